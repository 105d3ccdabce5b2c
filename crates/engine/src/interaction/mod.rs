//! Pointer-to-world interaction: the interactable capability, hover and click
//! dispatch, and the single interaction lock.

mod anchor;
mod context;
mod dispatch;
mod lock;

pub use anchor::{WalkToAnchor, DEFAULT_INTERACTION_OFFSET};
pub use context::{InteractionContext, PendingRelease, Services};
#[cfg(test)]
pub(crate) use context::test_support;
pub use dispatch::{
    ClickRoute, DispatchConfig, ExitArrowHint, HoverCandidate, HoverTransition,
    InteractionDispatch, DEFAULT_ARROW_DETECTION_RADIUS,
};
pub use lock::{InteractionLock, LockError, LockOwner, LockToken};

use crate::app::{InputSnapshot, Rect, Vec2};
use crate::dialogue::DialogueFinished;
use crate::flags::FlagRegistry;
use crate::movement::ArrivalTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InteractableId(pub u32);

impl From<InteractableId> for ArrivalTag {
    fn from(id: InteractableId) -> Self {
        ArrivalTag(id.0)
    }
}

impl From<ArrivalTag> for InteractableId {
    fn from(tag: ArrivalTag) -> Self {
        InteractableId(tag.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorDirection {
    Left,
    Right,
    Wall,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorHint {
    #[default]
    Default,
    Interactable,
    Door(DoorDirection),
}

/// A world object the dispatch can hover and click.
///
/// `on_click` is where every interaction starts. Walk-then-act objects send
/// the actor to their interaction point there and take the lock in
/// `on_arrived`; immediate objects act right away. Anything that holds a
/// [`LockToken`] must give it back on every path, including `abort`.
pub trait Interactable {
    fn label(&self) -> &str;

    fn position(&self) -> Vec2;

    fn hit_box(&self) -> Rect;

    fn cursor_hint(&self) -> CursorHint {
        CursorHint::Interactable
    }

    /// False hides the object from hover and clicks, e.g. a prop already searched.
    fn is_interactable(&self) -> bool {
        true
    }

    fn on_hover(&mut self, _hovering: bool) {}

    fn on_click(&mut self, ctx: &mut InteractionContext<'_>);

    fn on_arrived(&mut self, _ctx: &mut InteractionContext<'_>) {}

    fn on_dialogue_finished(
        &mut self,
        _finished: &DialogueFinished,
        _ctx: &mut InteractionContext<'_>,
    ) {
    }

    fn update(&mut self, _dt: f32, _input: &InputSnapshot, _ctx: &mut InteractionContext<'_>) {}

    fn abort(&mut self, _ctx: &mut InteractionContext<'_>) {}

    /// `Some(locked)` for exits that show a HUD arrow when the actor is near.
    fn exit_arrow(&self, _flags: &FlagRegistry) -> Option<bool> {
        None
    }
}
