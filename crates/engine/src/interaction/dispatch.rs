use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::app::{FloorBounds, InputSnapshot, Rect, Vec2};

use super::{CursorHint, InteractableId};

pub const DEFAULT_ARROW_DETECTION_RADIUS: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub walk_bounds_inset_x: f32,
    pub arrow_detection_radius: f32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            walk_bounds_inset_x: 0.0,
            arrow_detection_radius: DEFAULT_ARROW_DETECTION_RADIUS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoverCandidate {
    pub id: InteractableId,
    pub hit_box: Rect,
    pub cursor: CursorHint,
}

/// One hover change: `left` gets `on_hover(false)`, then `entered` gets `on_hover(true)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoverTransition {
    pub left: Option<InteractableId>,
    pub entered: Option<InteractableId>,
    pub cursor_changed: Option<CursorHint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClickRoute {
    NoClick,
    ConsumedByUi,
    Busy,
    Interactable(InteractableId),
    FreeWalk { target_x: f32 },
    NoFloor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitArrowHint {
    pub door: InteractableId,
    pub locked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InteractionDispatch {
    config: DispatchConfig,
    hovered: Option<InteractableId>,
    cursor: CursorHint,
    floor_bounds: Option<FloorBounds>,
}

impl InteractionDispatch {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn hovered(&self) -> Option<InteractableId> {
        self.hovered
    }

    pub fn cursor(&self) -> CursorHint {
        self.cursor
    }

    pub fn floor_bounds(&self) -> Option<FloorBounds> {
        self.floor_bounds
    }

    pub fn set_floor_bounds(&mut self, bounds: Option<FloorBounds>) {
        self.floor_bounds = bounds;
    }

    /// Picks the topmost candidate under the pointer. Later candidates sit on
    /// top of earlier ones.
    pub fn resolve_hover<I>(&mut self, pointer: Option<Vec2>, candidates: I) -> Option<HoverTransition>
    where
        I: IntoIterator<Item = HoverCandidate>,
    {
        let picked = pointer.and_then(|point| {
            candidates
                .into_iter()
                .filter(|candidate| candidate.hit_box.contains(point))
                .last()
        });
        let picked_id = picked.map(|candidate| candidate.id);
        let cursor = picked.map_or(CursorHint::Default, |candidate| candidate.cursor);

        let cursor_changed = (cursor != self.cursor).then_some(cursor);
        self.cursor = cursor;

        if picked_id == self.hovered {
            return cursor_changed.map(|cursor| HoverTransition {
                left: None,
                entered: None,
                cursor_changed: Some(cursor),
            });
        }

        let left = self.hovered;
        self.hovered = picked_id;
        trace!(?left, entered = ?picked_id, "hover_changed");
        Some(HoverTransition {
            left,
            entered: picked_id,
            cursor_changed,
        })
    }

    /// Decides what a click does this tick. `busy` is true while an
    /// interaction or dialogue controls the actor.
    pub fn route_click(&self, input: &InputSnapshot, busy: bool) -> ClickRoute {
        if !input.clicked() {
            return ClickRoute::NoClick;
        }
        if input.pointer_over_ui() {
            return ClickRoute::ConsumedByUi;
        }
        if busy {
            return ClickRoute::Busy;
        }
        if let Some(id) = self.hovered {
            return ClickRoute::Interactable(id);
        }
        let Some(pointer) = input.pointer_world_position() else {
            return ClickRoute::NoFloor;
        };
        match self.free_walk_target(pointer.x) {
            Some(target_x) => ClickRoute::FreeWalk { target_x },
            None => ClickRoute::NoFloor,
        }
    }

    pub fn free_walk_target(&self, x: f32) -> Option<f32> {
        self.floor_bounds
            .map(|bounds| bounds.clamp_x(x, self.config.walk_bounds_inset_x))
    }
}
