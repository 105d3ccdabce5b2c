use std::collections::HashMap;

use tracing::{debug, info};

use crate::app::{Cue, FloorBounds, Rect, Vec2};
use crate::flags::{FlagId, FlagRegistry};
use crate::interaction::{
    CursorHint, DoorDirection, Interactable, InteractionContext, WalkToAnchor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(pub u32);

pub const PLAYER_ACTOR: ActorId = ActorId(0);

/// Per-actor cooldown so a spawn inside another trigger does not bounce back.
#[derive(Debug, Clone)]
pub struct TeleportGate {
    cooldown_seconds: f64,
    next_allowed: HashMap<ActorId, f64>,
}

impl TeleportGate {
    pub fn new(cooldown_seconds: f32) -> Self {
        Self {
            cooldown_seconds: f64::from(cooldown_seconds.max(0.0)),
            next_allowed: HashMap::new(),
        }
    }

    pub fn try_pass(&mut self, actor: ActorId, now: f64) -> bool {
        if self
            .next_allowed
            .get(&actor)
            .is_some_and(|allowed| now < *allowed)
        {
            return false;
        }
        self.next_allowed.insert(actor, now + self.cooldown_seconds);
        true
    }
}

/// Immediate-fire door: clicking sends the actor through.
#[derive(Debug, Clone)]
pub struct Door {
    label: String,
    position: Vec2,
    half_extents: Vec2,
    target_room: String,
    entry_key: String,
    direction: DoorDirection,
    show_exit_arrow: bool,
}

impl Door {
    pub fn new(
        label: impl Into<String>,
        position: Vec2,
        half_extents: Vec2,
        target_room: impl Into<String>,
        entry_key: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            position,
            half_extents,
            target_room: target_room.into(),
            entry_key: entry_key.into(),
            direction: DoorDirection::Wall,
            show_exit_arrow: false,
        }
    }

    pub fn with_direction(mut self, direction: DoorDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_exit_arrow(mut self, show: bool) -> Self {
        self.show_exit_arrow = show;
        self
    }

    pub fn target_room(&self) -> &str {
        &self.target_room
    }
}

impl Interactable for Door {
    fn label(&self) -> &str {
        &self.label
    }

    fn position(&self) -> Vec2 {
        self.position
    }

    fn hit_box(&self) -> Rect {
        Rect::from_center(self.position, self.half_extents)
    }

    fn cursor_hint(&self) -> CursorHint {
        CursorHint::Door(self.direction)
    }

    fn on_click(&mut self, ctx: &mut InteractionContext<'_>) {
        if let Err(error) = ctx.rooms.prepare_transition(
            &self.target_room,
            &self.entry_key,
            self.position.x,
            ctx.movement,
        ) {
            debug!(door = %self.label, error = %error, "door_transition_rejected");
        }
    }

    fn exit_arrow(&self, _flags: &FlagRegistry) -> Option<bool> {
        self.show_exit_arrow.then_some(false)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoorLock {
    pub flag: Option<FlagId>,
    pub require_flag_true: bool,
    pub locked: bool,
}

impl DoorLock {
    pub fn is_locked(&self, flags: &FlagRegistry) -> bool {
        match self.flag {
            Some(flag) if self.require_flag_true => !flags.is_active(flag),
            Some(flag) if flags.is_active(flag) => false,
            _ => self.locked,
        }
    }
}

/// Walk-then-act door gated by a [`DoorLock`].
#[derive(Debug, Clone)]
pub struct LockedDoor {
    label: String,
    anchor: WalkToAnchor,
    target_room: String,
    entry_key: String,
    direction: DoorDirection,
    lock: DoorLock,
    show_exit_arrow: bool,
    locked_attempts: u32,
}

impl LockedDoor {
    pub fn new(
        label: impl Into<String>,
        anchor: WalkToAnchor,
        target_room: impl Into<String>,
        entry_key: impl Into<String>,
        lock: DoorLock,
    ) -> Self {
        Self {
            label: label.into(),
            anchor,
            target_room: target_room.into(),
            entry_key: entry_key.into(),
            direction: DoorDirection::Wall,
            lock,
            show_exit_arrow: false,
            locked_attempts: 0,
        }
    }

    pub fn with_direction(mut self, direction: DoorDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_exit_arrow(mut self, show: bool) -> Self {
        self.show_exit_arrow = show;
        self
    }

    pub fn is_locked(&self, flags: &FlagRegistry) -> bool {
        self.lock.is_locked(flags)
    }

    pub fn lock(&mut self) {
        self.lock.locked = true;
    }

    pub fn unlock(&mut self) {
        self.lock.locked = false;
    }

    pub fn toggle_lock(&mut self) {
        self.lock.locked = !self.lock.locked;
    }

    pub fn locked_attempts(&self) -> u32 {
        self.locked_attempts
    }
}

impl Interactable for LockedDoor {
    fn label(&self) -> &str {
        &self.label
    }

    fn position(&self) -> Vec2 {
        self.anchor.position
    }

    fn hit_box(&self) -> Rect {
        self.anchor.hit_box()
    }

    fn cursor_hint(&self) -> CursorHint {
        CursorHint::Door(self.direction)
    }

    fn on_click(&mut self, ctx: &mut InteractionContext<'_>) {
        self.anchor.begin_walk(ctx);
    }

    fn on_arrived(&mut self, ctx: &mut InteractionContext<'_>) {
        let Ok(token) = self.anchor.arrive(ctx) else {
            return;
        };
        if self.lock.is_locked(ctx.flags) {
            self.locked_attempts = self.locked_attempts.saturating_add(1);
            info!(door = %self.label, attempts = self.locked_attempts, "door_locked_attempt");
            let interactable = ctx.current();
            ctx.cues.emit(Cue::LockedAttempt { interactable });
            ctx.end_interaction(token);
            return;
        }
        ctx.end_interaction(token);
        if let Err(error) = ctx.rooms.prepare_transition(
            &self.target_room,
            &self.entry_key,
            self.anchor.position.x,
            ctx.movement,
        ) {
            debug!(door = %self.label, error = %error, "door_transition_rejected");
        }
    }

    fn exit_arrow(&self, flags: &FlagRegistry) -> Option<bool> {
        self.show_exit_arrow.then(|| self.lock.is_locked(flags))
    }
}

/// Floor span that teleports the actor on entry. Not clickable.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDoor {
    pub room: String,
    pub span: FloorBounds,
    pub target_room: String,
    pub entry_key: String,
    inside: bool,
}

impl TriggerDoor {
    pub fn new(
        room: impl Into<String>,
        span: FloorBounds,
        target_room: impl Into<String>,
        entry_key: impl Into<String>,
    ) -> Self {
        Self {
            room: room.into(),
            span,
            target_room: target_room.into(),
            entry_key: entry_key.into(),
            inside: false,
        }
    }

    /// Records overlap without firing, e.g. right after spawning on top of it.
    pub fn prime(&mut self, actor_x: f32) {
        self.inside = self.span.contains_x(actor_x);
    }

    /// True only on the tick the actor steps in.
    pub fn overlap_began(&mut self, actor_x: f32) -> bool {
        let inside = self.span.contains_x(actor_x);
        let began = inside && !self.inside;
        self.inside = inside;
        if began {
            debug!(room = %self.room, target = %self.target_room, "trigger_door_entered");
        }
        began
    }
}
