//! One-axis walk controller for the player actor.
//!
//! The controller is either idle or moving toward a single target X. A walk may
//! carry an [`ArrivalTag`] naming who asked for it, and `update` reports that tag
//! exactly once when the actor arrives. Disabling movement drops the target and
//! the tag, and every `set_target_x`/`walk_to` is ignored until movement is
//! enabled again.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::app::{AnimationState, Cue, CueQueue, Vec2};

pub const DEFAULT_WALK_SPEED: f32 = 4.0;
pub const DEFAULT_STOP_DISTANCE: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub speed: f32,
    pub stop_distance: f32,
    pub lock_floor_y: bool,
    pub floor_y: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            speed: DEFAULT_WALK_SPEED,
            stop_distance: DEFAULT_STOP_DISTANCE,
            lock_floor_y: false,
            floor_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrivalTag(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementEvent {
    Arrived { tag: Option<ArrivalTag> },
}

#[derive(Debug, Clone)]
pub struct MovementController {
    config: MovementConfig,
    position: Vec2,
    target_x: Option<f32>,
    arrival_tag: Option<ArrivalTag>,
    enabled: bool,
    facing: Facing,
    footsteps_playing: bool,
}

impl MovementController {
    pub fn new(config: MovementConfig, position: Vec2) -> Self {
        let mut controller = Self {
            config,
            position,
            target_x: None,
            arrival_tag: None,
            enabled: true,
            facing: Facing::default(),
            footsteps_playing: false,
        };
        controller.apply_floor_lock();
        controller
    }

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn x(&self) -> f32 {
        self.position.x
    }

    pub fn target_x(&self) -> Option<f32> {
        self.target_x
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_moving(&self) -> bool {
        self.target_x.is_some()
    }

    /// Free walk. Drops any arrival tag from an earlier walk.
    pub fn set_target_x(&mut self, x: f32) -> bool {
        if !self.enabled {
            trace!(x, "set_target_ignored_disabled");
            return false;
        }
        if !x.is_finite() {
            return false;
        }
        if self.target_x == Some(x) && self.arrival_tag.is_none() {
            return true;
        }
        self.target_x = Some(x);
        self.arrival_tag = None;
        true
    }

    /// Walk whose arrival is reported with `tag`.
    pub fn walk_to(&mut self, x: f32, tag: ArrivalTag) -> bool {
        if !self.enabled {
            trace!(x, "walk_to_ignored_disabled");
            return false;
        }
        if !x.is_finite() {
            return false;
        }
        self.target_x = Some(x);
        self.arrival_tag = Some(tag);
        true
    }

    pub fn teleport(&mut self, x: f32) {
        self.position.x = x;
        self.target_x = None;
        self.arrival_tag = None;
        self.apply_floor_lock();
    }

    pub fn enable_movement(&mut self) {
        self.enabled = true;
    }

    pub fn disable_movement(&mut self) {
        self.enabled = false;
        self.target_x = None;
        self.arrival_tag = None;
    }

    pub fn face(&mut self, facing: Facing) {
        self.facing = facing;
    }

    pub fn face_toward_x(&mut self, x: f32) {
        if x < self.position.x {
            self.facing = Facing::Left;
        } else if x > self.position.x {
            self.facing = Facing::Right;
        }
    }

    pub fn set_floor_y(&mut self, y: f32, snap: bool) {
        self.config.floor_y = y;
        if snap {
            self.position.y = y;
        }
    }

    pub fn update(&mut self, dt: f32, cues: &mut CueQueue) -> Option<MovementEvent> {
        let event = self.step(dt.max(0.0));
        self.update_footsteps(cues);
        event
    }

    pub fn animation_state(&self) -> AnimationState {
        AnimationState {
            facing: self.facing,
            is_walking: self.is_moving() && self.enabled,
            trigger: None,
        }
    }

    fn step(&mut self, dt: f32) -> Option<MovementEvent> {
        let target = self.target_x?;
        let dx = target - self.position.x;
        if dx.abs() <= self.config.stop_distance {
            return Some(self.arrive());
        }

        let step = (self.config.speed.max(0.0) * dt).min(dx.abs());
        self.position.x += dx.signum() * step;
        self.facing = if dx < 0.0 { Facing::Left } else { Facing::Right };
        self.apply_floor_lock();

        if (target - self.position.x).abs() <= self.config.stop_distance {
            return Some(self.arrive());
        }
        None
    }

    fn arrive(&mut self) -> MovementEvent {
        self.target_x = None;
        let tag = self.arrival_tag.take();
        debug!(x = self.position.x, tagged = tag.is_some(), "movement_arrived");
        MovementEvent::Arrived { tag }
    }

    fn update_footsteps(&mut self, cues: &mut CueQueue) {
        let walking = self.is_moving() && self.enabled;
        if walking == self.footsteps_playing {
            return;
        }
        self.footsteps_playing = walking;
        cues.emit(if walking {
            Cue::FootstepsStarted
        } else {
            Cue::FootstepsStopped
        });
    }

    fn apply_floor_lock(&mut self) {
        if self.config.lock_floor_y {
            self.position.y = self.config.floor_y;
        }
    }
}
