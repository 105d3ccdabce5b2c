use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::app::{Rect, Vec2};
use crate::rooms::CameraFraming;

pub const DEFAULT_HALF_VIEW_WIDTH: f32 = 8.0;
pub const DEFAULT_FOLLOW_SPEED: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub half_view_width: f32,
    pub follow_speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            half_view_width: DEFAULT_HALF_VIEW_WIDTH,
            follow_speed: DEFAULT_FOLLOW_SPEED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraMode {
    Static { position: Vec2, angle_degrees: f32 },
    Follow { min_x: f32, max_x: f32, y: f32 },
}

/// Horizontal follow camera clamped to the active room.
#[derive(Debug, Clone)]
pub struct CameraRig {
    config: CameraConfig,
    mode: CameraMode,
    position: Vec2,
}

impl CameraRig {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            mode: CameraMode::Static {
                position: Vec2::default(),
                angle_degrees: 0.0,
            },
            position: Vec2::default(),
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    pub fn apply_framing(&mut self, framing: CameraFraming, target_x: f32) {
        match framing {
            CameraFraming::Bounds(bounds) => self.set_room_bounds(bounds, target_x),
            CameraFraming::Anchor {
                position,
                angle_degrees,
            } => self.set_anchor(position, angle_degrees),
        }
    }

    /// Follows inside the room, or sits centred when the room is narrower
    /// than the view. Snaps so a new room never opens mid-pan.
    pub fn set_room_bounds(&mut self, bounds: Rect, target_x: f32) {
        let half = self.config.half_view_width.max(0.0);
        let min_x = bounds.min.x + half;
        let max_x = bounds.max.x - half;
        let y = bounds.center().y;
        if min_x > max_x {
            self.set_anchor(bounds.center(), 0.0);
            return;
        }
        self.mode = CameraMode::Follow { min_x, max_x, y };
        self.position = Vec2::new(target_x.clamp(min_x, max_x), y);
        debug!(min_x, max_x, "camera_follow_bounds");
    }

    pub fn set_anchor(&mut self, position: Vec2, angle_degrees: f32) {
        self.mode = CameraMode::Static {
            position,
            angle_degrees,
        };
        self.position = position;
        debug!(x = position.x, y = position.y, angle_degrees, "camera_anchored");
    }

    pub fn update(&mut self, dt: f32, target_x: f32) {
        let CameraMode::Follow { min_x, max_x, y } = self.mode else {
            return;
        };
        let goal = target_x.clamp(min_x, max_x);
        let t = (self.config.follow_speed.max(0.0) * dt.max(0.0)).min(1.0);
        self.position = Vec2::new(self.position.x + (goal - self.position.x) * t, y);
    }
}
