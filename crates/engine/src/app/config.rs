use serde::{Deserialize, Serialize};

use crate::camera::CameraConfig;
use crate::interaction::DispatchConfig;
use crate::movement::MovementConfig;
use crate::rooms::RoomConfig;

/// Tunables for one [`super::AdventureSession`]. Every section falls back to
/// its defaults when missing from a config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub movement: MovementConfig,
    pub dispatch: DispatchConfig,
    pub rooms: RoomConfig,
    pub camera: CameraConfig,
}
