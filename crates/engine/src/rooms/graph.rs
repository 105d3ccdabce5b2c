use std::collections::BTreeMap;

use crate::app::{FloorBounds, Rect, Vec2};

pub const LEFT_ENTRY_KEY: &str = "left";
pub const RIGHT_ENTRY_KEY: &str = "right";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSide {
    Left,
    Right,
}

impl ExitSide {
    /// Entry point used when arriving through the opposite wall.
    pub fn opposite_entry_key(self) -> &'static str {
        match self {
            ExitSide::Left => RIGHT_ENTRY_KEY,
            ExitSide::Right => LEFT_ENTRY_KEY,
        }
    }

    /// Direction pointing into the room from an exit on this side.
    pub fn inward_sign(self) -> f32 {
        match self {
            ExitSide::Left => -1.0,
            ExitSide::Right => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraFraming {
    Bounds(Rect),
    Anchor { position: Vec2, angle_degrees: f32 },
}

/// A way out of a room, as far as spawn resolution cares.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomExit {
    pub target_room: String,
    pub entry_key: String,
    pub x: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomDefinition {
    pub id: String,
    pub entry_points: BTreeMap<String, Vec2>,
    pub floor_bounds: FloorBounds,
    pub camera: CameraFraming,
    pub visual_root: String,
    pub exits: Vec<RoomExit>,
}

impl RoomDefinition {
    pub fn new(id: impl Into<String>, floor_bounds: FloorBounds) -> Self {
        let id = id.into();
        Self {
            visual_root: id.clone(),
            id,
            entry_points: BTreeMap::new(),
            floor_bounds,
            camera: CameraFraming::Bounds(Rect::new(
                Vec2::new(floor_bounds.min_x, 0.0),
                Vec2::new(floor_bounds.max_x, 0.0),
            )),
            exits: Vec::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, position: Vec2) -> Self {
        self.entry_points.insert(key.into(), position);
        self
    }

    pub fn with_camera(mut self, camera: CameraFraming) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_visual_root(mut self, visual_root: impl Into<String>) -> Self {
        self.visual_root = visual_root.into();
        self
    }

    pub fn with_exit(mut self, exit: RoomExit) -> Self {
        self.exits.push(exit);
        self
    }

    pub fn entry_point(&self, key: &str) -> Option<Vec2> {
        self.entry_points.get(key).copied()
    }

    pub fn exit_side(&self, door_x: f32) -> ExitSide {
        if door_x < self.floor_bounds.center_x() {
            ExitSide::Left
        } else {
            ExitSide::Right
        }
    }
}

/// Forces the entry point used for one room-to-room move. `from_room: None`
/// matches arrivals from anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOverride {
    pub from_room: Option<String>,
    pub to_room: String,
    pub entry_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct RoomGraph {
    rooms: BTreeMap<String, RoomDefinition>,
    overrides: Vec<SpawnOverride>,
}

impl RoomGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, room: RoomDefinition) {
        self.rooms.insert(room.id.clone(), room);
    }

    pub fn add_override(&mut self, spawn: SpawnOverride) {
        self.overrides.push(spawn);
    }

    pub fn room(&self, id: &str) -> Option<&RoomDefinition> {
        self.rooms.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn room_ids(&self) -> impl Iterator<Item = &str> {
        self.rooms.keys().map(String::as_str)
    }

    /// An exact `from` match beats a wildcard.
    pub fn override_for(&self, from: &str, to: &str) -> Option<&str> {
        let matching = |exact: bool| {
            self.overrides.iter().find(|spawn| {
                spawn.to_room == to
                    && match &spawn.from_room {
                        Some(room) => exact && room == from,
                        None => !exact,
                    }
            })
        };
        matching(true)
            .or_else(|| matching(false))
            .map(|spawn| spawn.entry_key.as_str())
    }

    /// The exit in `room` that leads back to `leaving`.
    pub fn return_exit(&self, room: &str, leaving: &str) -> Option<&RoomExit> {
        self.rooms
            .get(room)?
            .exits
            .iter()
            .find(|exit| exit.target_room == leaving)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_side_splits_at_floor_center() {
        let room = RoomDefinition::new("hall", FloorBounds::new(-10.0, 10.0));
        assert_eq!(room.exit_side(-3.0), ExitSide::Left);
        assert_eq!(room.exit_side(3.0), ExitSide::Right);
        assert_eq!(ExitSide::Left.opposite_entry_key(), RIGHT_ENTRY_KEY);
    }

    #[test]
    fn exact_override_beats_wildcard() {
        let mut graph = RoomGraph::new();
        graph.add_override(SpawnOverride {
            from_room: None,
            to_room: "office".to_string(),
            entry_key: "any".to_string(),
        });
        graph.add_override(SpawnOverride {
            from_room: Some("lobby".to_string()),
            to_room: "office".to_string(),
            entry_key: "desk".to_string(),
        });
        assert_eq!(graph.override_for("lobby", "office"), Some("desk"));
        assert_eq!(graph.override_for("street", "office"), Some("any"));
        assert_eq!(graph.override_for("lobby", "street"), None);
    }
}
