//! Room graph, transition controller and the door interactables.

mod controller;
mod doors;
mod graph;

pub use controller::{PendingTransition, RoomConfig, RoomController, RoomEntered, TransitionError};
pub use doors::{ActorId, Door, DoorLock, LockedDoor, TeleportGate, TriggerDoor, PLAYER_ACTOR};
pub use graph::{
    CameraFraming, ExitSide, RoomDefinition, RoomExit, RoomGraph, SpawnOverride, LEFT_ENTRY_KEY,
    RIGHT_ENTRY_KEY,
};
