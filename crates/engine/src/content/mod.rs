//! Read-only XML authoring data. Everything under `assets/base` compiles
//! once into inert definitions that the game crate turns into a session.

mod compiler;
mod types;

pub use compiler::{
    compile_adventure_content, parse_adventure_document, ContentCompileError, ContentErrorCode,
    SourceLocation,
};
pub use types::{
    AdventureContent, DoorDef, DoorLockDef, FlagDef, KeyHuntDef, PropDef, PropKind, RoomDef,
    StartDef, TriggerDoorDef, VisibilityDef,
};
