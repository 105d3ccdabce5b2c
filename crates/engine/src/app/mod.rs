mod config;
mod cues;
mod input;
mod loop_runner;
mod session;
mod space;

pub use config::SessionConfig;
pub use cues::{AnimationState, AnimationTrigger, Cue, CueCounts, CueQueue};
pub use input::InputSnapshot;
pub use loop_runner::{
    run_headless, AppError, InputSource, LoopConfig, LoopSummary, TPS_ENV_VAR,
};
pub use session::{AdventureSession, SessionSnapshot};
pub use space::{FloorBounds, Rect, Vec2};
