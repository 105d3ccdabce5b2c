use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod camera;
pub mod content;
pub mod dialogue;
pub mod flags;
pub mod interaction;
pub mod movement;
pub mod puzzles;
pub mod rooms;

pub use app::{
    run_headless, AdventureSession, AnimationState, AnimationTrigger, AppError, Cue, CueCounts,
    CueQueue, FloorBounds, InputSnapshot, InputSource, LoopConfig, LoopSummary, Rect,
    SessionConfig, SessionSnapshot, Vec2, TPS_ENV_VAR,
};
pub use camera::{CameraConfig, CameraMode, CameraRig};
pub use content::{
    compile_adventure_content, parse_adventure_document, AdventureContent, ContentCompileError,
    ContentErrorCode, DoorDef, DoorLockDef, FlagDef, KeyHuntDef, PropDef, PropKind, RoomDef,
    SourceLocation, StartDef, TriggerDoorDef, VisibilityDef,
};
pub use dialogue::{
    DialogueChoice, DialogueEffect, DialogueEngine, DialogueEvent, DialogueFinished,
    DialogueLine, DialogueScript, DialogueTicket, FinishReason, LineNext, ScriptLibrary, Speaker,
};
pub use flags::{FlagChange, FlagId, FlagRegistry, FlagSnapshot, FlagVisibility, SubscriptionId};
pub use interaction::{
    ClickRoute, CursorHint, DispatchConfig, DoorDirection, ExitArrowHint, HoverCandidate,
    HoverTransition, Interactable, InteractableId, InteractionContext, InteractionDispatch,
    InteractionLock, LockError, LockOwner, LockToken, PendingRelease, Services, WalkToAnchor,
};
pub use movement::{ArrivalTag, Facing, MovementConfig, MovementController, MovementEvent};
pub use puzzles::{
    ConversationProp, FetchQuest, FetchQuestFlags, FetchQuestScripts, KeyHunt, KeyPlacement,
    MashConfig, MashPuzzle, SearchProp, SearchScripts,
};
pub use rooms::{
    ActorId, CameraFraming, Door, DoorLock, ExitSide, LockedDoor, PendingTransition,
    RoomConfig, RoomController, RoomDefinition, RoomEntered, RoomExit, RoomGraph,
    SpawnOverride, TeleportGate, TransitionError, TriggerDoor, PLAYER_ACTOR,
};

pub const ROOT_ENV_VAR: &str = "ADVENTURE_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub content_dir: PathBuf,
    pub playthrough_dir: PathBuf,
    pub save_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create save directory at {path}: {source}")]
    CreateSaveDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "ADVENTURE_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and either crates/ or assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and either crates/ or assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/adventure\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_for_root(root)
}

pub fn app_paths_for_root(root: PathBuf) -> Result<AppPaths, StartupError> {
    let content_dir = root.join("assets").join("base");
    let playthrough_dir = root.join("assets").join("playthroughs");
    let save_dir = root.join("cache").join("saves");

    fs::create_dir_all(&save_dir).map_err(|source| StartupError::CreateSaveDir {
        path: save_dir.clone(),
        source,
    })?;

    Ok(AppPaths {
        root,
        content_dir,
        playthrough_dir,
        save_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let raw = PathBuf::from(value);
            let normalized = normalize_path(&raw);
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            for candidate in exe_dir.ancestors() {
                if is_repo_marker(candidate) {
                    return Ok(normalize_path(candidate));
                }
            }

            Err(StartupError::RootNotFound {
                start_dir: normalize_path(&exe_dir),
                env_var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    let cargo_toml = path.join("Cargo.toml").is_file();
    let has_crates = path.join("crates").is_dir();
    let has_assets = path.join("assets").is_dir();

    cargo_toml && (has_crates || has_assets)
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
