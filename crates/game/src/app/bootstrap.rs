use std::path::PathBuf;

use adventure_engine::{
    compile_adventure_content, resolve_app_paths, AppError, AppPaths, LoopConfig,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::{load_game_config, ConfigError};
use super::playthrough::{load_playthrough, resolve_script_path, Playthrough, PlaythroughError};
use super::save::SaveError;
use super::world::{build_world, DemoWorld, WorldError};

#[derive(Debug, Error)]
pub(crate) enum GameError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Playthrough(#[from] PlaythroughError),
    #[error(transparent)]
    Save(#[from] SaveError),
    #[error("playthrough failed at {failure}")]
    PlaythroughFailed { failure: String },
}

pub(crate) struct AppWiring {
    pub(crate) paths: AppPaths,
    pub(crate) config: LoopConfig,
    pub(crate) world: DemoWorld,
    pub(crate) playthrough: Playthrough,
    pub(crate) script_path: PathBuf,
}

pub(crate) fn build_app() -> Result<AppWiring, GameError> {
    info!("=== Adventure Startup ===");

    let paths = resolve_app_paths().map_err(AppError::from)?;
    info!(root = %paths.root.display(), "project_root_resolved");

    let game_config = load_game_config(&paths.root)?;
    let content = compile_adventure_content(&paths).map_err(AppError::from)?;

    let mut rng = match game_config.key_seed {
        Some(seed) => {
            info!(seed, "key_seed_fixed");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };
    let world = build_world(&content, game_config.session, &mut rng)?;

    let config = game_config.loop_config();
    let script_path = resolve_script_path(&paths.playthrough_dir);
    let playthrough = load_playthrough(&script_path, config.target_tps, &paths.save_dir)?;

    Ok(AppWiring {
        paths,
        config,
        world,
        playthrough,
        script_path,
    })
}

pub(crate) fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
