use adventure_engine::run_headless;
use tracing::{error, info, warn};

use super::bootstrap::{AppWiring, GameError};
use super::save;

const FINAL_SAVE_NAME: &str = "last_run";

pub(crate) fn run(app: AppWiring) -> Result<(), GameError> {
    let AppWiring {
        paths,
        config,
        mut world,
        mut playthrough,
        script_path,
    } = app;

    info!(script = %script_path.display(), "playthrough_started");
    let summary = run_headless(&mut world.session, &config, &mut playthrough)?;

    for placed in &world.key_hunts {
        info!(
            key_hunt = %placed.id,
            key_prop = placed.key_prop.as_deref().unwrap_or("-"),
            searched = placed.hunt.searched_count(),
            props = placed.hunt.prop_count(),
            found = placed.hunt.keys_found(world.session.flags()),
            "key_hunt_stats"
        );
    }

    save::write_snapshot(&paths.save_dir, FINAL_SAVE_NAME, &world.session.snapshot())?;

    if let Some(failure) = playthrough.failures().first() {
        error!(%failure, ticks = summary.ticks, "playthrough_failed");
        return Err(GameError::PlaythroughFailed {
            failure: failure.to_string(),
        });
    }
    if playthrough.remaining() > 0 {
        warn!(remaining = playthrough.remaining(), "playthrough_unfinished");
    }

    info!(
        commands = playthrough.executed(),
        ticks = summary.ticks,
        room = summary.final_room.as_deref().unwrap_or("-"),
        "playthrough_finished"
    );
    Ok(())
}
