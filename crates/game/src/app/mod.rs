mod bootstrap;
mod config;
mod loop_runner;
mod playthrough;
mod save;
mod world;

use std::process::ExitCode;

use tracing::error;

pub(crate) fn run() -> ExitCode {
    bootstrap::init_tracing();
    let result = bootstrap::build_app().and_then(loop_runner::run);
    if let Err(err) = result {
        error!(error = %err, "run_failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
