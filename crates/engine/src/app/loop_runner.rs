use std::env;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::content::ContentCompileError;
use crate::rooms::TransitionError;
use crate::StartupError;

use super::{AdventureSession, InputSnapshot};

pub const TPS_ENV_VAR: &str = "ADVENTURE_TPS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    /// Stops a run whose input never finishes.
    pub max_ticks: Option<u64>,
    /// Paces ticks against the wall clock instead of running flat out.
    pub realtime: bool,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval_ticks: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_ticks: Some(60 * 60 * 10),
            realtime: false,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval_ticks: 600,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Content(#[from] ContentCompileError),
    #[error("failed to enter room: {0}")]
    Transition(#[from] TransitionError),
    #[error("run did not finish within {max_ticks} ticks")]
    TickBudgetExhausted { max_ticks: u64 },
}

/// Feeds one input snapshot per tick. `None` ends the run. Scripted sources
/// may also drive the session between ticks, e.g. to save or abort.
pub trait InputSource {
    fn next_input(&mut self, tick: u64, session: &mut AdventureSession) -> Option<InputSnapshot>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub ticks: u64,
    pub cues_emitted: u64,
    pub transitions: u64,
    pub final_room: Option<String>,
}

pub fn run_headless(
    session: &mut AdventureSession,
    config: &LoopConfig,
    input: &mut dyn InputSource,
) -> Result<LoopSummary, AppError> {
    let target_tps = resolve_target_tps(config.target_tps);
    let fixed_dt = Duration::from_secs_f64(1.0 / f64::from(target_tps));
    let dt_seconds = fixed_dt.as_secs_f32();
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);

    info!(
        target_tps,
        realtime = config.realtime,
        max_ticks = ?config.max_ticks,
        "headless_loop_started"
    );

    let started = Instant::now();
    let mut ticks: u64 = 0;
    let mut accumulator = Duration::ZERO;
    let mut last_frame = Instant::now();

    'run: loop {
        let steps = if config.realtime {
            let now = Instant::now();
            let frame_dt = clamp_frame_delta(now - last_frame, config.max_frame_delta);
            last_frame = now;
            let plan = plan_sim_steps(accumulator + frame_dt, fixed_dt, max_ticks_per_frame);
            accumulator = plan.remaining_accumulator;
            if plan.dropped_backlog > Duration::ZERO {
                warn!(
                    dropped_ms = plan.dropped_backlog.as_secs_f64() * 1000.0,
                    "sim_backlog_dropped"
                );
            }
            plan.ticks_to_run
        } else {
            1
        };

        for _ in 0..steps {
            if let Some(max_ticks) = config.max_ticks {
                if ticks >= max_ticks {
                    warn!(max_ticks, "tick_budget_exhausted");
                    return Err(AppError::TickBudgetExhausted { max_ticks });
                }
            }
            let Some(snapshot) = input.next_input(ticks, session) else {
                break 'run;
            };
            session.tick(dt_seconds, &snapshot);
            ticks = ticks.saturating_add(1);

            if config.metrics_log_interval_ticks > 0
                && ticks % config.metrics_log_interval_ticks == 0
            {
                let counts = session.cues().last_tick_counts();
                debug!(
                    ticks,
                    room = session.active_room_id().unwrap_or("-"),
                    busy = session.is_busy(),
                    cues_total = session.cues().emitted_total(),
                    cues_last_tick = counts.total,
                    lock_acquisitions = session.lock().acquisitions(),
                    "loop_metrics"
                );
            }
        }

        if config.realtime {
            let spare = fixed_dt.saturating_sub(accumulator);
            if !spare.is_zero() {
                thread::sleep(spare);
            }
        }
    }

    let summary = LoopSummary {
        ticks,
        cues_emitted: session.cues().emitted_total(),
        transitions: session.rooms().transitions(),
        final_room: session.active_room_id().map(str::to_string),
    };
    info!(
        ticks = summary.ticks,
        cues = summary.cues_emitted,
        transitions = summary.transitions,
        room = summary.final_room.as_deref().unwrap_or("-"),
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "headless_loop_finished"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SimStepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(accumulator: Duration, fixed_dt: Duration, max_ticks: u32) -> SimStepPlan {
    let mut remaining = accumulator;
    let mut ticks_to_run = 0;
    while remaining >= fixed_dt && ticks_to_run < max_ticks {
        remaining -= fixed_dt;
        ticks_to_run += 1;
    }

    let mut dropped_backlog = Duration::ZERO;
    if ticks_to_run == max_ticks && remaining >= fixed_dt {
        dropped_backlog = remaining;
        remaining = Duration::ZERO;
    }

    SimStepPlan {
        ticks_to_run,
        remaining_accumulator: remaining,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn resolve_target_tps(config_tps: u32) -> u32 {
    let fallback = config_tps.max(1);
    match env::var(TPS_ENV_VAR) {
        Ok(value) => match value.parse::<u32>() {
            Ok(tps) if tps > 0 => tps,
            _ => {
                warn!(
                    env_var = TPS_ENV_VAR,
                    value = value.as_str(),
                    "invalid tick-rate env var value; falling back to config"
                );
                fallback
            }
        },
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var = TPS_ENV_VAR,
                error = %err,
                "unable to read tick-rate env var; falling back to config"
            );
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{FloorBounds, SessionConfig, Vec2};
    use crate::dialogue::ScriptLibrary;
    use crate::flags::FlagRegistry;
    use crate::rooms::{RoomDefinition, RoomGraph};

    struct Scripted {
        inputs: Vec<InputSnapshot>,
    }

    impl InputSource for Scripted {
        fn next_input(&mut self, tick: u64, _session: &mut AdventureSession) -> Option<InputSnapshot> {
            usize::try_from(tick)
                .ok()
                .and_then(|index| self.inputs.get(index).cloned())
        }
    }

    struct Endless;

    impl InputSource for Endless {
        fn next_input(&mut self, _tick: u64, _session: &mut AdventureSession) -> Option<InputSnapshot> {
            Some(InputSnapshot::empty())
        }
    }

    fn session() -> AdventureSession {
        let mut graph = RoomGraph::new();
        graph.insert(
            RoomDefinition::new("office", FloorBounds::new(-5.0, 5.0))
                .with_entry("start", Vec2::new(0.0, 0.0)),
        );
        let mut session = AdventureSession::new(
            SessionConfig::default(),
            graph,
            ScriptLibrary::default(),
            FlagRegistry::new(),
        );
        session.start("office", "start").expect("start");
        session
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn run_stops_when_input_source_is_exhausted() {
        let mut session = session();
        let mut inputs = vec![InputSnapshot::click_at(Vec2::new(3.0, 0.0))];
        inputs.extend(std::iter::repeat(InputSnapshot::empty()).take(119));
        let summary = run_headless(
            &mut session,
            &LoopConfig::default(),
            &mut Scripted { inputs },
        )
        .expect("run");

        assert_eq!(summary.ticks, 120);
        assert_eq!(summary.final_room.as_deref(), Some("office"));
        assert!((session.movement().x() - 3.0).abs() <= 0.02);
        assert!(summary.cues_emitted >= 2);
    }

    #[test]
    fn endless_input_hits_tick_budget() {
        let mut session = session();
        let config = LoopConfig {
            max_ticks: Some(10),
            ..LoopConfig::default()
        };
        let error = run_headless(&mut session, &config, &mut Endless).expect_err("budget");
        assert!(matches!(error, AppError::TickBudgetExhausted { max_ticks: 10 }));
        assert_eq!(session.tick_count(), 10);
    }
}
