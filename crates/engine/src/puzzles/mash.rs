use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::{Cue, InputSnapshot, Rect, Vec2};
use crate::dialogue::DialogueFinished;
use crate::flags::FlagId;
use crate::interaction::{Interactable, InteractionContext, LockToken, PendingRelease, WalkToAnchor};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MashConfig {
    pub target_progress: f32,
    pub click_power: f32,
    pub resistance_interval_seconds: f32,
    pub resistance_step: f32,
    pub late_stage_enabled: bool,
    pub late_stage_start: f32,
    pub late_stage_max_decay_per_second: f32,
    pub late_stage_overrides_discrete: bool,
    pub click_window_seconds: f32,
    pub completion_seconds: f32,
}

impl Default for MashConfig {
    fn default() -> Self {
        Self {
            target_progress: 20.0,
            click_power: 1.0,
            resistance_interval_seconds: 2.0,
            resistance_step: 1.0,
            late_stage_enabled: true,
            late_stage_start: 0.7,
            late_stage_max_decay_per_second: 5.0,
            late_stage_overrides_discrete: true,
            click_window_seconds: 1.0,
            completion_seconds: 3.0,
        }
    }
}

#[derive(Debug)]
enum MashPhase {
    Idle,
    Active {
        token: LockToken,
        progress: f32,
        resistance_timer: f32,
        elapsed: f32,
        clicks: VecDeque<f32>,
    },
    Completing {
        token: LockToken,
        remaining: f32,
    },
    Completed,
}

/// Click-to-escape puzzle: clicks push progress up while resistance pulls it down.
#[derive(Debug)]
pub struct MashPuzzle {
    label: String,
    anchor: WalkToAnchor,
    config: MashConfig,
    required_flag: Option<FlagId>,
    blocked_script: Option<String>,
    completion_flag: Option<FlagId>,
    phase: MashPhase,
    blocked: Option<PendingRelease>,
}

impl MashPuzzle {
    pub fn new(label: impl Into<String>, anchor: WalkToAnchor, config: MashConfig) -> Self {
        Self {
            label: label.into(),
            anchor,
            config,
            required_flag: None,
            blocked_script: None,
            completion_flag: None,
            phase: MashPhase::Idle,
            blocked: None,
        }
    }

    pub fn with_gate(mut self, required_flag: Option<FlagId>, blocked_script: Option<String>) -> Self {
        self.required_flag = required_flag;
        self.blocked_script = blocked_script;
        self
    }

    pub fn with_completion_flag(mut self, flag: Option<FlagId>) -> Self {
        self.completion_flag = flag;
        self
    }

    pub fn is_active(&self) -> bool {
        matches!(self.phase, MashPhase::Active { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.phase, MashPhase::Completed)
    }

    pub fn progress_normalized(&self) -> f32 {
        match &self.phase {
            MashPhase::Active { progress, .. } => self.normalized(*progress),
            MashPhase::Completing { .. } | MashPhase::Completed => 1.0,
            MashPhase::Idle => 0.0,
        }
    }

    fn normalized(&self, progress: f32) -> f32 {
        if self.config.target_progress <= 0.0 {
            return 1.0;
        }
        progress / self.config.target_progress
    }

    /// Resistance for one tick, following the early/late stage rules.
    fn apply_resistance(&self, progress: &mut f32, resistance_timer: &mut f32, dt: f32) {
        let config = &self.config;
        let normalized = self.normalized(*progress);
        if config.late_stage_enabled && normalized >= config.late_stage_start {
            let span = 1.0 - config.late_stage_start;
            let late = if span > 0.0 {
                ((normalized - config.late_stage_start) / span).clamp(0.0, 1.0)
            } else {
                1.0
            };
            *progress -= config.late_stage_max_decay_per_second * late * dt;
            if config.late_stage_overrides_discrete {
                *resistance_timer = 0.0;
                *progress = progress.max(0.0);
                return;
            }
        }
        *resistance_timer += dt;
        if *resistance_timer >= config.resistance_interval_seconds {
            *resistance_timer = 0.0;
            *progress -= config.resistance_step;
        }
        *progress = progress.max(0.0);
    }
}

impl Interactable for MashPuzzle {
    fn label(&self) -> &str {
        &self.label
    }

    fn position(&self) -> Vec2 {
        self.anchor.position
    }

    fn hit_box(&self) -> Rect {
        self.anchor.hit_box()
    }

    fn on_click(&mut self, ctx: &mut InteractionContext<'_>) {
        self.anchor.begin_walk(ctx);
    }

    fn on_arrived(&mut self, ctx: &mut InteractionContext<'_>) {
        if !matches!(self.phase, MashPhase::Idle | MashPhase::Completed) || self.blocked.is_some() {
            debug!(puzzle = %self.label, "mash_already_running");
            return;
        }

        let gate_open = self
            .required_flag
            .map_or(true, |flag| ctx.flags.is_active(flag));
        if !gate_open && self.blocked_script.is_none() {
            info!(puzzle = %self.label, "mash_blocked");
            return;
        }

        let Ok(token) = self.anchor.arrive(ctx) else {
            return;
        };
        if self.is_completed() {
            ctx.end_interaction(token);
            return;
        }
        if !gate_open {
            info!(puzzle = %self.label, "mash_blocked");
            self.blocked = ctx.release_after_dialogue(token, self.blocked_script.as_deref());
            return;
        }

        info!(puzzle = %self.label, target = self.config.target_progress, "mash_started");
        let interactable = ctx.current();
        ctx.cues.emit(Cue::PuzzleStarted { interactable });
        self.phase = MashPhase::Active {
            token,
            progress: 0.0,
            resistance_timer: 0.0,
            elapsed: 0.0,
            clicks: VecDeque::new(),
        };
    }

    fn on_dialogue_finished(&mut self, finished: &DialogueFinished, ctx: &mut InteractionContext<'_>) {
        ctx.settle(&mut self.blocked, finished);
    }

    fn update(&mut self, dt: f32, input: &InputSnapshot, ctx: &mut InteractionContext<'_>) {
        let dt = dt.max(0.0);
        let interactable = ctx.current();
        match std::mem::replace(&mut self.phase, MashPhase::Idle) {
            MashPhase::Active {
                token,
                mut progress,
                mut resistance_timer,
                mut elapsed,
                mut clicks,
            } => {
                elapsed += dt;
                if input.clicked() {
                    progress += self.config.click_power;
                    clicks.push_back(elapsed);
                }
                if progress >= self.config.target_progress {
                    info!(puzzle = %self.label, "mash_completed");
                    self.phase = MashPhase::Completing {
                        token,
                        remaining: self.config.completion_seconds,
                    };
                    return;
                }
                self.apply_resistance(&mut progress, &mut resistance_timer, dt);

                let cutoff = elapsed - self.config.click_window_seconds;
                while clicks.front().is_some_and(|at| *at < cutoff) {
                    clicks.pop_front();
                }
                let window = self.config.click_window_seconds.max(f32::EPSILON);
                ctx.cues.emit(Cue::PuzzleProgress {
                    interactable,
                    normalized: self.normalized(progress),
                    clicks_per_second: clicks.len() as f32 / window,
                });
                self.phase = MashPhase::Active {
                    token,
                    progress,
                    resistance_timer,
                    elapsed,
                    clicks,
                };
            }
            MashPhase::Completing { token, remaining } => {
                let remaining = remaining - dt;
                if remaining > 0.0 {
                    self.phase = MashPhase::Completing { token, remaining };
                    return;
                }
                if let Some(flag) = self.completion_flag {
                    ctx.flags.toggle(flag);
                }
                ctx.end_interaction(token);
                ctx.cues.emit(Cue::PuzzleFinished { interactable });
                self.phase = MashPhase::Completed;
            }
            other => self.phase = other,
        }
    }

    fn abort(&mut self, ctx: &mut InteractionContext<'_>) {
        ctx.release_pending(&mut self.blocked);
        match std::mem::replace(&mut self.phase, MashPhase::Idle) {
            MashPhase::Active { token, .. } | MashPhase::Completing { token, .. } => {
                info!(puzzle = %self.label, "mash_aborted");
                ctx.end_interaction(token);
            }
            other => self.phase = other,
        }
    }
}
