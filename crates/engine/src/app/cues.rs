use crate::interaction::{CursorHint, ExitArrowHint, InteractableId};
use crate::movement::Facing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationTrigger {
    Inspect,
    ReleaseInspect,
    HighlightReact,
}

/// What the sprite collaborator needs each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationState {
    pub facing: Facing,
    pub is_walking: bool,
    pub trigger: Option<AnimationTrigger>,
}

/// Presentation requests for the render, audio and HUD collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum Cue {
    HoverChanged {
        interactable: InteractableId,
        hovering: bool,
    },
    CursorChanged(CursorHint),
    FootstepsStarted,
    FootstepsStopped,
    Animation(AnimationTrigger),
    DialogueLineShown {
        speaker_name: String,
        text: String,
    },
    DialogueTextRevealed {
        visible_chars: usize,
    },
    DialogueChoicesShown {
        labels: Vec<String>,
    },
    DialogueClosed,
    Named(String),
    RoomDeactivated {
        room: String,
    },
    RoomActivated {
        room: String,
        visual_root: String,
    },
    TransitionEffectStarted {
        right_to_left: bool,
    },
    TransitionEffectFinished,
    LockedAttempt {
        interactable: InteractableId,
    },
    PuzzleStarted {
        interactable: InteractableId,
    },
    PuzzleProgress {
        interactable: InteractableId,
        normalized: f32,
        clicks_per_second: f32,
    },
    PuzzleFinished {
        interactable: InteractableId,
    },
    SearchStarted {
        interactable: InteractableId,
    },
    SearchFinished {
        interactable: InteractableId,
        found: bool,
    },
    ExitArrow(Option<ExitArrowHint>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CueCounts {
    pub total: u32,
    pub dialogue: u32,
    pub room: u32,
    pub puzzle: u32,
}

impl CueCounts {
    fn record(&mut self, cue: &Cue) {
        self.total = self.total.saturating_add(1);
        match cue {
            Cue::DialogueLineShown { .. }
            | Cue::DialogueTextRevealed { .. }
            | Cue::DialogueChoicesShown { .. }
            | Cue::DialogueClosed => self.dialogue = self.dialogue.saturating_add(1),
            Cue::RoomDeactivated { .. }
            | Cue::RoomActivated { .. }
            | Cue::TransitionEffectStarted { .. }
            | Cue::TransitionEffectFinished => self.room = self.room.saturating_add(1),
            Cue::PuzzleStarted { .. }
            | Cue::PuzzleProgress { .. }
            | Cue::PuzzleFinished { .. }
            | Cue::SearchStarted { .. }
            | Cue::SearchFinished { .. } => self.puzzle = self.puzzle.saturating_add(1),
            _ => {}
        }
    }
}

/// Per-tick outbox. Cues emitted during a tick become readable after
/// `finish_tick_rollover`.
#[derive(Debug, Default)]
pub struct CueQueue {
    current_tick: Vec<Cue>,
    last_tick: Vec<Cue>,
    last_tick_counts: CueCounts,
    emitted_total: u64,
}

impl CueQueue {
    pub fn emit(&mut self, cue: Cue) {
        self.current_tick.push(cue);
        self.emitted_total = self.emitted_total.saturating_add(1);
    }

    pub fn iter_emitted_so_far(&self) -> impl Iterator<Item = &Cue> {
        self.current_tick.iter()
    }

    pub fn finish_tick_rollover(&mut self) {
        let mut counts = CueCounts::default();
        for cue in &self.current_tick {
            counts.record(cue);
        }
        self.last_tick_counts = counts;
        self.last_tick = std::mem::take(&mut self.current_tick);
    }

    pub fn last_tick(&self) -> &[Cue] {
        &self.last_tick
    }

    pub fn last_tick_counts(&self) -> CueCounts {
        self.last_tick_counts
    }

    pub fn emitted_total(&self) -> u64 {
        self.emitted_total
    }

    pub fn last_animation_trigger(&self) -> Option<AnimationTrigger> {
        self.last_tick.iter().rev().find_map(|cue| match cue {
            Cue::Animation(trigger) => Some(*trigger),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollover_moves_current_cues_to_last_tick_with_counts() {
        let mut cues = CueQueue::default();
        cues.emit(Cue::DialogueClosed);
        cues.emit(Cue::RoomDeactivated {
            room: "office".to_string(),
        });
        cues.emit(Cue::FootstepsStarted);
        assert!(cues.last_tick().is_empty());

        cues.finish_tick_rollover();

        assert_eq!(cues.last_tick().len(), 3);
        let counts = cues.last_tick_counts();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.dialogue, 1);
        assert_eq!(counts.room, 1);
        assert_eq!(cues.iter_emitted_so_far().count(), 0);

        cues.finish_tick_rollover();
        assert!(cues.last_tick().is_empty());
        assert_eq!(cues.emitted_total(), 3);
    }

    #[test]
    fn last_animation_trigger_prefers_latest() {
        let mut cues = CueQueue::default();
        cues.emit(Cue::Animation(AnimationTrigger::HighlightReact));
        cues.emit(Cue::Animation(AnimationTrigger::Inspect));
        cues.finish_tick_rollover();
        assert_eq!(cues.last_animation_trigger(), Some(AnimationTrigger::Inspect));
    }
}
