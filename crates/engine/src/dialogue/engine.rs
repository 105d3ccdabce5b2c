use std::fmt;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::interaction::InteractableId;

use super::script::{DialogueEffect, DialogueLine, DialogueScript, LineNext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DialogueTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Completed,
    EmptyScript,
    Interrupted,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogueFinished {
    pub ticket: DialogueTicket,
    pub requester: Option<InteractableId>,
    pub reason: FinishReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogueEvent {
    LineShown { speaker_name: String, text: String },
    TextRevealed { visible_chars: usize },
    ChoicesShown { labels: Vec<String> },
    Closed,
    Effect(DialogueEffect),
    Finished(DialogueFinished),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Inactive,
    Typing { elapsed: f32 },
    Revealed,
    AwaitingChoice,
}

type FinishedObserver = Box<dyn FnMut(&DialogueFinished)>;

/// Typewriter dialogue runner. One dialogue is active at a time.
///
/// Output goes to an event queue the session drains each tick. Finished
/// events are also pushed to explicit observers.
pub struct DialogueEngine {
    phase: Phase,
    script: Option<Rc<DialogueScript>>,
    requester: Option<InteractableId>,
    ticket: Option<DialogueTicket>,
    line_index: usize,
    visible_chars: usize,
    line_end_fired: bool,
    next_ticket: u64,
    events: Vec<DialogueEvent>,
    observers: Vec<(u64, FinishedObserver)>,
    next_observer: u64,
}

impl fmt::Debug for DialogueEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogueEngine")
            .field("phase", &self.phase)
            .field("script", &self.script.as_ref().map(|script| script.id.as_str()))
            .field("requester", &self.requester)
            .field("line_index", &self.line_index)
            .field("visible_chars", &self.visible_chars)
            .field("pending_events", &self.events.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for DialogueEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogueEngine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Inactive,
            script: None,
            requester: None,
            ticket: None,
            line_index: 0,
            visible_chars: 0,
            line_end_fired: false,
            next_ticket: 1,
            events: Vec::new(),
            observers: Vec::new(),
            next_observer: 1,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase != Phase::Inactive
    }

    pub fn is_typing(&self) -> bool {
        matches!(self.phase, Phase::Typing { .. })
    }

    pub fn awaiting_choice(&self) -> bool {
        self.phase == Phase::AwaitingChoice
    }

    pub fn current_script_id(&self) -> Option<&str> {
        self.script.as_ref().map(|script| script.id.as_str())
    }

    pub fn current_line(&self) -> Option<&DialogueLine> {
        if !self.is_active() {
            return None;
        }
        self.script.as_ref()?.lines.get(self.line_index)
    }

    pub fn line_index(&self) -> usize {
        self.line_index
    }

    pub fn visible_chars(&self) -> usize {
        self.visible_chars
    }

    /// Starts `script` for `requester`. A running dialogue is finished as
    /// interrupted first. A missing or empty script finishes right away, so
    /// the returned ticket always gets exactly one finished event.
    pub fn start(
        &mut self,
        script: Option<Rc<DialogueScript>>,
        requester: Option<InteractableId>,
    ) -> DialogueTicket {
        if self.is_active() {
            self.finish(FinishReason::Interrupted);
        }

        let ticket = DialogueTicket(self.next_ticket);
        self.next_ticket = self.next_ticket.saturating_add(1);
        self.ticket = Some(ticket);
        self.requester = requester;

        let script = match script {
            Some(script) if !script.lines.is_empty() => script,
            other => {
                debug!(
                    script = other.as_ref().map(|script| script.id.as_str()),
                    "dialogue_empty_script"
                );
                self.publish_finished(DialogueFinished {
                    ticket,
                    requester,
                    reason: FinishReason::EmptyScript,
                });
                self.ticket = None;
                self.requester = None;
                return ticket;
            }
        };

        info!(script = %script.id, requester = ?requester.map(|id| id.0), "dialogue_started");
        self.script = Some(script);
        self.show_line(0);
        ticket
    }

    /// Skips the typewriter, or moves past a revealed line. Ignored while a
    /// choice is pending.
    pub fn advance(&mut self) {
        match self.phase {
            Phase::Inactive => {}
            Phase::Typing { .. } => self.complete_reveal(),
            Phase::Revealed => {
                self.fire_line_end();
                let next = self
                    .current_line()
                    .map(|line| line.next)
                    .unwrap_or(LineNext::End);
                self.go_to(next);
            }
            Phase::AwaitingChoice => debug!(line = self.line_index, "dialogue_advance_needs_choice"),
        }
    }

    pub fn select_choice(&mut self, index: usize) -> bool {
        if self.phase != Phase::AwaitingChoice {
            warn!(index, "dialogue_choice_without_prompt");
            return false;
        }
        let Some(choice) = self
            .current_line()
            .and_then(|line| line.choices.get(index))
            .cloned()
        else {
            warn!(index, line = self.line_index, "dialogue_choice_out_of_range");
            return false;
        };
        self.fire_line_end();
        self.events
            .extend(choice.on_choose.into_iter().map(DialogueEvent::Effect));
        self.go_to(choice.next);
        true
    }

    pub fn update(&mut self, dt: f32) {
        let Phase::Typing { elapsed } = self.phase else {
            return;
        };
        let Some((total, rate)) = self
            .current_line()
            .map(|line| (line.char_count(), line.reveal_seconds_per_char))
        else {
            return;
        };
        let elapsed = elapsed + dt.max(0.0);
        let visible = ((elapsed / rate).floor() as usize).min(total);
        self.phase = Phase::Typing { elapsed };
        if visible >= total {
            self.complete_reveal();
        } else if visible != self.visible_chars {
            self.visible_chars = visible;
            self.events.push(DialogueEvent::TextRevealed {
                visible_chars: visible,
            });
        }
    }

    pub fn abort(&mut self) {
        if self.is_active() {
            self.finish(FinishReason::Aborted);
        }
    }

    pub fn drain_events(&mut self) -> Vec<DialogueEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }

    pub fn subscribe_finished(&mut self, observer: FinishedObserver) -> u64 {
        let id = self.next_observer;
        self.next_observer = self.next_observer.saturating_add(1);
        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe_finished(&mut self, id: u64) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    fn show_line(&mut self, index: usize) {
        let Some(script) = self.script.clone() else {
            return;
        };
        let Some(line) = script.lines.get(index) else {
            self.finish(FinishReason::Completed);
            return;
        };
        self.line_index = index;
        self.line_end_fired = false;
        self.visible_chars = 0;
        self.events
            .extend(line.on_start.iter().cloned().map(DialogueEvent::Effect));
        self.events.push(DialogueEvent::LineShown {
            speaker_name: script.speaker_name(line.speaker).to_string(),
            text: line.text.clone(),
        });

        if line.is_instant() || line.char_count() == 0 {
            self.visible_chars = line.char_count();
            self.events.push(DialogueEvent::TextRevealed {
                visible_chars: self.visible_chars,
            });
            self.enter_revealed_phase(line);
        } else {
            self.phase = Phase::Typing { elapsed: 0.0 };
        }
    }

    fn complete_reveal(&mut self) {
        let Some(script) = self.script.clone() else {
            return;
        };
        let Some(line) = script.lines.get(self.line_index) else {
            return;
        };
        self.visible_chars = line.char_count();
        self.events.push(DialogueEvent::TextRevealed {
            visible_chars: self.visible_chars,
        });
        self.fire_line_end();
        self.enter_revealed_phase(line);
    }

    fn enter_revealed_phase(&mut self, line: &DialogueLine) {
        if line.choices.is_empty() {
            self.phase = Phase::Revealed;
        } else {
            self.phase = Phase::AwaitingChoice;
            self.events.push(DialogueEvent::ChoicesShown {
                labels: line.choices.iter().map(|choice| choice.label.clone()).collect(),
            });
        }
    }

    fn fire_line_end(&mut self) {
        if self.line_end_fired {
            return;
        }
        self.line_end_fired = true;
        let Some(script) = self.script.clone() else {
            return;
        };
        if let Some(line) = script.lines.get(self.line_index) {
            self.events
                .extend(line.on_end.iter().cloned().map(DialogueEvent::Effect));
        }
    }

    fn go_to(&mut self, next: LineNext) {
        let target = match next {
            LineNext::End => {
                self.finish(FinishReason::Completed);
                return;
            }
            LineNext::Sequential => self.line_index.saturating_add(1),
            LineNext::Goto(index) => index,
        };
        let line_count = self.script.as_ref().map_or(0, |script| script.lines.len());
        if target >= line_count {
            if matches!(next, LineNext::Goto(_)) {
                warn!(target, line_count, "dialogue_goto_out_of_range");
            }
            self.finish(FinishReason::Completed);
            return;
        }
        self.show_line(target);
    }

    fn finish(&mut self, reason: FinishReason) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        let requester = self.requester.take();
        info!(
            script = self.current_script_id().unwrap_or_default(),
            ?reason,
            "dialogue_finished"
        );
        self.phase = Phase::Inactive;
        self.script = None;
        self.line_index = 0;
        self.visible_chars = 0;
        self.line_end_fired = false;
        self.events.push(DialogueEvent::Closed);
        self.publish_finished(DialogueFinished {
            ticket,
            requester,
            reason,
        });
    }

    fn publish_finished(&mut self, finished: DialogueFinished) {
        self.events.push(DialogueEvent::Finished(finished));
        for (_, observer) in &mut self.observers {
            observer(&finished);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::dialogue::{DialogueChoice, Speaker};

    fn finished_events(events: &[DialogueEvent]) -> Vec<DialogueFinished> {
        events
            .iter()
            .filter_map(|event| match event {
                DialogueEvent::Finished(done) => Some(*done),
                _ => None,
            })
            .collect()
    }

    fn effects(events: &[DialogueEvent]) -> Vec<DialogueEffect> {
        events
            .iter()
            .filter_map(|event| match event {
                DialogueEvent::Effect(effect) => Some(effect.clone()),
                _ => None,
            })
            .collect()
    }

    fn two_line_script() -> Rc<DialogueScript> {
        Rc::new(
            DialogueScript::new("greeting")
                .with_names("Ray", "Clerk")
                .with_line(DialogueLine::new(Speaker::Other, "Hello.").with_reveal_seconds_per_char(0.0))
                .with_line(
                    DialogueLine::new(Speaker::Player, "Bye.")
                        .with_reveal_seconds_per_char(0.0)
                        .with_next(LineNext::End),
                ),
        )
    }

    #[test]
    fn two_instant_lines_finish_after_two_advances_exactly_once() {
        let mut engine = DialogueEngine::new();
        let ticket = engine.start(Some(two_line_script()), Some(InteractableId(7)));
        assert!(engine.is_active());

        engine.advance();
        assert!(engine.is_active());
        assert_eq!(engine.line_index(), 1);
        engine.advance();
        assert!(!engine.is_active());
        engine.advance();

        let events = engine.drain_events();
        let finished = finished_events(&events);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].ticket, ticket);
        assert_eq!(finished[0].requester, Some(InteractableId(7)));
        assert_eq!(finished[0].reason, FinishReason::Completed);
        assert!(events.contains(&DialogueEvent::LineShown {
            speaker_name: "Clerk".to_string(),
            text: "Hello.".to_string(),
        }));
    }

    #[test]
    fn typewriter_reveals_over_time_and_skip_fires_line_end_once() {
        let script = Rc::new(
            DialogueScript::new("typed").with_line(
                DialogueLine::new(Speaker::Other, "abcd")
                    .with_reveal_seconds_per_char(0.1)
                    .with_on_end(DialogueEffect::Cue("line_done".to_string())),
            ),
        );
        let mut engine = DialogueEngine::new();
        engine.start(Some(script), None);

        engine.update(0.25);
        assert!(engine.is_typing());
        assert_eq!(engine.visible_chars(), 2);

        engine.advance();
        assert!(!engine.is_typing());
        assert_eq!(engine.visible_chars(), 4);
        assert!(engine.is_active());

        engine.advance();
        assert!(!engine.is_active());
        let events = engine.drain_events();
        assert_eq!(effects(&events), vec![DialogueEffect::Cue("line_done".to_string())]);
    }

    #[test]
    fn natural_reveal_fires_line_end_once() {
        let script = Rc::new(
            DialogueScript::new("typed").with_line(
                DialogueLine::new(Speaker::Other, "ab")
                    .with_reveal_seconds_per_char(0.1)
                    .with_on_end(DialogueEffect::ToggleFlag {
                        flag: "heard".to_string(),
                    }),
            ),
        );
        let mut engine = DialogueEngine::new();
        engine.start(Some(script), None);
        engine.update(1.0);
        engine.update(1.0);
        engine.advance();

        let events = engine.drain_events();
        assert_eq!(effects(&events).len(), 1);
        assert_eq!(finished_events(&events).len(), 1);
    }

    #[test]
    fn empty_or_missing_script_finishes_during_start() {
        let mut engine = DialogueEngine::new();
        let empty = engine.start(Some(Rc::new(DialogueScript::new("empty"))), Some(InteractableId(1)));
        let missing = engine.start(None, Some(InteractableId(2)));
        assert!(!engine.is_active());

        let finished = finished_events(&engine.drain_events());
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].ticket, empty);
        assert_eq!(finished[0].reason, FinishReason::EmptyScript);
        assert_eq!(finished[1].ticket, missing);
        assert_eq!(finished[1].requester, Some(InteractableId(2)));
    }

    #[test]
    fn starting_over_a_running_dialogue_interrupts_it() {
        let mut engine = DialogueEngine::new();
        let first = engine.start(Some(two_line_script()), Some(InteractableId(1)));
        let second = engine.start(Some(two_line_script()), Some(InteractableId(2)));
        assert_ne!(first, second);
        assert!(engine.is_active());

        let finished = finished_events(&engine.drain_events());
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].ticket, first);
        assert_eq!(finished[0].reason, FinishReason::Interrupted);
    }

    #[test]
    fn choices_wait_for_selection_and_ignore_bad_index() {
        let script = Rc::new(
            DialogueScript::new("ask")
                .with_line(
                    DialogueLine::new(Speaker::Other, "Coffee?")
                        .with_reveal_seconds_per_char(0.0)
                        .with_choice(DialogueChoice::new("Yes", LineNext::Goto(2)).with_effect(
                            DialogueEffect::SetFlag {
                                flag: "wants_coffee".to_string(),
                                value: true,
                            },
                        ))
                        .with_choice(DialogueChoice::new("No", LineNext::End)),
                )
                .with_line(DialogueLine::new(Speaker::Other, "Skipped.").with_reveal_seconds_per_char(0.0))
                .with_line(DialogueLine::new(Speaker::Other, "Here.").with_reveal_seconds_per_char(0.0)),
        );
        let mut engine = DialogueEngine::new();
        engine.start(Some(script), None);
        assert!(engine.awaiting_choice());

        engine.advance();
        assert!(engine.awaiting_choice());
        assert!(!engine.select_choice(5));
        assert!(engine.select_choice(0));
        assert_eq!(engine.line_index(), 2);

        let events = engine.drain_events();
        assert!(events.contains(&DialogueEvent::ChoicesShown {
            labels: vec!["Yes".to_string(), "No".to_string()],
        }));
        assert_eq!(
            effects(&events),
            vec![DialogueEffect::SetFlag {
                flag: "wants_coffee".to_string(),
                value: true,
            }]
        );
    }

    #[test]
    fn goto_out_of_range_ends_dialogue() {
        let script = Rc::new(
            DialogueScript::new("broken").with_line(
                DialogueLine::new(Speaker::Other, "Oops.")
                    .with_reveal_seconds_per_char(0.0)
                    .with_next(LineNext::Goto(9)),
            ),
        );
        let mut engine = DialogueEngine::new();
        engine.start(Some(script), None);
        engine.advance();
        assert!(!engine.is_active());
        assert_eq!(finished_events(&engine.drain_events()).len(), 1);
    }

    #[test]
    fn observers_see_finished_until_unsubscribed() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut engine = DialogueEngine::new();
        let id = engine.subscribe_finished(Box::new(move |done| sink.borrow_mut().push(done.reason)));

        engine.start(Some(two_line_script()), None);
        engine.abort();
        assert!(engine.unsubscribe_finished(id));
        engine.start(None, None);

        assert_eq!(*seen.borrow(), vec![FinishReason::Aborted]);
        assert!(!engine.unsubscribe_finished(id));
    }
}
