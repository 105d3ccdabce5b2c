use tracing::info;

use crate::app::{Cue, Rect, Vec2};
use crate::dialogue::DialogueFinished;
use crate::flags::FlagId;
use crate::interaction::{Interactable, InteractionContext, PendingRelease, WalkToAnchor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchQuestFlags {
    pub started: FlagId,
    pub has_item: FlagId,
    pub complete: FlagId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchQuestScripts {
    pub intro: Option<String>,
    pub reminder: Option<String>,
    pub thanks: Option<String>,
}

/// Quest giver: hands out the task, reminds, then takes the item.
#[derive(Debug)]
pub struct FetchQuest {
    label: String,
    anchor: WalkToAnchor,
    flags: FetchQuestFlags,
    scripts: FetchQuestScripts,
    completion_cue: Option<String>,
    pending: Option<PendingRelease>,
    completion_pending: bool,
}

impl FetchQuest {
    pub fn new(
        label: impl Into<String>,
        anchor: WalkToAnchor,
        flags: FetchQuestFlags,
        scripts: FetchQuestScripts,
    ) -> Self {
        Self {
            label: label.into(),
            anchor,
            flags,
            scripts,
            completion_cue: None,
            pending: None,
            completion_pending: false,
        }
    }

    pub fn with_completion_cue(mut self, cue: Option<String>) -> Self {
        self.completion_cue = cue;
        self
    }

    fn emit_completion(&mut self, ctx: &mut InteractionContext<'_>) {
        self.completion_pending = false;
        if let Some(cue) = &self.completion_cue {
            ctx.cues.emit(Cue::Named(cue.clone()));
        }
    }
}

impl Interactable for FetchQuest {
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
        if self.pending.is_some() {
            return;
        }
        let Ok(token) = self.anchor.arrive(ctx) else {
            return;
        };
        let flags = self.flags;

        if ctx.flags.is_active(flags.complete) {
            ctx.end_interaction(token);
            return;
        }

        if ctx.flags.is_active(flags.has_item) {
            ctx.flags.toggle(flags.complete);
            info!(quest = %self.label, "fetch_quest_completed");
            self.completion_pending = true;
            self.pending = ctx.release_after_dialogue(token, self.scripts.thanks.as_deref());
            if self.pending.is_none() {
                self.emit_completion(ctx);
            }
            return;
        }

        let script = if ctx.flags.is_active(flags.started) {
            self.scripts.reminder.as_deref()
        } else {
            ctx.flags.toggle(flags.started);
            info!(quest = %self.label, "fetch_quest_started");
            self.scripts.intro.as_deref()
        };
        self.pending = ctx.release_after_dialogue(token, script);
    }

    fn on_dialogue_finished(&mut self, finished: &DialogueFinished, ctx: &mut InteractionContext<'_>) {
        if ctx.settle(&mut self.pending, finished) && self.completion_pending {
            self.emit_completion(ctx);
        }
    }

    fn abort(&mut self, ctx: &mut InteractionContext<'_>) {
        ctx.release_pending(&mut self.pending);
        if self.completion_pending {
            self.emit_completion(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{DialogueLine, DialogueScript, ScriptLibrary, Speaker};
    use crate::interaction::test_support::{finish_dialogues, services_with, walk_and_arrive};
    use crate::interaction::{InteractableId, Services};
    use crate::rooms::RoomGraph;

    const ID: InteractableId = InteractableId(40);

    fn setup() -> (Services, FetchQuest) {
        let mut scripts = ScriptLibrary::default();
        for id in ["janitor_intro", "janitor_reminder", "janitor_thanks"] {
            scripts.insert(
                DialogueScript::new(id)
                    .with_line(DialogueLine::new(Speaker::Other, id).with_reveal_seconds_per_char(0.0)),
            );
        }
        let mut services = services_with(scripts, RoomGraph::default());
        let flags = FetchQuestFlags {
            started: services.flags.register("janitor_started", false),
            has_item: services.flags.register("has_keys", false),
            complete: services.flags.register("janitor_complete", false),
        };
        let quest = FetchQuest::new(
            "janitor",
            WalkToAnchor::new(Vec2::new(3.0, 0.0), Vec2::new(0.5, 1.0)),
            flags,
            FetchQuestScripts {
                intro: Some("janitor_intro".to_string()),
                reminder: Some("janitor_reminder".to_string()),
                thanks: Some("janitor_thanks".to_string()),
            },
        )
        .with_completion_cue(Some("elevator_unlocked".to_string()));
        (services, quest)
    }

    fn visit(services: &mut Services, quest: &mut FetchQuest) -> Vec<DialogueFinished> {
        quest.on_click(&mut services.context(ID));
        walk_and_arrive(services, ID, quest);
        let finished = finish_dialogues(services, ID, quest);
        assert!(!services.lock.is_held());
        finished
    }

    #[test]
    fn quest_walks_through_intro_reminder_and_thanks() {
        let (mut services, mut quest) = setup();
        let started = services.flags.id("janitor_started").expect("flag");
        let has_keys = services.flags.id("has_keys").expect("flag");
        let complete = services.flags.id("janitor_complete").expect("flag");

        assert_eq!(visit(&mut services, &mut quest).len(), 1);
        assert!(services.flags.is_active(started));

        assert_eq!(visit(&mut services, &mut quest).len(), 1);
        assert!(!services.flags.is_active(complete));

        services.flags.set_active(has_keys, true);
        visit(&mut services, &mut quest);
        assert!(services.flags.is_active(complete));
        assert!(services
            .cues
            .iter_emitted_so_far()
            .any(|cue| *cue == Cue::Named("elevator_unlocked".to_string())));

        assert!(visit(&mut services, &mut quest).is_empty());
    }

    #[test]
    fn completion_without_thanks_script_releases_and_cues_immediately() {
        let (mut services, _) = setup();
        let flags = FetchQuestFlags {
            started: services.flags.id("janitor_started").expect("flag"),
            has_item: services.flags.id("has_keys").expect("flag"),
            complete: services.flags.id("janitor_complete").expect("flag"),
        };
        services.flags.set_active(flags.has_item, true);
        let mut quest = FetchQuest::new(
            "janitor",
            WalkToAnchor::new(Vec2::new(3.0, 0.0), Vec2::new(0.5, 1.0)),
            flags,
            FetchQuestScripts::default(),
        )
        .with_completion_cue(Some("done".to_string()));

        quest.on_click(&mut services.context(ID));
        walk_and_arrive(&mut services, ID, &mut quest);
        assert!(!services.lock.is_held());
        assert!(services
            .cues
            .iter_emitted_so_far()
            .any(|cue| *cue == Cue::Named("done".to_string())));
    }
}
