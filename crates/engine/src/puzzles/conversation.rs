use tracing::{debug, warn};

use crate::app::{Rect, Vec2};
use crate::dialogue::DialogueFinished;
use crate::flags::FlagId;
use crate::interaction::{Interactable, InteractionContext, PendingRelease, WalkToAnchor};

/// Walk up and talk. Optionally one-shot via `talk_once_flag`.
#[derive(Debug)]
pub struct ConversationProp {
    label: String,
    anchor: WalkToAnchor,
    script: Option<String>,
    conditional: Option<(FlagId, String)>,
    talk_once_flag: Option<FlagId>,
    flag_on_end: Option<FlagId>,
    pending: Option<PendingRelease>,
}

impl ConversationProp {
    pub fn new(label: impl Into<String>, anchor: WalkToAnchor, script: Option<String>) -> Self {
        Self {
            label: label.into(),
            anchor,
            script,
            conditional: None,
            talk_once_flag: None,
            flag_on_end: None,
            pending: None,
        }
    }

    /// Plays `script` instead while `flag` is active.
    pub fn with_conditional(mut self, flag: FlagId, script: impl Into<String>) -> Self {
        self.conditional = Some((flag, script.into()));
        self
    }

    pub fn with_talk_once_flag(mut self, flag: Option<FlagId>) -> Self {
        self.talk_once_flag = flag;
        self
    }

    pub fn with_flag_on_end(mut self, flag: Option<FlagId>) -> Self {
        self.flag_on_end = flag;
        self
    }

    pub fn is_talking(&self) -> bool {
        self.pending.is_some()
    }
}

impl Interactable for ConversationProp {
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
        if self.talk_once_flag.is_some_and(|flag| ctx.flags.is_active(flag)) {
            debug!(prop = %self.label, "conversation_already_had");
            ctx.end_interaction(token);
            return;
        }

        let script = match &self.conditional {
            Some((flag, script)) if ctx.flags.is_active(*flag) => Some(script.as_str()),
            _ => self.script.as_deref(),
        };
        if script.is_none() {
            warn!(prop = %self.label, "conversation_without_script");
        }
        self.pending = ctx.release_after_dialogue(token, script);
    }

    fn on_dialogue_finished(&mut self, finished: &DialogueFinished, ctx: &mut InteractionContext<'_>) {
        let ours = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.ticket() == finished.ticket);
        if !ours {
            return;
        }
        if let Some(flag) = self.flag_on_end {
            ctx.flags.set_active(flag, true);
        }
        ctx.settle(&mut self.pending, finished);
    }

    fn abort(&mut self, ctx: &mut InteractionContext<'_>) {
        ctx.release_pending(&mut self.pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::{DialogueLine, DialogueScript, ScriptLibrary, Speaker};
    use crate::interaction::test_support::{finish_dialogues, services, services_with, walk_and_arrive};
    use crate::interaction::InteractableId;
    use crate::rooms::RoomGraph;

    const ID: InteractableId = InteractableId(50);

    fn library() -> ScriptLibrary {
        let mut scripts = ScriptLibrary::default();
        for id in ["carmen_hello", "carmen_after_keys"] {
            scripts.insert(
                DialogueScript::new(id)
                    .with_names("Pierce", "Carmen")
                    .with_line(DialogueLine::new(Speaker::Other, id).with_reveal_seconds_per_char(0.0)),
            );
        }
        scripts
    }

    fn anchor() -> WalkToAnchor {
        WalkToAnchor::new(Vec2::new(2.0, 0.0), Vec2::new(0.5, 1.0))
    }

    #[test]
    fn talk_once_sets_flag_on_end_and_then_stays_quiet() {
        let mut services = services_with(library(), RoomGraph::default());
        let talked = services.flags.register("talked_to_carmen", false);
        let mut carmen = ConversationProp::new("carmen", anchor(), Some("carmen_hello".to_string()))
            .with_talk_once_flag(Some(talked))
            .with_flag_on_end(Some(talked));

        carmen.on_click(&mut services.context(ID));
        walk_and_arrive(&mut services, ID, &mut carmen);
        assert!(carmen.is_talking());
        assert_eq!(finish_dialogues(&mut services, ID, &mut carmen).len(), 1);
        assert!(services.flags.is_active(talked));
        assert!(!services.lock.is_held());

        carmen.on_arrived(&mut services.context(ID));
        assert!(!carmen.is_talking());
        assert!(!services.lock.is_held());
        assert!(!services.dialogue.is_active());
    }

    #[test]
    fn conditional_script_wins_while_flag_is_active() {
        let mut services = services_with(library(), RoomGraph::default());
        let has_keys = services.flags.register("has_keys", true);
        let mut carmen = ConversationProp::new("carmen", anchor(), Some("carmen_hello".to_string()))
            .with_conditional(has_keys, "carmen_after_keys");

        carmen.on_click(&mut services.context(ID));
        walk_and_arrive(&mut services, ID, &mut carmen);
        assert_eq!(services.dialogue.current_script_id(), Some("carmen_after_keys"));
        finish_dialogues(&mut services, ID, &mut carmen);
        assert!(!services.lock.is_held());
    }

    #[test]
    fn missing_script_releases_immediately() {
        let mut services = services();
        let mut prop = ConversationProp::new("poster", anchor(), Some("unknown".to_string()));
        prop.on_click(&mut services.context(ID));
        walk_and_arrive(&mut services, ID, &mut prop);
        assert!(!services.lock.is_held());
        assert!(!prop.is_talking());
    }
}
