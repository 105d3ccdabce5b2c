use std::cell::Cell;
use std::rc::Rc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::app::{AnimationTrigger, Cue, InputSnapshot, Rect, Vec2};
use crate::dialogue::DialogueFinished;
use crate::flags::{FlagId, FlagRegistry};
use crate::interaction::{Interactable, InteractionContext, LockToken, PendingRelease, WalkToAnchor};

pub const DEFAULT_SEARCH_SECONDS: f32 = 1.5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchScripts {
    pub found: Option<String>,
    pub empty: Option<String>,
    pub already_found: Option<String>,
}

#[derive(Debug)]
enum SearchPhase {
    Idle,
    Searching { token: LockToken, remaining: f32 },
}

/// A prop the actor rummages through for a fixed time.
#[derive(Debug)]
pub struct SearchProp {
    label: String,
    anchor: WalkToAnchor,
    search_seconds: f32,
    contains_key: bool,
    found_flag: Option<FlagId>,
    scripts: SearchScripts,
    hide_after_search: bool,
    searched: bool,
    phase: SearchPhase,
    pending: Option<PendingRelease>,
    hunt_searched: Option<Rc<Cell<u32>>>,
}

impl SearchProp {
    pub fn new(label: impl Into<String>, anchor: WalkToAnchor) -> Self {
        Self {
            label: label.into(),
            anchor,
            search_seconds: DEFAULT_SEARCH_SECONDS,
            contains_key: false,
            found_flag: None,
            scripts: SearchScripts::default(),
            hide_after_search: false,
            searched: false,
            phase: SearchPhase::Idle,
            pending: None,
            hunt_searched: None,
        }
    }

    pub fn with_search_seconds(mut self, seconds: f32) -> Self {
        self.search_seconds = seconds.max(0.0);
        self
    }

    pub fn with_found_flag(mut self, flag: Option<FlagId>) -> Self {
        self.found_flag = flag;
        self
    }

    pub fn with_scripts(mut self, scripts: SearchScripts) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_hide_after_search(mut self, hide: bool) -> Self {
        self.hide_after_search = hide;
        self
    }

    pub fn set_contains_key(&mut self, contains_key: bool) {
        self.contains_key = contains_key;
    }

    pub fn contains_key(&self) -> bool {
        self.contains_key
    }

    pub fn has_been_searched(&self) -> bool {
        self.searched
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.phase, SearchPhase::Searching { .. })
    }

    fn finish_search(&mut self, token: LockToken, ctx: &mut InteractionContext<'_>) {
        let already_found = self.found_flag.is_some_and(|flag| ctx.flags.is_active(flag));
        let (found, script) = if already_found {
            (false, self.scripts.already_found.clone())
        } else if self.contains_key && !self.searched {
            if let Some(flag) = self.found_flag {
                ctx.flags.toggle(flag);
            }
            (true, self.scripts.found.clone())
        } else {
            (false, self.scripts.empty.clone())
        };

        if !self.searched {
            self.searched = true;
            if let Some(counter) = &self.hunt_searched {
                counter.set(counter.get().saturating_add(1));
            }
        }
        info!(prop = %self.label, found, already_found, "search_finished");

        let interactable = ctx.current();
        ctx.cues.emit(Cue::Animation(AnimationTrigger::ReleaseInspect));
        ctx.cues.emit(Cue::SearchFinished { interactable, found });
        self.pending = ctx.release_after_dialogue(token, script.as_deref());
    }
}

impl Interactable for SearchProp {
    fn label(&self) -> &str {
        &self.label
    }

    fn position(&self) -> Vec2 {
        self.anchor.position
    }

    fn hit_box(&self) -> Rect {
        self.anchor.hit_box()
    }

    fn is_interactable(&self) -> bool {
        !(self.hide_after_search && self.searched)
    }

    fn on_click(&mut self, ctx: &mut InteractionContext<'_>) {
        self.anchor.begin_walk(ctx);
    }

    fn on_arrived(&mut self, ctx: &mut InteractionContext<'_>) {
        if self.is_searching() || self.pending.is_some() {
            debug!(prop = %self.label, "search_already_running");
            return;
        }
        let Ok(token) = self.anchor.arrive(ctx) else {
            return;
        };
        if self.searched {
            ctx.end_interaction(token);
            return;
        }
        info!(prop = %self.label, seconds = self.search_seconds, "search_started");
        let interactable = ctx.current();
        ctx.cues.emit(Cue::Animation(AnimationTrigger::Inspect));
        ctx.cues.emit(Cue::SearchStarted { interactable });
        self.phase = SearchPhase::Searching {
            token,
            remaining: self.search_seconds,
        };
    }

    fn on_dialogue_finished(&mut self, finished: &DialogueFinished, ctx: &mut InteractionContext<'_>) {
        ctx.settle(&mut self.pending, finished);
    }

    fn update(&mut self, dt: f32, _input: &InputSnapshot, ctx: &mut InteractionContext<'_>) {
        match std::mem::replace(&mut self.phase, SearchPhase::Idle) {
            SearchPhase::Searching { token, remaining } => {
                let remaining = remaining - dt.max(0.0);
                if remaining > 0.0 {
                    self.phase = SearchPhase::Searching { token, remaining };
                } else {
                    self.finish_search(token, ctx);
                }
            }
            SearchPhase::Idle => {}
        }
    }

    fn abort(&mut self, ctx: &mut InteractionContext<'_>) {
        ctx.release_pending(&mut self.pending);
        if let SearchPhase::Searching { token, .. } =
            std::mem::replace(&mut self.phase, SearchPhase::Idle)
        {
            ctx.cues.emit(Cue::Animation(AnimationTrigger::ReleaseInspect));
            ctx.end_interaction(token);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPlacement {
    Random,
    Fixed(usize),
}

/// Hides the key in one of a set of search props and counts searches.
#[derive(Debug, Clone)]
pub struct KeyHunt {
    placement: KeyPlacement,
    found_flag: Option<FlagId>,
    searched: Rc<Cell<u32>>,
    prop_count: usize,
}

impl KeyHunt {
    pub fn new(placement: KeyPlacement, found_flag: Option<FlagId>) -> Self {
        Self {
            placement,
            found_flag,
            searched: Rc::new(Cell::new(0)),
            prop_count: 0,
        }
    }

    /// Clears every prop, then hides the key in one. Returns its index.
    pub fn place<R: Rng + ?Sized>(&mut self, props: &mut [SearchProp], rng: &mut R) -> Option<usize> {
        self.prop_count = props.len();
        for prop in props.iter_mut() {
            prop.contains_key = false;
            prop.found_flag = self.found_flag;
            prop.hunt_searched = Some(Rc::clone(&self.searched));
        }
        if props.is_empty() {
            warn!("key_hunt_without_props");
            return None;
        }
        let index = match self.placement {
            KeyPlacement::Fixed(index) if index < props.len() => index,
            KeyPlacement::Fixed(index) => {
                warn!(index, props = props.len(), "key_hunt_fixed_index_out_of_range");
                rng.gen_range(0..props.len())
            }
            KeyPlacement::Random => rng.gen_range(0..props.len()),
        };
        props[index].contains_key = true;
        info!(prop = %props[index].label, "key_hunt_placed");
        Some(index)
    }

    pub fn searched_count(&self) -> u32 {
        self.searched.get()
    }

    pub fn prop_count(&self) -> usize {
        self.prop_count
    }

    pub fn keys_found(&self, flags: &FlagRegistry) -> bool {
        self.found_flag.is_some_and(|flag| flags.is_active(flag))
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::dialogue::{DialogueLine, DialogueScript, ScriptLibrary, Speaker};
    use crate::interaction::test_support::{finish_dialogues, services_with, tick_body, walk_and_arrive};
    use crate::interaction::InteractableId;
    use crate::rooms::RoomGraph;

    fn library() -> ScriptLibrary {
        let mut scripts = ScriptLibrary::default();
        for id in ["keys_found", "nothing_here"] {
            scripts.insert(
                DialogueScript::new(id)
                    .with_line(DialogueLine::new(Speaker::Player, id).with_reveal_seconds_per_char(0.0)),
            );
        }
        scripts
    }

    fn prop(label: &str, x: f32) -> SearchProp {
        SearchProp::new(label, WalkToAnchor::new(Vec2::new(x, 0.0), Vec2::new(0.5, 0.5))).with_scripts(
            SearchScripts {
                found: Some("keys_found".to_string()),
                empty: Some("nothing_here".to_string()),
                already_found: None,
            },
        )
    }

    fn run_search(services: &mut crate::interaction::Services, id: InteractableId, prop: &mut SearchProp) {
        prop.on_click(&mut services.context(id));
        walk_and_arrive(services, id, prop);
        for _ in 0..10 {
            tick_body(services, id, prop, 0.2, &InputSnapshot::empty());
        }
    }

    #[test]
    fn finding_the_key_sets_flag_and_releases_after_dialogue() {
        let mut services = services_with(library(), RoomGraph::default());
        let has_keys = services.flags.register("has_keys", false);
        let id = InteractableId(21);
        let mut cabinet = prop("cabinet", 2.0).with_found_flag(Some(has_keys));
        cabinet.set_contains_key(true);

        run_search(&mut services, id, &mut cabinet);
        assert!(services.flags.is_active(has_keys));
        assert!(services.lock.is_held());

        finish_dialogues(&mut services, id, &mut cabinet);
        assert!(!services.lock.is_held());
        assert!(cabinet.has_been_searched());
    }

    #[test]
    fn empty_prop_without_dialogue_releases_when_search_ends() {
        let mut services = services_with(ScriptLibrary::default(), RoomGraph::default());
        let id = InteractableId(22);
        let mut bin = SearchProp::new("bin", WalkToAnchor::new(Vec2::new(-2.0, 0.0), Vec2::new(0.5, 0.5)))
            .with_hide_after_search(true);

        bin.on_click(&mut services.context(id));
        walk_and_arrive(&mut services, id, &mut bin);
        assert!(bin.is_searching());
        tick_body(&mut services, id, &mut bin, 1.0, &InputSnapshot::empty());
        assert!(services.lock.is_held());
        tick_body(&mut services, id, &mut bin, 1.0, &InputSnapshot::empty());

        assert!(!services.lock.is_held());
        assert!(!bin.is_interactable());
        let cues: Vec<_> = services.cues.iter_emitted_so_far().cloned().collect();
        assert!(cues.contains(&Cue::Animation(AnimationTrigger::Inspect)));
        assert!(cues.contains(&Cue::SearchFinished {
            interactable: id,
            found: false
        }));
    }

    #[test]
    fn searched_prop_releases_immediately_on_revisit() {
        let mut services = services_with(library(), RoomGraph::default());
        let id = InteractableId(23);
        let mut desk = prop("desk", 2.0);
        run_search(&mut services, id, &mut desk);
        finish_dialogues(&mut services, id, &mut desk);
        let acquisitions = services.lock.acquisitions();

        desk.on_arrived(&mut services.context(id));
        assert!(!services.lock.is_held());
        assert!(!desk.is_searching());
        assert_eq!(services.lock.acquisitions(), acquisitions + 1);
    }

    #[test]
    fn abort_during_search_releases() {
        let mut services = services_with(library(), RoomGraph::default());
        let id = InteractableId(24);
        let mut desk = prop("desk", 2.0);
        desk.on_click(&mut services.context(id));
        walk_and_arrive(&mut services, id, &mut desk);
        assert!(services.lock.is_held());

        desk.abort(&mut services.context(id));
        assert!(!services.lock.is_held());
        assert!(!desk.has_been_searched());
    }

    #[test]
    fn key_hunt_places_exactly_one_key_and_counts_searches() {
        let mut services = services_with(library(), RoomGraph::default());
        let has_keys = services.flags.register("has_keys", false);
        let mut props = vec![prop("a", 2.0), prop("b", 4.0), prop("c", 6.0)];
        let mut hunt = KeyHunt::new(KeyPlacement::Random, Some(has_keys));
        let mut rng = StdRng::seed_from_u64(7);

        let index = hunt.place(&mut props, &mut rng).expect("placed");
        assert_eq!(props.iter().filter(|prop| prop.contains_key()).count(), 1);
        assert!(props[index].contains_key());

        let id = InteractableId(30);
        let mut first = props.remove(0);
        run_search(&mut services, id, &mut first);
        finish_dialogues(&mut services, id, &mut first);
        assert_eq!(hunt.searched_count(), 1);
        assert_eq!(hunt.keys_found(&services.flags), index == 0);
    }

    #[test]
    fn fixed_placement_uses_the_given_prop() {
        let mut props = vec![prop("a", 2.0), prop("b", 4.0)];
        let mut hunt = KeyHunt::new(KeyPlacement::Fixed(1), None);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(hunt.place(&mut props, &mut rng), Some(1));
        assert!(!props[0].contains_key());
    }
}
