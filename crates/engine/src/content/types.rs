use crate::app::Vec2;
use crate::dialogue::DialogueScript;
use crate::interaction::DoorDirection;
use crate::puzzles::{FetchQuestScripts, KeyPlacement, MashConfig, SearchScripts};
use crate::rooms::{RoomDefinition, SpawnOverride};

/// Everything compiled from `assets/base`. Flags, scripts and props are
/// referenced by name; nothing here is live runtime state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdventureContent {
    pub flags: Vec<FlagDef>,
    pub rooms: Vec<RoomDef>,
    pub spawn_overrides: Vec<SpawnOverride>,
    pub scripts: Vec<DialogueScript>,
    pub key_hunts: Vec<KeyHuntDef>,
    pub start: Option<StartDef>,
}

impl AdventureContent {
    pub fn room(&self, id: &str) -> Option<&RoomDef> {
        self.rooms.iter().find(|room| room.definition.id == id)
    }

    pub fn script(&self, id: &str) -> Option<&DialogueScript> {
        self.scripts.iter().find(|script| script.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagDef {
    pub name: String,
    pub default_value: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomDef {
    /// Exits are filled in from the room's doors.
    pub definition: RoomDefinition,
    pub doors: Vec<DoorDef>,
    pub trigger_doors: Vec<TriggerDoorDef>,
    pub props: Vec<PropDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityDef {
    pub flag: String,
    pub active_when_true: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoorDef {
    pub label: String,
    pub position: Vec2,
    pub half_extents: Vec2,
    pub target_room: String,
    pub entry_key: String,
    pub direction: DoorDirection,
    pub show_exit_arrow: bool,
    /// Set when the door is walk-then-act rather than click-to-leave.
    pub interaction_x: Option<f32>,
    pub lock: Option<DoorLockDef>,
    pub visibility: Option<VisibilityDef>,
}

impl DoorDef {
    pub fn is_walk_then_act(&self) -> bool {
        self.lock.is_some() || self.interaction_x.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorLockDef {
    pub flag: Option<String>,
    pub require_flag_true: bool,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerDoorDef {
    pub min_x: f32,
    pub max_x: f32,
    pub target_room: String,
    pub entry_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropDef {
    pub label: String,
    pub position: Vec2,
    pub half_extents: Vec2,
    pub interaction_x: Option<f32>,
    pub visibility: Option<VisibilityDef>,
    pub kind: PropKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKind {
    Conversation {
        script: Option<String>,
        conditional: Option<(String, String)>,
        talk_once_flag: Option<String>,
        flag_on_end: Option<String>,
    },
    Search {
        search_seconds: f32,
        found_flag: Option<String>,
        scripts: SearchScripts,
        hide_after_search: bool,
        key_hunt: Option<String>,
    },
    Mash {
        config: MashConfig,
        required_flag: Option<String>,
        blocked_script: Option<String>,
        completion_flag: Option<String>,
    },
    FetchQuest {
        started_flag: String,
        has_item_flag: String,
        complete_flag: String,
        scripts: FetchQuestScripts,
        completion_cue: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHuntDef {
    pub id: String,
    pub placement: KeyPlacement,
    pub found_flag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartDef {
    pub room: String,
    pub entry_key: String,
}
