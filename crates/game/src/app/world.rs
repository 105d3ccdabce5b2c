use std::collections::BTreeMap;

use adventure_engine::{
    AdventureContent, AdventureSession, ConversationProp, Door, DoorDef, DoorLock, FetchQuest,
    FetchQuestFlags, FlagId, FlagRegistry, FloorBounds, Interactable, KeyHunt, LockedDoor,
    MashPuzzle, PropKind, RoomDef, RoomGraph, ScriptLibrary, SearchProp,
    SessionConfig, TransitionError, TriggerDoor, Vec2, VisibilityDef, WalkToAnchor,
};
use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub(crate) enum WorldError {
    #[error("content references unknown flag '{name}'")]
    UnknownFlag { name: String },
    #[error("content has no <Start> element")]
    MissingStart,
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// A key hunt after placement, kept for end-of-run stats.
#[derive(Debug)]
pub(crate) struct PlacedKeyHunt {
    pub(crate) id: String,
    pub(crate) hunt: KeyHunt,
    pub(crate) key_prop: Option<String>,
}

pub(crate) struct DemoWorld {
    pub(crate) session: AdventureSession,
    pub(crate) key_hunts: Vec<PlacedKeyHunt>,
}

pub(crate) fn build_world<R: Rng + ?Sized>(
    content: &AdventureContent,
    config: SessionConfig,
    rng: &mut R,
) -> Result<DemoWorld, WorldError> {
    let mut flags = FlagRegistry::new();
    for flag in &content.flags {
        flags.register(&flag.name, flag.default_value);
    }

    let mut scripts = ScriptLibrary::default();
    for script in &content.scripts {
        scripts.insert(script.clone());
    }

    let mut graph = RoomGraph::new();
    for room in &content.rooms {
        graph.insert(room.definition.clone());
    }
    for spawn in &content.spawn_overrides {
        graph.add_override(spawn.clone());
    }

    let Some(start) = content.start.as_ref() else {
        return Err(WorldError::MissingStart);
    };

    let mut session = AdventureSession::new(config, graph, scripts, flags);
    let mut hunt_props: BTreeMap<&str, Vec<(&str, Option<&VisibilityDef>, SearchProp)>> =
        BTreeMap::new();

    for room in &content.rooms {
        let room_id = room.definition.id.as_str();
        for door in &room.doors {
            let body = build_door(&session, door)?;
            register(&mut session, room_id, body, door.visibility.as_ref())?;
        }
        for trigger in &room.trigger_doors {
            session.add_trigger_door(TriggerDoor::new(
                room_id,
                FloorBounds::new(trigger.min_x, trigger.max_x),
                trigger.target_room.clone(),
                trigger.entry_key.clone(),
            ));
        }
        add_props(&mut session, room, &mut hunt_props)?;
    }

    let mut key_hunts = Vec::new();
    for def in &content.key_hunts {
        let found_flag = def
            .found_flag
            .as_deref()
            .map(|name| flag_id(&session, name))
            .transpose()?;
        let entries = hunt_props.remove(def.id.as_str()).unwrap_or_default();
        let mut rooms = Vec::with_capacity(entries.len());
        let mut visibilities = Vec::with_capacity(entries.len());
        let mut props = Vec::with_capacity(entries.len());
        for (room, visibility, prop) in entries {
            rooms.push(room);
            visibilities.push(visibility);
            props.push(prop);
        }

        let mut hunt = KeyHunt::new(def.placement, found_flag);
        let key_prop = hunt
            .place(&mut props, &mut *rng)
            .and_then(|index| props.get(index))
            .map(|prop| prop.label().to_string());
        for ((room, visibility), prop) in rooms.into_iter().zip(visibilities).zip(props) {
            register(&mut session, room, Box::new(prop), visibility)?;
        }
        key_hunts.push(PlacedKeyHunt {
            id: def.id.clone(),
            hunt,
            key_prop,
        });
    }
    for (id, entries) in hunt_props {
        warn!(key_hunt = id, props = entries.len(), "key_hunt_undefined_props_dropped");
    }

    session.start(&start.room, &start.entry_key)?;
    info!(
        rooms = content.rooms.len(),
        interactables = session.interactable_count(),
        key_hunts = key_hunts.len(),
        start_room = %start.room,
        "world_built"
    );
    Ok(DemoWorld { session, key_hunts })
}

fn flag_id(session: &AdventureSession, name: &str) -> Result<FlagId, WorldError> {
    session.flags().id(name).ok_or_else(|| WorldError::UnknownFlag {
        name: name.to_string(),
    })
}

fn flag_opt(session: &AdventureSession, name: Option<&str>) -> Result<Option<FlagId>, WorldError> {
    name.map(|name| flag_id(session, name)).transpose()
}

fn register(
    session: &mut AdventureSession,
    room: &str,
    body: Box<dyn Interactable>,
    visibility: Option<&VisibilityDef>,
) -> Result<(), WorldError> {
    match visibility {
        Some(visibility) => {
            let flag = flag_id(session, &visibility.flag)?;
            session.add_interactable_with_visibility(room, body, flag, visibility.active_when_true);
        }
        None => {
            session.add_interactable(room, body);
        }
    }
    Ok(())
}

fn anchor(position: Vec2, half_extents: Vec2, interaction_x: Option<f32>) -> WalkToAnchor {
    WalkToAnchor::new(position, half_extents).with_interaction_x(interaction_x)
}

fn build_door(session: &AdventureSession, door: &DoorDef) -> Result<Box<dyn Interactable>, WorldError> {
    if !door.is_walk_then_act() {
        return Ok(Box::new(
            Door::new(
                door.label.clone(),
                door.position,
                door.half_extents,
                door.target_room.clone(),
                door.entry_key.clone(),
            )
            .with_direction(door.direction)
            .with_exit_arrow(door.show_exit_arrow),
        ));
    }

    let lock = match &door.lock {
        Some(lock) => DoorLock {
            flag: flag_opt(session, lock.flag.as_deref())?,
            require_flag_true: lock.require_flag_true,
            locked: lock.locked,
        },
        None => DoorLock::default(),
    };
    Ok(Box::new(
        LockedDoor::new(
            door.label.clone(),
            anchor(door.position, door.half_extents, door.interaction_x),
            door.target_room.clone(),
            door.entry_key.clone(),
            lock,
        )
        .with_direction(door.direction)
        .with_exit_arrow(door.show_exit_arrow),
    ))
}

fn add_props<'c>(
    session: &mut AdventureSession,
    room: &'c RoomDef,
    hunt_props: &mut BTreeMap<&'c str, Vec<(&'c str, Option<&'c VisibilityDef>, SearchProp)>>,
) -> Result<(), WorldError> {
    let room_id = room.definition.id.as_str();
    for prop in &room.props {
        let walk_to = anchor(prop.position, prop.half_extents, prop.interaction_x);
        let body: Box<dyn Interactable> = match &prop.kind {
            PropKind::Conversation {
                script,
                conditional,
                talk_once_flag,
                flag_on_end,
            } => {
                let mut conversation = ConversationProp::new(prop.label.clone(), walk_to, script.clone())
                    .with_talk_once_flag(flag_opt(session, talk_once_flag.as_deref())?)
                    .with_flag_on_end(flag_opt(session, flag_on_end.as_deref())?);
                if let Some((flag, script)) = conditional {
                    conversation = conversation.with_conditional(flag_id(session, flag)?, script.clone());
                }
                Box::new(conversation)
            }
            PropKind::Search {
                search_seconds,
                found_flag,
                scripts,
                hide_after_search,
                key_hunt,
            } => {
                let found_flag = flag_opt(session, found_flag.as_deref())?;
                let mut search = SearchProp::new(prop.label.clone(), walk_to)
                    .with_search_seconds(*search_seconds)
                    .with_found_flag(found_flag)
                    .with_scripts(scripts.clone())
                    .with_hide_after_search(*hide_after_search);
                if let Some(hunt) = key_hunt {
                    hunt_props.entry(hunt.as_str()).or_default().push((
                        room_id,
                        prop.visibility.as_ref(),
                        search,
                    ));
                    continue;
                }
                // Outside a hunt, a prop with a found flag always holds its item.
                search.set_contains_key(found_flag.is_some());
                Box::new(search)
            }
            PropKind::Mash {
                config,
                required_flag,
                blocked_script,
                completion_flag,
            } => Box::new(
                MashPuzzle::new(prop.label.clone(), walk_to, *config)
                    .with_gate(flag_opt(session, required_flag.as_deref())?, blocked_script.clone())
                    .with_completion_flag(flag_opt(session, completion_flag.as_deref())?),
            ),
            PropKind::FetchQuest {
                started_flag,
                has_item_flag,
                complete_flag,
                scripts,
                completion_cue,
            } => {
                let flags = FetchQuestFlags {
                    started: flag_id(session, started_flag)?,
                    has_item: flag_id(session, has_item_flag)?,
                    complete: flag_id(session, complete_flag)?,
                };
                Box::new(
                    FetchQuest::new(prop.label.clone(), walk_to, flags, scripts.clone())
                        .with_completion_cue(completion_cue.clone()),
                )
            }
        };
        register(session, room_id, body, prop.visibility.as_ref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use adventure_engine::{parse_adventure_document, InputSnapshot};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    const WORLD: &str = r#"<Adventure>
        <Flag name="has_keys"/>
        <Flag name="lamp_on" default="true"/>
        <Start room="office" entry="start"/>
        <Room id="office" floorMin="-6" floorMax="6">
            <Entry key="start" x="0"/>
            <Entry key="right" x="5"/>
            <Door label="hall door" x="5.5" target="hall" entry="left" interactionX="5"
                  lockFlag="has_keys"/>
            <Search label="desk" x="-3" keyHunt="office_keys" seconds="0.5"/>
            <Search label="cabinet" x="-5" keyHunt="office_keys" seconds="0.5"/>
            <Search label="lamp" x="3" visibleFlag="lamp_on"/>
        </Room>
        <Room id="hall" floorMin="-10" floorMax="10">
            <Entry key="left" x="-9"/>
            <TriggerDoor minX="-10" maxX="-9.5" target="office" entry="right"/>
        </Room>
        <KeyHunt id="office_keys" placement="1" foundFlag="has_keys"/>
    </Adventure>"#;

    fn world() -> DemoWorld {
        let content = parse_adventure_document(Path::new("world.xml"), WORLD).expect("content");
        let mut rng = StdRng::seed_from_u64(3);
        build_world(&content, SessionConfig::default(), &mut rng).expect("world")
    }

    #[test]
    fn builds_every_interactable_and_starts_in_start_room() {
        let world = world();
        assert_eq!(world.session.active_room_id(), Some("office"));
        assert_eq!(world.session.interactable_count(), 4);
        assert!(world.session.find_interactable("lamp").is_some());
        assert!(world.session.find_interactable("cabinet").is_some());
    }

    #[test]
    fn key_hunt_uses_fixed_placement() {
        let world = world();
        assert_eq!(world.key_hunts.len(), 1);
        let placed = &world.key_hunts[0];
        assert_eq!(placed.id, "office_keys");
        assert_eq!(placed.key_prop.as_deref(), Some("cabinet"));
        assert_eq!(placed.hunt.prop_count(), 2);
    }

    #[test]
    fn searching_the_key_prop_sets_the_hunt_flag() {
        let mut world = world();
        let (_, hit_box) = world.session.find_interactable("cabinet").expect("cabinet");
        world.session.tick(1.0 / 60.0, &InputSnapshot::click_at(hit_box.center()));
        for _ in 0..600 {
            world.session.tick(1.0 / 60.0, &InputSnapshot::empty());
            if world.session.is_idle() && world.key_hunts[0].hunt.searched_count() == 1 {
                break;
            }
        }
        let has_keys = world.session.flags().id("has_keys").expect("flag");
        assert!(world.session.flags().is_active(has_keys));
        assert!(world.key_hunts[0].hunt.keys_found(world.session.flags()));
    }

    #[test]
    fn hidden_prop_is_not_findable() {
        let mut world = world();
        let lamp_on = world.session.flags().id("lamp_on").expect("flag");
        world.session.flags_mut().set_active(lamp_on, false);
        assert!(world.session.find_interactable("lamp").is_none());
        assert_eq!(
            world.session.find_interactable("desk").map(|(_, rect)| rect.center().x),
            Some(-3.0)
        );
    }

    #[test]
    fn missing_start_is_reported() {
        let content = parse_adventure_document(
            Path::new("world.xml"),
            r#"<Adventure><Room id="a" floorMin="-1" floorMax="1"/></Adventure>"#,
        )
        .expect("content");
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            build_world(&content, SessionConfig::default(), &mut rng),
            Err(WorldError::MissingStart)
        ));
    }
}
