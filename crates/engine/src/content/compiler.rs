use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{debug, info};

use crate::app::{FloorBounds, Rect, Vec2};
use crate::dialogue::{
    DialogueChoice, DialogueEffect, DialogueLine, DialogueScript, LineNext, Speaker,
    DEFAULT_REVEAL_SECONDS_PER_CHAR,
};
use crate::interaction::DoorDirection;
use crate::puzzles::{
    FetchQuestScripts, KeyPlacement, MashConfig, SearchScripts, DEFAULT_SEARCH_SECONDS,
};
use crate::rooms::{CameraFraming, RoomDefinition, RoomExit, SpawnOverride};
use crate::AppPaths;

use super::types::{
    AdventureContent, DoorDef, DoorLockDef, FlagDef, KeyHuntDef, PropDef, PropKind, RoomDef,
    StartDef, TriggerDoorDef, VisibilityDef,
};

const DEFAULT_HALF_WIDTH: f32 = 0.5;
const DEFAULT_HALF_HEIGHT: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDefinition,
    UnknownReference,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

/// Compiles every `*.xml` under the content directory, in path order, into
/// one [`AdventureContent`]. Names may be referenced across files.
pub fn compile_adventure_content(app_paths: &AppPaths) -> Result<AdventureContent, ContentCompileError> {
    let content_dir = &app_paths.content_dir;
    if !content_dir.is_dir() {
        return Err(ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: "content directory does not exist".to_string(),
            file_path: content_dir.clone(),
            location: None,
        });
    }

    let xml_files = collect_xml_files_sorted(content_dir)
        .map_err(|error| read_error(error.path, error.source))?;
    if xml_files.is_empty() {
        return Err(ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: "content directory contains no XML files".to_string(),
            file_path: content_dir.clone(),
            location: None,
        });
    }

    let mut builder = ContentBuilder::default();
    for xml_file in &xml_files {
        let raw = fs::read_to_string(xml_file)
            .map_err(|source| read_error(xml_file.clone(), source))?;
        parse_into(xml_file, &raw, &mut builder)?;
        debug!(file = %xml_file.display(), "content_file_parsed");
    }
    let content = builder.finish()?;

    info!(
        files = xml_files.len(),
        rooms = content.rooms.len(),
        scripts = content.scripts.len(),
        flags = content.flags.len(),
        "content_compiled"
    );
    Ok(content)
}

/// Compiles a single document on its own; every reference must resolve inside it.
pub fn parse_adventure_document(
    file_path: &Path,
    raw: &str,
) -> Result<AdventureContent, ContentCompileError> {
    let mut builder = ContentBuilder::default();
    parse_into(file_path, raw, &mut builder)?;
    builder.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DefKind {
    Flag,
    Room,
    Dialogue,
    KeyHunt,
}

impl DefKind {
    fn describe(self) -> &'static str {
        match self {
            DefKind::Flag => "flag",
            DefKind::Room => "room",
            DefKind::Dialogue => "dialogue",
            DefKind::KeyHunt => "key hunt",
        }
    }
}

#[derive(Debug, Clone)]
struct Origin {
    file_path: PathBuf,
    location: Option<SourceLocation>,
}

#[derive(Debug, Clone)]
struct PendingReference {
    kind: DefKind,
    name: String,
    origin: Origin,
}

#[derive(Debug, Default)]
struct ContentBuilder {
    content: AdventureContent,
    defined: HashSet<(DefKind, String)>,
    references: Vec<PendingReference>,
}

impl ContentBuilder {
    fn define(
        &mut self,
        kind: DefKind,
        name: &str,
        source: &Source<'_, '_>,
        node: Node<'_, '_>,
    ) -> Result<(), ContentCompileError> {
        if !self.defined.insert((kind, name.to_string())) {
            return Err(source.error_at(
                ContentErrorCode::DuplicateDefinition,
                format!("duplicate {} '{}'", kind.describe(), name),
                node,
            ));
        }
        Ok(())
    }

    fn reference(&mut self, kind: DefKind, name: &str, source: &Source<'_, '_>, node: Node<'_, '_>) {
        self.references.push(PendingReference {
            kind,
            name: name.to_string(),
            origin: source.origin(node),
        });
    }

    fn reference_opt(
        &mut self,
        kind: DefKind,
        name: Option<&str>,
        source: &Source<'_, '_>,
        node: Node<'_, '_>,
    ) {
        if let Some(name) = name {
            self.reference(kind, name, source, node);
        }
    }

    fn finish(self) -> Result<AdventureContent, ContentCompileError> {
        for reference in &self.references {
            if !self.defined.contains(&(reference.kind, reference.name.clone())) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::UnknownReference,
                    message: format!(
                        "unknown {} '{}'",
                        reference.kind.describe(),
                        reference.name
                    ),
                    file_path: reference.origin.file_path.clone(),
                    location: reference.origin.location,
                });
            }
        }
        Ok(self.content)
    }
}

struct Source<'d, 'input> {
    file_path: &'d Path,
    doc: &'d Document<'input>,
}

impl Source<'_, '_> {
    fn location(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    }

    fn origin(&self, node: Node<'_, '_>) -> Origin {
        Origin {
            file_path: self.file_path.to_path_buf(),
            location: Some(self.location(node)),
        }
    }

    fn error_at(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentCompileError {
        ContentCompileError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(self.location(node)),
        }
    }
}

/// Reads attributes off one element and rejects any it was not asked for.
struct Attributes<'s, 'd, 'input> {
    source: &'s Source<'d, 'input>,
    node: Node<'d, 'input>,
    consumed: HashSet<&'static str>,
}

impl<'s, 'd, 'input> Attributes<'s, 'd, 'input> {
    fn new(source: &'s Source<'d, 'input>, node: Node<'d, 'input>) -> Self {
        Self {
            source,
            node,
            consumed: HashSet::new(),
        }
    }

    fn element(&self) -> &str {
        self.node.tag_name().name()
    }

    fn invalid(&self, message: String) -> ContentCompileError {
        self.source
            .error_at(ContentErrorCode::InvalidValue, message, self.node)
    }

    fn string(&mut self, name: &'static str) -> Option<String> {
        self.consumed.insert(name);
        self.node
            .attribute(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    fn required(&mut self, name: &'static str) -> Result<String, ContentCompileError> {
        self.string(name).ok_or_else(|| {
            self.source.error_at(
                ContentErrorCode::MissingField,
                format!("missing required attribute '{}' on <{}>", name, self.element()),
                self.node,
            )
        })
    }

    fn f32_opt(&mut self, name: &'static str) -> Result<Option<f32>, ContentCompileError> {
        let Some(value) = self.string(name) else {
            return Ok(None);
        };
        match value.parse::<f32>() {
            Ok(parsed) if parsed.is_finite() => Ok(Some(parsed)),
            _ => Err(self.invalid(format!(
                "attribute '{}' on <{}> must be a finite number, got '{}'",
                name,
                self.element(),
                value
            ))),
        }
    }

    fn f32_or(&mut self, name: &'static str, default: f32) -> Result<f32, ContentCompileError> {
        Ok(self.f32_opt(name)?.unwrap_or(default))
    }

    fn required_f32(&mut self, name: &'static str) -> Result<f32, ContentCompileError> {
        match self.f32_opt(name)? {
            Some(value) => Ok(value),
            None => Err(self.source.error_at(
                ContentErrorCode::MissingField,
                format!("missing required attribute '{}' on <{}>", name, self.element()),
                self.node,
            )),
        }
    }

    fn non_negative_or(&mut self, name: &'static str, default: f32) -> Result<f32, ContentCompileError> {
        let value = self.f32_or(name, default)?;
        if value < 0.0 {
            return Err(self.invalid(format!(
                "attribute '{}' on <{}> must be >= 0",
                name,
                self.element()
            )));
        }
        Ok(value)
    }

    fn bool_or(&mut self, name: &'static str, default: bool) -> Result<bool, ContentCompileError> {
        match self.string(name).as_deref() {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(self.invalid(format!(
                "attribute '{}' on <{}> must be true or false, got '{}'",
                name,
                self.element(),
                other
            ))),
        }
    }

    fn finish(self) -> Result<(), ContentCompileError> {
        for attribute in self.node.attributes() {
            if !self.consumed.contains(attribute.name()) {
                return Err(self.source.error_at(
                    ContentErrorCode::UnknownField,
                    format!(
                        "unknown attribute '{}' on <{}>",
                        attribute.name(),
                        self.element()
                    ),
                    self.node,
                ));
            }
        }
        Ok(())
    }
}

fn parse_into(
    file_path: &Path,
    raw: &str,
    builder: &mut ContentBuilder,
) -> Result<(), ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let source = Source {
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Adventure" {
        return Err(source.error_at(
            ContentErrorCode::InvalidRoot,
            "root element must be <Adventure>".to_string(),
            root,
        ));
    }

    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "Flag" => {
                let flag = parse_flag(&source, child)?;
                builder.define(DefKind::Flag, &flag.name, &source, child)?;
                builder.content.flags.push(flag);
            }
            "Start" => {
                if builder.content.start.is_some() {
                    return Err(source.error_at(
                        ContentErrorCode::DuplicateDefinition,
                        "only one <Start> is allowed".to_string(),
                        child,
                    ));
                }
                let mut attrs = Attributes::new(&source, child);
                let start = StartDef {
                    room: attrs.required("room")?,
                    entry_key: attrs.required("entry")?,
                };
                attrs.finish()?;
                builder.reference(DefKind::Room, &start.room, &source, child);
                builder.content.start = Some(start);
            }
            "SpawnOverride" => {
                let mut attrs = Attributes::new(&source, child);
                let from_room = attrs.string("from").filter(|from| from != "*");
                let spawn = SpawnOverride {
                    from_room,
                    to_room: attrs.required("to")?,
                    entry_key: attrs.required("entry")?,
                };
                attrs.finish()?;
                builder.reference_opt(DefKind::Room, spawn.from_room.as_deref(), &source, child);
                builder.reference(DefKind::Room, &spawn.to_room, &source, child);
                builder.content.spawn_overrides.push(spawn);
            }
            "Room" => {
                let room = parse_room(&source, child, builder)?;
                builder.define(DefKind::Room, &room.definition.id, &source, child)?;
                builder.content.rooms.push(room);
            }
            "Dialogue" => {
                let script = parse_dialogue(&source, child, builder)?;
                builder.define(DefKind::Dialogue, &script.id, &source, child)?;
                builder.content.scripts.push(script);
            }
            "KeyHunt" => {
                let hunt = parse_key_hunt(&source, child, builder)?;
                builder.define(DefKind::KeyHunt, &hunt.id, &source, child)?;
                builder.content.key_hunts.push(hunt);
            }
            other => {
                return Err(source.error_at(
                    ContentErrorCode::UnknownElement,
                    format!("unsupported element <{other}> in <Adventure>"),
                    child,
                ))
            }
        }
    }
    Ok(())
}

fn parse_flag(source: &Source<'_, '_>, node: Node<'_, '_>) -> Result<FlagDef, ContentCompileError> {
    let mut attrs = Attributes::new(source, node);
    let flag = FlagDef {
        name: attrs.required("name")?,
        default_value: attrs.bool_or("default", false)?,
    };
    attrs.finish()?;
    Ok(flag)
}

fn parse_room(
    source: &Source<'_, '_>,
    node: Node<'_, '_>,
    builder: &mut ContentBuilder,
) -> Result<RoomDef, ContentCompileError> {
    let mut attrs = Attributes::new(source, node);
    let id = attrs.required("id")?;
    let floor_min = attrs.required_f32("floorMin")?;
    let floor_max = attrs.required_f32("floorMax")?;
    let visual_root = attrs.string("visual");
    if floor_min >= floor_max {
        return Err(attrs.invalid(format!(
            "room '{id}' needs floorMin < floorMax"
        )));
    }
    attrs.finish()?;

    let mut definition = RoomDefinition::new(id, FloorBounds::new(floor_min, floor_max));
    if let Some(visual_root) = visual_root {
        definition = definition.with_visual_root(visual_root);
    }
    let mut room = RoomDef {
        definition,
        doors: Vec::new(),
        trigger_doors: Vec::new(),
        props: Vec::new(),
    };
    let mut camera_seen = false;

    for child in node.children().filter(|child| child.is_element()) {
        match child.tag_name().name() {
            "Entry" => {
                let mut attrs = Attributes::new(source, child);
                let key = attrs.required("key")?;
                let position = Vec2::new(attrs.required_f32("x")?, attrs.f32_or("y", 0.0)?);
                attrs.finish()?;
                if room.definition.entry_point(&key).is_some() {
                    return Err(source.error_at(
                        ContentErrorCode::DuplicateDefinition,
                        format!("duplicate entry point '{key}'"),
                        child,
                    ));
                }
                room.definition = room.definition.with_entry(key, position);
            }
            "CameraBounds" | "CameraAnchor" => {
                if camera_seen {
                    return Err(source.error_at(
                        ContentErrorCode::DuplicateField,
                        "a room takes one camera element".to_string(),
                        child,
                    ));
                }
                camera_seen = true;
                let framing = parse_camera(source, child)?;
                room.definition = room.definition.with_camera(framing);
            }
            "Door" => {
                let door = parse_door(source, child, builder)?;
                room.definition = room.definition.with_exit(RoomExit {
                    target_room: door.target_room.clone(),
                    entry_key: door.entry_key.clone(),
                    x: door.position.x,
                });
                room.doors.push(door);
            }
            "TriggerDoor" => {
                let mut attrs = Attributes::new(source, child);
                let trigger = TriggerDoorDef {
                    min_x: attrs.required_f32("minX")?,
                    max_x: attrs.required_f32("maxX")?,
                    target_room: attrs.required("target")?,
                    entry_key: attrs.required("entry")?,
                };
                attrs.finish()?;
                builder.reference(DefKind::Room, &trigger.target_room, source, child);
                room.definition = room.definition.with_exit(RoomExit {
                    target_room: trigger.target_room.clone(),
                    entry_key: trigger.entry_key.clone(),
                    x: (trigger.min_x + trigger.max_x) * 0.5,
                });
                room.trigger_doors.push(trigger);
            }
            "Conversation" | "Search" | "Mash" | "FetchQuest" => {
                room.props.push(parse_prop(source, child, builder)?);
            }
            other => {
                return Err(source.error_at(
                    ContentErrorCode::UnknownElement,
                    format!("unsupported element <{other}> in <Room>"),
                    child,
                ))
            }
        }
    }
    Ok(room)
}

fn parse_camera(source: &Source<'_, '_>, node: Node<'_, '_>) -> Result<CameraFraming, ContentCompileError> {
    let mut attrs = Attributes::new(source, node);
    let framing = if node.tag_name().name() == "CameraBounds" {
        let min = Vec2::new(attrs.required_f32("minX")?, attrs.f32_or("minY", 0.0)?);
        let max = Vec2::new(attrs.required_f32("maxX")?, attrs.f32_or("maxY", 0.0)?);
        CameraFraming::Bounds(Rect::new(min, max))
    } else {
        CameraFraming::Anchor {
            position: Vec2::new(attrs.required_f32("x")?, attrs.f32_or("y", 0.0)?),
            angle_degrees: attrs.f32_or("angle", 0.0)?,
        }
    };
    attrs.finish()?;
    Ok(framing)
}

struct Placement {
    label: String,
    position: Vec2,
    half_extents: Vec2,
    interaction_x: Option<f32>,
    visibility: Option<VisibilityDef>,
}

fn parse_placement(
    attrs: &mut Attributes<'_, '_, '_>,
    builder: &mut ContentBuilder,
) -> Result<Placement, ContentCompileError> {
    let label = attrs.required("label")?;
    let position = Vec2::new(attrs.required_f32("x")?, attrs.f32_or("y", 0.0)?);
    let half_extents = Vec2::new(
        attrs.non_negative_or("halfWidth", DEFAULT_HALF_WIDTH)?,
        attrs.non_negative_or("halfHeight", DEFAULT_HALF_HEIGHT)?,
    );
    let interaction_x = attrs.f32_opt("interactionX")?;
    let visible_when = attrs.bool_or("visibleWhen", true)?;
    let visibility = attrs.string("visibleFlag").map(|flag| VisibilityDef {
        flag,
        active_when_true: visible_when,
    });
    if let Some(visibility) = &visibility {
        builder.reference(DefKind::Flag, &visibility.flag, attrs.source, attrs.node);
    }
    Ok(Placement {
        label,
        position,
        half_extents,
        interaction_x,
        visibility,
    })
}

fn parse_door(
    source: &Source<'_, '_>,
    node: Node<'_, '_>,
    builder: &mut ContentBuilder,
) -> Result<DoorDef, ContentCompileError> {
    let mut attrs = Attributes::new(source, node);
    let placement = parse_placement(&mut attrs, builder)?;
    let target_room = attrs.required("target")?;
    let entry_key = attrs.required("entry")?;
    let direction = match attrs.string("direction").as_deref() {
        None | Some("wall") => DoorDirection::Wall,
        Some("left") => DoorDirection::Left,
        Some("right") => DoorDirection::Right,
        Some(other) => {
            return Err(attrs.invalid(format!(
                "invalid direction '{other}'; allowed values: left, right, wall"
            )))
        }
    };
    let show_exit_arrow = attrs.bool_or("exitArrow", false)?;
    let lock_flag = attrs.string("lockFlag");
    let require_flag_true = attrs.bool_or("requireFlag", true)?;
    let locked = attrs.bool_or("locked", false)?;
    attrs.finish()?;

    builder.reference(DefKind::Room, &target_room, source, node);
    builder.reference_opt(DefKind::Flag, lock_flag.as_deref(), source, node);

    let lock = (lock_flag.is_some() || locked).then(|| DoorLockDef {
        flag: lock_flag,
        require_flag_true,
        locked,
    });
    Ok(DoorDef {
        label: placement.label,
        position: placement.position,
        half_extents: placement.half_extents,
        target_room,
        entry_key,
        direction,
        show_exit_arrow,
        interaction_x: placement.interaction_x,
        lock,
        visibility: placement.visibility,
    })
}

fn parse_prop(
    source: &Source<'_, '_>,
    node: Node<'_, '_>,
    builder: &mut ContentBuilder,
) -> Result<PropDef, ContentCompileError> {
    let mut attrs = Attributes::new(source, node);
    let placement = parse_placement(&mut attrs, builder)?;

    let kind = match node.tag_name().name() {
        "Conversation" => {
            let script = attrs.string("script");
            let conditional_flag = attrs.string("conditionalFlag");
            let conditional_script = attrs.string("conditionalScript");
            let conditional = match (conditional_flag, conditional_script) {
                (Some(flag), Some(script)) => Some((flag, script)),
                (None, None) => None,
                _ => {
                    return Err(source.error_at(
                        ContentErrorCode::MissingField,
                        "conditionalFlag and conditionalScript go together".to_string(),
                        node,
                    ))
                }
            };
            let talk_once_flag = attrs.string("talkOnceFlag");
            let flag_on_end = attrs.string("flagOnEnd");

            builder.reference_opt(DefKind::Dialogue, script.as_deref(), source, node);
            if let Some((flag, script)) = &conditional {
                builder.reference(DefKind::Flag, flag, source, node);
                builder.reference(DefKind::Dialogue, script, source, node);
            }
            builder.reference_opt(DefKind::Flag, talk_once_flag.as_deref(), source, node);
            builder.reference_opt(DefKind::Flag, flag_on_end.as_deref(), source, node);
            PropKind::Conversation {
                script,
                conditional,
                talk_once_flag,
                flag_on_end,
            }
        }
        "Search" => {
            let search_seconds = attrs.non_negative_or("seconds", DEFAULT_SEARCH_SECONDS)?;
            let found_flag = attrs.string("foundFlag");
            let scripts = SearchScripts {
                found: attrs.string("foundScript"),
                empty: attrs.string("emptyScript"),
                already_found: attrs.string("alreadyFoundScript"),
            };
            let hide_after_search = attrs.bool_or("hideAfterSearch", false)?;
            let key_hunt = attrs.string("keyHunt");

            builder.reference_opt(DefKind::Flag, found_flag.as_deref(), source, node);
            for script in [&scripts.found, &scripts.empty, &scripts.already_found] {
                builder.reference_opt(DefKind::Dialogue, script.as_deref(), source, node);
            }
            builder.reference_opt(DefKind::KeyHunt, key_hunt.as_deref(), source, node);
            PropKind::Search {
                search_seconds,
                found_flag,
                scripts,
                hide_after_search,
                key_hunt,
            }
        }
        "Mash" => {
            let defaults = MashConfig::default();
            let config = MashConfig {
                target_progress: attrs.non_negative_or("targetProgress", defaults.target_progress)?,
                click_power: attrs.non_negative_or("clickPower", defaults.click_power)?,
                resistance_interval_seconds: attrs
                    .non_negative_or("resistanceInterval", defaults.resistance_interval_seconds)?,
                resistance_step: attrs.non_negative_or("resistanceStep", defaults.resistance_step)?,
                late_stage_enabled: attrs.bool_or("lateStage", defaults.late_stage_enabled)?,
                late_stage_start: attrs.non_negative_or("lateStageStart", defaults.late_stage_start)?,
                late_stage_max_decay_per_second: attrs.non_negative_or(
                    "lateStageMaxDecay",
                    defaults.late_stage_max_decay_per_second,
                )?,
                late_stage_overrides_discrete: attrs.bool_or(
                    "lateStageOverridesDiscrete",
                    defaults.late_stage_overrides_discrete,
                )?,
                click_window_seconds: attrs
                    .non_negative_or("clickWindow", defaults.click_window_seconds)?,
                completion_seconds: attrs
                    .non_negative_or("completionSeconds", defaults.completion_seconds)?,
            };
            if config.target_progress <= 0.0 {
                return Err(attrs.invalid("targetProgress must be > 0".to_string()));
            }
            let required_flag = attrs.string("requiredFlag");
            let blocked_script = attrs.string("blockedScript");
            let completion_flag = attrs.string("completionFlag");

            builder.reference_opt(DefKind::Flag, required_flag.as_deref(), source, node);
            builder.reference_opt(DefKind::Dialogue, blocked_script.as_deref(), source, node);
            builder.reference_opt(DefKind::Flag, completion_flag.as_deref(), source, node);
            PropKind::Mash {
                config,
                required_flag,
                blocked_script,
                completion_flag,
            }
        }
        _ => {
            let started_flag = attrs.required("startedFlag")?;
            let has_item_flag = attrs.required("hasItemFlag")?;
            let complete_flag = attrs.required("completeFlag")?;
            let scripts = FetchQuestScripts {
                intro: attrs.string("introScript"),
                reminder: attrs.string("reminderScript"),
                thanks: attrs.string("thanksScript"),
            };
            let completion_cue = attrs.string("completionCue");

            for flag in [&started_flag, &has_item_flag, &complete_flag] {
                builder.reference(DefKind::Flag, flag, source, node);
            }
            for script in [&scripts.intro, &scripts.reminder, &scripts.thanks] {
                builder.reference_opt(DefKind::Dialogue, script.as_deref(), source, node);
            }
            PropKind::FetchQuest {
                started_flag,
                has_item_flag,
                complete_flag,
                scripts,
                completion_cue,
            }
        }
    };
    attrs.finish()?;

    Ok(PropDef {
        label: placement.label,
        position: placement.position,
        half_extents: placement.half_extents,
        interaction_x: placement.interaction_x,
        visibility: placement.visibility,
        kind,
    })
}

fn parse_key_hunt(
    source: &Source<'_, '_>,
    node: Node<'_, '_>,
    builder: &mut ContentBuilder,
) -> Result<KeyHuntDef, ContentCompileError> {
    let mut attrs = Attributes::new(source, node);
    let id = attrs.required("id")?;
    let placement = match attrs.string("placement").as_deref() {
        None | Some("random") => KeyPlacement::Random,
        Some(index) => match index.parse::<usize>() {
            Ok(index) => KeyPlacement::Fixed(index),
            Err(_) => {
                return Err(attrs.invalid(format!(
                    "placement must be 'random' or a prop index, got '{index}'"
                )))
            }
        },
    };
    let found_flag = attrs.string("foundFlag");
    attrs.finish()?;
    builder.reference_opt(DefKind::Flag, found_flag.as_deref(), source, node);
    Ok(KeyHuntDef {
        id,
        placement,
        found_flag,
    })
}

fn parse_dialogue(
    source: &Source<'_, '_>,
    node: Node<'_, '_>,
    builder: &mut ContentBuilder,
) -> Result<DialogueScript, ContentCompileError> {
    let mut attrs = Attributes::new(source, node);
    let id = attrs.required("id")?;
    let player_name = attrs.string("playerName").unwrap_or_default();
    let other_name = attrs.string("otherName").unwrap_or_default();
    attrs.finish()?;

    let mut script = DialogueScript::new(id).with_names(player_name, other_name);
    let mut jumps = Vec::new();

    for child in node.children().filter(|child| child.is_element()) {
        if child.tag_name().name() != "Line" {
            return Err(source.error_at(
                ContentErrorCode::UnknownElement,
                format!("unsupported element <{}> in <Dialogue>", child.tag_name().name()),
                child,
            ));
        }
        let line = parse_line(source, child, builder)?;
        if let LineNext::Goto(target) = line.next {
            jumps.push((target, child));
        }
        for choice in &line.choices {
            if let LineNext::Goto(target) = choice.next {
                jumps.push((target, child));
            }
        }
        script = script.with_line(line);
    }

    let line_count = script.lines.len();
    if let Some((target, line_node)) = jumps.into_iter().find(|(target, _)| *target >= line_count) {
        return Err(source.error_at(
            ContentErrorCode::InvalidValue,
            format!("jump to line {target} but the dialogue has {line_count} lines"),
            line_node,
        ));
    }
    if line_count == 0 {
        debug!(script = %script.id, "dialogue_without_lines");
    }
    Ok(script)
}

fn parse_line(
    source: &Source<'_, '_>,
    node: Node<'_, '_>,
    builder: &mut ContentBuilder,
) -> Result<DialogueLine, ContentCompileError> {
    let mut attrs = Attributes::new(source, node);
    let speaker = match attrs.required("speaker")?.as_str() {
        "player" => Speaker::Player,
        "other" => Speaker::Other,
        other => {
            return Err(attrs.invalid(format!(
                "invalid speaker '{other}'; allowed values: player, other"
            )))
        }
    };
    let reveal = attrs.non_negative_or("reveal", DEFAULT_REVEAL_SECONDS_PER_CHAR)?;
    let next = parse_next(&mut attrs)?;
    attrs.finish()?;

    let mut text: Option<String> = None;
    let mut choices = Vec::new();
    let mut on_start = Vec::new();
    let mut on_end = Vec::new();

    for child in node.children().filter(|child| child.is_element()) {
        match child.tag_name().name() {
            "Text" => {
                if text.is_some() {
                    return Err(source.error_at(
                        ContentErrorCode::DuplicateField,
                        "duplicate <Text> in <Line>".to_string(),
                        child,
                    ));
                }
                text = Some(child.text().map(str::trim).unwrap_or_default().to_string());
            }
            "Choice" => {
                let mut attrs = Attributes::new(source, child);
                let label = attrs.required("label")?;
                let next = parse_next(&mut attrs)?;
                attrs.finish()?;
                let mut choice = DialogueChoice::new(label, next);
                for effect in parse_effects(source, child, builder)? {
                    choice = choice.with_effect(effect);
                }
                choices.push(choice);
            }
            "OnStart" => on_start.extend(parse_effects(source, child, builder)?),
            "OnEnd" => on_end.extend(parse_effects(source, child, builder)?),
            other => {
                return Err(source.error_at(
                    ContentErrorCode::UnknownElement,
                    format!("unsupported element <{other}> in <Line>"),
                    child,
                ))
            }
        }
    }

    let Some(text) = text else {
        return Err(source.error_at(
            ContentErrorCode::MissingField,
            "missing required <Text> in <Line>".to_string(),
            node,
        ));
    };

    let mut line = DialogueLine::new(speaker, text)
        .with_reveal_seconds_per_char(reveal)
        .with_next(next);
    for choice in choices {
        line = line.with_choice(choice);
    }
    for effect in on_start {
        line = line.with_on_start(effect);
    }
    for effect in on_end {
        line = line.with_on_end(effect);
    }
    Ok(line)
}

fn parse_next(attrs: &mut Attributes<'_, '_, '_>) -> Result<LineNext, ContentCompileError> {
    match attrs.string("next").as_deref() {
        None => Ok(LineNext::Sequential),
        Some("end") => Ok(LineNext::End),
        Some(index) => index.parse::<usize>().map(LineNext::Goto).map_err(|_| {
            attrs.invalid(format!("next must be 'end' or a line index, got '{index}'"))
        }),
    }
}

fn parse_effects(
    source: &Source<'_, '_>,
    node: Node<'_, '_>,
    builder: &mut ContentBuilder,
) -> Result<Vec<DialogueEffect>, ContentCompileError> {
    let mut effects = Vec::new();
    for child in node.children().filter(|child| child.is_element()) {
        let mut attrs = Attributes::new(source, child);
        let effect = match child.tag_name().name() {
            "SetFlag" => DialogueEffect::SetFlag {
                flag: attrs.required("flag")?,
                value: attrs.bool_or("value", true)?,
            },
            "ToggleFlag" => DialogueEffect::ToggleFlag {
                flag: attrs.required("flag")?,
            },
            "ResetFlag" => DialogueEffect::ResetFlag {
                flag: attrs.required("flag")?,
            },
            "Cue" => DialogueEffect::Cue(attrs.required("name")?),
            other => {
                return Err(source.error_at(
                    ContentErrorCode::UnknownElement,
                    format!("unsupported effect <{other}>"),
                    child,
                ))
            }
        };
        attrs.finish()?;
        match &effect {
            DialogueEffect::SetFlag { flag, .. }
            | DialogueEffect::ToggleFlag { flag }
            | DialogueEffect::ResetFlag { flag } => {
                builder.reference(DefKind::Flag, flag, source, child);
            }
            DialogueEffect::Cue(_) => {}
        }
        effects.push(effect);
    }
    Ok(effects)
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_cached_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read XML file: {source}"),
        file_path: path,
        location: None,
    }
}
