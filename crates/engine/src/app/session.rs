use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::camera::CameraRig;
use crate::dialogue::{DialogueEffect, DialogueEngine, DialogueEvent, ScriptLibrary};
use crate::flags::{FlagId, FlagRegistry, FlagSnapshot, FlagVisibility};
use crate::interaction::{
    ClickRoute, ExitArrowHint, HoverCandidate, Interactable, InteractableId, InteractionDispatch,
    InteractionLock, Services,
};
use crate::movement::{MovementController, MovementEvent};
use crate::rooms::{RoomController, RoomEntered, RoomGraph, TransitionError, TriggerDoor, PLAYER_ACTOR};

use super::{AnimationState, Cue, CueQueue, InputSnapshot, Rect, SessionConfig, Vec2};

/// What a save needs to put the player back where they were.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub flags: FlagSnapshot,
    pub active_room: Option<String>,
    pub actor_x: f32,
}

struct InteractableSlot {
    id: InteractableId,
    room: String,
    visibility: Option<FlagVisibility>,
    body: Box<dyn Interactable>,
}

impl InteractableSlot {
    fn is_visible(&self) -> bool {
        self.visibility
            .as_ref()
            .map_or(true, FlagVisibility::is_visible)
    }
}

fn slot_mut(slots: &mut [InteractableSlot], id: InteractableId) -> Option<&mut InteractableSlot> {
    slots.iter_mut().find(|slot| slot.id == id)
}

/// Owns every runtime service and steps them in a fixed order each tick.
pub struct AdventureSession {
    config: SessionConfig,
    services: Services,
    dispatch: InteractionDispatch,
    camera: CameraRig,
    slots: Vec<InteractableSlot>,
    trigger_doors: Vec<TriggerDoor>,
    exit_arrow: Option<ExitArrowHint>,
    next_interactable: u32,
    tick_count: u64,
}

impl AdventureSession {
    pub fn new(
        config: SessionConfig,
        graph: RoomGraph,
        scripts: ScriptLibrary,
        flags: FlagRegistry,
    ) -> Self {
        let services = Services {
            flags,
            movement: MovementController::new(config.movement, Vec2::new(0.0, config.movement.floor_y)),
            lock: InteractionLock::default(),
            dialogue: DialogueEngine::new(),
            rooms: RoomController::new(config.rooms, graph),
            scripts,
            cues: CueQueue::default(),
        };
        Self {
            dispatch: InteractionDispatch::new(config.dispatch),
            camera: CameraRig::new(config.camera),
            config,
            services,
            slots: Vec::new(),
            trigger_doors: Vec::new(),
            exit_arrow: None,
            next_interactable: 1,
            tick_count: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers `body` in `room`. Later registrations sit on top for hover.
    pub fn add_interactable(&mut self, room: &str, body: Box<dyn Interactable>) -> InteractableId {
        self.push_slot(room, body, None)
    }

    /// Like [`Self::add_interactable`], shown only while `flag` matches `active_when_true`.
    pub fn add_interactable_with_visibility(
        &mut self,
        room: &str,
        body: Box<dyn Interactable>,
        flag: FlagId,
        active_when_true: bool,
    ) -> InteractableId {
        let visibility = FlagVisibility::bind(&mut self.services.flags, flag, active_when_true);
        self.push_slot(room, body, Some(visibility))
    }

    pub fn add_trigger_door(&mut self, door: TriggerDoor) {
        self.trigger_doors.push(door);
    }

    /// Unbinds flag subscriptions held by removed interactables.
    pub fn remove_interactable(&mut self, id: InteractableId) -> bool {
        let Some(index) = self.slots.iter().position(|slot| slot.id == id) else {
            return false;
        };
        let mut slot = self.slots.remove(index);
        slot.body.abort(&mut self.services.context(id));
        if let Some(visibility) = slot.visibility.as_mut() {
            visibility.unbind(&mut self.services.flags);
        }
        true
    }

    pub fn start(&mut self, room: &str, entry_key: &str) -> Result<(), TransitionError> {
        let entered = self.services.rooms.enter_room(
            room,
            entry_key,
            &mut self.services.movement,
            &mut self.services.cues,
        )?;
        self.apply_room_entered(&entered);
        self.services.cues.finish_tick_rollover();
        Ok(())
    }

    pub fn tick(&mut self, dt: f32, input: &InputSnapshot) {
        let dt = dt.max(0.0);

        self.resolve_hover(input);
        self.apply_dialogue_input(input);
        self.route_click(input);

        if let Some(MovementEvent::Arrived { tag: Some(tag) }) =
            self.services.movement.update(dt, &mut self.services.cues)
        {
            self.route_arrival(InteractableId::from(tag));
        }

        if let Some(entered) = self.services.rooms.update(
            dt,
            &mut self.services.movement,
            &mut self.services.lock,
            &mut self.services.cues,
        ) {
            self.apply_room_entered(&entered);
        }

        self.check_trigger_doors();
        self.services.dialogue.update(dt);

        for slot in &mut self.slots {
            slot.body.update(dt, input, &mut self.services.context(slot.id));
        }

        self.route_dialogue_events();
        self.camera.update(dt, self.services.movement.x());
        self.update_exit_arrow();

        self.services.cues.finish_tick_rollover();
        self.tick_count = self.tick_count.saturating_add(1);
    }

    /// Cancels every running interaction and frees the actor.
    pub fn abort_interactions(&mut self) {
        for slot in &mut self.slots {
            slot.body.abort(&mut self.services.context(slot.id));
        }
        self.services
            .rooms
            .abort(&mut self.services.lock, &mut self.services.movement);
        self.services.dialogue.abort();
        self.route_dialogue_events();
        if let Some(holder) = self.services.lock.holder() {
            error!(?holder, "interaction_lock_held_after_abort");
        }
        info!("interactions_aborted");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            flags: self.services.flags.snapshot(),
            active_room: self.services.rooms.active_room_id().map(str::to_string),
            actor_x: self.services.movement.x(),
        }
    }

    pub fn restore(&mut self, snapshot: &SessionSnapshot) -> Result<(), TransitionError> {
        self.abort_interactions();
        self.services.flags.restore(&snapshot.flags);
        if let Some(room) = snapshot.active_room.as_deref() {
            let entered = self.services.rooms.enter_room_at(
                room,
                snapshot.actor_x,
                &mut self.services.movement,
                &mut self.services.cues,
            )?;
            self.apply_room_entered(&entered);
        }
        info!(room = ?snapshot.active_room, x = snapshot.actor_x, "session_restored");
        Ok(())
    }

    pub fn animation_state(&self) -> AnimationState {
        AnimationState {
            trigger: self.services.cues.last_animation_trigger(),
            ..self.services.movement.animation_state()
        }
    }

    pub fn is_busy(&self) -> bool {
        self.services.lock.is_held()
            || self.services.dialogue.is_active()
            || self.services.rooms.is_transitioning()
    }

    /// True when nothing is moving, talking or pending.
    pub fn is_idle(&self) -> bool {
        !self.is_busy()
            && !self.services.movement.is_moving()
            && self.services.rooms.pending().is_none()
    }

    pub fn active_room_id(&self) -> Option<&str> {
        self.services.rooms.active_room_id()
    }

    pub fn flags(&self) -> &FlagRegistry {
        &self.services.flags
    }

    pub fn flags_mut(&mut self) -> &mut FlagRegistry {
        &mut self.services.flags
    }

    pub fn movement(&self) -> &MovementController {
        &self.services.movement
    }

    pub fn lock(&self) -> &InteractionLock {
        &self.services.lock
    }

    pub fn dialogue(&self) -> &DialogueEngine {
        &self.services.dialogue
    }

    pub fn dialogue_mut(&mut self) -> &mut DialogueEngine {
        &mut self.services.dialogue
    }

    pub fn rooms(&self) -> &RoomController {
        &self.services.rooms
    }

    pub fn cues(&self) -> &CueQueue {
        &self.services.cues
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    pub fn dispatch(&self) -> &InteractionDispatch {
        &self.dispatch
    }

    pub fn exit_arrow(&self) -> Option<ExitArrowHint> {
        self.exit_arrow
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn interactable_count(&self) -> usize {
        self.slots.len()
    }

    /// Finds a visible interactable in the active room by label.
    pub fn find_interactable(&self, label: &str) -> Option<(InteractableId, Rect)> {
        let room = self.active_room_id()?;
        self.slots
            .iter()
            .rev()
            .find(|slot| slot.room == room && slot.is_visible() && slot.body.label() == label)
            .map(|slot| (slot.id, slot.body.hit_box()))
    }

    fn push_slot(
        &mut self,
        room: &str,
        body: Box<dyn Interactable>,
        visibility: Option<FlagVisibility>,
    ) -> InteractableId {
        let id = InteractableId(self.next_interactable);
        self.next_interactable = self.next_interactable.saturating_add(1);
        debug!(id = id.0, room, label = body.label(), "interactable_registered");
        self.slots.push(InteractableSlot {
            id,
            room: room.to_string(),
            visibility,
            body,
        });
        id
    }

    fn apply_room_entered(&mut self, entered: &RoomEntered) {
        let actor_x = self.services.movement.x();
        self.dispatch.set_floor_bounds(Some(entered.floor_bounds));
        self.camera.apply_framing(entered.camera, actor_x);
        for door in &mut self.trigger_doors {
            if door.room == entered.room {
                door.prime(actor_x);
            }
        }
    }

    fn resolve_hover(&mut self, input: &InputSnapshot) {
        let pointer = if input.pointer_over_ui() {
            None
        } else {
            input.pointer_world_position()
        };
        let active = self.services.rooms.active_room_id();
        let candidates = self
            .slots
            .iter()
            .filter(|slot| {
                Some(slot.room.as_str()) == active && slot.is_visible() && slot.body.is_interactable()
            })
            .map(|slot| HoverCandidate {
                id: slot.id,
                hit_box: slot.body.hit_box(),
                cursor: slot.body.cursor_hint(),
            });
        let Some(transition) = self.dispatch.resolve_hover(pointer, candidates) else {
            return;
        };

        if let Some(left) = transition.left {
            if let Some(slot) = slot_mut(&mut self.slots, left) {
                slot.body.on_hover(false);
            }
            self.services.cues.emit(Cue::HoverChanged {
                interactable: left,
                hovering: false,
            });
        }
        if let Some(entered) = transition.entered {
            if let Some(slot) = slot_mut(&mut self.slots, entered) {
                slot.body.on_hover(true);
            }
            self.services.cues.emit(Cue::HoverChanged {
                interactable: entered,
                hovering: true,
            });
        }
        if let Some(cursor) = transition.cursor_changed {
            self.services.cues.emit(Cue::CursorChanged(cursor));
        }
    }

    fn apply_dialogue_input(&mut self, input: &InputSnapshot) {
        let dialogue = &mut self.services.dialogue;
        if !dialogue.is_active() {
            return;
        }
        if let Some(choice) = input.choice_selected() {
            dialogue.select_choice(choice);
        } else if input.advance_dialogue_pressed() {
            dialogue.advance();
        }
    }

    fn route_click(&mut self, input: &InputSnapshot) {
        match self.dispatch.route_click(input, self.is_busy()) {
            ClickRoute::Interactable(id) => {
                self.services.rooms.cancel_pending();
                if let Some(slot) = slot_mut(&mut self.slots, id) {
                    debug!(id = id.0, label = slot.body.label(), "interactable_clicked");
                    slot.body.on_click(&mut self.services.context(id));
                }
            }
            ClickRoute::FreeWalk { target_x } => {
                self.services.rooms.cancel_pending();
                self.services.movement.set_target_x(target_x);
                trace!(target_x, "free_walk");
            }
            ClickRoute::NoClick => {}
            other => trace!(route = ?other, "click_not_routed"),
        }
    }

    fn route_arrival(&mut self, id: InteractableId) {
        let active = self.services.rooms.active_room_id();
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|slot| slot.id == id && Some(slot.room.as_str()) == active)
        else {
            warn!(id = id.0, "arrival_without_interactable");
            return;
        };
        slot.body.on_arrived(&mut self.services.context(id));
    }

    fn check_trigger_doors(&mut self) {
        let actor_x = self.services.movement.x();
        let Some(active) = self.services.rooms.active_room_id().map(str::to_string) else {
            return;
        };
        let mut entered = None;
        for door in &mut self.trigger_doors {
            if door.room != active || !door.overlap_began(actor_x) {
                continue;
            }
            match self.services.rooms.teleport_through(
                PLAYER_ACTOR,
                &door.target_room,
                &door.entry_key,
                &mut self.services.movement,
                &mut self.services.cues,
            ) {
                Ok(Some(room)) => {
                    entered = Some(room);
                    break;
                }
                Ok(None) => {}
                Err(error) => debug!(error = %error, "trigger_door_skipped"),
            }
        }
        if let Some(entered) = entered {
            self.apply_room_entered(&entered);
        }
    }

    fn route_dialogue_events(&mut self) {
        for event in self.services.dialogue.drain_events() {
            match event {
                DialogueEvent::LineShown { speaker_name, text } => {
                    self.services
                        .cues
                        .emit(Cue::DialogueLineShown { speaker_name, text });
                }
                DialogueEvent::TextRevealed { visible_chars } => {
                    self.services
                        .cues
                        .emit(Cue::DialogueTextRevealed { visible_chars });
                }
                DialogueEvent::ChoicesShown { labels } => {
                    self.services.cues.emit(Cue::DialogueChoicesShown { labels });
                }
                DialogueEvent::Closed => self.services.cues.emit(Cue::DialogueClosed),
                DialogueEvent::Effect(effect) => self.apply_effect(effect),
                DialogueEvent::Finished(finished) => {
                    let Some(requester) = finished.requester else {
                        continue;
                    };
                    if let Some(slot) = slot_mut(&mut self.slots, requester) {
                        slot.body
                            .on_dialogue_finished(&finished, &mut self.services.context(requester));
                    }
                }
            }
        }
    }

    fn apply_effect(&mut self, effect: DialogueEffect) {
        let flags = &mut self.services.flags;
        match effect {
            DialogueEffect::SetFlag { flag, value } => match flags.id(&flag) {
                Some(id) => {
                    flags.set_active(id, value);
                }
                None => warn!(flag = %flag, "dialogue_effect_unknown_flag"),
            },
            DialogueEffect::ToggleFlag { flag } => match flags.id(&flag) {
                Some(id) => {
                    flags.toggle(id);
                }
                None => warn!(flag = %flag, "dialogue_effect_unknown_flag"),
            },
            DialogueEffect::ResetFlag { flag } => match flags.id(&flag) {
                Some(id) => {
                    flags.reset(id);
                }
                None => warn!(flag = %flag, "dialogue_effect_unknown_flag"),
            },
            DialogueEffect::Cue(name) => self.services.cues.emit(Cue::Named(name)),
        }
    }

    fn update_exit_arrow(&mut self) {
        let actor_x = self.services.movement.x();
        let radius = self.dispatch.config().arrow_detection_radius;
        let active = self.services.rooms.active_room_id();
        let flags = &self.services.flags;

        let hint = self
            .slots
            .iter()
            .filter(|slot| Some(slot.room.as_str()) == active && slot.is_visible())
            .filter_map(|slot| {
                let locked = slot.body.exit_arrow(flags)?;
                let distance = (slot.body.position().x - actor_x).abs();
                (distance <= radius).then_some((distance, slot.id, locked))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, door, locked)| ExitArrowHint { door, locked });

        if hint != self.exit_arrow {
            self.exit_arrow = hint;
            self.services.cues.emit(Cue::ExitArrow(hint));
        }
    }
}
