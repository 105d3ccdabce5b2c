use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::app::{Cue, CueQueue, FloorBounds};
use crate::interaction::{InteractionLock, LockOwner, LockToken};
use crate::movement::{Facing, MovementController};

use super::doors::{ActorId, TeleportGate};
use super::graph::{CameraFraming, ExitSide, RoomDefinition, RoomGraph};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    pub door_reach_distance: f32,
    pub spawn_inward_offset: f32,
    pub teleport_cooldown_seconds: f32,
    /// `None` or zero switches rooms without the cover effect.
    pub transition_effect_seconds: Option<f32>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            door_reach_distance: 0.5,
            spawn_inward_offset: 0.8,
            teleport_cooldown_seconds: 0.25,
            transition_effect_seconds: Some(0.6),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransition {
    pub target_room: String,
    pub entry_key: String,
    pub trigger_x: f32,
    pub leaving_room: Option<String>,
    pub exit_side: ExitSide,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("room `{room}` is not in the room graph")]
    UnknownRoom { room: String },
    #[error("room `{room}` has no entry point `{entry}`")]
    MissingEntryPoint { room: String, entry: String },
    #[error("a room transition is already playing")]
    TransitionInProgress,
}

/// Emitted once per room switch so the session can re-point camera and floor.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomEntered {
    pub room: String,
    pub floor_bounds: FloorBounds,
    pub camera: CameraFraming,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Effect {
        transition: PendingTransition,
        remaining: f32,
        token: LockToken,
    },
}

enum Spawn<'a> {
    Entry(&'a str),
    At(f32),
    Through(&'a PendingTransition),
}

/// Owns the active room and drives door transitions.
#[derive(Debug)]
pub struct RoomController {
    config: RoomConfig,
    graph: RoomGraph,
    active: Option<String>,
    pending: Option<PendingTransition>,
    phase: Phase,
    gate: TeleportGate,
    clock: f64,
    transitions: u64,
}

impl RoomController {
    pub fn new(config: RoomConfig, graph: RoomGraph) -> Self {
        Self {
            gate: TeleportGate::new(config.teleport_cooldown_seconds),
            config,
            graph,
            active: None,
            pending: None,
            phase: Phase::Idle,
            clock: 0.0,
            transitions: 0,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn graph(&self) -> &RoomGraph {
        &self.graph
    }

    pub fn active_room_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_room(&self) -> Option<&RoomDefinition> {
        self.graph.room(self.active.as_deref()?)
    }

    pub fn pending(&self) -> Option<&PendingTransition> {
        self.pending.as_ref()
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self.phase, Phase::Effect { .. })
    }

    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Stores the pending move and walks the actor to the door. A newer
    /// request replaces an older one.
    pub fn prepare_transition(
        &mut self,
        target_room: &str,
        entry_key: &str,
        door_x: f32,
        movement: &mut MovementController,
    ) -> Result<(), TransitionError> {
        if !self.graph.contains(target_room) {
            error!(room = target_room, "transition_unknown_room");
            return Err(TransitionError::UnknownRoom {
                room: target_room.to_string(),
            });
        }
        if self.is_transitioning() {
            warn!(room = target_room, "transition_request_during_effect");
            return Err(TransitionError::TransitionInProgress);
        }

        let exit_side = self
            .active_room()
            .map_or(ExitSide::Right, |room| room.exit_side(door_x));
        if let Some(previous) = &self.pending {
            debug!(
                previous = %previous.target_room,
                next = target_room,
                "pending_transition_replaced"
            );
        }
        self.pending = Some(PendingTransition {
            target_room: target_room.to_string(),
            entry_key: entry_key.to_string(),
            trigger_x: door_x,
            leaving_room: self.active.clone(),
            exit_side,
        });
        movement.set_target_x(door_x);
        debug!(room = target_room, entry = entry_key, door_x, "transition_prepared");
        Ok(())
    }

    pub fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(room = %pending.target_room, "pending_transition_cancelled");
        }
    }

    pub fn update(
        &mut self,
        dt: f32,
        movement: &mut MovementController,
        lock: &mut InteractionLock,
        cues: &mut CueQueue,
    ) -> Option<RoomEntered> {
        let dt = dt.max(0.0);
        self.clock += f64::from(dt);

        if let Phase::Effect { remaining, .. } = &mut self.phase {
            *remaining -= dt;
            if *remaining > 0.0 {
                return None;
            }
            let Phase::Effect {
                transition, token, ..
            } = std::mem::replace(&mut self.phase, Phase::Idle)
            else {
                return None;
            };
            let entered = self.switch(&transition, movement, cues);
            if let Err(error) = lock.release(token, movement) {
                error!(error = %error, "transition_lock_release_failed");
            }
            cues.emit(Cue::TransitionEffectFinished);
            return entered;
        }

        let reached = self
            .pending
            .as_ref()
            .is_some_and(|pending| {
                (movement.x() - pending.trigger_x).abs() <= self.config.door_reach_distance
            });
        if !reached {
            return None;
        }
        let transition = self.pending.take()?;

        let effect_seconds = self
            .config
            .transition_effect_seconds
            .filter(|seconds| *seconds > 0.0);
        if let Some(seconds) = effect_seconds {
            match lock.acquire(LockOwner::RoomTransition, movement) {
                Ok(token) => {
                    cues.emit(Cue::TransitionEffectStarted {
                        right_to_left: transition.exit_side == ExitSide::Left,
                    });
                    debug!(room = %transition.target_room, seconds, "transition_effect_started");
                    self.phase = Phase::Effect {
                        transition,
                        remaining: seconds,
                        token,
                    };
                    return None;
                }
                Err(error) => {
                    warn!(error = %error, "transition_effect_skipped");
                }
            }
        }
        self.switch(&transition, movement, cues)
    }

    /// Initial or scripted placement at a named entry point.
    pub fn enter_room(
        &mut self,
        room: &str,
        entry_key: &str,
        movement: &mut MovementController,
        cues: &mut CueQueue,
    ) -> Result<RoomEntered, TransitionError> {
        self.pending = None;
        self.activate(room, Spawn::Entry(entry_key), movement, cues)
    }

    /// Places the actor at `x`, e.g. when restoring a snapshot.
    pub fn enter_room_at(
        &mut self,
        room: &str,
        x: f32,
        movement: &mut MovementController,
        cues: &mut CueQueue,
    ) -> Result<RoomEntered, TransitionError> {
        self.pending = None;
        self.activate(room, Spawn::At(x), movement, cues)
    }

    /// Instant move for trigger volumes. `Ok(None)` means the actor's
    /// cooldown has not run out yet.
    pub fn teleport_through(
        &mut self,
        actor: ActorId,
        target_room: &str,
        entry_key: &str,
        movement: &mut MovementController,
        cues: &mut CueQueue,
    ) -> Result<Option<RoomEntered>, TransitionError> {
        let Some(room) = self.graph.room(target_room) else {
            error!(room = target_room, "teleport_unknown_room");
            return Err(TransitionError::UnknownRoom {
                room: target_room.to_string(),
            });
        };
        if room.entry_point(entry_key).is_none() {
            warn!(room = target_room, entry = entry_key, "teleport_missing_entry_point");
            return Err(TransitionError::MissingEntryPoint {
                room: target_room.to_string(),
                entry: entry_key.to_string(),
            });
        }
        if self.is_transitioning() {
            return Err(TransitionError::TransitionInProgress);
        }
        if !self.gate.try_pass(actor, self.clock) {
            debug!(actor = actor.0, room = target_room, "teleport_cooldown_active");
            return Ok(None);
        }
        self.pending = None;
        self.activate(target_room, Spawn::Entry(entry_key), movement, cues)
            .map(Some)
    }

    /// Drops the pending move and ends a running effect without switching.
    pub fn abort(&mut self, lock: &mut InteractionLock, movement: &mut MovementController) {
        self.pending = None;
        if let Phase::Effect { token, .. } = std::mem::replace(&mut self.phase, Phase::Idle) {
            if let Err(error) = lock.release(token, movement) {
                error!(error = %error, "transition_lock_release_failed");
            }
            info!("transition_aborted");
        }
    }

    fn switch(
        &mut self,
        transition: &PendingTransition,
        movement: &mut MovementController,
        cues: &mut CueQueue,
    ) -> Option<RoomEntered> {
        match self.activate(&transition.target_room, Spawn::Through(transition), movement, cues) {
            Ok(entered) => Some(entered),
            Err(error) => {
                error!(error = %error, "room_switch_failed");
                None
            }
        }
    }

    fn activate(
        &mut self,
        room_id: &str,
        spawn: Spawn<'_>,
        movement: &mut MovementController,
        cues: &mut CueQueue,
    ) -> Result<RoomEntered, TransitionError> {
        let Some(room) = self.graph.room(room_id) else {
            error!(room = room_id, "enter_unknown_room");
            return Err(TransitionError::UnknownRoom {
                room: room_id.to_string(),
            });
        };

        let (x, facing) = self.resolve_spawn(room, &spawn, movement.x());
        let entered = RoomEntered {
            room: room.id.clone(),
            floor_bounds: room.floor_bounds,
            camera: room.camera,
        };
        let visual_root = room.visual_root.clone();

        if let Some(previous) = self.active.take() {
            cues.emit(Cue::RoomDeactivated { room: previous });
        }
        cues.emit(Cue::RoomActivated {
            room: entered.room.clone(),
            visual_root,
        });
        self.active = Some(entered.room.clone());
        self.transitions = self.transitions.saturating_add(1);

        movement.teleport(x);
        if let Some(facing) = facing {
            movement.face(facing);
        }
        info!(room = %entered.room, x, "room_entered");
        Ok(entered)
    }

    fn resolve_spawn(
        &self,
        room: &RoomDefinition,
        spawn: &Spawn<'_>,
        current_x: f32,
    ) -> (f32, Option<Facing>) {
        let fallback = |requested: &str| {
            warn!(room = %room.id, entry = requested, "entry_point_missing");
            room.floor_bounds.clamp_x(current_x, 0.0)
        };

        match spawn {
            Spawn::At(x) => (*x, None),
            Spawn::Entry(key) => (
                room.entry_point(key)
                    .map_or_else(|| fallback(*key), |point| point.x),
                None,
            ),
            Spawn::Through(transition) => {
                let facing = match transition.exit_side {
                    ExitSide::Left => Facing::Left,
                    ExitSide::Right => Facing::Right,
                };
                (self.transition_spawn_x(room, transition, fallback), Some(facing))
            }
        }
    }

    fn transition_spawn_x(
        &self,
        room: &RoomDefinition,
        transition: &PendingTransition,
        fallback: impl Fn(&str) -> f32,
    ) -> f32 {
        if let Some(leaving) = transition.leaving_room.as_deref() {
            if let Some(point) = self
                .graph
                .override_for(leaving, &room.id)
                .and_then(|key| room.entry_point(key))
            {
                return point.x;
            }
            if let Some(exit) = self.graph.return_exit(&room.id, leaving) {
                return exit.x + transition.exit_side.inward_sign() * self.config.spawn_inward_offset;
            }
        }
        let opposite = transition.exit_side.opposite_entry_key();
        room.entry_point(opposite)
            .map_or_else(|| fallback(opposite), |point| point.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Vec2;
    use crate::movement::MovementConfig;
    use crate::rooms::{RoomExit, SpawnOverride, PLAYER_ACTOR};

    fn graph() -> RoomGraph {
        let mut graph = RoomGraph::new();
        graph.insert(
            RoomDefinition::new("lobby", FloorBounds::new(-10.0, 10.0))
                .with_entry("start", Vec2::new(0.0, 0.0))
                .with_exit(RoomExit {
                    target_room: "office".to_string(),
                    entry_key: "left".to_string(),
                    x: 9.0,
                }),
        );
        graph.insert(
            RoomDefinition::new("office", FloorBounds::new(-6.0, 6.0))
                .with_entry("left", Vec2::new(-5.0, 0.0))
                .with_entry("right", Vec2::new(5.0, 0.0))
                .with_exit(RoomExit {
                    target_room: "lobby".to_string(),
                    entry_key: "right".to_string(),
                    x: -5.5,
                }),
        );
        graph.insert(
            RoomDefinition::new("closet", FloorBounds::new(-2.0, 2.0))
                .with_entry("right", Vec2::new(1.5, 0.0)),
        );
        graph
    }

    struct Rig {
        rooms: RoomController,
        movement: MovementController,
        lock: InteractionLock,
        cues: CueQueue,
    }

    fn rig(config: RoomConfig) -> Rig {
        let mut rig = Rig {
            rooms: RoomController::new(config, graph()),
            movement: MovementController::new(MovementConfig::default(), Vec2::default()),
            lock: InteractionLock::default(),
            cues: CueQueue::default(),
        };
        rig.rooms
            .enter_room("lobby", "start", &mut rig.movement, &mut rig.cues)
            .expect("enter lobby");
        rig
    }

    fn run_until_entered(rig: &mut Rig, ticks: usize) -> Option<RoomEntered> {
        for _ in 0..ticks {
            rig.movement.update(1.0 / 60.0, &mut rig.cues);
            if let Some(entered) =
                rig.rooms
                    .update(1.0 / 60.0, &mut rig.movement, &mut rig.lock, &mut rig.cues)
            {
                return Some(entered);
            }
        }
        None
    }

    fn no_effect() -> RoomConfig {
        RoomConfig {
            transition_effect_seconds: None,
            ..RoomConfig::default()
        }
    }

    #[test]
    fn reaching_the_door_switches_and_spawns_inward_of_return_exit() {
        let mut rig = rig(no_effect());
        rig.rooms
            .prepare_transition("office", "left", 9.0, &mut rig.movement)
            .expect("prepare");
        assert_eq!(rig.rooms.pending().map(|p| p.exit_side), Some(ExitSide::Right));

        let entered = run_until_entered(&mut rig, 600).expect("entered office");
        assert_eq!(entered.room, "office");
        assert_eq!(rig.rooms.active_room_id(), Some("office"));
        assert!((rig.movement.x() - (-5.5 + 0.8)).abs() < 1e-5);
        assert_eq!(rig.movement.facing(), Facing::Right);
        assert!(rig.rooms.pending().is_none());
    }

    #[test]
    fn override_table_wins_over_return_exit() {
        let mut rig = rig(no_effect());
        let mut graph = graph();
        graph.add_override(SpawnOverride {
            from_room: Some("lobby".to_string()),
            to_room: "office".to_string(),
            entry_key: "right".to_string(),
        });
        rig.rooms = RoomController::new(no_effect(), graph);
        rig.rooms
            .enter_room("lobby", "start", &mut rig.movement, &mut rig.cues)
            .expect("enter");
        rig.rooms
            .prepare_transition("office", "left", 9.0, &mut rig.movement)
            .expect("prepare");
        run_until_entered(&mut rig, 600).expect("entered");
        assert_eq!(rig.movement.x(), 5.0);
    }

    #[test]
    fn left_exit_without_return_uses_opposite_entry_and_faces_left() {
        let mut rig = rig(no_effect());
        rig.rooms
            .prepare_transition("closet", "missing", -1.0, &mut rig.movement)
            .expect("prepare");
        run_until_entered(&mut rig, 600).expect("entered closet");
        assert_eq!(rig.movement.x(), 1.5);
        assert_eq!(rig.movement.facing(), Facing::Left);
    }

    #[test]
    fn door_transition_ignores_requested_entry_for_opposite_side() {
        let mut rig = rig(no_effect());
        let mut graph = graph();
        graph.insert(
            RoomDefinition::new("office", FloorBounds::new(-6.0, 6.0))
                .with_entry("left", Vec2::new(-5.0, 0.0))
                .with_entry("right", Vec2::new(5.0, 0.0)),
        );
        rig.rooms = RoomController::new(no_effect(), graph);
        rig.rooms
            .enter_room("lobby", "start", &mut rig.movement, &mut rig.cues)
            .expect("enter");
        rig.rooms
            .prepare_transition("office", "left", -1.0, &mut rig.movement)
            .expect("prepare");
        run_until_entered(&mut rig, 600).expect("entered office");
        assert_eq!(rig.movement.x(), 5.0);
        assert_eq!(rig.movement.facing(), Facing::Left);
    }

    #[test]
    fn unknown_target_is_rejected_and_nothing_is_pending() {
        let mut rig = rig(no_effect());
        let err = rig
            .rooms
            .prepare_transition("attic", "left", 1.0, &mut rig.movement)
            .expect_err("unknown");
        assert_eq!(
            err,
            TransitionError::UnknownRoom {
                room: "attic".to_string()
            }
        );
        assert!(rig.rooms.pending().is_none());
    }

    #[test]
    fn last_pending_transition_wins() {
        let mut rig = rig(no_effect());
        rig.rooms
            .prepare_transition("office", "left", 9.0, &mut rig.movement)
            .expect("first");
        rig.rooms
            .prepare_transition("closet", "right", -1.0, &mut rig.movement)
            .expect("second");
        let entered = run_until_entered(&mut rig, 600).expect("entered");
        assert_eq!(entered.room, "closet");
    }

    #[test]
    fn effect_holds_the_lock_then_switches_and_releases() {
        let mut rig = rig(RoomConfig::default());
        rig.rooms
            .prepare_transition("office", "left", 0.3, &mut rig.movement)
            .expect("prepare");

        assert!(rig
            .rooms
            .update(0.0, &mut rig.movement, &mut rig.lock, &mut rig.cues)
            .is_none());
        assert!(rig.rooms.is_transitioning());
        assert_eq!(rig.lock.holder(), Some(LockOwner::RoomTransition));
        assert!(!rig.movement.is_enabled());
        assert!(rig
            .cues
            .iter_emitted_so_far()
            .any(|cue| *cue == Cue::TransitionEffectStarted { right_to_left: false }));

        assert!(rig
            .rooms
            .update(0.3, &mut rig.movement, &mut rig.lock, &mut rig.cues)
            .is_none());
        let entered = rig
            .rooms
            .update(0.31, &mut rig.movement, &mut rig.lock, &mut rig.cues)
            .expect("switched");
        assert_eq!(entered.room, "office");
        assert!(!rig.lock.is_held());
        assert!(rig.movement.is_enabled());
    }

    #[test]
    fn abort_during_effect_releases_lock() {
        let mut rig = rig(RoomConfig::default());
        rig.rooms
            .prepare_transition("office", "left", 0.0, &mut rig.movement)
            .expect("prepare");
        rig.rooms
            .update(0.0, &mut rig.movement, &mut rig.lock, &mut rig.cues);
        assert!(rig.lock.is_held());

        rig.rooms.abort(&mut rig.lock, &mut rig.movement);
        assert!(!rig.lock.is_held());
        assert_eq!(rig.rooms.active_room_id(), Some("lobby"));
    }

    #[test]
    fn teleport_respects_cooldown_per_actor() {
        let mut rig = rig(no_effect());
        let first = rig
            .rooms
            .teleport_through(PLAYER_ACTOR, "office", "left", &mut rig.movement, &mut rig.cues)
            .expect("teleport");
        assert!(first.is_some());

        let blocked = rig
            .rooms
            .teleport_through(PLAYER_ACTOR, "lobby", "start", &mut rig.movement, &mut rig.cues)
            .expect("gate");
        assert!(blocked.is_none());
        assert_eq!(rig.rooms.active_room_id(), Some("office"));

        rig.rooms
            .update(0.3, &mut rig.movement, &mut rig.lock, &mut rig.cues);
        let later = rig
            .rooms
            .teleport_through(PLAYER_ACTOR, "lobby", "start", &mut rig.movement, &mut rig.cues)
            .expect("teleport again");
        assert!(later.is_some());
    }

    #[test]
    fn teleport_to_missing_entry_is_skipped() {
        let mut rig = rig(no_effect());
        let err = rig
            .rooms
            .teleport_through(PLAYER_ACTOR, "closet", "left", &mut rig.movement, &mut rig.cues)
            .expect_err("missing entry");
        assert!(matches!(err, TransitionError::MissingEntryPoint { .. }));
        assert_eq!(rig.rooms.active_room_id(), Some("lobby"));
    }

    #[test]
    fn room_switch_emits_deactivate_then_activate() {
        let mut rig = rig(no_effect());
        rig.cues.finish_tick_rollover();
        rig.rooms
            .enter_room("office", "left", &mut rig.movement, &mut rig.cues)
            .expect("enter");
        let cues: Vec<_> = rig.cues.iter_emitted_so_far().cloned().collect();
        assert_eq!(
            cues,
            vec![
                Cue::RoomDeactivated {
                    room: "lobby".to_string()
                },
                Cue::RoomActivated {
                    room: "office".to_string(),
                    visual_root: "office".to_string()
                },
            ]
        );
    }
}
