use tracing::{error, warn};

use crate::app::CueQueue;
use crate::dialogue::{DialogueEngine, DialogueFinished, DialogueTicket, ScriptLibrary};
use crate::flags::FlagRegistry;
use crate::movement::MovementController;
use crate::rooms::RoomController;

use super::{InteractableId, InteractionLock, LockError, LockOwner, LockToken};

/// Shared services handed to every interactable call.
pub struct Services {
    pub flags: FlagRegistry,
    pub movement: MovementController,
    pub lock: InteractionLock,
    pub dialogue: DialogueEngine,
    pub rooms: RoomController,
    pub scripts: ScriptLibrary,
    pub cues: CueQueue,
}

impl Services {
    pub fn context(&mut self, current: InteractableId) -> InteractionContext<'_> {
        InteractionContext {
            current,
            flags: &mut self.flags,
            movement: &mut self.movement,
            lock: &mut self.lock,
            dialogue: &mut self.dialogue,
            rooms: &mut self.rooms,
            scripts: &self.scripts,
            cues: &mut self.cues,
        }
    }
}

pub struct InteractionContext<'a> {
    current: InteractableId,
    pub flags: &'a mut FlagRegistry,
    pub movement: &'a mut MovementController,
    pub lock: &'a mut InteractionLock,
    pub dialogue: &'a mut DialogueEngine,
    pub rooms: &'a mut RoomController,
    pub scripts: &'a ScriptLibrary,
    pub cues: &'a mut CueQueue,
}

/// A held lock waiting on one dialogue's finished event.
#[derive(Debug)]
pub struct PendingRelease {
    token: LockToken,
    ticket: DialogueTicket,
}

impl PendingRelease {
    pub fn ticket(&self) -> DialogueTicket {
        self.ticket
    }
}

impl InteractionContext<'_> {
    pub fn current(&self) -> InteractableId {
        self.current
    }

    pub fn begin_interaction(&mut self) -> Result<LockToken, LockError> {
        self.lock
            .acquire(LockOwner::Interactable(self.current), self.movement)
    }

    pub fn end_interaction(&mut self, token: LockToken) {
        if let Err(error) = self.lock.release(token, self.movement) {
            error!(interactable = self.current.0, error = %error, "end_interaction_failed");
        }
    }

    /// Walks to `x` and reports arrival back to the current interactable.
    pub fn walk_to(&mut self, x: f32) -> bool {
        self.movement.walk_to(x, self.current.into())
    }

    /// Starts a library script on behalf of the current interactable.
    /// A missing script is logged and nothing starts.
    pub fn start_dialogue(&mut self, script_id: &str) -> Option<DialogueTicket> {
        let Some(script) = self.scripts.get(script_id) else {
            warn!(interactable = self.current.0, script = script_id, "dialogue_script_missing");
            return None;
        };
        Some(self.dialogue.start(Some(script), Some(self.current)))
    }

    /// Plays `script_id` and keeps the lock until it finishes. Without a
    /// playable script the lock is released immediately.
    pub fn release_after_dialogue(
        &mut self,
        token: LockToken,
        script_id: Option<&str>,
    ) -> Option<PendingRelease> {
        match script_id.and_then(|id| self.start_dialogue(id)) {
            Some(ticket) => Some(PendingRelease { token, ticket }),
            None => {
                self.end_interaction(token);
                None
            }
        }
    }

    /// Releases `pending` if `finished` belongs to its dialogue.
    pub fn settle(
        &mut self,
        pending: &mut Option<PendingRelease>,
        finished: &DialogueFinished,
    ) -> bool {
        match pending.take() {
            Some(held) if held.ticket == finished.ticket => {
                self.end_interaction(held.token);
                true
            }
            other => {
                *pending = other;
                false
            }
        }
    }

    /// Releases without waiting, e.g. when the interaction is aborted.
    pub fn release_pending(&mut self, pending: &mut Option<PendingRelease>) {
        if let Some(held) = pending.take() {
            self.end_interaction(held.token);
        }
    }
}
