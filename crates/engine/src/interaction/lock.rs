use thiserror::Error;
use tracing::{debug, error};

use crate::movement::MovementController;

use super::InteractableId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOwner {
    Interactable(InteractableId),
    RoomTransition,
}

/// Proof of holding the interaction lock. Not `Clone`: releasing consumes it.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a held interaction lock freezes the actor until the token is released"]
pub struct LockToken {
    owner: LockOwner,
    serial: u64,
}

impl LockToken {
    pub fn owner(&self) -> LockOwner {
        self.owner
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("interaction lock requested by {requested:?} while held by {holder:?}")]
    AlreadyHeld {
        holder: LockOwner,
        requested: LockOwner,
    },
    #[error("lock token from {owner:?} (serial {serial}) does not match the current holder")]
    StaleToken { owner: LockOwner, serial: u64 },
}

/// The single "who controls the actor" token.
///
/// Holding the lock keeps movement disabled. Releasing it re-enables movement.
#[derive(Debug, Default)]
pub struct InteractionLock {
    holder: Option<(LockOwner, u64)>,
    next_serial: u64,
    acquisitions: u64,
    releases: u64,
}

impl InteractionLock {
    pub fn acquire(
        &mut self,
        owner: LockOwner,
        movement: &mut MovementController,
    ) -> Result<LockToken, LockError> {
        if let Some((holder, _)) = self.holder {
            error!(?holder, requested = ?owner, "interaction_lock_already_held");
            return Err(LockError::AlreadyHeld {
                holder,
                requested: owner,
            });
        }
        let serial = self.next_serial;
        self.next_serial = self.next_serial.saturating_add(1);
        self.holder = Some((owner, serial));
        self.acquisitions = self.acquisitions.saturating_add(1);
        movement.disable_movement();
        debug!(?owner, serial, "interaction_lock_acquired");
        Ok(LockToken { owner, serial })
    }

    pub fn release(
        &mut self,
        token: LockToken,
        movement: &mut MovementController,
    ) -> Result<(), LockError> {
        match self.holder {
            Some((owner, serial)) if owner == token.owner && serial == token.serial => {
                self.holder = None;
                self.releases = self.releases.saturating_add(1);
                movement.enable_movement();
                debug!(?owner, serial, "interaction_lock_released");
                Ok(())
            }
            _ => {
                error!(owner = ?token.owner, serial = token.serial, "interaction_lock_stale_token");
                Err(LockError::StaleToken {
                    owner: token.owner,
                    serial: token.serial,
                })
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.holder.is_some()
    }

    pub fn holder(&self) -> Option<LockOwner> {
        self.holder.map(|(owner, _)| owner)
    }

    pub fn held_count(&self) -> u32 {
        u32::from(self.holder.is_some())
    }

    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    pub fn releases(&self) -> u64 {
        self.releases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Vec2;
    use crate::movement::MovementConfig;

    fn movement() -> MovementController {
        MovementController::new(MovementConfig::default(), Vec2::default())
    }

    #[test]
    fn acquire_disables_movement_and_release_restores_it() {
        let mut lock = InteractionLock::default();
        let mut movement = movement();
        movement.set_target_x(3.0);

        let token = lock
            .acquire(LockOwner::Interactable(InteractableId(1)), &mut movement)
            .expect("acquire");
        assert!(lock.is_held());
        assert!(!movement.is_enabled());
        assert!(!movement.is_moving());

        lock.release(token, &mut movement).expect("release");
        assert!(!lock.is_held());
        assert!(movement.is_enabled());
        assert_eq!(lock.acquisitions(), lock.releases());
    }

    #[test]
    fn second_acquire_fails_loudly_and_keeps_first_holder() {
        let mut lock = InteractionLock::default();
        let mut movement = movement();
        let first = lock
            .acquire(LockOwner::Interactable(InteractableId(1)), &mut movement)
            .expect("acquire");

        let err = lock
            .acquire(LockOwner::RoomTransition, &mut movement)
            .expect_err("already held");

        assert_eq!(
            err,
            LockError::AlreadyHeld {
                holder: LockOwner::Interactable(InteractableId(1)),
                requested: LockOwner::RoomTransition,
            }
        );
        assert_eq!(lock.held_count(), 1);
        lock.release(first, &mut movement).expect("release");
        assert_eq!(lock.held_count(), 0);
    }

    #[test]
    fn token_from_another_lock_is_rejected() {
        let mut lock_a = InteractionLock::default();
        let mut lock_b = InteractionLock::default();
        let mut movement = movement();
        let _held_a = lock_a
            .acquire(LockOwner::RoomTransition, &mut movement)
            .expect("a");
        lock_b.next_serial = 5;
        let foreign = lock_b
            .acquire(LockOwner::RoomTransition, &mut movement)
            .expect("b");

        let err = lock_a.release(foreign, &mut movement).expect_err("stale");
        assert!(matches!(err, LockError::StaleToken { serial: 5, .. }));
        assert!(lock_a.is_held());
    }
}
