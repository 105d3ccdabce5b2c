use tracing::debug;

use crate::app::{Rect, Vec2};

use super::{InteractionContext, LockError, LockToken};

pub const DEFAULT_INTERACTION_OFFSET: f32 = 1.0;

/// Placement shared by walk-then-act objects: where the object is, how big its
/// click area is, and where the actor stands to use it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkToAnchor {
    pub position: Vec2,
    pub half_extents: Vec2,
    pub interaction_x: Option<f32>,
    pub default_offset: f32,
}

impl WalkToAnchor {
    pub fn new(position: Vec2, half_extents: Vec2) -> Self {
        Self {
            position,
            half_extents,
            interaction_x: None,
            default_offset: DEFAULT_INTERACTION_OFFSET,
        }
    }

    pub fn with_interaction_x(mut self, x: Option<f32>) -> Self {
        self.interaction_x = x;
        self
    }

    pub fn hit_box(&self) -> Rect {
        Rect::from_center(self.position, self.half_extents)
    }

    /// The explicit anchor if set, else one offset away from the object on the actor's side.
    pub fn interaction_x_for(&self, actor_x: f32) -> f32 {
        if let Some(x) = self.interaction_x {
            return x;
        }
        if actor_x < self.position.x {
            self.position.x - self.default_offset
        } else {
            self.position.x + self.default_offset
        }
    }

    pub fn begin_walk(&self, ctx: &mut InteractionContext<'_>) -> bool {
        let x = self.interaction_x_for(ctx.movement.x());
        let accepted = ctx.walk_to(x);
        debug!(interactable = ctx.current().0, x, accepted, "walk_to_interactable");
        accepted
    }

    /// Faces the object and takes the lock.
    pub fn arrive(&self, ctx: &mut InteractionContext<'_>) -> Result<LockToken, LockError> {
        ctx.movement.face_toward_x(self.position.x);
        ctx.begin_interaction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_point_sits_on_the_actor_side() {
        let anchor = WalkToAnchor::new(Vec2::new(4.0, 0.0), Vec2::new(0.5, 1.0));
        assert_eq!(anchor.interaction_x_for(0.0), 3.0);
        assert_eq!(anchor.interaction_x_for(9.0), 5.0);
    }

    #[test]
    fn explicit_point_wins() {
        let anchor =
            WalkToAnchor::new(Vec2::new(4.0, 0.0), Vec2::new(0.5, 1.0)).with_interaction_x(Some(2.5));
        assert_eq!(anchor.interaction_x_for(9.0), 2.5);
    }
}
