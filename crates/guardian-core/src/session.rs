//! The owner's session object. It owns the slot registry for as long as the owner is online.

use contracts::{EntityHandle, OwnerId, SecurityLevel};

use crate::host::HostWorld;
use crate::registry::OwnerGuardianState;

#[derive(Debug, Clone)]
pub struct OwnerSession {
    pub owner_id: OwnerId,
    /// The owner's own entity in the world.
    pub player: EntityHandle,
    pub security: SecurityLevel,
    pub guardians: OwnerGuardianState,
}

impl OwnerSession {
    pub fn new(
        owner_id: OwnerId,
        player: EntityHandle,
        security: SecurityLevel,
        max_slots: usize,
    ) -> Self {
        Self {
            owner_id,
            player,
            security,
            guardians: OwnerGuardianState::new(owner_id, max_slots),
        }
    }

    /// One simulation tick for every summoned guardian of this owner.
    pub fn update<W: HostWorld + ?Sized>(&mut self, world: &mut W, diff_ms: u32) {
        self.guardians.update(world, diff_ms);
    }
}
