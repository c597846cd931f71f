//! Owner movement between contexts and session boundaries.

use std::f32::consts::FRAC_PI_2;

use contracts::{EntityHandle, OwnerId, Position, SecurityLevel, SyncMessage};
use serde::Serialize;
use tracing::{info, warn};

use super::{snapshot_live, GuardianManager};
use crate::host::HostWorld;
use crate::session::OwnerSession;
use crate::store::GuardianStore;
use crate::sync::SyncSink;

/// Distance from the destination at which guardians land after a same-context teleport.
pub const RELOCATION_SPREAD: f32 = 3.0;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelocationReport {
    /// Slots repositioned next to the destination.
    pub moved: Vec<u8>,
    /// Slots snapshotted and despawned ahead of a cross-context transfer.
    pub stored: Vec<u8>,
}

impl<S: GuardianStore, E: SyncSink> GuardianManager<S, E> {
    /// Call before the owner is moved to `destination`.
    pub fn relocate<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        destination: Position,
    ) -> RelocationReport {
        let owner_id = session.owner_id;
        let same_context = world
            .unit(session.player)
            .is_some_and(|owner| owner.position.context_id == destination.context_id);
        let mut report = RelocationReport::default();

        for index in 0..session.guardians.max_slots() as u8 {
            let Some(entry) = session.guardians.slot_mut(index) else {
                continue;
            };
            let Some(handle) = entry.active_handle() else {
                continue;
            };

            if same_context {
                if world.unit(handle).is_some() {
                    let spot = destination.offset(RELOCATION_SPREAD, f32::from(index) * FRAC_PI_2);
                    world.near_teleport(handle, spot);
                    report.moved.push(index);
                } else {
                    warn!(owner = %owner_id, slot = index, handle = %handle, "stale guardian handle cleared");
                    entry.unbind();
                }
                continue;
            }

            if snapshot_live(&*world, entry) {
                world.despawn(handle);
            }
            entry.unbind();
            self.persist(entry.record_mut());
            self.sink.send(owner_id, SyncMessage::Dismiss { slot: index });
            report.stored.push(index);
        }

        if !report.stored.is_empty() {
            info!(owner = %owner_id, slots = ?report.stored, "guardians stored for transfer");
        }
        report
    }

    /// Call once the owner has arrived in a new context. Re-summons every occupied,
    /// inactive slot the owner did not dismiss. Returns the re-summoned slots.
    pub fn arrive<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
    ) -> Vec<u8> {
        let Some(owner) = world.unit(session.player).filter(|unit| unit.in_world) else {
            warn!(owner = %session.owner_id, "owner not in world on arrival");
            return Vec::new();
        };
        let owner_id = session.owner_id;
        let mut resummoned = Vec::new();

        for index in 0..session.guardians.max_slots() as u8 {
            let Some(entry) = session.guardians.slot_mut(index) else {
                continue;
            };
            if !entry.is_occupied() || entry.is_active() || entry.record().dismissed {
                continue;
            }
            match self.instantiate(world, &owner, entry, true) {
                Ok(_) => {
                    self.persist(entry.record_mut());
                    self.emit_full_state(owner_id, entry);
                    resummoned.push(index);
                }
                Err(err) => {
                    warn!(owner = %owner_id, slot = index, error = %err, "guardian could not follow owner");
                }
            }
        }
        resummoned
    }

    /// Persist every summoned guardian and remove it from the world. Consumes the session.
    pub fn logout<W: HostWorld + ?Sized>(&mut self, mut session: OwnerSession, world: &mut W) -> usize {
        let owner_id = session.owner_id;
        let mut saved = 0;
        for index in 0..session.guardians.max_slots() as u8 {
            let Some(entry) = session.guardians.slot_mut(index) else {
                continue;
            };
            let Some(handle) = entry.active_handle() else {
                continue;
            };
            if snapshot_live(&*world, entry) {
                world.despawn(handle);
            }
            entry.unbind();
            self.persist(entry.record_mut());
            saved += 1;
        }
        info!(owner = %owner_id, saved, "owner logged out");
        saved
    }

    /// Build the owner's session from storage, auto-summoning every slot not dismissed,
    /// then announce and emit the full state of every occupied slot once.
    pub fn login<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        owner_id: OwnerId,
        player: EntityHandle,
        security: SecurityLevel,
    ) -> OwnerSession {
        let mut session =
            OwnerSession::new(owner_id, player, security, self.config.effective_max_slots());
        if !self.config.enabled {
            return session;
        }

        let records = match self.store.load_slots(owner_id) {
            Ok(records) => records,
            Err(err) => {
                self.record_store_failure(owner_id, 0, &err);
                Vec::new()
            }
        };
        for record in records.into_iter().filter(|r| r.is_occupied()) {
            let slot = record.slot;
            let Some(entry) = session.guardians.slot_mut(slot) else {
                warn!(owner = %owner_id, slot, "stored guardian beyond configured slot count ignored");
                continue;
            };
            let name = world
                .template(record.template_id)
                .map(|template| template.name)
                .unwrap_or_else(|| "Guardian".to_string());
            entry.occupy(record, name);
        }

        let owner = world.unit(player).filter(|unit| unit.in_world);
        for index in 0..session.guardians.max_slots() as u8 {
            let Some(entry) = session.guardians.slot_mut(index) else {
                continue;
            };
            if !entry.is_occupied() || entry.record().dismissed {
                continue;
            }
            let Some(owner) = owner.as_ref() else {
                break;
            };
            match self.instantiate(world, owner, entry, true) {
                Ok(_) => self.persist(entry.record_mut()),
                Err(err) => {
                    warn!(owner = %owner_id, slot = index, error = %err, "guardian could not be restored");
                }
            }
        }

        self.announce(world, &session);
        for entry in session.guardians.slots() {
            self.emit_full_state(owner_id, entry);
        }
        info!(
            owner = %owner_id,
            occupied = session.guardians.occupied_count(),
            active = session.guardians.active_count(),
            "owner logged in"
        );
        session
    }

    fn announce<W: HostWorld + ?Sized>(&self, world: &mut W, session: &OwnerSession) {
        let stored = session
            .guardians
            .slots()
            .iter()
            .filter(|entry| entry.is_occupied() && !entry.is_active())
            .map(|entry| entry.name().to_string())
            .collect::<Vec<_>>();
        for name in &stored {
            world.notify(
                session.player,
                &format!("Your guardian {name} is stored in the Tesseract. Use it to summon!"),
            );
        }
        if session.guardians.occupied_count() == 0 && self.config.announce {
            world.notify(
                session.player,
                "Target a creature and use your Tesseract to capture it!",
            );
        }
    }
}
