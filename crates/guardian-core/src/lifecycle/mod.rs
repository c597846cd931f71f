//! Lifecycle manager: capture, summon, dismiss, release, loadout edits, relocation,
//! and session save/restore. Every transition writes the affected slot through the
//! store and pushes the matching sync messages.

mod loadout;
mod travel;


use chrono::Utc;
use contracts::{
    Archetype, CaptureConfig, EntityHandle, GuardianSlotRecord, Loadout, OwnerId, PowerType,
    SecurityLevel, SpawnRequest, SyncMessage, TemplateId, UnitState,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::{follow_offset, GuardianEngine};
use crate::error::{GuardianError, Result};
use crate::host::HostWorld;
use crate::registry::GuardianSlot;
use crate::session::OwnerSession;
use crate::store::{GuardianStore, StoreError};
use crate::sync::{full_state, SyncSink};
use crate::validator::can_capture;

pub use loadout::{ArchetypeOutcome, TeachReport, UnlearnOutcome};
pub use travel::RelocationReport;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureReport {
    pub slot: u8,
    pub name: String,
    pub level: u8,
    pub handle: EntityHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummonReport {
    pub slot: u8,
    pub name: String,
    pub handle: EntityHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DismissReport {
    pub slot: u8,
    pub name: String,
    /// The bound entity had already left the world; only the stale reference was cleared.
    pub entity_missing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseReport {
    pub slot: u8,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardianInfo {
    pub slot: u8,
    pub name: String,
    pub template_id: TemplateId,
    pub level: u8,
    pub health: u32,
    /// Only known while summoned.
    pub max_health: Option<u32>,
    pub power_type: PowerType,
    pub power: u32,
    pub archetype: Archetype,
    pub loadout: Loadout,
    pub active: bool,
    pub dismissed: bool,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct GuardianManager<S, E> {
    config: CaptureConfig,
    store: S,
    sink: E,
    last_persistence_error: Option<String>,
}

impl<S: GuardianStore, E: SyncSink> GuardianManager<S, E> {
    pub fn new(config: CaptureConfig, store: S, sink: E) -> Self {
        Self {
            config,
            store,
            sink,
            last_persistence_error: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn replace_store(&mut self, store: S) -> S {
        std::mem::replace(&mut self.store, store)
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut E {
        &mut self.sink
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    // ---------------------------------------------------------------------
    // Capture
    // ---------------------------------------------------------------------

    /// Convert `target` into a guardian in the owner's first empty slot.
    pub fn capture<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        target: Option<EntityHandle>,
    ) -> Result<CaptureReport> {
        if !self.config.enabled {
            return Err(GuardianError::Disabled);
        }
        let owner = owner_unit(world, session)?;
        let target = target.and_then(|handle| world.unit(handle));
        can_capture(&*world, &owner, target.as_ref(), &self.config)
            .map_err(GuardianError::Validation)?;
        let Some(target) = target else {
            return Err(GuardianError::Validation(contracts::CaptureRefusal::NoTarget));
        };
        let slot = session
            .guardians
            .first_empty_slot()
            .ok_or(GuardianError::Capacity {
                max_slots: session.guardians.max_slots(),
            })?;
        let template = target
            .template_id
            .and_then(|id| world.template(id))
            .ok_or(GuardianError::Validation(
                contracts::CaptureRefusal::InvalidTemplate,
            ))?;

        let mut record = GuardianSlotRecord::unoccupied(session.owner_id, slot);
        record.template_id = template.id;
        record.level = target.level;
        record.loadout = Loadout::from_abilities(&template.spells);
        record.display_override = target.display_id;
        record.equipment_override = target.equipment_id;

        world.despawn(target.handle);
        debug!(
            owner = %session.owner_id,
            slot,
            template = template.id,
            target = %target.handle,
            "capture target removed from world"
        );

        let handle = self.occupy_new(session, world, &owner, record, target.name.clone())?;
        info!(
            owner = %session.owner_id,
            slot,
            template = template.id,
            level = target.level,
            handle = %handle,
            "guardian captured"
        );
        Ok(CaptureReport {
            slot,
            name: target.name,
            level: target.level,
            handle,
        })
    }

    /// Privileged: put a fresh guardian of `template_id` at the owner's level into the first empty slot.
    pub fn spawn_for_test<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        template_id: TemplateId,
    ) -> Result<CaptureReport> {
        if session.security < SecurityLevel::GameMaster {
            return Err(GuardianError::PermissionDenied);
        }
        let owner = owner_unit(world, session)?;
        let template = world
            .template(template_id)
            .ok_or(GuardianError::UnknownTemplate(template_id))?;
        let slot = session
            .guardians
            .first_empty_slot()
            .ok_or(GuardianError::Capacity {
                max_slots: session.guardians.max_slots(),
            })?;

        let mut record = GuardianSlotRecord::unoccupied(session.owner_id, slot);
        record.template_id = template.id;
        record.level = owner.level;
        record.loadout = Loadout::from_abilities(&template.spells);

        let handle = self.occupy_new(session, world, &owner, record, template.name.clone())?;
        info!(owner = %session.owner_id, slot, template = template_id, "guardian spawned by game master");
        Ok(CaptureReport {
            slot,
            name: template.name,
            level: owner.level,
            handle,
        })
    }

    // ---------------------------------------------------------------------
    // Summon / dismiss / release
    // ---------------------------------------------------------------------

    pub fn summon<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        slot: u8,
    ) -> Result<SummonReport> {
        let owner = owner_unit(world, session)?;
        let owner_id = session.owner_id;
        let entry = slot_entry(session, slot)?;
        if !entry.is_occupied() {
            return Err(GuardianError::SlotEmpty { slot });
        }
        if let Some(handle) = entry.active_handle() {
            match world.unit(handle) {
                Some(unit) if unit.alive => return Err(GuardianError::AlreadyActive { slot }),
                Some(_) => {
                    debug!(owner = %owner_id, slot, handle = %handle, "removing dead guardian before summon");
                    world.despawn(handle);
                }
                None => {
                    warn!(owner = %owner_id, slot, handle = %handle, "stale guardian handle cleared");
                }
            }
            entry.unbind();
        }

        let handle = self.instantiate(world, &owner, entry, true)?;
        entry.record_mut().dismissed = false;
        self.persist(entry.record_mut());
        self.emit_full_state(owner_id, entry);
        info!(owner = %owner_id, slot, handle = %handle, "guardian summoned");
        Ok(SummonReport {
            slot,
            name: entry.name().to_string(),
            handle,
        })
    }

    pub fn dismiss<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        slot: u8,
    ) -> Result<DismissReport> {
        let owner_id = session.owner_id;
        let entry = slot_entry(session, slot)?;
        if !entry.is_occupied() {
            return Err(GuardianError::SlotEmpty { slot });
        }
        let Some(handle) = entry.active_handle() else {
            return Err(GuardianError::NotActive { slot });
        };

        let found = snapshot_live(world, entry);
        if found {
            world.despawn(handle);
        } else {
            warn!(owner = %owner_id, slot, handle = %handle, "dismissing guardian that already left the world");
        }
        entry.unbind();
        entry.record_mut().dismissed = true;
        self.persist(entry.record_mut());
        self.sink.send(owner_id, SyncMessage::Dismiss { slot });
        info!(owner = %owner_id, slot, "guardian dismissed");
        Ok(DismissReport {
            slot,
            name: entry.name().to_string(),
            entity_missing: !found,
        })
    }

    /// Irreversible: free the slot and delete its stored row.
    pub fn release<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        slot: u8,
    ) -> Result<ReleaseReport> {
        let owner_id = session.owner_id;
        let entry = slot_entry(session, slot)?;
        if !entry.is_occupied() {
            return Err(GuardianError::SlotEmpty { slot });
        }
        if let Some(active) = entry.unbind() {
            if world.unit(active.handle).is_some() {
                world.despawn(active.handle);
            }
        }
        let name = entry.name().to_string();
        entry.clear();

        match self.store.delete_slot(owner_id, slot) {
            Ok(()) => self.last_persistence_error = None,
            Err(err) => self.record_store_failure(owner_id, slot, &err),
        }
        self.sink.send(owner_id, SyncMessage::Clear { slot });
        info!(owner = %owner_id, slot, name = %name, "guardian released");
        Ok(ReleaseReport { slot, name })
    }

    /// Details of `slot`, or of the first summoned (else first occupied) slot when `None`.
    pub fn info<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &W,
        slot: Option<u8>,
    ) -> Result<GuardianInfo> {
        let slot = match slot {
            Some(slot) => slot,
            None => session
                .guardians
                .first_active_slot()
                .or_else(|| {
                    session
                        .guardians
                        .slots()
                        .iter()
                        .find(|s| s.is_occupied())
                        .map(GuardianSlot::index)
                })
                .ok_or(GuardianError::NoGuardians)?,
        };
        let owner_id = session.owner_id;
        let entry = slot_entry(session, slot)?;
        if !entry.is_occupied() {
            return Err(GuardianError::SlotEmpty { slot });
        }
        let record = entry.record().clone();
        let mut info = GuardianInfo {
            slot,
            name: entry.name().to_string(),
            template_id: record.template_id,
            level: record.level,
            health: record.health,
            max_health: None,
            power_type: record.power_type,
            power: record.power,
            archetype: entry.archetype(),
            loadout: entry.loadout(),
            active: false,
            dismissed: record.dismissed,
        };
        let Some(handle) = entry.active_handle() else {
            return Ok(info);
        };
        let Some(unit) = world.unit(handle) else {
            warn!(owner = %owner_id, slot, handle = %handle, "stale guardian handle cleared");
            entry.unbind();
            return Err(GuardianError::NotFound { slot });
        };
        info.name = unit.name;
        info.level = unit.level;
        info.health = unit.health;
        info.max_health = Some(unit.max_health);
        info.power_type = unit.power_type;
        info.power = unit.power;
        info.active = true;
        Ok(info)
    }

    // ---------------------------------------------------------------------
    // Shared helpers
    // ---------------------------------------------------------------------

    /// Fill `record` into its slot, spawn it, and persist. On spawn failure the slot is left empty.
    fn occupy_new<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        owner: &UnitState,
        record: GuardianSlotRecord,
        name: String,
    ) -> Result<EntityHandle> {
        let slot = record.slot;
        let owner_id = session.owner_id;
        let entry = slot_entry(session, slot)?;
        entry.occupy(record, name);

        let handle = match self.instantiate(world, owner, entry, false) {
            Ok(handle) => handle,
            Err(err) => {
                entry.clear();
                return Err(err);
            }
        };
        if let Some(unit) = world.unit(handle) {
            let record = entry.record_mut();
            record.health = unit.health;
            record.power = unit.power;
            record.power_type = unit.power_type;
        }
        self.persist(entry.record_mut());
        self.emit_full_state(owner_id, entry);
        Ok(handle)
    }

    /// Spawn the slot's guardian next to the owner and bind a fresh engine to it.
    /// With `restore`, saved health and power are applied, clamped to the new maximums.
    fn instantiate<W: HostWorld + ?Sized>(
        &self,
        world: &mut W,
        owner: &UnitState,
        entry: &mut GuardianSlot,
        restore: bool,
    ) -> Result<EntityHandle> {
        let record = entry.record().clone();
        let offset = follow_offset(record.archetype, record.slot);
        let request = SpawnRequest {
            template_id: record.template_id,
            level: record.level,
            position: owner.position.offset(offset.distance, offset.angle),
            display_override: record.display_override,
            equipment_override: record.equipment_override,
            power_type: restore.then_some(record.power_type),
            duration_ms: self.config.guardian_duration_ms(),
            health_pct: self.config.health_pct,
            damage_pct: self.config.damage_pct,
        };
        let handle = world
            .spawn_guardian(owner.handle, &request)
            .ok_or(GuardianError::SpawnFailed)?;

        if restore {
            if let Some(unit) = world.unit(handle) {
                if record.health > 0 {
                    world.set_health(handle, record.health.min(unit.max_health));
                }
                if unit.power_type == record.power_type {
                    world.set_power(handle, unit.power_type, record.power.min(unit.max_power));
                }
            }
        }

        let mut engine = GuardianEngine::new(
            handle,
            owner.handle,
            record.slot,
            record.archetype,
            record.loadout,
        );
        engine.start_follow(world);
        entry.bind(handle, engine);
        debug!(slot = record.slot, template = record.template_id, handle = %handle, "guardian instantiated");
        Ok(handle)
    }

    fn persist(&mut self, record: &mut GuardianSlotRecord) {
        record.saved_at = Utc::now().timestamp();
        match self.store.save_slot(record) {
            Ok(()) => self.last_persistence_error = None,
            Err(err) => self.record_store_failure(record.owner_id, record.slot, &err),
        }
    }

    fn record_store_failure(&mut self, owner_id: OwnerId, slot: u8, err: &StoreError) {
        error!(owner = %owner_id, slot, error = %err, "guardian persistence failed");
        self.last_persistence_error = Some(err.to_string());
    }

    fn emit_full_state(&mut self, owner_id: OwnerId, entry: &GuardianSlot) {
        for message in full_state(entry) {
            self.sink.send(owner_id, message);
        }
    }
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

fn owner_unit<W: HostWorld + ?Sized>(world: &W, session: &OwnerSession) -> Result<UnitState> {
    world
        .unit(session.player)
        .filter(|unit| unit.in_world)
        .ok_or(GuardianError::OwnerUnavailable)
}

fn slot_entry(session: &mut OwnerSession, slot: u8) -> Result<&mut GuardianSlot> {
    let max_slots = session.guardians.max_slots();
    session
        .guardians
        .slot_mut(slot)
        .ok_or(GuardianError::InvalidSlot { slot, max_slots })
}

/// Copy live health, power, archetype and loadout into the record.
/// Returns false when the bound entity no longer exists.
fn snapshot_live<W: HostWorld + ?Sized>(world: &W, entry: &mut GuardianSlot) -> bool {
    let Some(handle) = entry.active_handle() else {
        return false;
    };
    let loadout = entry.loadout();
    let archetype = entry.archetype();
    let unit = world.unit(handle);
    let record = entry.record_mut();
    record.loadout = loadout;
    record.archetype = archetype;
    match unit {
        Some(unit) => {
            record.health = if unit.alive { unit.health } else { 0 };
            record.power = unit.power;
            record.power_type = unit.power_type;
            true
        }
        None => false,
    }
}
