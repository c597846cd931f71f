//! Loadout and role edits on an existing slot.

use contracts::{Archetype, EntityHandle, PowerType, SpellId, SyncMessage, LOADOUT_SIZE};
use serde::Serialize;
use tracing::{info, warn};

use super::{slot_entry, GuardianManager};
use crate::error::{GuardianError, Result};
use crate::host::HostWorld;
use crate::session::OwnerSession;
use crate::store::GuardianStore;
use crate::sync::SyncSink;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeachReport {
    pub slot: u8,
    /// One-based loadout position.
    pub index: u8,
    pub spell_id: SpellId,
    pub spell_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UnlearnOutcome {
    Cleared { spell_id: SpellId, spell_name: String },
    AlreadyEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArchetypeOutcome {
    Unchanged(Archetype),
    Switched { from: Archetype, to: Archetype },
}

fn check_index(index: u8) -> Result<usize> {
    if index == 0 || usize::from(index) > LOADOUT_SIZE {
        return Err(GuardianError::InvalidLoadoutIndex { index });
    }
    Ok(usize::from(index) - 1)
}

impl<S: GuardianStore, E: SyncSink> GuardianManager<S, E> {
    /// Put `spell_id` at one-based `index` of a summoned guardian's loadout.
    pub fn teach<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        slot: u8,
        index: u8,
        spell_id: SpellId,
    ) -> Result<TeachReport> {
        let position = check_index(index)?;
        let owner_id = session.owner_id;
        let entry = slot_entry(session, slot)?;
        let Some(handle) = entry.active_handle() else {
            return Err(GuardianError::NotActive { slot });
        };
        let Some(unit) = world.unit(handle) else {
            warn!(owner = %owner_id, slot, handle = %handle, "stale guardian handle cleared");
            entry.unbind();
            return Err(GuardianError::NotFound { slot });
        };
        let spell = world
            .spell(spell_id)
            .ok_or(GuardianError::UnknownSpell(spell_id))?;
        if spell.costs_resource()
            && spell.power_type != PowerType::Health
            && spell.power_type != unit.power_type
        {
            return Err(GuardianError::ResourceMismatch {
                spell_id,
                required: spell.power_type,
                available: unit.power_type,
            });
        }

        if let Some(engine) = entry.engine_mut() {
            engine.set_spell(position, spell_id);
        }
        entry.record_mut().loadout.set(position, spell_id);
        self.persist(entry.record_mut());
        self.sink.send(
            owner_id,
            SyncMessage::Spells {
                slot,
                loadout: entry.loadout(),
            },
        );
        info!(owner = %owner_id, slot, index, spell = spell_id, "guardian learned spell");
        Ok(TeachReport {
            slot,
            index,
            spell_id,
            spell_name: spell.name,
        })
    }

    /// Clear one-based `index`. Works on stored guardians too.
    pub fn unlearn<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &W,
        slot: u8,
        index: u8,
    ) -> Result<UnlearnOutcome> {
        let position = check_index(index)?;
        let owner_id = session.owner_id;
        let entry = slot_entry(session, slot)?;
        if !entry.is_occupied() {
            return Err(GuardianError::SlotEmpty { slot });
        }
        let spell_id = entry.loadout().get(position);
        if spell_id == 0 {
            return Ok(UnlearnOutcome::AlreadyEmpty);
        }

        if let Some(engine) = entry.engine_mut() {
            engine.set_spell(position, 0);
        }
        entry.record_mut().loadout.set(position, 0);
        self.persist(entry.record_mut());
        self.sink.send(
            owner_id,
            SyncMessage::Spells {
                slot,
                loadout: entry.loadout(),
            },
        );
        let spell_name = world
            .spell(spell_id)
            .map(|spell| spell.name)
            .unwrap_or_else(|| format!("spell {spell_id}"));
        info!(owner = %owner_id, slot, index, spell = spell_id, "guardian unlearned spell");
        Ok(UnlearnOutcome::Cleared {
            spell_id,
            spell_name,
        })
    }

    /// Change role. `interacted` must be the slot's own summoned entity.
    pub fn switch_archetype<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        slot: u8,
        archetype: Archetype,
        interacted: EntityHandle,
    ) -> Result<ArchetypeOutcome> {
        let owner_id = session.owner_id;
        let player = session.player;
        let entry = slot_entry(session, slot)?;
        let Some(handle) = entry.active_handle() else {
            return Err(GuardianError::NotActive { slot });
        };
        if handle != interacted {
            return Err(GuardianError::NotInteracting { slot });
        }
        let Some(unit) = world.unit(handle) else {
            warn!(owner = %owner_id, slot, handle = %handle, "stale guardian handle cleared");
            entry.unbind();
            return Err(GuardianError::NotFound { slot });
        };
        if unit.owner != Some(player) {
            return Err(GuardianError::NotInteracting { slot });
        }

        let previous = entry.archetype();
        if previous == archetype {
            return Ok(ArchetypeOutcome::Unchanged(archetype));
        }
        if let Some(engine) = entry.engine_mut() {
            engine.set_archetype(world, archetype);
        }
        entry.record_mut().archetype = archetype;
        self.persist(entry.record_mut());
        self.sink
            .send(owner_id, SyncMessage::Arch { slot, archetype });
        info!(owner = %owner_id, slot, from = %previous, to = %archetype, "guardian archetype switched");
        Ok(ArchetypeOutcome::Switched {
            from: previous,
            to: archetype,
        })
    }

    /// One-time choice of a summoned guardian's resource pool.
    pub fn choose_power<W: HostWorld + ?Sized>(
        &mut self,
        session: &mut OwnerSession,
        world: &mut W,
        slot: u8,
        power_type: PowerType,
    ) -> Result<PowerType> {
        if power_type == PowerType::Health {
            return Err(GuardianError::InvalidPowerType(power_type));
        }
        let owner_id = session.owner_id;
        let entry = slot_entry(session, slot)?;
        let Some(handle) = entry.active_handle() else {
            return Err(GuardianError::NotActive { slot });
        };
        if entry.record().power_chosen {
            return Err(GuardianError::PowerAlreadyChosen { slot });
        }
        if world.unit(handle).is_none() {
            warn!(owner = %owner_id, slot, handle = %handle, "stale guardian handle cleared");
            entry.unbind();
            return Err(GuardianError::NotFound { slot });
        }

        world.set_power_type(handle, power_type);
        let power = world.unit(handle).map(|unit| unit.power).unwrap_or(0);
        let record = entry.record_mut();
        record.power_type = power_type;
        record.power = power;
        record.power_chosen = true;
        self.persist(entry.record_mut());
        info!(owner = %owner_id, slot, power = %power_type, "guardian resource chosen");
        Ok(power_type)
    }
}
