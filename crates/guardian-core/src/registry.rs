//! Per-owner slot registry: which slots are occupied, which are summoned, and the
//! engine driving each summoned guardian.

use contracts::{Archetype, EntityHandle, GuardianSlotRecord, Loadout, OwnerId, TemplateId};
use tracing::{debug, warn};

use crate::engine::{AllyGuardian, EngineStatus, GuardianEngine};
use crate::host::HostWorld;

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Live binding between a slot and a world entity.
#[derive(Debug, Clone)]
pub struct ActiveGuardian {
    pub handle: EntityHandle,
    pub engine: GuardianEngine,
}

#[derive(Debug, Clone)]
pub struct GuardianSlot {
    record: GuardianSlotRecord,
    name: String,
    active: Option<ActiveGuardian>,
}

impl GuardianSlot {
    fn empty(owner_id: OwnerId, slot: u8) -> Self {
        Self {
            record: GuardianSlotRecord::unoccupied(owner_id, slot),
            name: String::new(),
            active: None,
        }
    }

    pub fn index(&self) -> u8 {
        self.record.slot
    }

    pub fn record(&self) -> &GuardianSlotRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut GuardianSlotRecord {
        &mut self.record
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_occupied(&self) -> bool {
        self.record.is_occupied()
    }

    /// Whether the slot holds a live reference. The entity itself may already be dead.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_handle(&self) -> Option<EntityHandle> {
        self.active.as_ref().map(|a| a.handle)
    }

    pub fn engine(&self) -> Option<&GuardianEngine> {
        self.active.as_ref().map(|a| &a.engine)
    }

    pub fn engine_mut(&mut self) -> Option<&mut GuardianEngine> {
        self.active.as_mut().map(|a| &mut a.engine)
    }

    /// Live archetype when summoned, stored one otherwise.
    pub fn archetype(&self) -> Archetype {
        self.engine()
            .map(GuardianEngine::archetype)
            .unwrap_or(self.record.archetype)
    }

    /// Live loadout when summoned, stored one otherwise.
    pub fn loadout(&self) -> Loadout {
        self.engine()
            .map(GuardianEngine::loadout)
            .unwrap_or(self.record.loadout)
    }

    /// Occupy the slot with a fresh record. Any live binding is dropped.
    pub fn occupy(&mut self, record: GuardianSlotRecord, name: impl Into<String>) {
        self.record = record;
        self.name = name.into();
        self.active = None;
    }

    pub fn bind(&mut self, handle: EntityHandle, engine: GuardianEngine) {
        self.active = Some(ActiveGuardian { handle, engine });
    }

    pub fn unbind(&mut self) -> Option<ActiveGuardian> {
        self.active.take()
    }

    /// Back to unoccupied; the slot key is kept.
    pub fn clear(&mut self) {
        self.record.clear();
        self.name.clear();
        self.active = None;
    }
}

// ---------------------------------------------------------------------------
// Owner registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OwnerGuardianState {
    owner_id: OwnerId,
    slots: Vec<GuardianSlot>,
}

impl OwnerGuardianState {
    /// `max_slots` unoccupied slots, indexed from 0.
    pub fn new(owner_id: OwnerId, max_slots: usize) -> Self {
        let slots = (0..max_slots)
            .map(|i| GuardianSlot::empty(owner_id, i as u8))
            .collect();
        Self { owner_id, slots }
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn max_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[GuardianSlot] {
        &self.slots
    }

    pub fn slot(&self, index: u8) -> Option<&GuardianSlot> {
        self.slots.get(usize::from(index))
    }

    pub fn slot_mut(&mut self, index: u8) -> Option<&mut GuardianSlot> {
        self.slots.get_mut(usize::from(index))
    }

    pub fn first_empty_slot(&self) -> Option<u8> {
        self.slots
            .iter()
            .find(|slot| !slot.is_occupied())
            .map(GuardianSlot::index)
    }

    pub fn first_active_slot(&self) -> Option<u8> {
        self.slots
            .iter()
            .find(|slot| slot.is_active())
            .map(GuardianSlot::index)
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_occupied()).count()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_active()).count()
    }

    /// Slot bound to `handle`, if any.
    pub fn slot_by_handle(&self, handle: EntityHandle) -> Option<u8> {
        self.slots
            .iter()
            .find(|slot| slot.active_handle() == Some(handle))
            .map(GuardianSlot::index)
    }

    /// First occupied slot holding a guardian captured from `template_id`.
    pub fn slot_by_template(&self, template_id: TemplateId) -> Option<u8> {
        self.slots
            .iter()
            .find(|slot| slot.is_occupied() && slot.record().template_id == template_id)
            .map(GuardianSlot::index)
    }

    pub fn active_slots(&self) -> impl Iterator<Item = &GuardianSlot> {
        self.slots.iter().filter(|slot| slot.is_active())
    }

    pub fn allies(&self) -> Vec<AllyGuardian> {
        self.slots
            .iter()
            .filter_map(|slot| {
                slot.active.as_ref().map(|active| AllyGuardian {
                    slot: slot.index(),
                    handle: active.handle,
                    archetype: active.engine.archetype(),
                })
            })
            .collect()
    }

    /// Tick every summoned guardian. Slots whose entity left the world lose their binding.
    pub fn update<W: HostWorld + ?Sized>(&mut self, world: &mut W, diff_ms: u32) {
        let allies = self.allies();
        for slot in &mut self.slots {
            let Some(active) = slot.active.as_mut() else {
                continue;
            };
            match active.engine.update(world, diff_ms, &allies) {
                EngineStatus::Running | EngineStatus::Dead => {}
                EngineStatus::Despawned => {
                    debug!(
                        owner = %self.owner_id,
                        slot = slot.record.slot,
                        "guardian left the world, clearing active reference"
                    );
                    slot.active = None;
                }
            }
        }
    }

    /// Host callback: `caster` summoned `summon`. Only this owner's guardians react.
    pub fn on_summoned<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        caster: EntityHandle,
        summon: EntityHandle,
    ) -> bool {
        let Some(index) = self.slot_by_handle(caster) else {
            return false;
        };
        match self.slot_mut(index).and_then(GuardianSlot::engine_mut) {
            Some(engine) => {
                engine.adopt_summon(world, summon);
                true
            }
            None => false,
        }
    }

    /// Host callback: a guardian dealt damage to `victim`.
    pub fn on_damage_dealt<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        guardian: EntityHandle,
        victim: EntityHandle,
    ) {
        let Some(index) = self.slot_by_handle(guardian) else {
            return;
        };
        if let Some(engine) = self.slot_mut(index).and_then(GuardianSlot::engine_mut) {
            engine.on_damage_dealt(world, victim);
        }
    }

    /// Host callback: a guardian died.
    pub fn on_guardian_died<W: HostWorld + ?Sized>(&mut self, world: &mut W, guardian: EntityHandle) {
        let Some(index) = self.slot_by_handle(guardian) else {
            warn!(owner = %self.owner_id, guardian = %guardian, "death reported for unknown guardian");
            return;
        };
        if let Some(engine) = self.slot_mut(index).and_then(GuardianSlot::engine_mut) {
            engine.notify_death(world);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied(owner: OwnerId, slot: u8) -> GuardianSlotRecord {
        let mut record = GuardianSlotRecord::unoccupied(owner, slot);
        record.template_id = 299;
        record.level = 5;
        record
    }

    #[test]
    fn slots_are_indexed_and_initially_empty() {
        let state = OwnerGuardianState::new(OwnerId(1), 3);
        assert_eq!(state.max_slots(), 3);
        assert_eq!(state.first_empty_slot(), Some(0));
        assert_eq!(
            state.slots().iter().map(GuardianSlot::index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(state.slot(3).is_none());
    }

    #[test]
    fn first_empty_skips_occupied_slots() {
        let mut state = OwnerGuardianState::new(OwnerId(1), 4);
        for index in [0, 1, 3] {
            state
                .slot_mut(index)
                .expect("slot")
                .occupy(occupied(OwnerId(1), index), "Wolf");
        }
        assert_eq!(state.first_empty_slot(), Some(2));
        assert_eq!(state.occupied_count(), 3);
        state.slot_mut(2).expect("slot").occupy(occupied(OwnerId(1), 2), "Wolf");
        assert_eq!(state.first_empty_slot(), None);
    }

    #[test]
    fn binding_tracks_handle_and_live_loadout() {
        let mut state = OwnerGuardianState::new(OwnerId(1), 2);
        let slot = state.slot_mut(1).expect("slot");
        slot.occupy(occupied(OwnerId(1), 1), "Wolf");
        let mut engine = GuardianEngine::new(
            EntityHandle(50),
            EntityHandle(1),
            1,
            Archetype::Tank,
            Loadout::default(),
        );
        engine.set_spell(0, 133);
        slot.bind(EntityHandle(50), engine);

        assert_eq!(state.slot_by_handle(EntityHandle(50)), Some(1));
        assert_eq!(state.first_active_slot(), Some(1));
        let slot = state.slot(1).expect("slot");
        assert_eq!(slot.loadout().get(0), 133);
        assert_eq!(slot.archetype(), Archetype::Tank);
        assert_eq!(state.allies().len(), 1);
    }

    #[test]
    fn template_lookup_finds_occupied_slots_only() {
        let mut state = OwnerGuardianState::new(OwnerId(1), 3);
        assert_eq!(state.slot_by_template(299), None);

        let mut geomancer = occupied(OwnerId(1), 2);
        geomancer.template_id = 476;
        state.slot_mut(1).expect("slot").occupy(occupied(OwnerId(1), 1), "Wolf");
        state.slot_mut(2).expect("slot").occupy(geomancer, "Geomancer");

        assert_eq!(state.slot_by_template(299), Some(1));
        assert_eq!(state.slot_by_template(476), Some(2));
        assert_eq!(state.slot_by_template(0), None);

        state.slot_mut(1).expect("slot").clear();
        assert_eq!(state.slot_by_template(299), None);
    }

    #[test]
    fn clear_keeps_key_and_drops_binding() {
        let mut state = OwnerGuardianState::new(OwnerId(1), 1);
        let slot = state.slot_mut(0).expect("slot");
        slot.occupy(occupied(OwnerId(1), 0), "Wolf");
        slot.bind(
            EntityHandle(9),
            GuardianEngine::new(EntityHandle(9), EntityHandle(1), 0, Archetype::Dps, Loadout::default()),
        );
        slot.clear();
        assert!(!slot.is_occupied());
        assert!(!slot.is_active());
        assert_eq!(slot.index(), 0);
        assert_eq!(slot.name(), "");
    }
}
