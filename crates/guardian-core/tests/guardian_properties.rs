use std::collections::BTreeSet;

use contracts::{
    CaptureConfig, EntityHandle, OwnerId, Position, SecurityLevel, SpellInfo,
};
use guardian_core::engine::cast_cooldown;
use guardian_core::sim::catalog::YOUNG_WOLF;
use guardian_core::{
    GuardianManager, HostWorld, MemoryGuardianStore, OwnerSession, SimWorld, SyncOutbox,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const OWNER: OwnerId = OwnerId(7);

#[derive(Debug, Clone)]
enum Op {
    Capture,
    Summon(u8),
    Dismiss(u8),
    Release(u8),
    Tick,
    Vanish(u8),
    Kill(u8),
    Relocate { cross: bool },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Capture),
        2 => (0_u8..5).prop_map(Op::Summon),
        2 => (0_u8..5).prop_map(Op::Dismiss),
        1 => (0_u8..5).prop_map(Op::Release),
        2 => Just(Op::Tick),
        1 => (0_u8..4).prop_map(Op::Vanish),
        1 => (0_u8..4).prop_map(Op::Kill),
        1 => any::<bool>().prop_map(|cross| Op::Relocate { cross }),
    ]
}

struct Harness {
    world: SimWorld,
    player: EntityHandle,
    session: OwnerSession,
    manager: GuardianManager<MemoryGuardianStore, SyncOutbox>,
}

impl Harness {
    fn new() -> Self {
        let config = CaptureConfig::default();
        let mut world = SimWorld::with_sample_catalog();
        let player = world.spawn_player("Ayla", 20, Position::new(0, 0.0, 0.0, 0.0));
        let session = OwnerSession::new(
            OWNER,
            player,
            SecurityLevel::Player,
            config.effective_max_slots(),
        );
        Self {
            world,
            player,
            session,
            manager: GuardianManager::new(config, MemoryGuardianStore::new(), SyncOutbox::new()),
        }
    }

    fn apply(&mut self, op: &Op) {
        match op {
            Op::Capture => {
                let owner = self.world.unit(self.player).map(|u| u.position);
                let at = owner.unwrap_or_default().offset(8.0, 0.0);
                let target = self.world.spawn_creature(YOUNG_WOLF, 18, at);
                let _ = self
                    .manager
                    .capture(&mut self.session, &mut self.world, Some(target));
            }
            Op::Summon(slot) => {
                let _ = self.manager.summon(&mut self.session, &mut self.world, *slot);
            }
            Op::Dismiss(slot) => {
                let _ = self.manager.dismiss(&mut self.session, &mut self.world, *slot);
            }
            Op::Release(slot) => {
                let _ = self.manager.release(&mut self.session, &mut self.world, *slot);
            }
            Op::Tick => {
                self.world.advance(250);
                self.session.update(&mut self.world, 250);
            }
            Op::Vanish(slot) => {
                if let Some(handle) = self.active_handle(*slot) {
                    self.world.despawn(handle);
                }
            }
            Op::Kill(slot) => {
                if let Some(handle) = self.active_handle(*slot) {
                    self.world.kill(handle);
                }
            }
            Op::Relocate { cross } => {
                let here = self
                    .world
                    .unit(self.player)
                    .map(|u| u.position)
                    .unwrap_or_default();
                let context_id = if *cross { here.context_id + 1 } else { here.context_id };
                let destination = Position::new(context_id, here.x + 20.0, here.y, here.z);
                self.manager
                    .relocate(&mut self.session, &mut self.world, destination);
                self.world.transfer(self.player, destination);
                if *cross {
                    self.manager.arrive(&mut self.session, &mut self.world);
                }
            }
        }
    }

    fn active_handle(&self, slot: u8) -> Option<EntityHandle> {
        self.session
            .guardians
            .slot(slot)
            .and_then(|entry| entry.active_handle())
    }
}

fn assert_consistent(h: &Harness) -> Result<(), TestCaseError> {
    let mut bound = BTreeSet::new();
    for entry in h.session.guardians.slots() {
        if let Some(handle) = entry.active_handle() {
            prop_assert!(entry.is_occupied(), "slot {} active but empty", entry.index());
            prop_assert!(bound.insert(handle), "handle {} bound twice", handle);
        }

        let row = h.manager.store().get(OWNER, entry.index());
        prop_assert_eq!(row.is_some(), entry.is_occupied(), "slot {}", entry.index());
        if let Some(row) = row {
            prop_assert_eq!(row.template_id, entry.record().template_id);
            prop_assert_eq!(row.dismissed, entry.record().dismissed);
        }
    }

    for handle in h.world.live_guardians_of(h.player) {
        prop_assert!(bound.contains(&handle), "orphaned guardian {}", handle);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn property_slot_registry_store_and_world_agree(ops in prop::collection::vec(op(), 1..40)) {
        let mut h = Harness::new();
        for op in &ops {
            h.apply(op);
            assert_consistent(&h)?;
        }
    }

    #[test]
    fn property_cooldown_respects_recovery_and_floor(
        recovery in 0_u32..40_000,
        category in 0_u32..40_000,
        start in 0_u32..40_000,
        heal in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let spell = SpellInfo {
            recovery_ms: recovery,
            category_recovery_ms: category,
            start_recovery_ms: start,
            ..SpellInfo::default()
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let cooldown = cast_cooldown(&spell, heal, &mut rng);

        let floor = if heal { 10_000 } else { 2_000 };
        let base = recovery.max(category).max(start).max(floor);
        prop_assert!(cooldown >= base + 500, "{} < {}", cooldown, base + 500);
        prop_assert!(cooldown < base + 1500, "{} >= {}", cooldown, base + 1500);
    }
}

#[test]
fn every_captured_guardian_is_tracked_across_a_long_session() {
    let mut h = Harness::new();
    for _ in 0..4 {
        h.apply(&Op::Capture);
    }
    assert_eq!(h.session.guardians.active_count(), 4);
    h.apply(&Op::Capture);
    assert_eq!(h.world.live_guardians_of(h.player).len(), 4);

    for _ in 0..40 {
        h.apply(&Op::Tick);
    }
    assert_eq!(h.session.guardians.active_count(), 4);
    let store = h.manager.store();
    assert_eq!(store.len(), 4);
    assert!(store.rows().all(|row| row.template_id == YOUNG_WOLF));
    assert!(h.world.unit(h.player).is_some());
}
