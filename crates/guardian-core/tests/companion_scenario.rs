use contracts::{Archetype, OwnerId, Position, SecurityLevel, SyncMessage};
use guardian_core::sim::catalog::{FIREBOLT, HEALING_WAVE, KOBOLD_GEOMANCER, YOUNG_WOLF};
use guardian_core::{
    GuardianManager, HostWorld, MemoryGuardianStore, OwnerSession, SimWorld, SyncOutbox,
};

const OWNER: OwnerId = OwnerId(1001);
const TICK_MS: u32 = 100;

fn run(world: &mut SimWorld, session: &mut OwnerSession, ticks: usize) {
    for _ in 0..ticks {
        world.advance(u64::from(TICK_MS));
        session.update(world, TICK_MS);
    }
}

#[test]
fn captured_guardian_defends_owner_then_survives_a_relog() {
    let mut world = SimWorld::with_sample_catalog();
    let player = world.spawn_player("Ayla", 20, Position::new(0, 0.0, 0.0, 0.0));
    let mut manager = GuardianManager::new(
        Default::default(),
        MemoryGuardianStore::new(),
        SyncOutbox::new(),
    );
    let mut session = manager.login(&mut world, OWNER, player, SecurityLevel::Player);
    assert_eq!(session.guardians.occupied_count(), 0);

    let geomancer = world.spawn_creature(KOBOLD_GEOMANCER, 18, Position::new(0, 6.0, 0.0, 0.0));
    let capture = manager
        .capture(&mut session, &mut world, Some(geomancer))
        .expect("capture");
    let guardian = capture.handle;

    // Settle into formation.
    run(&mut world, &mut session, 5);
    let owner = world.unit(player).expect("owner");
    let me = world.unit(guardian).expect("guardian");
    assert!(me.distance_to(&owner) <= 3.5);

    let wolf = world.spawn_creature(YOUNG_WOLF, 12, Position::new(0, 0.0, -8.0, 0.0));
    assert!(world.attack(wolf, player));
    run(&mut world, &mut session, 300);

    assert!(!world.unit(wolf).expect("wolf corpse").alive);
    assert!(!world.casts_of(FIREBOLT).is_empty());
    assert!(world.unit(guardian).expect("guardian").alive);

    // Back in formation once the fight is over.
    run(&mut world, &mut session, 10);
    assert!(world.is_following(guardian));

    let writes = manager.store().write_count();
    manager
        .switch_archetype(&mut session, &mut world, 0, Archetype::Healer, guardian)
        .expect("switch");
    assert_eq!(manager.store().write_count(), writes + 1);

    let max = world.unit(player).expect("owner").max_health;
    world.set_health(player, max * 6 / 10);
    run(&mut world, &mut session, 10);
    let heals = world.casts_of(HEALING_WAVE);
    assert!(heals.iter().any(|cast| cast.target == player));

    assert_eq!(manager.logout(session, &mut world), 1);
    assert!(!world.exists(guardian));

    manager.sink_mut().drain();
    let session = manager.login(&mut world, OWNER, player, SecurityLevel::Player);
    let slot = session.guardians.slot(0).expect("slot");
    assert!(slot.is_active());
    assert_eq!(slot.archetype(), Archetype::Healer);
    let burst = manager.sink().messages_for(OWNER);
    assert!(burst.contains(&&SyncMessage::Arch {
        slot: 0,
        archetype: Archetype::Healer
    }));
}
