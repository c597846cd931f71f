//! Capture eligibility. Pure: reads the world, never mutates it.

use contracts::{
    CaptureConfig, CaptureRefusal, CreatureKind, CreatureRank, UnitState, CAPTURE_RADIUS,
};

use crate::host::HostWorld;

/// Checks run in a fixed order and the first failure wins.
pub fn can_capture<W: HostWorld + ?Sized>(
    world: &W,
    owner: &UnitState,
    target: Option<&UnitState>,
    config: &CaptureConfig,
) -> Result<(), CaptureRefusal> {
    let target = target.ok_or(CaptureRefusal::NoTarget)?;

    if !target.alive {
        return Err(CaptureRefusal::Dead);
    }
    if target.is_controlled() {
        return Err(CaptureRefusal::AlreadyControlled);
    }
    if target.is_player {
        return Err(CaptureRefusal::IsPlayer);
    }

    let template = target
        .template_id
        .and_then(|id| world.template(id))
        .ok_or(CaptureRefusal::InvalidTemplate)?;

    if template.kind == CreatureKind::Critter {
        return Err(CaptureRefusal::Critter);
    }
    if template.rank.is_elite() && !config.allow_elite {
        return Err(CaptureRefusal::EliteNotAllowed);
    }
    if template.rank == CreatureRank::Rare && !config.allow_rare {
        return Err(CaptureRefusal::RareNotAllowed);
    }

    if target.level < config.min_creature_level {
        return Err(CaptureRefusal::LevelTooLow);
    }
    if i32::from(target.level) > i32::from(owner.level) + config.max_level_diff {
        return Err(CaptureRefusal::LevelTooHigh);
    }

    if target.in_combat && target.victim != Some(owner.handle) {
        return Err(CaptureRefusal::InCombatWithOther);
    }

    if owner.distance_to(target) > CAPTURE_RADIUS {
        return Err(CaptureRefusal::TooFar);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use contracts::{CreatureTemplate, Position};

    use super::*;
    use crate::sim::SimWorld;

    fn world_with(rank: CreatureRank, kind: CreatureKind) -> (SimWorld, UnitState, UnitState) {
        let mut world = SimWorld::new();
        world.add_template(CreatureTemplate {
            id: 100,
            name: "Forest Spider".into(),
            rank,
            kind,
            spells: vec![],
        });
        let owner = world.spawn_player("Ayla", 20, Position::new(0, 0.0, 0.0, 0.0));
        let target = world.spawn_creature(100, 18, Position::new(0, 10.0, 0.0, 0.0));
        let owner = world.unit(owner).expect("owner");
        let target = world.unit(target).expect("target");
        (world, owner, target)
    }

    #[test]
    fn accepts_eligible_target() {
        let (world, owner, target) = world_with(CreatureRank::Normal, CreatureKind::Beast);
        let config = CaptureConfig::default();
        assert_eq!(can_capture(&world, &owner, Some(&target), &config), Ok(()));
    }

    #[test]
    fn missing_target_is_refused_first() {
        let (world, owner, _) = world_with(CreatureRank::Normal, CreatureKind::Beast);
        assert_eq!(
            can_capture(&world, &owner, None, &CaptureConfig::default()),
            Err(CaptureRefusal::NoTarget)
        );
    }

    #[test]
    fn dead_check_precedes_level_check() {
        let (world, owner, mut target) = world_with(CreatureRank::Normal, CreatureKind::Beast);
        target.alive = false;
        target.level = 80;
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &CaptureConfig::default()),
            Err(CaptureRefusal::Dead)
        );
    }

    #[test]
    fn controlled_and_player_targets_are_refused() {
        let (world, owner, mut target) = world_with(CreatureRank::Normal, CreatureKind::Beast);
        let config = CaptureConfig::default();
        target.is_summon = true;
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::AlreadyControlled)
        );
        assert_eq!(
            can_capture(&world, &owner, Some(&owner), &config),
            Err(CaptureRefusal::IsPlayer)
        );
    }

    #[test]
    fn critters_and_unknown_templates_are_refused() {
        let (world, owner, mut target) = world_with(CreatureRank::Normal, CreatureKind::Critter);
        let config = CaptureConfig::default();
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::Critter)
        );
        target.template_id = Some(999);
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::InvalidTemplate)
        );
    }

    #[test]
    fn rank_rules_follow_config() {
        let (world, owner, target) = world_with(CreatureRank::Elite, CreatureKind::Beast);
        let mut config = CaptureConfig::default();
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::EliteNotAllowed)
        );
        config.allow_elite = true;
        assert_eq!(can_capture(&world, &owner, Some(&target), &config), Ok(()));

        let (world, owner, target) = world_with(CreatureRank::Rare, CreatureKind::Beast);
        config.allow_rare = false;
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::RareNotAllowed)
        );
    }

    #[test]
    fn level_window_is_inclusive() {
        let (world, owner, mut target) = world_with(CreatureRank::Normal, CreatureKind::Beast);
        let config = CaptureConfig::default();
        target.level = 25;
        assert_eq!(can_capture(&world, &owner, Some(&target), &config), Ok(()));
        target.level = 26;
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::LevelTooHigh)
        );
        let config = CaptureConfig {
            min_creature_level: 30,
            ..CaptureConfig::default()
        };
        target.level = 20;
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::LevelTooLow)
        );
    }

    #[test]
    fn combat_with_owner_is_allowed_but_not_with_others() {
        let (world, owner, mut target) = world_with(CreatureRank::Normal, CreatureKind::Beast);
        let config = CaptureConfig::default();
        target.in_combat = true;
        target.victim = Some(owner.handle);
        assert_eq!(can_capture(&world, &owner, Some(&target), &config), Ok(()));
        target.victim = Some(contracts::EntityHandle(0xDEAD));
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::InCombatWithOther)
        );
    }

    #[test]
    fn distance_limit_and_other_contexts() {
        let (world, owner, mut target) = world_with(CreatureRank::Normal, CreatureKind::Beast);
        let config = CaptureConfig::default();
        target.position = Position::new(0, 30.0, 0.0, 0.0);
        assert_eq!(can_capture(&world, &owner, Some(&target), &config), Ok(()));
        target.position = Position::new(0, 30.5, 0.0, 0.0);
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::TooFar)
        );
        target.position = Position::new(1, 1.0, 0.0, 0.0);
        assert_eq!(
            can_capture(&world, &owner, Some(&target), &config),
            Err(CaptureRefusal::TooFar)
        );
    }
}
