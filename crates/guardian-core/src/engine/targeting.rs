//! Threat scanning, engagement, and control of units the guardian summons.

use contracts::{Archetype, EntityHandle, UnitState};
use tracing::debug;

use super::{
    AllyGuardian, EngineState, GuardianEngine, SELF_DEFENSE_THREAT, SUMMON_CHECK_INTERVAL_MS,
    TANK_HOLD_THREAT, TANK_PULL_THREAT,
};
use crate::host::HostWorld;

impl GuardianEngine {
    /// Pick a new target in priority order and engage it. Returns true on engagement.
    pub(super) fn scan_for_threats<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        me: &UnitState,
        owner: &UnitState,
        allies: &[AllyGuardian],
    ) -> bool {
        let live = |world: &W, handle: EntityHandle| {
            world.unit(handle).is_some_and(|u| u.alive) && world.can_attack(me.handle, handle)
        };

        if let Some(attacker) = world
            .attacker_for_helper(owner.handle)
            .filter(|h| live(&*world, *h))
        {
            if self.archetype == Archetype::Tank {
                world.add_threat(attacker, self.me, TANK_PULL_THREAT);
            }
            return self.engage(world, attacker);
        }

        if let Some(victim) = owner.victim.filter(|h| live(&*world, *h)) {
            return self.engage(world, victim);
        }

        for ally in allies.iter().filter(|ally| ally.handle != self.me) {
            let attacker = world
                .attackers(ally.handle)
                .into_iter()
                .find(|h| live(&*world, *h));
            if let Some(attacker) = attacker {
                return self.engage(world, attacker);
            }
        }

        let own_attacker = world
            .attackers(self.me)
            .into_iter()
            .find(|h| live(&*world, *h));
        if let Some(attacker) = own_attacker {
            world.add_threat(attacker, self.me, SELF_DEFENSE_THREAT);
            return self.engage(world, attacker);
        }

        false
    }

    /// Start attacking `target`. Healers stand and face; melee archetypes chase.
    pub(super) fn engage<W: HostWorld + ?Sized>(&mut self, world: &mut W, target: EntityHandle) -> bool {
        if !world.can_attack(self.me, target) || !world.attack(self.me, target) {
            return false;
        }
        if self.archetype == Archetype::Healer {
            world.face(self.me, target);
        } else {
            world.move_chase(self.me, target);
        }
        self.state = EngineState::Engaged(target);
        debug!(guardian = %self.me, target = %target, archetype = %self.archetype, "guardian engaged");
        true
    }

    /// Tank upkeep: pull enemies off the owner and off healer guardians.
    pub(super) fn hold_threat<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        owner: Option<&UnitState>,
        allies: &[AllyGuardian],
    ) {
        let mut protected = allies
            .iter()
            .filter(|ally| ally.archetype == Archetype::Healer && ally.handle != self.me)
            .map(|ally| ally.handle)
            .collect::<Vec<_>>();
        if let Some(owner) = owner {
            protected.push(owner.handle);
        }

        for enemy in world.threat_list(self.me) {
            let hitting_protected = world
                .unit(enemy)
                .and_then(|u| u.victim)
                .is_some_and(|victim| protected.contains(&victim));
            if hitting_protected {
                world.add_threat(enemy, self.me, TANK_HOLD_THREAT);
            }
        }
    }

    /// Take control of a unit this guardian summoned.
    pub fn adopt_summon<W: HostWorld + ?Sized>(&mut self, world: &mut W, summon: EntityHandle) {
        world.adopt(summon, self.owner);
        if let Some(victim) = world.unit(self.me).and_then(|me| me.victim) {
            world.attack(summon, victim);
        }
        if !self.summons.contains(&summon) {
            self.summons.push(summon);
        }
        debug!(guardian = %self.me, summon = %summon, "summon adopted");
    }

    /// Drop dead summons and stop any that turned on the owner.
    pub(super) fn manage_summons<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        diff: i64,
        victim: Option<EntityHandle>,
    ) {
        self.summon_check_timer -= diff;
        if self.summon_check_timer > 0 {
            return;
        }
        self.summon_check_timer = SUMMON_CHECK_INTERVAL_MS;

        self.summons
            .retain(|h| world.unit(*h).is_some_and(|u| u.alive && u.in_world));
        if self.summons.is_empty() {
            return;
        }

        let Some(owner_faction) = world.unit(self.owner).map(|o| o.faction) else {
            return;
        };
        for summon in self.summons.clone() {
            let hostile_to_owner = world
                .unit(summon)
                .is_some_and(|u| u.victim == Some(self.owner));
            if !hostile_to_owner {
                continue;
            }
            world.clear_threat(summon);
            world.attack_stop(summon);
            world.set_faction(summon, owner_faction);
            if let Some(victim) = victim {
                world.attack(summon, victim);
            }
        }
    }
}
