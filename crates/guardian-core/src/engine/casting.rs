//! Spell selection and casting from the guardian's loadout.

use std::ops::Range;

use contracts::{SpellInfo, UnitState};
use rand::Rng;
use tracing::debug;

use super::{AllyGuardian, GuardianEngine, ALLY_BUFF_RANGE, COMBAT_HEAL_THRESHOLD_PCT};
use crate::host::HostWorld;

pub const MIN_SPELL_COOLDOWN_MS: u32 = 2000;
pub const MIN_HEAL_COOLDOWN_MS: u32 = 10_000;
pub const COOLDOWN_JITTER_MS: Range<u32> = 500..1500;

/// Cooldown applied after a successful cast: the spell's longest recovery,
/// raised to the floor, plus jitter so guardians do not cast in lockstep.
pub fn cast_cooldown<R: Rng + ?Sized>(spell: &SpellInfo, is_heal: bool, rng: &mut R) -> u32 {
    let recovery = spell
        .recovery_ms
        .max(spell.category_recovery_ms)
        .max(spell.start_recovery_ms);
    let floor = if is_heal {
        MIN_HEAL_COOLDOWN_MS
    } else {
        MIN_SPELL_COOLDOWN_MS
    };
    recovery.max(floor) + rng.gen_range(COOLDOWN_JITTER_MS)
}

fn in_range(spell: &SpellInfo, me: &UnitState, target: &UnitState) -> bool {
    spell.max_range <= 0.0 || me.distance_to(target) <= spell.max_range
}

impl GuardianEngine {
    /// Loadout spells, in loadout order, that exist and are off cooldown.
    fn ready_spells<W, F>(&self, world: &W, filter: F) -> Vec<SpellInfo>
    where
        W: HostWorld + ?Sized,
        F: Fn(&SpellInfo) -> bool,
    {
        self.loadout
            .spells()
            .filter_map(|id| world.spell(id))
            .filter(|spell| !world.has_spell_cooldown(self.me, spell.id))
            .filter(|spell| filter(spell))
            .collect()
    }

    fn try_cast<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        target: &UnitState,
        spell: &SpellInfo,
        is_heal: bool,
    ) -> bool {
        if !world.cast_spell(self.me, target.handle, spell.id) {
            return false;
        }
        let cooldown = cast_cooldown(spell, is_heal, &mut self.rng);
        world.add_spell_cooldown(self.me, spell.id, cooldown);
        debug!(
            guardian = %self.me,
            spell = spell.id,
            target = %target.handle,
            cooldown_ms = cooldown,
            "guardian cast"
        );
        true
    }

    /// First castable offensive spell; a refused cast moves on to the next entry.
    /// Periodic effects this guardian already has on the target are skipped.
    pub(super) fn cast_offensive<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        me: &UnitState,
        target: &UnitState,
    ) -> bool {
        let me_handle = self.me;
        let candidates = self.ready_spells(&*world, |spell| {
            spell.is_offensive() && spell.usable_in_combat && in_range(spell, me, target)
        });
        for spell in candidates {
            if spell.periodic_damage && world.has_aura(target.handle, spell.id, Some(me_handle)) {
                continue;
            }
            if self.try_cast(world, target, &spell, false) {
                return true;
            }
        }
        false
    }

    /// Re-apply a missing self buff.
    pub(super) fn cast_self_buff<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        me: &UnitState,
    ) -> bool {
        let candidates = self.ready_spells(&*world, |spell| spell.is_buff() && spell.applies_aura);
        for spell in candidates {
            if world.has_aura(self.me, spell.id, None) {
                continue;
            }
            if self.try_cast(world, me, &spell, false) {
                return true;
            }
        }
        false
    }

    pub(super) fn cast_heal_on<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        me: &UnitState,
        target: &UnitState,
    ) -> bool {
        let candidates = self.ready_spells(&*world, |spell| spell.is_heal() && in_range(spell, me, target));
        for spell in candidates {
            if self.try_cast(world, target, &spell, true) {
                return true;
            }
        }
        false
    }

    /// Healer priorities while engaged: heal, self buff, ally buff, debuff.
    /// Returns true when one of them produced a cast.
    pub(super) fn healer_support<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        me: &UnitState,
        owner: Option<&UnitState>,
        target: &UnitState,
        allies: &[AllyGuardian],
    ) -> bool {
        if let Some(patient) = self.pick_heal_target(&*world, me, owner, allies) {
            if self.cast_heal_on(world, me, &patient) {
                return true;
            }
        }
        if self.cast_self_buff(world, me) {
            return true;
        }
        if self.cast_ally_buff(world, me, owner, allies) {
            return true;
        }
        self.cast_debuff(world, me, target)
    }

    /// Owner first, then self, then the most wounded ally guardian.
    fn pick_heal_target<W: HostWorld + ?Sized>(
        &self,
        world: &W,
        me: &UnitState,
        owner: Option<&UnitState>,
        allies: &[AllyGuardian],
    ) -> Option<UnitState> {
        let wounded = |unit: &UnitState| unit.alive && unit.health_pct() < COMBAT_HEAL_THRESHOLD_PCT;

        if let Some(owner) = owner.filter(|o| wounded(*o)) {
            return Some(owner.clone());
        }
        if wounded(me) {
            return Some(me.clone());
        }
        allies
            .iter()
            .filter(|ally| ally.handle != self.me)
            .filter_map(|ally| world.unit(ally.handle))
            .filter(|unit| wounded(unit))
            .min_by(|a, b| a.health_pct().total_cmp(&b.health_pct()))
    }

    fn cast_ally_buff<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        me: &UnitState,
        owner: Option<&UnitState>,
        allies: &[AllyGuardian],
    ) -> bool {
        let mut recipients = owner.into_iter().cloned().collect::<Vec<_>>();
        recipients.extend(
            allies
                .iter()
                .filter(|ally| ally.handle != self.me)
                .filter_map(|ally| world.unit(ally.handle)),
        );
        recipients.retain(|unit| unit.alive && me.distance_to(unit) <= ALLY_BUFF_RANGE);
        if recipients.is_empty() {
            return false;
        }

        let candidates = self.ready_spells(&*world, |spell| spell.is_buff() && spell.applies_aura);
        for spell in candidates {
            let missing = recipients
                .iter()
                .find(|unit| !world.has_aura(unit.handle, spell.id, None))
                .cloned();
            if let Some(recipient) = missing {
                if self.try_cast(world, &recipient, &spell, false) {
                    return true;
                }
            }
        }
        false
    }

    fn cast_debuff<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        me: &UnitState,
        target: &UnitState,
    ) -> bool {
        let candidates =
            self.ready_spells(&*world, |spell| spell.is_debuff() && in_range(spell, me, target));
        for spell in candidates {
            if world.has_aura(target.handle, spell.id, Some(self.me)) {
                continue;
            }
            if self.try_cast(world, target, &spell, false) {
                return true;
            }
        }
        false
    }
}
