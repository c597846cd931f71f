//! Per-guardian behavior engine: timer-driven follow, threat scanning, archetype
//! combat routines, regeneration, and adoption of the guardian's own summons.

mod casting;
mod targeting;


use std::f32::consts::{FRAC_PI_2, PI};

use contracts::{Archetype, EntityHandle, Loadout, PowerType, SpellId, UnitState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::host::HostWorld;

pub use casting::cast_cooldown;

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

pub const OWNER_CHECK_INTERVAL_MS: i64 = 1000;
pub const THREAT_SCAN_INTERVAL_MS: i64 = 500;
pub const REGEN_INTERVAL_MS: i64 = 2000;
pub const SUMMON_CHECK_INTERVAL_MS: i64 = 500;
/// First summon check after spawn, before the regular interval applies.
pub const SUMMON_CHECK_INITIAL_MS: i64 = 1000;

/// Owner further than this gets the guardian teleported back.
pub const LEASH_DISTANCE: f32 = 50.0;
/// A guardian further than this from its owner drops its target.
pub const ENGAGE_RANGE: f32 = 40.0;
/// Healers only buff allies within this radius.
pub const ALLY_BUFF_RANGE: f32 = 30.0;

pub const MELEE_FOLLOW_DISTANCE: f32 = 3.0;
pub const HEALER_FOLLOW_DISTANCE: f32 = 12.0;

pub const REGEN_PCT: u32 = 6;
pub const COMBAT_HEAL_THRESHOLD_PCT: f32 = 50.0;
pub const PROACTIVE_HEAL_THRESHOLD_PCT: f32 = 80.0;

pub const TANK_PULL_THREAT: f32 = 200.0;
pub const SELF_DEFENSE_THREAT: f32 = 100.0;
pub const TANK_HOLD_THREAT: f32 = 50.0;

pub const DEATH_NOTICE: &str = "Your captured guardian has died.";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Following,
    Engaged(EntityHandle),
}

/// Outcome of one engine tick, for the owning registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Running,
    /// The guardian is a corpse; the slot stays bound until summon or release.
    Dead,
    /// The guardian left the world; the slot's active reference must be cleared.
    Despawned,
}

/// Another active guardian of the same owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllyGuardian {
    pub slot: u8,
    pub handle: EntityHandle,
    pub archetype: Archetype,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FollowOffset {
    pub distance: f32,
    pub angle: f32,
}

/// Melee archetypes stay close behind-left, healers hang back; each slot rotates
/// a quarter turn so guardians do not stack.
pub fn follow_offset(archetype: Archetype, slot: u8) -> FollowOffset {
    let (distance, base_angle) = match archetype {
        Archetype::Healer => (HEALER_FOLLOW_DISTANCE, PI),
        Archetype::Dps | Archetype::Tank => (MELEE_FOLLOW_DISTANCE, FRAC_PI_2),
    };
    FollowOffset {
        distance,
        angle: base_angle + f32::from(slot) * FRAC_PI_2,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GuardianEngine {
    me: EntityHandle,
    owner: EntityHandle,
    slot: u8,
    archetype: Archetype,
    loadout: Loadout,
    state: EngineState,
    owner_check_timer: i64,
    threat_scan_timer: i64,
    regen_timer: i64,
    summon_check_timer: i64,
    summons: Vec<EntityHandle>,
    death_notified: bool,
    rng: StdRng,
}

impl GuardianEngine {
    pub fn new(
        me: EntityHandle,
        owner: EntityHandle,
        slot: u8,
        archetype: Archetype,
        loadout: Loadout,
    ) -> Self {
        Self {
            me,
            owner,
            slot,
            archetype,
            loadout,
            state: EngineState::Following,
            owner_check_timer: OWNER_CHECK_INTERVAL_MS,
            threat_scan_timer: THREAT_SCAN_INTERVAL_MS,
            regen_timer: REGEN_INTERVAL_MS,
            summon_check_timer: SUMMON_CHECK_INITIAL_MS,
            summons: Vec::new(),
            death_notified: false,
            rng: StdRng::seed_from_u64(me.0 ^ (u64::from(slot) << 56)),
        }
    }

    pub fn handle(&self) -> EntityHandle {
        self.me
    }

    pub fn owner(&self) -> EntityHandle {
        self.owner
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    pub fn loadout(&self) -> Loadout {
        self.loadout
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn summons(&self) -> &[EntityHandle] {
        &self.summons
    }

    pub fn follow_offset(&self) -> FollowOffset {
        follow_offset(self.archetype, self.slot)
    }

    /// Zero-based loadout write.
    pub fn set_spell(&mut self, index: usize, spell_id: SpellId) {
        self.loadout.set(index, spell_id);
    }

    /// Switch behavior. Outside combat the follow offset is re-applied at once.
    pub fn set_archetype<W: HostWorld + ?Sized>(&mut self, world: &mut W, archetype: Archetype) {
        self.archetype = archetype;
        let engaged = world.unit(self.me).is_some_and(|me| me.victim.is_some());
        if !engaged {
            self.start_follow(world);
        }
    }

    /// Begin following the owner at this guardian's offset.
    pub fn start_follow<W: HostWorld + ?Sized>(&mut self, world: &mut W) {
        let offset = self.follow_offset();
        world.move_follow(self.me, self.owner, offset.distance, offset.angle);
        self.state = EngineState::Following;
    }

    /// Tell the owner once that this guardian died.
    pub fn notify_death<W: HostWorld + ?Sized>(&mut self, world: &mut W) {
        if self.death_notified {
            return;
        }
        self.death_notified = true;
        world.notify(self.owner, DEATH_NOTICE);
        info!(guardian = %self.me, slot = self.slot, "guardian died");
    }

    /// Any damage the guardian deals credits its owner for kill and loot.
    pub fn on_damage_dealt<W: HostWorld + ?Sized>(&mut self, world: &mut W, victim: EntityHandle) {
        world.credit_owner(victim, self.owner);
    }

    // ---------------------------------------------------------------------
    // Tick
    // ---------------------------------------------------------------------

    pub fn update<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        diff_ms: u32,
        allies: &[AllyGuardian],
    ) -> EngineStatus {
        let Some(me) = world.unit(self.me) else {
            return EngineStatus::Despawned;
        };
        if !me.alive {
            self.notify_death(world);
            return EngineStatus::Dead;
        }
        let diff = i64::from(diff_ms);

        self.owner_check_timer -= diff;
        if self.owner_check_timer <= 0 {
            self.owner_check_timer = OWNER_CHECK_INTERVAL_MS;
            match world.unit(self.owner).filter(|owner| owner.in_world) {
                None => {
                    debug!(guardian = %self.me, "owner gone, despawning");
                    world.despawn(self.me);
                    return EngineStatus::Despawned;
                }
                Some(owner) => {
                    if me.distance_to(&owner) > LEASH_DISTANCE {
                        let offset = self.follow_offset();
                        world.near_teleport(
                            self.me,
                            owner.position.offset(offset.distance, offset.angle),
                        );
                        self.start_follow(world);
                    }
                }
            }
        }

        let owner = world.unit(self.owner).filter(|owner| owner.in_world);
        let me = world.unit(self.me).unwrap_or(me);

        match me.victim {
            Some(victim) => self.update_engaged(world, &me, owner.as_ref(), victim, allies),
            None => self.update_following(world, &me, owner.as_ref(), diff, allies),
        }

        let victim = world.unit(self.me).and_then(|me| me.victim);
        self.manage_summons(world, diff, victim);
        EngineStatus::Running
    }

    fn update_following<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        me: &UnitState,
        owner: Option<&UnitState>,
        diff: i64,
        allies: &[AllyGuardian],
    ) {
        self.state = EngineState::Following;

        self.regen_timer -= diff;
        if self.regen_timer <= 0 {
            self.regen_timer = REGEN_INTERVAL_MS;
            if !me.in_combat {
                self.regenerate(world, me);
            }
        }

        self.threat_scan_timer -= diff;
        if self.threat_scan_timer <= 0 {
            self.threat_scan_timer = THREAT_SCAN_INTERVAL_MS;
            if let Some(owner) = owner {
                if self.scan_for_threats(world, me, owner, allies) {
                    return;
                }
                if self.archetype == Archetype::Healer
                    && owner.alive
                    && owner.health_pct() < PROACTIVE_HEAL_THRESHOLD_PCT
                    && !me.casting
                {
                    self.cast_heal_on(world, me, owner);
                }
            }
        }

        if owner.is_some() && !world.is_following(self.me) {
            self.start_follow(world);
        }
    }

    fn update_engaged<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        me: &UnitState,
        owner: Option<&UnitState>,
        victim: EntityHandle,
        allies: &[AllyGuardian],
    ) {
        self.state = EngineState::Engaged(victim);

        let target = world
            .unit(victim)
            .filter(|t| t.alive && world.can_attack(self.me, victim));
        let too_far = owner.is_some_and(|o| me.distance_to(o) > ENGAGE_RANGE);
        let Some(target) = target.filter(|_| !too_far) else {
            self.evade(world, owner.is_some());
            return;
        };

        match self.archetype {
            Archetype::Dps => {
                world.melee_attack_if_ready(self.me);
                if !me.casting {
                    self.cast_offensive(world, me, &target);
                }
            }
            Archetype::Tank => {
                world.melee_attack_if_ready(self.me);
                self.hold_threat(world, owner, allies);
                if !me.casting && !self.cast_self_buff(world, me) {
                    self.cast_offensive(world, me, &target);
                }
            }
            Archetype::Healer => {
                if !me.casting && self.healer_support(world, me, owner, &target, allies) {
                    return;
                }
                world.melee_attack_if_ready(self.me);
                if !me.casting {
                    self.cast_offensive(world, me, &target);
                }
            }
        }
    }

    /// Drop the target and fall back to following.
    fn evade<W: HostWorld + ?Sized>(&mut self, world: &mut W, has_owner: bool) {
        world.attack_stop(self.me);
        world.stop_moving(self.me);
        self.state = EngineState::Following;
        if has_owner {
            self.start_follow(world);
        }
    }

    fn regenerate<W: HostWorld + ?Sized>(&mut self, world: &mut W, me: &UnitState) {
        if me.health < me.max_health {
            let gain = (me.max_health * REGEN_PCT / 100).max(1);
            world.set_health(self.me, me.health.saturating_add(gain).min(me.max_health));
        }
        if me.power_type == PowerType::Mana && me.max_power > 0 && me.power < me.max_power {
            let gain = (me.max_power * REGEN_PCT / 100).max(1);
            world.set_power(
                self.me,
                PowerType::Mana,
                me.power.saturating_add(gain).min(me.max_power),
            );
        }
    }
}
