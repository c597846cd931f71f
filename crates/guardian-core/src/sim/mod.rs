//! Deterministic in-memory host world.
//!
//! Backs the CLI simulation and the test suites. Motion is instantaneous, melee
//! swings on a fixed timer, and hostile creatures attack whoever they hold the
//! most threat against.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{
    CreatureTemplate, EntityHandle, Position, PowerType, SpawnRequest, SpellId, SpellInfo,
    TemplateId, UnitState,
};

use crate::host::HostWorld;

pub mod catalog;

pub const PLAYER_FACTION: u32 = 1;
pub const HOSTILE_FACTION: u32 = 14;
pub const MELEE_SWING_MS: u64 = 2000;
pub const MELEE_REACH: f32 = 5.0;

const FIRST_HANDLE: u64 = 0x1000;

#[derive(Debug, Clone, PartialEq)]
pub struct CastRecord {
    pub at_ms: u64,
    pub caster: EntityHandle,
    pub target: EntityHandle,
    pub spell_id: SpellId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Follow {
    leader: EntityHandle,
    distance: f32,
    angle: f32,
}

#[derive(Debug, Clone)]
struct SimUnit {
    state: UnitState,
    threat: BTreeMap<EntityHandle, f32>,
    follow: Option<Follow>,
    chasing: Option<EntityHandle>,
    melee_damage: u32,
    next_swing_ms: u64,
    despawn_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    now_ms: u64,
    next_handle: u64,
    units: BTreeMap<EntityHandle, SimUnit>,
    templates: BTreeMap<TemplateId, CreatureTemplate>,
    template_power: BTreeMap<TemplateId, PowerType>,
    spells: BTreeMap<SpellId, SpellInfo>,
    auras: BTreeSet<(EntityHandle, SpellId, EntityHandle)>,
    cooldowns: BTreeMap<(EntityHandle, SpellId), u64>,
    cooldown_log: Vec<(EntityHandle, SpellId, u32)>,
    casts: Vec<CastRecord>,
    notifications: Vec<(EntityHandle, String)>,
    credits: Vec<(EntityHandle, EntityHandle)>,
    spawn_fails: bool,
}

impl SimWorld {
    pub fn new() -> Self {
        Self {
            next_handle: FIRST_HANDLE,
            ..Self::default()
        }
    }

    // ---------------------------------------------------------------------
    // Setup
    // ---------------------------------------------------------------------

    pub fn add_template(&mut self, template: CreatureTemplate) {
        self.templates.insert(template.id, template);
    }

    /// Resource pool creatures of this template spawn with. Mana when unset.
    pub fn set_template_power(&mut self, template_id: TemplateId, power_type: PowerType) {
        self.template_power.insert(template_id, power_type);
    }

    pub fn add_spell(&mut self, spell: SpellInfo) {
        self.spells.insert(spell.id, spell);
    }

    pub fn spawn_player(&mut self, name: &str, level: u8, position: Position) -> EntityHandle {
        let handle = self.allocate_handle();
        let max_health = u32::from(level) * 50 + 100;
        let max_power = u32::from(level) * 20 + 100;
        let state = UnitState {
            handle,
            template_id: None,
            name: name.to_string(),
            level,
            alive: true,
            in_world: true,
            is_player: true,
            is_pet: false,
            is_guardian: false,
            is_summon: false,
            position,
            health: max_health,
            max_health,
            power_type: PowerType::Mana,
            power: max_power,
            max_power,
            in_combat: false,
            casting: false,
            victim: None,
            owner: None,
            faction: PLAYER_FACTION,
            display_id: None,
            equipment_id: None,
        };
        self.insert_unit(state, u32::from(level) * 3 + 10, None);
        handle
    }

    /// Hostile creature of a registered template. Unknown templates spawn with a placeholder name.
    pub fn spawn_creature(
        &mut self,
        template_id: TemplateId,
        level: u8,
        position: Position,
    ) -> EntityHandle {
        let handle = self.allocate_handle();
        let name = self
            .templates
            .get(&template_id)
            .map(|t| t.name.clone())
            .unwrap_or_else(|| format!("Creature {template_id}"));
        let power_type = self.power_type_of(template_id);
        let (max_health, power, max_power) = creature_pools(level, 100, power_type);
        let state = UnitState {
            handle,
            template_id: Some(template_id),
            name,
            level,
            alive: true,
            in_world: true,
            is_player: false,
            is_pet: false,
            is_guardian: false,
            is_summon: false,
            position,
            health: max_health,
            max_health,
            power_type,
            power,
            max_power,
            in_combat: false,
            casting: false,
            victim: None,
            owner: None,
            faction: HOSTILE_FACTION,
            display_id: Some(template_id * 10),
            equipment_id: None,
        };
        self.insert_unit(state, u32::from(level) * 2 + 5, None);
        handle
    }

    /// A creature spawned by `caster`, e.g. a totem or summoned minion.
    pub fn spawn_summon(
        &mut self,
        caster: EntityHandle,
        template_id: TemplateId,
        level: u8,
    ) -> Option<EntityHandle> {
        let position = self.units.get(&caster)?.state.position;
        let handle = self.spawn_creature(template_id, level, position.offset(1.0, 0.0));
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.state.is_summon = true;
            unit.state.owner = Some(caster);
        }
        Some(handle)
    }

    /// Place an aura directly, as if `caster` had cast `spell_id` on `target` earlier.
    pub fn apply_aura(&mut self, target: EntityHandle, spell_id: SpellId, caster: EntityHandle) {
        self.auras.insert((target, spell_id, caster));
    }

    pub fn set_spawn_fails(&mut self, fails: bool) {
        self.spawn_fails = fails;
    }

    pub fn unit_mut(&mut self, handle: EntityHandle) -> Option<&mut UnitState> {
        self.units.get_mut(&handle).map(|unit| &mut unit.state)
    }

    pub fn kill(&mut self, handle: EntityHandle) {
        let health = self.units.get(&handle).map(|u| u.state.health).unwrap_or(0);
        self.damage(handle, health.max(1));
    }

    /// Move a unit to another context, as a far teleport would.
    pub fn transfer(&mut self, handle: EntityHandle, destination: Position) {
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.state.position = destination;
            unit.state.victim = None;
            unit.state.in_combat = false;
            unit.threat.clear();
        }
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn exists(&self, handle: EntityHandle) -> bool {
        self.units.contains_key(&handle)
    }

    pub fn live_guardians_of(&self, owner: EntityHandle) -> Vec<EntityHandle> {
        self.units
            .values()
            .filter(|u| u.state.is_guardian && u.state.owner == Some(owner))
            .map(|u| u.state.handle)
            .collect()
    }

    pub fn casts(&self) -> &[CastRecord] {
        &self.casts
    }

    pub fn casts_of(&self, spell_id: SpellId) -> Vec<&CastRecord> {
        self.casts.iter().filter(|c| c.spell_id == spell_id).collect()
    }

    pub fn cooldown_log(&self) -> &[(EntityHandle, SpellId, u32)] {
        &self.cooldown_log
    }

    pub fn notifications(&self) -> &[(EntityHandle, String)] {
        &self.notifications
    }

    pub fn credits(&self) -> &[(EntityHandle, EntityHandle)] {
        &self.credits
    }

    pub fn threat_of(&self, holder: EntityHandle, target: EntityHandle) -> f32 {
        self.units
            .get(&holder)
            .and_then(|u| u.threat.get(&target).copied())
            .unwrap_or(0.0)
    }

    pub fn follow_of(&self, handle: EntityHandle) -> Option<(EntityHandle, f32, f32)> {
        self.units
            .get(&handle)
            .and_then(|u| u.follow)
            .map(|f| (f.leader, f.distance, f.angle))
    }

    pub fn chase_target_of(&self, handle: EntityHandle) -> Option<EntityHandle> {
        self.units.get(&handle).and_then(|u| u.chasing)
    }

    // ---------------------------------------------------------------------
    // Simulation
    // ---------------------------------------------------------------------

    /// Move the clock only.
    pub fn advance_clock(&mut self, diff_ms: u64) {
        self.now_ms += diff_ms;
    }

    /// Move the clock, expire lifespans, resolve motion, and run hostile creatures.
    pub fn advance(&mut self, diff_ms: u64) {
        self.now_ms += diff_ms;

        let expired = self
            .units
            .values()
            .filter(|u| u.despawn_at_ms.is_some_and(|at| at <= self.now_ms))
            .map(|u| u.state.handle)
            .collect::<Vec<_>>();
        for handle in expired {
            self.despawn(handle);
        }

        let handles = self.units.keys().copied().collect::<Vec<_>>();
        for handle in &handles {
            self.resolve_motion(*handle);
        }
        for handle in handles {
            self.run_hostile(handle);
        }
    }

    fn resolve_motion(&mut self, handle: EntityHandle) {
        let Some(unit) = self.units.get(&handle) else {
            return;
        };
        if !unit.state.alive {
            return;
        }
        let destination = if let Some(target) = unit.chasing {
            self.units
                .get(&target)
                .filter(|t| t.state.position.context_id == unit.state.position.context_id)
                .map(|t| t.state.position.offset(MELEE_REACH * 0.5, 0.0))
        } else if let Some(follow) = unit.follow {
            self.units
                .get(&follow.leader)
                .filter(|l| l.state.position.context_id == unit.state.position.context_id)
                .map(|l| l.state.position.offset(follow.distance, follow.angle))
        } else {
            None
        };
        if let (Some(destination), Some(unit)) = (destination, self.units.get_mut(&handle)) {
            unit.state.position = destination;
        }
    }

    fn run_hostile(&mut self, handle: EntityHandle) {
        let Some(unit) = self.units.get(&handle) else {
            return;
        };
        if unit.state.is_player || unit.state.is_guardian || !unit.state.alive {
            return;
        }
        let top = unit
            .threat
            .iter()
            .filter(|(target, _)| self.can_attack(handle, **target))
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(target, _)| *target);
        if let Some(target) = top {
            if unit.state.victim != Some(target) {
                self.attack(handle, target);
                self.move_chase(handle, target);
            }
            self.resolve_motion(handle);
            self.melee_attack_if_ready(handle);
        }
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn allocate_handle(&mut self) -> EntityHandle {
        if self.next_handle < FIRST_HANDLE {
            self.next_handle = FIRST_HANDLE;
        }
        let handle = EntityHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn insert_unit(&mut self, state: UnitState, melee_damage: u32, despawn_at_ms: Option<u64>) {
        self.units.insert(
            state.handle,
            SimUnit {
                state,
                threat: BTreeMap::new(),
                follow: None,
                chasing: None,
                melee_damage,
                next_swing_ms: 0,
                despawn_at_ms,
            },
        );
    }

    fn power_type_of(&self, template_id: TemplateId) -> PowerType {
        self.template_power
            .get(&template_id)
            .copied()
            .unwrap_or_default()
    }

    fn same_context(&self, a: EntityHandle, b: EntityHandle) -> bool {
        match (self.units.get(&a), self.units.get(&b)) {
            (Some(a), Some(b)) => a.state.position.context_id == b.state.position.context_id,
            _ => false,
        }
    }

    fn distance(&self, a: EntityHandle, b: EntityHandle) -> f32 {
        match (self.units.get(&a), self.units.get(&b)) {
            (Some(a), Some(b)) => a.state.distance_to(&b.state),
            _ => f32::MAX,
        }
    }

    fn damage(&mut self, target: EntityHandle, amount: u32) {
        let Some(unit) = self.units.get_mut(&target) else {
            return;
        };
        unit.state.health = unit.state.health.saturating_sub(amount);
        if unit.state.health > 0 {
            return;
        }
        unit.state.alive = false;
        unit.state.in_combat = false;
        unit.state.victim = None;
        unit.threat.clear();
        unit.follow = None;
        unit.chasing = None;
        self.forget(target);
    }

    /// Drop every reference other units hold to `handle`.
    fn forget(&mut self, handle: EntityHandle) {
        for unit in self.units.values_mut() {
            if unit.state.victim == Some(handle) {
                unit.state.victim = None;
            }
            if unit.chasing == Some(handle) {
                unit.chasing = None;
            }
            if unit.follow.is_some_and(|f| f.leader == handle) {
                unit.follow = None;
            }
            unit.threat.remove(&handle);
            if unit.state.victim.is_none() && unit.threat.is_empty() && !unit.state.is_player {
                unit.state.in_combat = false;
            }
        }
    }
}

fn creature_pools(level: u8, health_pct: u32, power_type: PowerType) -> (u32, u32, u32) {
    let max_health = ((u32::from(level) * 20 + 50) * health_pct / 100).max(1);
    let (power, max_power) = match power_type {
        PowerType::Mana => {
            let max = u32::from(level) * 15 + 50;
            (max, max)
        }
        PowerType::Rage | PowerType::RunicPower => (0, 100),
        PowerType::Energy | PowerType::Focus => (100, 100),
        PowerType::Health => (0, 0),
    };
    (max_health, power, max_power)
}

impl HostWorld for SimWorld {
    fn unit(&self, handle: EntityHandle) -> Option<UnitState> {
        self.units.get(&handle).map(|u| u.state.clone())
    }

    fn template(&self, template_id: TemplateId) -> Option<CreatureTemplate> {
        self.templates.get(&template_id).cloned()
    }

    fn spell(&self, spell_id: SpellId) -> Option<SpellInfo> {
        self.spells.get(&spell_id).cloned()
    }

    fn can_attack(&self, attacker: EntityHandle, target: EntityHandle) -> bool {
        if attacker == target || !self.same_context(attacker, target) {
            return false;
        }
        match (self.units.get(&attacker), self.units.get(&target)) {
            (Some(a), Some(t)) => {
                a.state.alive
                    && t.state.alive
                    && a.state.in_world
                    && t.state.in_world
                    && a.state.faction != t.state.faction
            }
            _ => false,
        }
    }

    fn attacker_for_helper(&self, handle: EntityHandle) -> Option<EntityHandle> {
        self.attackers(handle).into_iter().next()
    }

    fn attackers(&self, handle: EntityHandle) -> Vec<EntityHandle> {
        self.units
            .values()
            .filter(|u| u.state.alive && u.state.victim == Some(handle))
            .map(|u| u.state.handle)
            .collect()
    }

    fn threat_list(&self, handle: EntityHandle) -> Vec<EntityHandle> {
        self.units
            .get(&handle)
            .map(|u| {
                u.threat
                    .keys()
                    .copied()
                    .filter(|t| self.units.get(t).is_some_and(|t| t.state.alive))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn has_aura(
        &self,
        target: EntityHandle,
        spell_id: SpellId,
        caster: Option<EntityHandle>,
    ) -> bool {
        match caster {
            Some(caster) => self.auras.contains(&(target, spell_id, caster)),
            None => self
                .auras
                .iter()
                .any(|(t, s, _)| *t == target && *s == spell_id),
        }
    }

    fn has_spell_cooldown(&self, caster: EntityHandle, spell_id: SpellId) -> bool {
        self.cooldowns
            .get(&(caster, spell_id))
            .is_some_and(|ready_at| *ready_at > self.now_ms)
    }

    fn is_following(&self, handle: EntityHandle) -> bool {
        self.units.get(&handle).is_some_and(|u| u.follow.is_some())
    }

    fn spawn_guardian(
        &mut self,
        owner: EntityHandle,
        request: &SpawnRequest,
    ) -> Option<EntityHandle> {
        if self.spawn_fails {
            return None;
        }
        let template = self.templates.get(&request.template_id)?.clone();
        let owner_faction = self.units.get(&owner)?.state.faction;
        let handle = self.allocate_handle();
        let power_type = request
            .power_type
            .unwrap_or_else(|| self.power_type_of(request.template_id));
        let (max_health, power, max_power) =
            creature_pools(request.level, request.health_pct, power_type);
        let melee_damage =
            ((u32::from(request.level) * 2 + 5) * request.damage_pct / 100).max(1);
        let despawn_at_ms =
            (request.duration_ms > 0).then(|| self.now_ms + u64::from(request.duration_ms));
        let state = UnitState {
            handle,
            template_id: Some(template.id),
            name: template.name,
            level: request.level,
            alive: true,
            in_world: true,
            is_player: false,
            is_pet: false,
            is_guardian: true,
            is_summon: false,
            position: request.position,
            health: max_health,
            max_health,
            power_type,
            power,
            max_power,
            in_combat: false,
            casting: false,
            victim: None,
            owner: Some(owner),
            faction: owner_faction,
            display_id: request.display_override.or(Some(template.id * 10)),
            equipment_id: request.equipment_override,
        };
        self.insert_unit(state, melee_damage, despawn_at_ms);
        Some(handle)
    }

    fn despawn(&mut self, handle: EntityHandle) {
        if self.units.remove(&handle).is_some() {
            self.auras.retain(|(t, _, c)| *t != handle && *c != handle);
            self.forget(handle);
        }
    }

    fn near_teleport(&mut self, handle: EntityHandle, destination: Position) {
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.state.position = destination;
        }
    }

    fn move_follow(&mut self, handle: EntityHandle, leader: EntityHandle, distance: f32, angle: f32) {
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.follow = Some(Follow {
                leader,
                distance,
                angle,
            });
            unit.chasing = None;
        }
    }

    fn move_chase(&mut self, handle: EntityHandle, target: EntityHandle) {
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.chasing = Some(target);
            unit.follow = None;
        }
    }

    fn stop_moving(&mut self, handle: EntityHandle) {
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.chasing = None;
            unit.follow = None;
        }
    }

    fn face(&mut self, handle: EntityHandle, target: EntityHandle) {
        let Some(target_pos) = self.units.get(&target).map(|u| u.state.position) else {
            return;
        };
        if let Some(unit) = self.units.get_mut(&handle) {
            let dx = target_pos.x - unit.state.position.x;
            let dy = target_pos.y - unit.state.position.y;
            unit.state.position.orientation = dy.atan2(dx);
            unit.chasing = None;
            unit.follow = None;
        }
    }

    fn attack(&mut self, attacker: EntityHandle, target: EntityHandle) -> bool {
        if !self.can_attack(attacker, target) {
            return false;
        }
        if let Some(unit) = self.units.get_mut(&attacker) {
            unit.state.victim = Some(target);
            unit.state.in_combat = true;
            unit.threat.entry(target).or_insert(0.0);
        }
        if let Some(unit) = self.units.get_mut(&target) {
            unit.state.in_combat = true;
            unit.threat.entry(attacker).or_insert(0.0);
        }
        true
    }

    fn attack_stop(&mut self, handle: EntityHandle) {
        let attacked = !self.attackers(handle).is_empty();
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.state.victim = None;
            if !attacked && !unit.state.is_player {
                unit.state.in_combat = false;
            }
        }
    }

    fn melee_attack_if_ready(&mut self, attacker: EntityHandle) {
        let Some(unit) = self.units.get(&attacker) else {
            return;
        };
        let Some(victim) = unit.state.victim else {
            return;
        };
        if !unit.state.alive
            || self.now_ms < unit.next_swing_ms
            || self.distance(attacker, victim) > MELEE_REACH
        {
            return;
        }
        let damage = unit.melee_damage;
        if let Some(unit) = self.units.get_mut(&attacker) {
            unit.next_swing_ms = self.now_ms + MELEE_SWING_MS;
        }
        if let Some(target) = self.units.get_mut(&victim) {
            *target.threat.entry(attacker).or_insert(0.0) += damage as f32;
        }
        self.damage(victim, damage);
    }

    fn add_threat(&mut self, holder: EntityHandle, target: EntityHandle, amount: f32) {
        if let Some(unit) = self.units.get_mut(&holder) {
            *unit.threat.entry(target).or_insert(0.0) += amount;
        }
    }

    fn clear_threat(&mut self, handle: EntityHandle) {
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.threat.clear();
        }
    }

    fn cast_spell(&mut self, caster: EntityHandle, target: EntityHandle, spell_id: SpellId) -> bool {
        let Some(spell) = self.spells.get(&spell_id).cloned() else {
            return false;
        };
        let (Some(caster_state), Some(target_state)) = (
            self.units.get(&caster).map(|u| u.state.clone()),
            self.units.get(&target).map(|u| u.state.clone()),
        ) else {
            return false;
        };
        if !caster_state.alive || !target_state.alive || !self.same_context(caster, target) {
            return false;
        }
        if spell.max_range > 0.0 && caster_state.distance_to(&target_state) > spell.max_range {
            return false;
        }
        if spell.is_offensive() && !self.can_attack(caster, target) {
            return false;
        }

        if spell.costs_resource() {
            if spell.power_type == PowerType::Health {
                if caster_state.health <= spell.power_cost {
                    return false;
                }
                self.set_health(caster, caster_state.health - spell.power_cost);
            } else {
                if spell.power_type != caster_state.power_type {
                    return false;
                }
                let cost =
                    spell.power_cost + caster_state.max_power * spell.power_cost_pct / 100;
                if caster_state.power < cost {
                    return false;
                }
                self.set_power(caster, caster_state.power_type, caster_state.power - cost);
            }
        }

        if spell.heals {
            let healed = target_state
                .health
                .saturating_add(spell.base_points)
                .min(target_state.max_health);
            self.set_health(target, healed);
        }
        if spell.applies_aura {
            self.auras.insert((target, spell_id, caster));
        }
        if spell.is_offensive() {
            if let Some(unit) = self.units.get_mut(&target) {
                unit.state.in_combat = true;
                *unit.threat.entry(caster).or_insert(0.0) += spell.base_points.max(1) as f32;
            }
            if spell.deals_damage {
                self.damage(target, spell.base_points);
            }
        }

        self.casts.push(CastRecord {
            at_ms: self.now_ms,
            caster,
            target,
            spell_id,
        });
        true
    }

    fn add_spell_cooldown(&mut self, caster: EntityHandle, spell_id: SpellId, duration_ms: u32) {
        self.cooldowns
            .insert((caster, spell_id), self.now_ms + u64::from(duration_ms));
        self.cooldown_log.push((caster, spell_id, duration_ms));
    }

    fn set_health(&mut self, handle: EntityHandle, health: u32) {
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.state.health = health.min(unit.state.max_health);
        }
    }

    fn set_power(&mut self, handle: EntityHandle, power_type: PowerType, value: u32) {
        if let Some(unit) = self.units.get_mut(&handle) {
            if unit.state.power_type == power_type {
                unit.state.power = value.min(unit.state.max_power);
            }
        }
    }

    fn set_power_type(&mut self, handle: EntityHandle, power_type: PowerType) {
        if let Some(unit) = self.units.get_mut(&handle) {
            let (_, power, max_power) = creature_pools(unit.state.level, 100, power_type);
            unit.state.power_type = power_type;
            unit.state.max_power = max_power;
            unit.state.power = power;
        }
    }

    fn adopt(&mut self, summon: EntityHandle, owner: EntityHandle) {
        let Some(faction) = self.units.get(&owner).map(|u| u.state.faction) else {
            return;
        };
        if let Some(unit) = self.units.get_mut(&summon) {
            unit.state.owner = Some(owner);
            unit.state.faction = faction;
            unit.state.is_summon = true;
            unit.threat.clear();
        }
    }

    fn set_faction(&mut self, handle: EntityHandle, faction: u32) {
        if let Some(unit) = self.units.get_mut(&handle) {
            unit.state.faction = faction;
        }
    }

    fn credit_owner(&mut self, victim: EntityHandle, owner: EntityHandle) {
        self.credits.push((victim, owner));
    }

    fn notify(&mut self, player: EntityHandle, text: &str) {
        self.notifications.push((player, text.to_string()));
    }
}
