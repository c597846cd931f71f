//! Read-only snapshots the host hands to the engine, and the spawn request it hands back.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    CreatureKind, CreatureRank, EntityHandle, Position, PowerType, SpellId, TemplateId,
};

/// Point-in-time view of a world unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnitState {
    pub handle: EntityHandle,
    /// `None` for players and template-less entities.
    pub template_id: Option<TemplateId>,
    pub name: String,
    pub level: u8,
    pub alive: bool,
    pub in_world: bool,
    pub is_player: bool,
    pub is_pet: bool,
    pub is_guardian: bool,
    pub is_summon: bool,
    pub position: Position,
    pub health: u32,
    pub max_health: u32,
    pub power_type: PowerType,
    pub power: u32,
    pub max_power: u32,
    pub in_combat: bool,
    pub casting: bool,
    pub victim: Option<EntityHandle>,
    pub owner: Option<EntityHandle>,
    pub faction: u32,
    pub display_id: Option<u32>,
    pub equipment_id: Option<u32>,
}

impl UnitState {
    /// Health as a percentage of maximum; a unit without max health counts as full.
    pub fn health_pct(&self) -> f32 {
        if self.max_health == 0 {
            return 100.0;
        }
        self.health as f32 * 100.0 / self.max_health as f32
    }

    pub fn is_controlled(&self) -> bool {
        self.is_pet || self.is_guardian || self.is_summon
    }

    pub fn distance_to(&self, other: &UnitState) -> f32 {
        self.position.distance_or_max(&other.position)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatureTemplate {
    pub id: TemplateId,
    pub name: String,
    pub rank: CreatureRank,
    pub kind: CreatureKind,
    /// Innate abilities in template order; zeros are allowed and skipped.
    pub spells: Vec<SpellId>,
}

/// Static spell data relevant to guardian decision making.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SpellInfo {
    pub id: SpellId,
    pub name: String,
    pub power_type: PowerType,
    pub power_cost: u32,
    pub power_cost_pct: u32,
    pub positive: bool,
    pub heals: bool,
    pub applies_aura: bool,
    pub deals_damage: bool,
    pub periodic_damage: bool,
    pub usable_in_combat: bool,
    /// 0 means no range restriction.
    pub max_range: f32,
    pub recovery_ms: u32,
    pub category_recovery_ms: u32,
    pub start_recovery_ms: u32,
    /// Magnitude used by simulated hosts for damage and healing.
    pub base_points: u32,
}

impl SpellInfo {
    pub fn is_heal(&self) -> bool {
        self.positive && self.heals
    }

    pub fn is_buff(&self) -> bool {
        self.positive && !self.heals
    }

    pub fn is_offensive(&self) -> bool {
        !self.positive
    }

    pub fn is_debuff(&self) -> bool {
        !self.positive && self.applies_aura && !self.deals_damage && !self.periodic_damage
    }

    pub fn costs_resource(&self) -> bool {
        self.power_cost > 0 || self.power_cost_pct > 0
    }
}

/// Everything the host needs to put a guardian into the world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpawnRequest {
    pub template_id: TemplateId,
    pub level: u8,
    pub position: Position,
    pub display_override: Option<u32>,
    pub equipment_override: Option<u32>,
    pub power_type: Option<PowerType>,
    /// 0 = unlimited; otherwise the host schedules its own despawn.
    pub duration_ms: u32,
    pub health_pct: u32,
    pub damage_pct: u32,
}

/// Why a capture attempt was refused, in check order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureRefusal {
    NoTarget,
    Dead,
    AlreadyControlled,
    IsPlayer,
    InvalidTemplate,
    Critter,
    EliteNotAllowed,
    RareNotAllowed,
    LevelTooLow,
    LevelTooHigh,
    InCombatWithOther,
    TooFar,
}

impl CaptureRefusal {
    pub fn reason(self) -> &'static str {
        match self {
            CaptureRefusal::NoTarget => "No target selected.",
            CaptureRefusal::Dead => "Target must be alive.",
            CaptureRefusal::AlreadyControlled => "Cannot capture pets, guardians, or summons.",
            CaptureRefusal::IsPlayer => "Cannot capture players.",
            CaptureRefusal::InvalidTemplate => "Invalid creature.",
            CaptureRefusal::Critter => "Cannot capture critters.",
            CaptureRefusal::EliteNotAllowed => "Cannot capture elite creatures.",
            CaptureRefusal::RareNotAllowed => "Cannot capture rare creatures.",
            CaptureRefusal::LevelTooLow => "Creature level is too low.",
            CaptureRefusal::LevelTooHigh => "Creature level is too high for you to capture.",
            CaptureRefusal::InCombatWithOther => "Creature is in combat with someone else.",
            CaptureRefusal::TooFar => "Target is too far away.",
        }
    }
}

impl fmt::Display for CaptureRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}
