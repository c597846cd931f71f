//! A small creature and spell catalog for simulations.

use contracts::{CreatureKind, CreatureRank, CreatureTemplate, PowerType, SpellId, SpellInfo, TemplateId};

use super::SimWorld;

pub const YOUNG_WOLF: TemplateId = 299;
pub const KOBOLD_GEOMANCER: TemplateId = 476;
pub const RIVERPAW_BRUTE: TemplateId = 117;
pub const MOGROSH_ENFORCER: TemplateId = 1180;
pub const MOTHER_FANG: TemplateId = 471;
pub const RABBIT: TemplateId = 721;
pub const SEARING_TOTEM: TemplateId = 2523;

pub const BITE: SpellId = 17253;
pub const FIREBOLT: SpellId = 3110;
pub const HEALING_WAVE: SpellId = 331;
pub const STONESKIN: SpellId = 8071;
pub const DEMORALIZING_SHOUT: SpellId = 1160;
pub const CORRUPTION: SpellId = 172;
pub const REND: SpellId = 772;
pub const BATTLE_SHOUT: SpellId = 6673;
pub const LIFE_TAP: SpellId = 1454;

pub fn templates() -> Vec<CreatureTemplate> {
    vec![
        CreatureTemplate {
            id: YOUNG_WOLF,
            name: "Young Wolf".into(),
            rank: CreatureRank::Normal,
            kind: CreatureKind::Beast,
            spells: vec![BITE],
        },
        CreatureTemplate {
            id: KOBOLD_GEOMANCER,
            name: "Kobold Geomancer".into(),
            rank: CreatureRank::Normal,
            kind: CreatureKind::Humanoid,
            spells: vec![FIREBOLT, 0, HEALING_WAVE, STONESKIN, DEMORALIZING_SHOUT],
        },
        CreatureTemplate {
            id: RIVERPAW_BRUTE,
            name: "Riverpaw Brute".into(),
            rank: CreatureRank::Normal,
            kind: CreatureKind::Humanoid,
            spells: vec![REND, BATTLE_SHOUT],
        },
        CreatureTemplate {
            id: MOGROSH_ENFORCER,
            name: "Mogrosh Enforcer".into(),
            rank: CreatureRank::Elite,
            kind: CreatureKind::Giant,
            spells: vec![],
        },
        CreatureTemplate {
            id: MOTHER_FANG,
            name: "Mother Fang".into(),
            rank: CreatureRank::Rare,
            kind: CreatureKind::Beast,
            spells: vec![BITE],
        },
        CreatureTemplate {
            id: RABBIT,
            name: "Rabbit".into(),
            rank: CreatureRank::Normal,
            kind: CreatureKind::Critter,
            spells: vec![],
        },
        CreatureTemplate {
            id: SEARING_TOTEM,
            name: "Searing Totem".into(),
            rank: CreatureRank::Normal,
            kind: CreatureKind::Other,
            spells: vec![],
        },
    ]
}

pub fn spells() -> Vec<SpellInfo> {
    let offensive = SpellInfo {
        usable_in_combat: true,
        ..SpellInfo::default()
    };
    vec![
        SpellInfo {
            id: BITE,
            name: "Bite".into(),
            deals_damage: true,
            max_range: 5.0,
            base_points: 12,
            ..offensive.clone()
        },
        SpellInfo {
            id: FIREBOLT,
            name: "Firebolt".into(),
            power_cost: 20,
            deals_damage: true,
            max_range: 30.0,
            base_points: 25,
            ..offensive.clone()
        },
        SpellInfo {
            id: HEALING_WAVE,
            name: "Healing Wave".into(),
            power_cost: 25,
            positive: true,
            heals: true,
            usable_in_combat: true,
            max_range: 40.0,
            recovery_ms: 1500,
            base_points: 80,
            ..SpellInfo::default()
        },
        SpellInfo {
            id: STONESKIN,
            name: "Stoneskin".into(),
            power_cost: 10,
            positive: true,
            applies_aura: true,
            usable_in_combat: true,
            max_range: 30.0,
            ..SpellInfo::default()
        },
        SpellInfo {
            id: DEMORALIZING_SHOUT,
            name: "Demoralizing Shout".into(),
            applies_aura: true,
            max_range: 10.0,
            ..offensive.clone()
        },
        SpellInfo {
            id: CORRUPTION,
            name: "Corruption".into(),
            power_cost: 15,
            applies_aura: true,
            periodic_damage: true,
            max_range: 30.0,
            base_points: 4,
            ..offensive.clone()
        },
        SpellInfo {
            id: REND,
            name: "Rend".into(),
            power_type: PowerType::Rage,
            power_cost: 10,
            applies_aura: true,
            periodic_damage: true,
            max_range: 5.0,
            base_points: 3,
            ..offensive.clone()
        },
        SpellInfo {
            id: BATTLE_SHOUT,
            name: "Battle Shout".into(),
            power_type: PowerType::Rage,
            power_cost: 10,
            positive: true,
            applies_aura: true,
            usable_in_combat: true,
            ..SpellInfo::default()
        },
        SpellInfo {
            id: LIFE_TAP,
            name: "Life Tap".into(),
            power_type: PowerType::Health,
            power_cost: 30,
            positive: true,
            usable_in_combat: true,
            ..SpellInfo::default()
        },
    ]
}

impl SimWorld {
    /// A world preloaded with the sample catalog.
    pub fn with_sample_catalog() -> Self {
        let mut world = SimWorld::new();
        for template in templates() {
            world.add_template(template);
        }
        world.set_template_power(RIVERPAW_BRUTE, PowerType::Rage);
        for spell in spells() {
            world.add_spell(spell);
        }
        world
    }
}
