//! v1 cross-boundary contracts for the guardian engine, lifecycle manager, persistence, and UI sync.

pub mod serde_u64_string;
pub mod sync;
pub mod unit;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use sync::{SyncMessage, SyncParseError, ADDON_PREFIX};
pub use unit::{CaptureRefusal, CreatureTemplate, SpawnRequest, SpellInfo, UnitState};

/// Hard ceiling on guardian slots per owner.
pub const MAX_GUARDIAN_SLOTS: usize = 4;
/// Number of ordered ability entries a guardian carries.
pub const LOADOUT_SIZE: usize = 8;
/// Maximum owner-to-target distance for a capture attempt.
pub const CAPTURE_RADIUS: f32 = 30.0;

pub type TemplateId = u32;
pub type SpellId = u32;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Persistent character id of a guardian owner.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(#[serde(with = "serde_u64_string")] pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a live world entity. Only valid while the host keeps the entity alive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle(#[serde(with = "serde_u64_string")] pub u64);

impl EntityHandle {
    pub fn to_hex(self) -> String {
        format!("{:016X}", self.0)
    }

    pub fn from_hex(raw: &str) -> Option<Self> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        u64::from_str_radix(digits, 16).ok().map(Self)
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Behavioral role of a guardian.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    #[default]
    Dps,
    Tank,
    Healer,
}

impl Archetype {
    pub fn id(self) -> u8 {
        match self {
            Archetype::Dps => 0,
            Archetype::Tank => 1,
            Archetype::Healer => 2,
        }
    }

    /// Unknown ids fall back to DPS, matching how stored rows were always read.
    pub fn from_id(id: u8) -> Self {
        match id {
            1 => Archetype::Tank,
            2 => Archetype::Healer,
            _ => Archetype::Dps,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Archetype::Dps => "DPS",
            Archetype::Tank => "Tank",
            Archetype::Healer => "Healer",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Archetype {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dps" | "0" => Ok(Archetype::Dps),
            "tank" | "1" => Ok(Archetype::Tank),
            "healer" | "heal" | "2" => Ok(Archetype::Healer),
            other => Err(format!("unknown archetype: {other}")),
        }
    }
}

/// Resource pool a unit casts from, or the resource a spell is paid with.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PowerType {
    #[default]
    Mana,
    Rage,
    Focus,
    Energy,
    RunicPower,
    /// Only meaningful as a spell cost: the spell is paid with health.
    Health,
}

impl PowerType {
    pub fn id(self) -> u8 {
        match self {
            PowerType::Mana => 0,
            PowerType::Rage => 1,
            PowerType::Focus => 2,
            PowerType::Energy => 3,
            PowerType::RunicPower => 6,
            PowerType::Health => 0xFE,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(PowerType::Mana),
            1 => Some(PowerType::Rage),
            2 => Some(PowerType::Focus),
            3 => Some(PowerType::Energy),
            6 => Some(PowerType::RunicPower),
            0xFE => Some(PowerType::Health),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PowerType::Mana => "Mana",
            PowerType::Rage => "Rage",
            PowerType::Focus => "Focus",
            PowerType::Energy => "Energy",
            PowerType::RunicPower => "Runic Power",
            PowerType::Health => "Health",
        }
    }
}

impl fmt::Display for PowerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CreatureRank {
    #[default]
    Normal,
    Elite,
    RareElite,
    WorldBoss,
    Rare,
}

impl CreatureRank {
    pub fn is_elite(self) -> bool {
        matches!(
            self,
            CreatureRank::Elite | CreatureRank::RareElite | CreatureRank::WorldBoss
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CreatureKind {
    Beast,
    Dragonkin,
    Demon,
    Elemental,
    Giant,
    Undead,
    #[default]
    Humanoid,
    Critter,
    Mechanical,
    Other,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    #[default]
    Player,
    GameMaster,
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A point inside one simulation context (map). Distances across contexts are undefined.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub context_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub orientation: f32,
}

impl Position {
    pub fn new(context_id: u32, x: f32, y: f32, z: f32) -> Self {
        Self {
            context_id,
            x,
            y,
            z,
            orientation: 0.0,
        }
    }

    /// `None` when the two points live in different contexts.
    pub fn distance(&self, other: &Position) -> Option<f32> {
        if self.context_id != other.context_id {
            return None;
        }
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }

    /// Cross-context distance is treated as infinitely far.
    pub fn distance_or_max(&self, other: &Position) -> f32 {
        self.distance(other).unwrap_or(f32::MAX)
    }

    /// Point `distance` units away at `angle` radians relative to this point's facing.
    pub fn offset(&self, distance: f32, angle: f32) -> Position {
        let heading = self.orientation + angle;
        Position {
            context_id: self.context_id,
            x: self.x + distance * heading.cos(),
            y: self.y + distance * heading.sin(),
            z: self.z,
            orientation: self.orientation,
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub announce: bool,
    /// Guardian lifespan in seconds; 0 means unlimited.
    pub guardian_duration_secs: u32,
    pub allow_elite: bool,
    pub allow_rare: bool,
    pub max_level_diff: i32,
    pub min_creature_level: u8,
    pub health_pct: u32,
    pub damage_pct: u32,
    pub max_slots: u8,
}

impl CaptureConfig {
    pub fn effective_max_slots(&self) -> usize {
        usize::from(self.max_slots).clamp(1, MAX_GUARDIAN_SLOTS)
    }

    pub fn guardian_duration_ms(&self) -> u32 {
        self.guardian_duration_secs.saturating_mul(1000)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            announce: true,
            guardian_duration_secs: 0,
            allow_elite: false,
            allow_rare: true,
            max_level_diff: 5,
            min_creature_level: 1,
            health_pct: 100,
            damage_pct: 100,
            max_slots: MAX_GUARDIAN_SLOTS as u8,
        }
    }
}

// ---------------------------------------------------------------------------
// Loadout
// ---------------------------------------------------------------------------

/// Fixed, ordered set of eight ability ids; `0` marks an empty entry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Loadout(pub [SpellId; LOADOUT_SIZE]);

impl Loadout {
    /// First (up to eight) nonzero ability ids, in template order.
    pub fn from_abilities(abilities: &[SpellId]) -> Self {
        let mut entries = [0; LOADOUT_SIZE];
        for (slot, spell_id) in abilities
            .iter()
            .copied()
            .filter(|id| *id != 0)
            .take(LOADOUT_SIZE)
            .enumerate()
        {
            entries[slot] = spell_id;
        }
        Self(entries)
    }

    /// Zero-based access.
    pub fn get(&self, index: usize) -> SpellId {
        self.0.get(index).copied().unwrap_or(0)
    }

    pub fn set(&mut self, index: usize, spell_id: SpellId) {
        if let Some(entry) = self.0.get_mut(index) {
            *entry = spell_id;
        }
    }

    pub fn entries(&self) -> &[SpellId; LOADOUT_SIZE] {
        &self.0
    }

    pub fn spells(&self) -> impl Iterator<Item = SpellId> + '_ {
        self.0.iter().copied().filter(|id| *id != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|id| *id == 0)
    }

    /// Storage text form: `id1,id2,...,id8`.
    pub fn to_csv(&self) -> String {
        self.0
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Lenient inverse of [`Loadout::to_csv`]: missing or malformed entries become 0.
    pub fn from_csv(raw: &str) -> Self {
        let mut entries = [0; LOADOUT_SIZE];
        if raw.trim().is_empty() {
            return Self(entries);
        }
        for (slot, token) in raw.split(',').take(LOADOUT_SIZE).enumerate() {
            entries[slot] = token.trim().parse::<u32>().unwrap_or(0);
        }
        Self(entries)
    }
}

// ---------------------------------------------------------------------------
// Persisted slot record
// ---------------------------------------------------------------------------

/// One persisted guardian slot. `template_id == 0` marks the slot unoccupied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardianSlotRecord {
    pub owner_id: OwnerId,
    pub slot: u8,
    pub template_id: TemplateId,
    pub level: u8,
    pub health: u32,
    pub power: u32,
    pub power_type: PowerType,
    pub archetype: Archetype,
    pub loadout: Loadout,
    pub display_override: Option<u32>,
    pub equipment_override: Option<u32>,
    pub power_chosen: bool,
    pub dismissed: bool,
    /// Unix seconds of the last write.
    pub saved_at: i64,
}

impl GuardianSlotRecord {
    pub fn unoccupied(owner_id: OwnerId, slot: u8) -> Self {
        Self {
            owner_id,
            slot,
            template_id: 0,
            level: 0,
            health: 0,
            power: 0,
            power_type: PowerType::Mana,
            archetype: Archetype::Dps,
            loadout: Loadout::default(),
            display_override: None,
            equipment_override: None,
            power_chosen: false,
            dismissed: false,
            saved_at: 0,
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.template_id != 0
    }

    /// Reset to unoccupied, keeping only the key.
    pub fn clear(&mut self) {
        *self = Self::unoccupied(self.owner_id, self.slot);
    }
}

impl fmt::Display for GuardianSlotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_occupied() {
            return write!(f, "owner={} slot={} unoccupied", self.owner_id, self.slot);
        }
        write!(
            f,
            "owner={} slot={} template={} level={} archetype={} health={} dismissed={}",
            self.owner_id,
            self.slot,
            self.template_id,
            self.level,
            self.archetype,
            self.health,
            self.dismissed
        )
    }
}
