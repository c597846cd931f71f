//! Error taxonomy for guardian lifecycle operations.

use contracts::{CaptureRefusal, PowerType, SpellId, TemplateId};

pub type Result<T> = std::result::Result<T, GuardianError>;

/// Every variant is reported to the caller; none leaves a slot half-mutated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GuardianError {
    #[error("Creature capture is disabled.")]
    Disabled,

    /// A capture precondition failed.
    #[error("Cannot capture: {0}")]
    Validation(CaptureRefusal),

    /// No empty slot is left for a new guardian.
    #[error("All {max_slots} guardian slots are occupied.")]
    Capacity { max_slots: usize },

    /// The taught spell is paid with a resource this guardian does not have.
    #[error("This guardian cannot use {required} spells (spell {spell_id}, guardian uses {available}).")]
    ResourceMismatch {
        spell_id: SpellId,
        required: PowerType,
        available: PowerType,
    },

    /// The slot pointed at an entity that no longer exists; the stale handle has been cleared.
    #[error("Guardian in slot {slot} could not be found.")]
    NotFound { slot: u8 },

    #[error("Invalid slot {slot}; this owner has {max_slots} slots.")]
    InvalidSlot { slot: u8, max_slots: usize },

    #[error("Invalid loadout index {index} (1-8).")]
    InvalidLoadoutIndex { index: u8 },

    #[error("Slot {slot} is empty.")]
    SlotEmpty { slot: u8 },

    #[error("No active guardian in slot {slot}.")]
    NotActive { slot: u8 },

    #[error("Guardian in slot {slot} is already summoned.")]
    AlreadyActive { slot: u8 },

    #[error("You don't have a captured guardian.")]
    NoGuardians,

    #[error("Spell {0} does not exist.")]
    UnknownSpell(SpellId),

    #[error("Creature entry {0} does not exist.")]
    UnknownTemplate(TemplateId),

    #[error("That creature is not your guardian in slot {slot}.")]
    NotInteracting { slot: u8 },

    #[error("The resource of the guardian in slot {slot} was already chosen.")]
    PowerAlreadyChosen { slot: u8 },

    #[error("{0} cannot be chosen as a guardian resource.")]
    InvalidPowerType(PowerType),

    #[error("Insufficient privileges.")]
    PermissionDenied,

    #[error("Owner is not in the world.")]
    OwnerUnavailable,

    #[error("Failed to summon guardian.")]
    SpawnFailed,
}
