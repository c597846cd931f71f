//! The host world as seen from guardian logic.
//!
//! Queries take `&self` and return owned snapshots; commands take `&mut self`.
//! Handles that no longer resolve are treated as "gone" by every caller, never as a bug.

use contracts::{
    CreatureTemplate, EntityHandle, Position, PowerType, SpawnRequest, SpellId, SpellInfo,
    TemplateId, UnitState,
};

pub trait HostWorld {
    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    fn unit(&self, handle: EntityHandle) -> Option<UnitState>;

    fn template(&self, template_id: TemplateId) -> Option<CreatureTemplate>;

    fn spell(&self, spell_id: SpellId) -> Option<SpellInfo>;

    /// Whether `attacker` is allowed to attack `target` right now.
    fn can_attack(&self, attacker: EntityHandle, target: EntityHandle) -> bool;

    /// The attacker of `handle` a helper should engage first, if any.
    fn attacker_for_helper(&self, handle: EntityHandle) -> Option<EntityHandle>;

    /// Every live unit currently attacking `handle`.
    fn attackers(&self, handle: EntityHandle) -> Vec<EntityHandle>;

    /// Units `handle` holds threat against.
    fn threat_list(&self, handle: EntityHandle) -> Vec<EntityHandle>;

    /// `caster == None` matches an aura from any caster.
    fn has_aura(
        &self,
        target: EntityHandle,
        spell_id: SpellId,
        caster: Option<EntityHandle>,
    ) -> bool;

    fn has_spell_cooldown(&self, caster: EntityHandle, spell_id: SpellId) -> bool;

    fn is_following(&self, handle: EntityHandle) -> bool;

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// `None` when the host refuses or fails to spawn.
    fn spawn_guardian(&mut self, owner: EntityHandle, request: &SpawnRequest)
        -> Option<EntityHandle>;

    fn despawn(&mut self, handle: EntityHandle);

    fn near_teleport(&mut self, handle: EntityHandle, destination: Position);

    fn move_follow(&mut self, handle: EntityHandle, leader: EntityHandle, distance: f32, angle: f32);

    fn move_chase(&mut self, handle: EntityHandle, target: EntityHandle);

    fn stop_moving(&mut self, handle: EntityHandle);

    fn face(&mut self, handle: EntityHandle, target: EntityHandle);

    /// Returns false when the attack could not be started.
    fn attack(&mut self, attacker: EntityHandle, target: EntityHandle) -> bool;

    fn attack_stop(&mut self, handle: EntityHandle);

    /// Swing at the current victim if the swing timer is ready and the victim is in reach.
    fn melee_attack_if_ready(&mut self, attacker: EntityHandle);

    fn add_threat(&mut self, holder: EntityHandle, target: EntityHandle, amount: f32);

    fn clear_threat(&mut self, handle: EntityHandle);

    /// Returns false when the cast was refused (range, resource, invalid target).
    fn cast_spell(&mut self, caster: EntityHandle, target: EntityHandle, spell_id: SpellId)
        -> bool;

    fn add_spell_cooldown(&mut self, caster: EntityHandle, spell_id: SpellId, duration_ms: u32);

    fn set_health(&mut self, handle: EntityHandle, health: u32);

    fn set_power(&mut self, handle: EntityHandle, power_type: PowerType, value: u32);

    fn set_power_type(&mut self, handle: EntityHandle, power_type: PowerType);

    /// Hand `summon` to `owner`: ownership, faction, cleared threat, defensive stance.
    fn adopt(&mut self, summon: EntityHandle, owner: EntityHandle);

    fn set_faction(&mut self, handle: EntityHandle, faction: u32);

    /// Give `owner` kill and loot credit on `victim`.
    fn credit_owner(&mut self, victim: EntityHandle, owner: EntityHandle);

    /// System text shown to a player.
    fn notify(&mut self, player: EntityHandle, text: &str);
}
