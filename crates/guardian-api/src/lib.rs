//! Owner-facing action facade over the guardian lifecycle, with SQLite persistence
//! and layered configuration.

pub mod config;
mod persistence;

use std::collections::BTreeMap;
use std::path::Path;

use contracts::{
    Archetype, CaptureConfig, EntityHandle, OwnerId, Position, PowerType, SecurityLevel, SpellId,
    SyncMessage, TemplateId,
};
use guardian_core::{
    ArchetypeOutcome, GuardianError, GuardianInfo, GuardianManager, GuardianStore, HostWorld,
    MemoryGuardianStore, OwnerSession, RelocationReport, SyncOutbox, UnlearnOutcome,
};
use serde::Serialize;
use tracing::{debug, info};

pub use config::{load_config, ConfigError};
pub use persistence::{PersistenceError, SqliteGuardianStore};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("owner {0} is not logged in")]
    UnknownOwner(OwnerId),

    #[error("owner {0} is already logged in")]
    AlreadyLoggedIn(OwnerId),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Outcome of one owner action. Rejections carry the reason as their only message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub owner_id: OwnerId,
    pub action: &'static str,
    pub accepted: bool,
    pub messages: Vec<String>,
}

pub struct GuardianApi<W: HostWorld> {
    world: W,
    manager: GuardianManager<Box<dyn GuardianStore>, SyncOutbox>,
    sessions: BTreeMap<OwnerId, OwnerSession>,
}

impl<W: HostWorld> GuardianApi<W> {
    pub fn new(world: W, config: CaptureConfig) -> Self {
        Self::with_store(world, config, Box::new(MemoryGuardianStore::new()))
    }

    pub fn with_store(world: W, config: CaptureConfig, store: Box<dyn GuardianStore>) -> Self {
        Self {
            world,
            manager: GuardianManager::new(config, store, SyncOutbox::new()),
            sessions: BTreeMap::new(),
        }
    }

    /// Swap the backing store for a SQLite database. Sessions already open keep their
    /// in-memory state and write through the new store from here on.
    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), ApiError> {
        let store = SqliteGuardianStore::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "sqlite guardian store attached");
        self.manager.replace_store(Box::new(store));
        Ok(())
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.manager.last_persistence_error()
    }

    pub fn config(&self) -> &CaptureConfig {
        self.manager.config()
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn session(&self, owner_id: OwnerId) -> Option<&OwnerSession> {
        self.sessions.get(&owner_id)
    }

    pub fn online_owners(&self) -> impl Iterator<Item = OwnerId> + '_ {
        self.sessions.keys().copied()
    }

    // ---------------------------------------------------------------------
    // Session boundaries
    // ---------------------------------------------------------------------

    pub fn login(
        &mut self,
        owner_id: OwnerId,
        player: EntityHandle,
        security: SecurityLevel,
    ) -> Result<&OwnerSession, ApiError> {
        if self.sessions.contains_key(&owner_id) {
            return Err(ApiError::AlreadyLoggedIn(owner_id));
        }
        let session = self
            .manager
            .login(&mut self.world, owner_id, player, security);
        Ok(self.sessions.entry(owner_id).or_insert(session))
    }

    /// Returns the number of summoned guardians saved on the way out.
    pub fn logout(&mut self, owner_id: OwnerId) -> Result<usize, ApiError> {
        let session = self
            .sessions
            .remove(&owner_id)
            .ok_or(ApiError::UnknownOwner(owner_id))?;
        Ok(self.manager.logout(session, &mut self.world))
    }

    /// Call before the host moves the owner to `destination`.
    pub fn relocate(
        &mut self,
        owner_id: OwnerId,
        destination: Position,
    ) -> Result<RelocationReport, ApiError> {
        let session = self
            .sessions
            .get_mut(&owner_id)
            .ok_or(ApiError::UnknownOwner(owner_id))?;
        Ok(self.manager.relocate(session, &mut self.world, destination))
    }

    /// Call once the owner is in the world at the new context.
    pub fn arrive(&mut self, owner_id: OwnerId) -> Result<Vec<u8>, ApiError> {
        let session = self
            .sessions
            .get_mut(&owner_id)
            .ok_or(ApiError::UnknownOwner(owner_id))?;
        Ok(self.manager.arrive(session, &mut self.world))
    }

    // ---------------------------------------------------------------------
    // Actions
    // ---------------------------------------------------------------------

    pub fn capture(
        &mut self,
        owner_id: OwnerId,
        target: Option<EntityHandle>,
    ) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "capture",
            |manager, session, world| manager.capture(session, world, target),
            |_, report| {
                vec![format!(
                    "You have captured {} (Level {})! It will now follow and protect you!",
                    report.name, report.level
                )]
            },
        )
    }

    pub fn summon(&mut self, owner_id: OwnerId, slot: u8) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "summon",
            |manager, session, world| manager.summon(session, world, slot),
            |_, report| vec![format!("{} has been summoned!", report.name)],
        )
    }

    pub fn dismiss(&mut self, owner_id: OwnerId, slot: u8) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "dismiss",
            |manager, session, world| manager.dismiss(session, world, slot),
            |_, _| vec!["Your guardian has been dismissed.".to_string()],
        )
    }

    pub fn release(&mut self, owner_id: OwnerId, slot: u8) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "release",
            |manager, session, world| manager.release(session, world, slot),
            |_, report| vec![format!("{} has been released into the wild.", report.name)],
        )
    }

    pub fn info(&mut self, owner_id: OwnerId, slot: Option<u8>) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "info",
            |manager, session, world| manager.info(session, &*world, slot),
            info_lines,
        )
    }

    /// `index` is the one-based loadout position.
    pub fn teach(
        &mut self,
        owner_id: OwnerId,
        slot: u8,
        index: u8,
        spell_id: SpellId,
    ) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "teach",
            |manager, session, world| manager.teach(session, world, slot, index, spell_id),
            |_, report| {
                vec![format!(
                    "Learned {} in slot {}.",
                    report.spell_name, report.index
                )]
            },
        )
    }

    pub fn unlearn(
        &mut self,
        owner_id: OwnerId,
        slot: u8,
        index: u8,
    ) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "unlearn",
            |manager, session, world| manager.unlearn(session, &*world, slot, index),
            |_, outcome| match outcome {
                UnlearnOutcome::Cleared { spell_name, .. } => {
                    vec![format!("Unlearned {spell_name} from slot {index}.")]
                }
                UnlearnOutcome::AlreadyEmpty => vec![format!("Slot {index} is already empty.")],
            },
        )
    }

    /// `interacted` is the creature the owner is talking to; it must be the guardian in `slot`.
    pub fn switch_archetype(
        &mut self,
        owner_id: OwnerId,
        slot: u8,
        archetype: Archetype,
        interacted: EntityHandle,
    ) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "switch_archetype",
            |manager, session, world| {
                manager.switch_archetype(session, world, slot, archetype, interacted)
            },
            |_, outcome| match outcome {
                ArchetypeOutcome::Unchanged(current) => {
                    vec![format!("Already set to {current} archetype.")]
                }
                ArchetypeOutcome::Switched { to, .. } => {
                    vec![format!("Switched to {to} archetype.")]
                }
            },
        )
    }

    pub fn choose_power(
        &mut self,
        owner_id: OwnerId,
        slot: u8,
        power_type: PowerType,
    ) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "choose_power",
            |manager, session, world| manager.choose_power(session, world, slot, power_type),
            |_, chosen| vec![format!("Your guardian now uses {chosen}.")],
        )
    }

    pub fn spawn_for_test(
        &mut self,
        owner_id: OwnerId,
        template_id: TemplateId,
    ) -> Result<ActionReport, ApiError> {
        self.act(
            owner_id,
            "spawn_for_test",
            |manager, session, world| manager.spawn_for_test(session, world, template_id),
            |_, report| {
                vec![format!(
                    "GM captured {} (Entry {template_id}) at level {}.",
                    report.name, report.level
                )]
            },
        )
    }

    // ---------------------------------------------------------------------
    // Simulation and host events
    // ---------------------------------------------------------------------

    /// One behavior tick for every online owner's summoned guardians.
    pub fn tick(&mut self, diff_ms: u32) {
        for session in self.sessions.values_mut() {
            session.update(&mut self.world, diff_ms);
        }
    }

    /// Returns true when an online owner's guardian adopted the summon.
    pub fn on_summoned(&mut self, caster: EntityHandle, summon: EntityHandle) -> bool {
        self.sessions
            .values_mut()
            .any(|session| session.guardians.on_summoned(&mut self.world, caster, summon))
    }

    pub fn on_damage_dealt(&mut self, guardian: EntityHandle, victim: EntityHandle) {
        if let Some(session) = owning_session(&mut self.sessions, guardian) {
            session.guardians.on_damage_dealt(&mut self.world, guardian, victim);
        }
    }

    pub fn on_guardian_died(&mut self, guardian: EntityHandle) {
        match owning_session(&mut self.sessions, guardian) {
            Some(session) => session.guardians.on_guardian_died(&mut self.world, guardian),
            None => debug!(guardian = %guardian, "death of an untracked guardian ignored"),
        }
    }

    /// Every sync message emitted since the last drain, in emission order.
    pub fn drain_sync(&mut self) -> Vec<(OwnerId, SyncMessage)> {
        self.manager.sink_mut().drain()
    }

    fn act<T>(
        &mut self,
        owner_id: OwnerId,
        action: &'static str,
        run: impl FnOnce(
            &mut GuardianManager<Box<dyn GuardianStore>, SyncOutbox>,
            &mut OwnerSession,
            &mut W,
        ) -> Result<T, GuardianError>,
        describe: impl FnOnce(&W, &T) -> Vec<String>,
    ) -> Result<ActionReport, ApiError> {
        let session = self
            .sessions
            .get_mut(&owner_id)
            .ok_or(ApiError::UnknownOwner(owner_id))?;

        let (accepted, messages) = match run(&mut self.manager, session, &mut self.world) {
            Ok(outcome) => (true, describe(&self.world, &outcome)),
            Err(err) => {
                debug!(owner = %owner_id, action, error = %err, "action rejected");
                (false, vec![err.to_string()])
            }
        };
        for message in &messages {
            self.world.notify(session.player, message);
        }

        Ok(ActionReport {
            owner_id,
            action,
            accepted,
            messages,
        })
    }
}

fn owning_session(
    sessions: &mut BTreeMap<OwnerId, OwnerSession>,
    guardian: EntityHandle,
) -> Option<&mut OwnerSession> {
    sessions
        .values_mut()
        .find(|session| session.guardians.slot_by_handle(guardian).is_some())
}

fn info_lines<W: HostWorld>(world: &W, info: &GuardianInfo) -> Vec<String> {
    let health = match info.max_health {
        Some(max) => format!("Health: {} / {max}", info.health),
        None => format!("Health: {} (stored)", info.health),
    };
    let spells = info
        .loadout
        .spells()
        .map(|spell_id| {
            world
                .spell(spell_id)
                .map(|spell| spell.name)
                .unwrap_or_else(|| spell_id.to_string())
        })
        .collect::<Vec<_>>();
    let status = if info.active {
        "Summoned"
    } else if info.dismissed {
        "Dismissed"
    } else {
        "Stored"
    };

    vec![
        "=== Guardian Info ===".to_string(),
        format!("Slot: {}", info.slot),
        format!("Name: {}", info.name),
        format!("Level: {}", info.level),
        health,
        format!("Entry: {}", info.template_id),
        format!("Archetype: {}", info.archetype),
        format!("Resource: {} {}", info.power_type, info.power),
        format!(
            "Spells: {}",
            if spells.is_empty() {
                "none".to_string()
            } else {
                spells.join(", ")
            }
        ),
        format!("Status: {status}"),
    ]
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use guardian_core::engine::DEATH_NOTICE;
    use guardian_core::sim::catalog::{FIREBOLT, KOBOLD_GEOMANCER, STONESKIN, YOUNG_WOLF};
    use guardian_core::SimWorld;

    use super::*;

    const OWNER: OwnerId = OwnerId(77);

    fn temp_db_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("guardian_api_{}_{}.sqlite", name, std::process::id()))
    }

    fn cleanup(path: &Path) {
        let _ = fs::remove_file(path);
        let _ = fs::remove_file(path.with_extension("sqlite-wal"));
        let _ = fs::remove_file(path.with_extension("sqlite-shm"));
    }

    fn api_with_owner() -> (GuardianApi<SimWorld>, EntityHandle) {
        let mut world = SimWorld::with_sample_catalog();
        let player = world.spawn_player("Ayla", 20, Position::new(0, 0.0, 0.0, 0.0));
        let mut api = GuardianApi::new(world, CaptureConfig::default());
        api.login(OWNER, player, SecurityLevel::Player).expect("login");
        (api, player)
    }

    fn capture_wolf(api: &mut GuardianApi<SimWorld>) -> ActionReport {
        let wolf = api
            .world_mut()
            .spawn_creature(YOUNG_WOLF, 18, Position::new(0, 6.0, 0.0, 0.0));
        api.capture(OWNER, Some(wolf)).expect("owner online")
    }

    #[test]
    fn capture_reports_and_notifies_the_owner() {
        let (mut api, player) = api_with_owner();
        api.drain_sync();

        let report = capture_wolf(&mut api);
        assert!(report.accepted);
        assert_eq!(report.action, "capture");
        assert_eq!(
            report.messages,
            vec!["You have captured Young Wolf (Level 18)! It will now follow and protect you!"]
        );
        assert!(api
            .world()
            .notifications()
            .iter()
            .any(|(to, text)| *to == player && text == &report.messages[0]));

        let sync = api.drain_sync();
        assert!(sync.iter().any(|(owner, message)| *owner == OWNER
            && *message
                == SyncMessage::Name {
                    slot: 0,
                    name: "Young Wolf".into()
                }));
    }

    #[test]
    fn rejected_actions_carry_the_reason() {
        let (mut api, _) = api_with_owner();
        let report = api.dismiss(OWNER, 0).expect("owner online");
        assert!(!report.accepted);
        assert_eq!(report.messages, vec!["Slot 0 is empty."]);

        let report = api.capture(OWNER, None).expect("owner online");
        assert!(!report.accepted);
        assert!(report.messages[0].starts_with("Cannot capture:"));

        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["action"], "capture");
        assert_eq!(json["accepted"], false);
        assert_eq!(json["owner_id"], "77");
    }

    #[test]
    fn actions_for_offline_owners_fail() {
        let (mut api, player) = api_with_owner();
        assert!(matches!(
            api.summon(OwnerId(5), 0),
            Err(ApiError::UnknownOwner(OwnerId(5)))
        ));
        assert!(matches!(
            api.login(OWNER, player, SecurityLevel::Player),
            Err(ApiError::AlreadyLoggedIn(OWNER))
        ));
    }

    #[test]
    fn dismiss_then_summon_round_trip() {
        let (mut api, _) = api_with_owner();
        capture_wolf(&mut api);

        let report = api.dismiss(OWNER, 0).expect("owner online");
        assert_eq!(report.messages, vec!["Your guardian has been dismissed."]);
        let report = api.summon(OWNER, 0).expect("owner online");
        assert_eq!(report.messages, vec!["Young Wolf has been summoned!"]);
        let report = api.release(OWNER, 0).expect("owner online");
        assert_eq!(report.messages, vec!["Young Wolf has been released into the wild."]);
        assert_eq!(
            api.session(OWNER).expect("session").guardians.occupied_count(),
            0
        );
    }

    #[test]
    fn info_lists_name_health_and_spells() {
        let (mut api, _) = api_with_owner();
        capture_wolf(&mut api);
        let report = api.info(OWNER, None).expect("owner online");
        assert!(report.accepted);
        assert_eq!(report.messages[0], "=== Guardian Info ===");
        assert!(report.messages.contains(&"Name: Young Wolf".to_string()));
        assert!(report.messages.contains(&"Level: 18".to_string()));
        assert!(report.messages.contains(&"Archetype: DPS".to_string()));
        assert!(report.messages.iter().any(|line| line.starts_with("Health: ") && line.contains(" / ")));
        assert!(report.messages.contains(&"Spells: Bite".to_string()));
    }

    #[test]
    fn loadout_edits_report_positions() {
        let (mut api, _) = api_with_owner();
        let geomancer = api
            .world_mut()
            .spawn_creature(KOBOLD_GEOMANCER, 18, Position::new(0, 6.0, 0.0, 0.0));
        assert!(api.capture(OWNER, Some(geomancer)).expect("owner online").accepted);

        let report = api.unlearn(OWNER, 0, 6).expect("owner online");
        assert_eq!(report.messages, vec!["Slot 6 is already empty."]);
        let report = api.unlearn(OWNER, 0, 1).expect("owner online");
        assert_eq!(report.messages, vec!["Unlearned Firebolt from slot 1."]);
        let report = api.teach(OWNER, 0, 1, STONESKIN).expect("owner online");
        assert!(report.accepted, "{:?}", report.messages);
        assert_eq!(report.messages, vec!["Learned Stoneskin in slot 1."]);
        let report = api.teach(OWNER, 0, 9, FIREBOLT).expect("owner online");
        assert!(!report.accepted);
    }

    #[test]
    fn switch_archetype_requires_the_interacted_guardian() {
        let (mut api, player) = api_with_owner();
        let captured = capture_wolf(&mut api);
        assert!(captured.accepted);
        let guardian = api
            .session(OWNER)
            .and_then(|s| s.guardians.slot(0))
            .and_then(|slot| slot.active_handle())
            .expect("summoned");

        let report = api
            .switch_archetype(OWNER, 0, Archetype::Tank, player)
            .expect("owner online");
        assert!(!report.accepted);
        let report = api
            .switch_archetype(OWNER, 0, Archetype::Tank, guardian)
            .expect("owner online");
        assert_eq!(report.messages, vec!["Switched to Tank archetype."]);
        let report = api
            .switch_archetype(OWNER, 0, Archetype::Tank, guardian)
            .expect("owner online");
        assert_eq!(report.messages, vec!["Already set to Tank archetype."]);
    }

    #[test]
    fn spawn_for_test_needs_game_master_rights() {
        let (mut api, _) = api_with_owner();
        let report = api.spawn_for_test(OWNER, YOUNG_WOLF).expect("owner online");
        assert!(!report.accepted);
        assert_eq!(report.messages, vec!["Insufficient privileges."]);

        let gm = api
            .world_mut()
            .spawn_player("Warden", 30, Position::new(0, 50.0, 0.0, 0.0));
        api.login(OwnerId(1), gm, SecurityLevel::GameMaster).expect("login");
        let report = api.spawn_for_test(OwnerId(1), YOUNG_WOLF).expect("owner online");
        assert_eq!(
            report.messages,
            vec![format!("GM captured Young Wolf (Entry {YOUNG_WOLF}) at level 30.")]
        );
    }

    #[test]
    fn guardian_death_is_forwarded_to_the_owner() {
        let (mut api, player) = api_with_owner();
        capture_wolf(&mut api);
        let guardian = api
            .session(OWNER)
            .and_then(|s| s.guardians.slot(0))
            .and_then(|slot| slot.active_handle())
            .expect("summoned");

        api.world_mut().kill(guardian);
        api.on_guardian_died(guardian);
        assert!(api
            .world()
            .notifications()
            .iter()
            .any(|(to, text)| *to == player && text == DEATH_NOTICE));
    }

    #[test]
    fn sqlite_store_keeps_guardians_across_api_instances() {
        let path = temp_db_path("relog");
        cleanup(&path);

        let (mut api, _) = api_with_owner();
        api.attach_sqlite_store(&path).expect("attach");
        assert!(capture_wolf(&mut api).accepted);
        assert_eq!(api.logout(OWNER).expect("logout"), 1);
        assert!(api.last_persistence_error().is_none());

        let world = SimWorld::with_sample_catalog();
        let mut restored = GuardianApi::new(world, CaptureConfig::default());
        restored.attach_sqlite_store(&path).expect("attach");
        let player_again = restored
            .world_mut()
            .spawn_player("Ayla", 20, Position::new(0, 0.0, 0.0, 0.0));
        let session = restored
            .login(OWNER, player_again, SecurityLevel::Player)
            .expect("login");
        let slot = session.guardians.slot(0).expect("slot");
        assert!(slot.is_active());
        assert_eq!(slot.record().template_id, YOUNG_WOLF);

        drop(restored);
        drop(api);
        cleanup(&path);
    }
}
