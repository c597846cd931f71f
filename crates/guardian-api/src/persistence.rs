use std::path::Path;

use contracts::{Archetype, GuardianSlotRecord, Loadout, OwnerId, PowerType};
use guardian_core::{GuardianStore, StoreError};
use rusqlite::{params, Connection, Row};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt guardian row for owner {owner_id} slot {slot}: {reason}")]
    Corrupt {
        owner_id: OwnerId,
        slot: u8,
        reason: String,
    },
}

impl From<PersistenceError> for StoreError {
    fn from(value: PersistenceError) -> Self {
        match value {
            PersistenceError::Sqlite(err) => StoreError::Backend(err.to_string()),
            PersistenceError::Corrupt {
                owner_id,
                slot,
                reason,
            } => StoreError::Corrupt {
                owner_id,
                slot,
                reason,
            },
        }
    }
}

/// Guardian slot rows in SQLite, one row per `(owner_id, slot)`.
#[derive(Debug)]
pub struct SqliteGuardianStore {
    conn: Connection,
}

impl SqliteGuardianStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Occupied rows for one owner, ordered by slot.
    pub fn load_owner(&self, owner_id: OwnerId) -> Result<Vec<GuardianSlotRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id, slot, template_id, level, health, power, power_type, archetype,
                    spells, display_override, equipment_override, power_chosen, dismissed, saved_at
             FROM character_guardian
             WHERE owner_id = ?1 AND template_id <> 0
             ORDER BY slot ASC",
        )?;
        let rows = stmt.query_map(params![owner_key(owner_id)], RawRow::read)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    /// Every stored row, ordered by owner then slot.
    pub fn load_all(&self) -> Result<Vec<GuardianSlotRecord>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id, slot, template_id, level, health, power, power_type, archetype,
                    spells, display_override, equipment_override, power_chosen, dismissed, saved_at
             FROM character_guardian
             ORDER BY owner_id ASC, slot ASC",
        )?;
        let rows = stmt.query_map([], RawRow::read)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }

    pub fn upsert(&mut self, record: &GuardianSlotRecord) -> Result<(), PersistenceError> {
        self.conn.execute(
            "INSERT INTO character_guardian (
                owner_id,
                slot,
                template_id,
                level,
                health,
                power,
                power_type,
                archetype,
                spells,
                display_override,
                equipment_override,
                power_chosen,
                dismissed,
                saved_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(owner_id, slot) DO UPDATE SET
                template_id = excluded.template_id,
                level = excluded.level,
                health = excluded.health,
                power = excluded.power,
                power_type = excluded.power_type,
                archetype = excluded.archetype,
                spells = excluded.spells,
                display_override = excluded.display_override,
                equipment_override = excluded.equipment_override,
                power_chosen = excluded.power_chosen,
                dismissed = excluded.dismissed,
                saved_at = excluded.saved_at",
            params![
                owner_key(record.owner_id),
                i64::from(record.slot),
                i64::from(record.template_id),
                i64::from(record.level),
                i64::from(record.health),
                i64::from(record.power),
                i64::from(record.power_type.id()),
                i64::from(record.archetype.id()),
                record.loadout.to_csv(),
                record.display_override.map(i64::from),
                record.equipment_override.map(i64::from),
                record.power_chosen,
                record.dismissed,
                record.saved_at,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&mut self, owner_id: OwnerId, slot: u8) -> Result<(), PersistenceError> {
        self.conn.execute(
            "DELETE FROM character_guardian WHERE owner_id = ?1 AND slot = ?2",
            params![owner_key(owner_id), i64::from(slot)],
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64, PersistenceError> {
        let version = self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    fn configure(&mut self) -> Result<(), PersistenceError> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    fn migrate(&mut self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS character_guardian (
                owner_id INTEGER NOT NULL,
                slot INTEGER NOT NULL,
                template_id INTEGER NOT NULL,
                level INTEGER NOT NULL,
                health INTEGER NOT NULL,
                power INTEGER NOT NULL,
                power_type INTEGER NOT NULL,
                archetype INTEGER NOT NULL,
                spells TEXT NOT NULL,
                display_override INTEGER,
                equipment_override INTEGER,
                power_chosen INTEGER NOT NULL DEFAULT 0,
                dismissed INTEGER NOT NULL DEFAULT 0,
                saved_at INTEGER NOT NULL,
                PRIMARY KEY (owner_id, slot)
            );
            ",
        )?;

        self.conn.execute(
            "INSERT OR IGNORE INTO schema_migrations(version, name, applied_at)
             VALUES(1, 'character_guardian_v1', datetime('now'))",
            [],
        )?;

        Ok(())
    }
}

impl GuardianStore for SqliteGuardianStore {
    fn load_slots(&mut self, owner_id: OwnerId) -> Result<Vec<GuardianSlotRecord>, StoreError> {
        Ok(self.load_owner(owner_id)?)
    }

    fn save_slot(&mut self, record: &GuardianSlotRecord) -> Result<(), StoreError> {
        Ok(self.upsert(record)?)
    }

    fn delete_slot(&mut self, owner_id: OwnerId, slot: u8) -> Result<(), StoreError> {
        Ok(self.delete(owner_id, slot)?)
    }
}

/// Owner ids are stored bit-for-bit in a signed column.
fn owner_key(owner_id: OwnerId) -> i64 {
    i64::from_ne_bytes(owner_id.0.to_ne_bytes())
}

fn owner_from_key(key: i64) -> OwnerId {
    OwnerId(u64::from_ne_bytes(key.to_ne_bytes()))
}

/// Column values as SQLite returns them, before range checks.
struct RawRow {
    owner_id: i64,
    slot: i64,
    template_id: i64,
    level: i64,
    health: i64,
    power: i64,
    power_type: i64,
    archetype: i64,
    spells: String,
    display_override: Option<i64>,
    equipment_override: Option<i64>,
    power_chosen: bool,
    dismissed: bool,
    saved_at: i64,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner_id: row.get(0)?,
            slot: row.get(1)?,
            template_id: row.get(2)?,
            level: row.get(3)?,
            health: row.get(4)?,
            power: row.get(5)?,
            power_type: row.get(6)?,
            archetype: row.get(7)?,
            spells: row.get(8)?,
            display_override: row.get(9)?,
            equipment_override: row.get(10)?,
            power_chosen: row.get(11)?,
            dismissed: row.get(12)?,
            saved_at: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<GuardianSlotRecord, PersistenceError> {
        let owner_id = owner_from_key(self.owner_id);
        let slot = u8::try_from(self.slot).map_err(|_| PersistenceError::Corrupt {
            owner_id,
            slot: u8::MAX,
            reason: format!("slot {} out of range", self.slot),
        })?;
        let corrupt = |reason: String| PersistenceError::Corrupt {
            owner_id,
            slot,
            reason,
        };

        let power_type = u8::try_from(self.power_type)
            .ok()
            .and_then(PowerType::from_id)
            .ok_or_else(|| corrupt(format!("unknown power type {}", self.power_type)))?;
        let archetype = u8::try_from(self.archetype)
            .map(Archetype::from_id)
            .map_err(|_| corrupt(format!("unknown archetype {}", self.archetype)))?;

        Ok(GuardianSlotRecord {
            owner_id,
            slot,
            template_id: to_u32(self.template_id, "template_id", &corrupt)?,
            level: u8::try_from(self.level)
                .map_err(|_| corrupt(format!("level {} out of range", self.level)))?,
            health: to_u32(self.health, "health", &corrupt)?,
            power: to_u32(self.power, "power", &corrupt)?,
            power_type,
            archetype,
            loadout: Loadout::from_csv(&self.spells),
            display_override: self
                .display_override
                .map(|v| to_u32(v, "display_override", &corrupt))
                .transpose()?,
            equipment_override: self
                .equipment_override
                .map(|v| to_u32(v, "equipment_override", &corrupt))
                .transpose()?,
            power_chosen: self.power_chosen,
            dismissed: self.dismissed,
            saved_at: self.saved_at,
        })
    }
}

fn to_u32(
    value: i64,
    column: &str,
    corrupt: &dyn Fn(String) -> PersistenceError,
) -> Result<u32, PersistenceError> {
    u32::try_from(value).map_err(|_| corrupt(format!("{column} {value} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(owner: u64, slot: u8, template_id: u32) -> GuardianSlotRecord {
        let mut record = GuardianSlotRecord::unoccupied(OwnerId(owner), slot);
        record.template_id = template_id;
        record.level = 14;
        record.health = 310;
        record.power = 55;
        record.power_type = PowerType::Rage;
        record.archetype = Archetype::Tank;
        record.loadout = Loadout::from_abilities(&[772, 6673]);
        record.display_override = Some(1990);
        record.power_chosen = true;
        record.saved_at = 1_700_000_000;
        record
    }

    #[test]
    fn rows_survive_reopening_the_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("guardians.sqlite");

        {
            let mut store = SqliteGuardianStore::open(&path).expect("open");
            store.upsert(&record(9, 1, 117)).expect("save");
        }

        let store = SqliteGuardianStore::open(&path).expect("reopen");
        assert_eq!(store.schema_version().expect("version"), 1);
        let rows = store.load_owner(OwnerId(9)).expect("load");
        assert_eq!(rows, vec![record(9, 1, 117)]);
    }

    #[test]
    fn upsert_replaces_the_row_for_the_same_key() {
        let mut store = SqliteGuardianStore::open_in_memory().expect("open");
        store.upsert(&record(1, 0, 117)).expect("save");
        let mut updated = record(1, 0, 117);
        updated.dismissed = true;
        updated.health = 0;
        store.upsert(&updated).expect("save");

        let rows = store.load_all().expect("load");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].dismissed);
        assert_eq!(rows[0].health, 0);
    }

    #[test]
    fn load_skips_unoccupied_rows_and_other_owners() {
        let mut store = SqliteGuardianStore::open_in_memory().expect("open");
        store.upsert(&record(1, 2, 117)).expect("save");
        store.upsert(&record(1, 0, 299)).expect("save");
        store
            .upsert(&GuardianSlotRecord::unoccupied(OwnerId(1), 3))
            .expect("save");
        store.upsert(&record(2, 0, 476)).expect("save");

        let slots = store
            .load_owner(OwnerId(1))
            .expect("load")
            .iter()
            .map(|r| r.slot)
            .collect::<Vec<_>>();
        assert_eq!(slots, vec![0, 2]);
    }

    #[test]
    fn delete_removes_only_the_named_slot() {
        let mut store = SqliteGuardianStore::open_in_memory().expect("open");
        store.upsert(&record(1, 0, 117)).expect("save");
        store.upsert(&record(1, 1, 299)).expect("save");
        store.delete(OwnerId(1), 0).expect("delete");
        let rows = store.load_owner(OwnerId(1)).expect("load");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].slot, 1);
    }

    #[test]
    fn large_owner_ids_round_trip() {
        let mut store = SqliteGuardianStore::open_in_memory().expect("open");
        store.upsert(&record(u64::MAX - 3, 0, 117)).expect("save");
        let rows = store.load_owner(OwnerId(u64::MAX - 3)).expect("load");
        assert_eq!(rows[0].owner_id, OwnerId(u64::MAX - 3));
    }

    #[test]
    fn malformed_spell_text_loads_as_empty_entries() {
        let mut store = SqliteGuardianStore::open_in_memory().expect("open");
        store.upsert(&record(1, 0, 117)).expect("save");
        store
            .conn
            .execute(
                "UPDATE character_guardian SET spells = '772,oops' WHERE owner_id = 1",
                [],
            )
            .expect("update");
        let rows = store.load_owner(OwnerId(1)).expect("load");
        assert_eq!(rows[0].loadout.entries(), &[772, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn unknown_power_type_is_reported_as_corrupt() {
        let mut store = SqliteGuardianStore::open_in_memory().expect("open");
        store.upsert(&record(1, 0, 117)).expect("save");
        store
            .conn
            .execute("UPDATE character_guardian SET power_type = 42", [])
            .expect("update");
        let err = GuardianStore::load_slots(&mut store, OwnerId(1)).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { slot: 0, .. }), "{err}");
    }
}
