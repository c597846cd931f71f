//! Persistence gateway contract: durable guardian slot rows keyed by (owner, slot).

use std::collections::BTreeMap;

use contracts::{GuardianSlotRecord, OwnerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("corrupt guardian row for owner {owner_id} slot {slot}: {reason}")]
    Corrupt {
        owner_id: OwnerId,
        slot: u8,
        reason: String,
    },
}

/// Each call is independent: slots are never written as one batch per owner.
pub trait GuardianStore {
    /// Occupied rows for `owner_id`, in slot order.
    fn load_slots(&mut self, owner_id: OwnerId) -> Result<Vec<GuardianSlotRecord>, StoreError>;

    /// Insert or replace the row at `(record.owner_id, record.slot)`.
    fn save_slot(&mut self, record: &GuardianSlotRecord) -> Result<(), StoreError>;

    fn delete_slot(&mut self, owner_id: OwnerId, slot: u8) -> Result<(), StoreError>;
}

impl<T: GuardianStore + ?Sized> GuardianStore for Box<T> {
    fn load_slots(&mut self, owner_id: OwnerId) -> Result<Vec<GuardianSlotRecord>, StoreError> {
        (**self).load_slots(owner_id)
    }

    fn save_slot(&mut self, record: &GuardianSlotRecord) -> Result<(), StoreError> {
        (**self).save_slot(record)
    }

    fn delete_slot(&mut self, owner_id: OwnerId, slot: u8) -> Result<(), StoreError> {
        (**self).delete_slot(owner_id, slot)
    }
}

/// In-process store. Also used as the default backend before a database is attached.
#[derive(Debug, Clone, Default)]
pub struct MemoryGuardianStore {
    rows: BTreeMap<(OwnerId, u8), GuardianSlotRecord>,
    write_count: usize,
    fail_writes: bool,
}

impl MemoryGuardianStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, owner_id: OwnerId, slot: u8) -> Option<&GuardianSlotRecord> {
        self.rows.get(&(owner_id, slot))
    }

    pub fn rows(&self) -> impl Iterator<Item = &GuardianSlotRecord> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of successful saves and deletes since creation.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Make every subsequent write fail, to exercise persistence-failure handling.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl GuardianStore for MemoryGuardianStore {
    fn load_slots(&mut self, owner_id: OwnerId) -> Result<Vec<GuardianSlotRecord>, StoreError> {
        Ok(self
            .rows
            .range((owner_id, 0)..=(owner_id, u8::MAX))
            .map(|(_, record)| record.clone())
            .filter(GuardianSlotRecord::is_occupied)
            .collect())
    }

    fn save_slot(&mut self, record: &GuardianSlotRecord) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Backend("writes disabled".to_string()));
        }
        self.rows
            .insert((record.owner_id, record.slot), record.clone());
        self.write_count += 1;
        Ok(())
    }

    fn delete_slot(&mut self, owner_id: OwnerId, slot: u8) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Backend("writes disabled".to_string()));
        }
        self.rows.remove(&(owner_id, slot));
        self.write_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occupied(owner: u64, slot: u8, template_id: u32) -> GuardianSlotRecord {
        let mut record = GuardianSlotRecord::unoccupied(OwnerId(owner), slot);
        record.template_id = template_id;
        record.level = 10;
        record
    }

    #[test]
    fn load_is_scoped_to_owner_and_ordered_by_slot() {
        let mut store = MemoryGuardianStore::new();
        store.save_slot(&occupied(1, 2, 300)).expect("save");
        store.save_slot(&occupied(1, 0, 100)).expect("save");
        store.save_slot(&occupied(2, 1, 200)).expect("save");

        let rows = store.load_slots(OwnerId(1)).expect("load");
        assert_eq!(
            rows.iter().map(|r| r.slot).collect::<Vec<_>>(),
            vec![0, 2]
        );
    }

    #[test]
    fn save_replaces_row_with_same_key() {
        let mut store = MemoryGuardianStore::new();
        store.save_slot(&occupied(1, 0, 100)).expect("save");
        store.save_slot(&occupied(1, 0, 101)).expect("save");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(OwnerId(1), 0).map(|r| r.template_id), Some(101));
    }

    #[test]
    fn failing_writes_leave_rows_untouched() {
        let mut store = MemoryGuardianStore::new();
        store.save_slot(&occupied(1, 0, 100)).expect("save");
        store.set_fail_writes(true);
        assert!(store.delete_slot(OwnerId(1), 0).is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(store.write_count(), 1);
    }
}
