//! State-sync emitter seam and the full-state burst builder.

use contracts::{OwnerId, SyncMessage};

use crate::registry::GuardianSlot;

/// Receives slot state for an owner's remote UI. Delivery is the host's concern.
pub trait SyncSink {
    fn send(&mut self, owner_id: OwnerId, message: SyncMessage);
}

impl<T: SyncSink + ?Sized> SyncSink for Box<T> {
    fn send(&mut self, owner_id: OwnerId, message: SyncMessage) {
        (**self).send(owner_id, message)
    }
}

/// Buffers outgoing messages until the host drains them.
#[derive(Debug, Clone, Default)]
pub struct SyncOutbox {
    messages: Vec<(OwnerId, SyncMessage)>,
}

impl SyncOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[(OwnerId, SyncMessage)] {
        &self.messages
    }

    pub fn messages_for(&self, owner_id: OwnerId) -> Vec<&SyncMessage> {
        self.messages
            .iter()
            .filter(|(owner, _)| *owner == owner_id)
            .map(|(_, message)| message)
            .collect()
    }

    pub fn drain(&mut self) -> Vec<(OwnerId, SyncMessage)> {
        std::mem::take(&mut self.messages)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl SyncSink for SyncOutbox {
    fn send(&mut self, owner_id: OwnerId, message: SyncMessage) {
        self.messages.push((owner_id, message));
    }
}

/// NAME, ARCH, SPELLS, and GUID when summoned. Unoccupied slots produce nothing.
pub fn full_state(slot: &GuardianSlot) -> Vec<SyncMessage> {
    if !slot.is_occupied() {
        return Vec::new();
    }
    let index = slot.index();
    let mut burst = vec![
        SyncMessage::Name {
            slot: index,
            name: slot.name().to_string(),
        },
        SyncMessage::Arch {
            slot: index,
            archetype: slot.archetype(),
        },
        SyncMessage::Spells {
            slot: index,
            loadout: slot.loadout(),
        },
    ];
    if let Some(handle) = slot.active_handle() {
        burst.push(SyncMessage::Guid {
            slot: index,
            handle,
        });
    }
    burst
}
