//! Colon-delimited state-sync messages pushed to the owner's remote UI.
//!
//! One message per slot per concern. Encoding lives here, apart from engine
//! logic, so the wire format can be consumed and produced independently.

use std::fmt;
use std::str::FromStr;

use crate::{Archetype, EntityHandle, Loadout, LOADOUT_SIZE};

/// Prefix the remote addon filters on; the payload follows a tab.
pub const ADDON_PREFIX: &str = "CCAPTURE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    Name { slot: u8, name: String },
    Arch { slot: u8, archetype: Archetype },
    Spells { slot: u8, loadout: Loadout },
    Guid { slot: u8, handle: EntityHandle },
    Dismiss { slot: u8 },
    Clear { slot: u8 },
}

impl SyncMessage {
    pub fn slot(&self) -> u8 {
        match self {
            SyncMessage::Name { slot, .. }
            | SyncMessage::Arch { slot, .. }
            | SyncMessage::Spells { slot, .. }
            | SyncMessage::Guid { slot, .. }
            | SyncMessage::Dismiss { slot }
            | SyncMessage::Clear { slot } => *slot,
        }
    }

    pub fn to_addon_packet(&self) -> String {
        format!("{ADDON_PREFIX}\t{self}")
    }

    pub fn from_addon_packet(raw: &str) -> Result<Self, SyncParseError> {
        let payload = raw
            .strip_prefix(ADDON_PREFIX)
            .and_then(|rest| rest.strip_prefix('\t'))
            .ok_or(SyncParseError::MissingPrefix)?;
        payload.parse()
    }
}

impl fmt::Display for SyncMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMessage::Name { slot, name } => write!(f, "NAME:{slot}:{name}"),
            SyncMessage::Arch { slot, archetype } => write!(f, "ARCH:{slot}:{}", archetype.id()),
            SyncMessage::Spells { slot, loadout } => {
                write!(f, "SPELLS:{slot}")?;
                for spell_id in loadout.entries() {
                    write!(f, ":{spell_id}")?;
                }
                Ok(())
            }
            SyncMessage::Guid { slot, handle } => write!(f, "GUID:{slot}:{}", handle.to_hex()),
            SyncMessage::Dismiss { slot } => write!(f, "DISMISS:{slot}"),
            SyncMessage::Clear { slot } => write!(f, "CLEAR:{slot}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncParseError {
    #[error("missing {prefix} prefix", prefix = ADDON_PREFIX)]
    MissingPrefix,
    #[error("unknown sync tag: {0}")]
    UnknownTag(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl FromStr for SyncMessage {
    type Err = SyncParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        // NAME keeps everything after the second colon, names may contain colons.
        let mut parts = raw.splitn(3, ':');
        let tag = parts.next().unwrap_or_default();
        let slot_raw = parts.next().ok_or(SyncParseError::MissingField("slot"))?;
        let slot = slot_raw
            .parse::<u8>()
            .map_err(|_| SyncParseError::InvalidField {
                field: "slot",
                value: slot_raw.to_string(),
            })?;
        let rest = parts.next();

        match tag {
            "NAME" => Ok(SyncMessage::Name {
                slot,
                name: rest.ok_or(SyncParseError::MissingField("name"))?.to_string(),
            }),
            "ARCH" => {
                let raw_id = rest.ok_or(SyncParseError::MissingField("archetype"))?;
                let id = raw_id
                    .parse::<u8>()
                    .map_err(|_| SyncParseError::InvalidField {
                        field: "archetype",
                        value: raw_id.to_string(),
                    })?;
                Ok(SyncMessage::Arch {
                    slot,
                    archetype: Archetype::from_id(id),
                })
            }
            "SPELLS" => {
                let raw_ids = rest.ok_or(SyncParseError::MissingField("spells"))?;
                let ids = raw_ids.split(':').collect::<Vec<_>>();
                if ids.len() != LOADOUT_SIZE {
                    return Err(SyncParseError::InvalidField {
                        field: "spells",
                        value: raw_ids.to_string(),
                    });
                }
                let mut loadout = Loadout::default();
                for (index, id) in ids.iter().enumerate() {
                    let spell_id = id.parse::<u32>().map_err(|_| SyncParseError::InvalidField {
                        field: "spells",
                        value: (*id).to_string(),
                    })?;
                    loadout.set(index, spell_id);
                }
                Ok(SyncMessage::Spells { slot, loadout })
            }
            "GUID" => {
                let raw_handle = rest.ok_or(SyncParseError::MissingField("guid"))?;
                let handle =
                    EntityHandle::from_hex(raw_handle).ok_or(SyncParseError::InvalidField {
                        field: "guid",
                        value: raw_handle.to_string(),
                    })?;
                Ok(SyncMessage::Guid { slot, handle })
            }
            "DISMISS" => Ok(SyncMessage::Dismiss { slot }),
            "CLEAR" => Ok(SyncMessage::Clear { slot }),
            other => Err(SyncParseError::UnknownTag(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_each_concern() {
        assert_eq!(
            SyncMessage::Name {
                slot: 0,
                name: "Kobold Miner".into()
            }
            .to_string(),
            "NAME:0:Kobold Miner"
        );
        assert_eq!(
            SyncMessage::Arch {
                slot: 1,
                archetype: Archetype::Healer
            }
            .to_string(),
            "ARCH:1:2"
        );
        assert_eq!(
            SyncMessage::Spells {
                slot: 2,
                loadout: Loadout([133, 0, 0, 0, 0, 0, 0, 9])
            }
            .to_string(),
            "SPELLS:2:133:0:0:0:0:0:0:9"
        );
        assert_eq!(
            SyncMessage::Guid {
                slot: 3,
                handle: EntityHandle(0xAB)
            }
            .to_string(),
            "GUID:3:00000000000000AB"
        );
        assert_eq!(SyncMessage::Dismiss { slot: 0 }.to_string(), "DISMISS:0");
        assert_eq!(SyncMessage::Clear { slot: 3 }.to_string(), "CLEAR:3");
    }

    #[test]
    fn names_with_colons_survive_parsing() {
        let message = SyncMessage::Name {
            slot: 1,
            name: "Gnoll: Brute".into(),
        };
        assert_eq!(message.to_string().parse::<SyncMessage>(), Ok(message));
    }

    #[test]
    fn addon_packet_carries_prefix() {
        let message = SyncMessage::Dismiss { slot: 2 };
        let packet = message.to_addon_packet();
        assert_eq!(packet, "CCAPTURE\tDISMISS:2");
        assert_eq!(SyncMessage::from_addon_packet(&packet), Ok(message));
        assert_eq!(
            SyncMessage::from_addon_packet("DISMISS:2"),
            Err(SyncParseError::MissingPrefix)
        );
    }

    #[test]
    fn rejects_short_spell_lists_and_unknown_tags() {
        assert!(matches!(
            "SPELLS:0:1:2".parse::<SyncMessage>(),
            Err(SyncParseError::InvalidField { field: "spells", .. })
        ));
        assert_eq!(
            "PING:0".parse::<SyncMessage>(),
            Err(SyncParseError::UnknownTag("PING".into()))
        );
    }

    #[test]
    fn parse_errors_read_as_messages() {
        assert_eq!(
            SyncParseError::MissingPrefix.to_string(),
            "missing CCAPTURE prefix"
        );
        assert_eq!(
            SyncParseError::UnknownTag("PING".into()).to_string(),
            "unknown sync tag: PING"
        );
        assert_eq!(
            SyncParseError::MissingField("slot").to_string(),
            "missing field: slot"
        );
        let err = "NAME:x:Wolf".parse::<SyncMessage>().unwrap_err();
        assert_eq!(err.to_string(), "invalid slot: x");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }
}
