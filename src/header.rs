//! Header codec: packs a `(node id, message type)` pair into an 11-bit CAN identifier.
//!
//! Packing both fields into the standard identifier lets every frame carry full
//! addressing without spending a payload byte on it. The 8/3 split caps the network
//! at 256 nodes with 4 message classes.
//!
//! ## Functions
//!
//! - [`Header::encode`]: total, `(node_id << 3) | message_type`
//! - [`Header::decode`]: inverse; fails on the four unassigned message type values
//!
//! ```rust
//! use cannode::header::{CanIdentifier, Header, MessageType};
//!
//! let header = Header::new(0x42, MessageType::Heartbeat);
//! let id = header.encode();
//! assert_eq!(id.raw(), 0x211);
//! assert_eq!(Header::decode(id), Ok(header));
//! assert!(CanIdentifier::new(0x800).is_none());
//! ```

use crate::consts::{MESSAGE_TYPE_BITS, MESSAGE_TYPE_MASK, STANDARD_ID_MASK};
use embedded_can::StandardId;

/// Class of a message, stored in the low three identifier bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageType {
    /// Sent by a node to report an action it performed.
    Normal = 0b000,
    /// Sent by a node on a timer to announce it is alive.
    Heartbeat = 0b001,
    /// Sent by a master node to configure the addressed node.
    Config = 0b010,
    /// Extension of [`Normal`](MessageType::Normal) for richer commands.
    Complex = 0b011,
}

impl MessageType {
    /// All defined message types, in encoding order.
    pub const ALL: [MessageType; 4] = [
        MessageType::Normal,
        MessageType::Heartbeat,
        MessageType::Config,
        MessageType::Complex,
    ];

    /// Raw 3-bit value of this message type.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            0b000 => Ok(MessageType::Normal),
            0b001 => Ok(MessageType::Heartbeat),
            0b010 => Ok(MessageType::Config),
            0b011 => Ok(MessageType::Complex),
            other => Err(DecodeError::UnknownMessageType(other)),
        }
    }
}

/// Failure to turn an identifier back into a [`Header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum DecodeError {
    /// The low three bits do not name a defined [`MessageType`].
    #[error("unknown message type bits {0:#05b}")]
    UnknownMessageType(u8),
    /// The raw value does not fit in a standard 11-bit identifier.
    #[error("identifier {0:#x} exceeds 11 bits")]
    OutOfRange(u16),
}

/// Logical addressing information of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Header {
    /// Address of the node the message belongs to.
    pub node_id: u8,
    /// Class of the message.
    pub message_type: MessageType,
}

impl Header {
    /// Creates a header for `node_id` carrying a `message_type` message.
    pub const fn new(node_id: u8, message_type: MessageType) -> Self {
        Self {
            node_id,
            message_type,
        }
    }

    /// Packs the header into an identifier: `(node_id << 3) | message_type`.
    pub const fn encode(&self) -> CanIdentifier {
        let node_id = (self.node_id as u16) << MESSAGE_TYPE_BITS;
        CanIdentifier(node_id | self.message_type.bits() as u16)
    }

    /// Unpacks an identifier produced by [`encode`](Header::encode).
    ///
    /// # Errors
    /// [`DecodeError::UnknownMessageType`] if the message type bits are 4 through 7.
    /// Receive paths should drop such frames rather than treat them as fatal.
    pub fn decode(id: CanIdentifier) -> Result<Self, DecodeError> {
        let message_type = MessageType::try_from(id.message_type_bits())?;
        Ok(Self {
            node_id: id.node_id(),
            message_type,
        })
    }
}

impl From<Header> for CanIdentifier {
    fn from(header: Header) -> Self {
        header.encode()
    }
}

impl TryFrom<CanIdentifier> for Header {
    type Error = DecodeError;

    fn try_from(id: CanIdentifier) -> Result<Self, Self::Error> {
        Header::decode(id)
    }
}

/// An 11-bit standard CAN identifier laid out as `[node_id:8][message_type:3]`.
///
/// The value is always below `2^11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct CanIdentifier(u16);

impl CanIdentifier {
    /// Wraps a raw identifier, returning `None` if it does not fit in 11 bits.
    pub const fn new(raw: u16) -> Option<Self> {
        if raw > STANDARD_ID_MASK {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Raw 11-bit value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Node id stored in bits 3-10.
    pub const fn node_id(self) -> u8 {
        (self.0 >> MESSAGE_TYPE_BITS) as u8
    }

    /// Undecoded message type bits 0-2.
    pub const fn message_type_bits(self) -> u8 {
        (self.0 & MESSAGE_TYPE_MASK) as u8
    }
}

impl TryFrom<u16> for CanIdentifier {
    type Error = DecodeError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        CanIdentifier::new(raw).ok_or(DecodeError::OutOfRange(raw))
    }
}

impl From<StandardId> for CanIdentifier {
    fn from(id: StandardId) -> Self {
        Self(id.as_raw())
    }
}

impl From<CanIdentifier> for StandardId {
    fn from(id: CanIdentifier) -> Self {
        // `CanIdentifier` never holds more than 11 bits.
        StandardId::new(id.0).unwrap_or(StandardId::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_places_node_id_above_message_type() {
        let header = Header::new(0b1000_0000, MessageType::Config);
        assert_eq!(header.encode().raw(), 0b100_0000_0010);

        let header = Header::new(0xff, MessageType::Complex);
        assert_eq!(header.encode().raw(), 0x7fb);

        // The top of the identifier range carries an unassigned message type.
        let top = CanIdentifier::new(STANDARD_ID_MASK).unwrap();
        assert_eq!(Header::decode(top), Err(DecodeError::UnknownMessageType(7)));

        let header = Header::new(0, MessageType::Normal);
        assert_eq!(header.encode().raw(), 0);
    }

    #[test]
    fn test_decode_inverts_encode_for_every_header() {
        for node_id in 0..=u8::MAX {
            for message_type in MessageType::ALL {
                let header = Header::new(node_id, message_type);
                assert_eq!(Header::decode(header.encode()), Ok(header));
            }
        }
    }

    #[test]
    fn test_encode_is_injective() {
        let mut seen = [false; 1 << 11];
        for node_id in 0..=u8::MAX {
            for message_type in MessageType::ALL {
                let raw = Header::new(node_id, message_type).encode().raw() as usize;
                assert!(!seen[raw], "identifier {raw:#x} produced twice");
                seen[raw] = true;
            }
        }
    }

    #[test]
    fn test_decode_rejects_unassigned_message_types() {
        for bits in 4..=7u16 {
            let id = CanIdentifier::new((0x12 << 3) | bits).unwrap();
            assert_eq!(
                Header::decode(id),
                Err(DecodeError::UnknownMessageType(bits as u8))
            );
        }
    }

    #[test]
    fn test_identifier_range_checks() {
        assert!(CanIdentifier::new(0x7ff).is_some());
        assert!(CanIdentifier::new(0x800).is_none());
        assert_eq!(
            CanIdentifier::try_from(0xffffu16),
            Err(DecodeError::OutOfRange(0xffff))
        );
    }

    #[test]
    fn test_standard_id_conversion() {
        let id = Header::new(0x7f, MessageType::Heartbeat).encode();
        let sid: StandardId = id.into();
        assert_eq!(sid.as_raw(), id.raw());
        assert_eq!(CanIdentifier::from(sid), id);
    }
}
