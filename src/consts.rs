//! Constants shared across the CAN node driver.
//!
//! This module fixes the identifier layout, the acceptance masks derived from it,
//! the frame payload size and the bit-timing limits of the peripheral.
//!
//! ## Identifier layout
//!
//! ```text
//!  10                 3   2     0
//! +--------------------+---------+
//! |   node id (8 bit)  | type(3) |
//! +--------------------+---------+
//! ```
//!
//! Only standard (11-bit) identifiers are used. The node id occupies the high-order bits,
//! so lower node ids win arbitration over higher ones for the same message type.

/// Number of identifier bits allotted to the message type.
pub const MESSAGE_TYPE_BITS: u8 = 3;

/// Mask selecting the message type bits (0-2) of an identifier.
pub const MESSAGE_TYPE_MASK: u16 = (1 << MESSAGE_TYPE_BITS) - 1;

/// Mask covering every bit of a standard identifier.
pub const STANDARD_ID_MASK: u16 = 0x7ff;

/// Mask selecting only the most significant node id bit (bit 10).
pub const NODE_ID_MSB_MASK: u16 = 1 << 10;

/// Frame payload length. Every frame sent by the driver carries all 8 bytes.
pub const PAYLOAD_LEN: usize = 8;

/// Application bytes that follow the switch flag in the payload.
pub const APP_DATA_LEN: usize = PAYLOAD_LEN - 1;

/// Time quanta per bit period.
pub const TQ_PER_BIT: u8 = 16;

/// Length of the synchronisation segment in time quanta.
pub const SYNC_SEG: u8 = 1;

/// Highest supported baud rate in kbit/s.
pub const MAX_BAUD_KBPS: u16 = 500;

/// Largest prescaler the baud rate generator can hold (6-bit register, stored minus one).
pub const MAX_PRESCALER: u32 = 64;

/// Largest propagation or phase segment length in time quanta.
pub const MAX_SEGMENT: u8 = 8;

/// Largest synchronisation jump width in time quanta.
pub const MAX_SJW: u8 = 4;

/// Information processing time; phase segment 2 may not be shorter.
pub const MIN_PHASE_SEG2: u8 = 2;
