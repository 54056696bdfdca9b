//! Contract between the driver and the chip's CAN peripheral.
//!
//! The driver never touches registers itself. A chip support layer implements
//! [`CanPeripheral`] on top of its register block; frame transmission and reception come
//! from [`embedded_can::nb::Can`].

use crate::filter::FilterSpec;
use crate::timing::BaudTiming;

/// Operating mode of the peripheral, with the request bits it is selected by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// Configuration mode; filters and bit timing may only be written here.
    Config = 0b100,
    /// Frames are looped back internally and not driven onto the bus.
    Loopback = 0b010,
    /// Normal bus operation.
    Normal = 0b000,
}

impl Mode {
    /// Value of the mode request field.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Register-level access to a CAN peripheral with two acceptance filters and a single
/// transmit buffer in use.
pub trait CanPeripheral: embedded_can::nb::Can {
    /// Requests a mode change. The change takes effect asynchronously.
    fn request_mode(&mut self, mode: Mode) -> Result<(), Self::Error>;

    /// Mode the peripheral currently reports.
    ///
    /// Returns `WouldBlock` while a requested change is still pending.
    fn mode(&mut self) -> nb::Result<Mode, Self::Error>;

    /// Writes the mask/value pair of `spec.slot`. Both slots feed the same receive buffer.
    fn write_filter(&mut self, spec: &FilterSpec) -> Result<(), Self::Error>;

    /// Programs prescaler and segment lengths.
    fn write_bit_timing(&mut self, timing: &BaudTiming) -> Result<(), Self::Error>;

    /// Completion signal of the transmit buffer.
    ///
    /// - `Ok(())`: the last frame was acknowledged on the bus
    /// - `Err(WouldBlock)`: still pending
    /// - `Err(Other(e))`: the transmission failed (bus error, arbitration lost)
    fn transmit_complete(&mut self) -> nb::Result<(), Self::Error>;
}
