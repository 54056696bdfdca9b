//! CAN node driver.
//!
//! [`CanDriver`] ties the header codec, the filter configurator, the bit-timing calculator
//! and the transmit status tracker to a [`CanPeripheral`] implementation and an optional
//! transceiver standby pin.
//!
//! ## Setup
//!
//! ```ignore
//! use cannode::driver::{CanDriver, DriverConfig, Message};
//! use cannode::header::{Header, MessageType};
//! use cannode::peripheral::Mode;
//! use cannode::status::TransmitTracker;
//!
//! static TRANSMIT_STATUS: TransmitTracker = TransmitTracker::new();
//!
//! let mut driver = CanDriver::new(peripheral, Some(stb_pin), None, &TRANSMIT_STATUS);
//! driver.init(&DriverConfig::default())?;
//! driver.setup_strict_receive_filter(&Header::new(NODE_ID, MessageType::Config))?;
//! driver.set_mode_blocking(Mode::Normal)?;
//!
//! let header = Header::new(NODE_ID, MessageType::Heartbeat);
//! nb::block!(driver.send(&Message::new(&header), now()))?;
//! ```
//!
//! ## Transmission
//!
//! [`send`](CanDriver::send) writes one frame to the single transmit buffer in use and
//! marks the tracker [`Sending`](StatusCode::Sending). It never waits for the bus.
//! Completion is observed by the application, either from the peripheral interrupt
//! (see [`crate::isr`]) or by polling [`poll_completion`](CanDriver::poll_completion).
//!
//! ## Payload layout
//!
//! | Byte | Content                               |
//! |------|---------------------------------------|
//! | 0    | `is_switch_on` (`0` or `1`)           |
//! | 1-7  | application data, zero padded         |

use crate::consts::{APP_DATA_LEN, PAYLOAD_LEN};
use crate::filter::{FilterConfigurator, FilterPolicy, FilterUpdate};
use crate::header::{CanIdentifier, DecodeError, Header};
use crate::peripheral::{CanPeripheral, Mode};
use crate::status::{StatusCode, StatusError, TransmitTracker};
use crate::timing::{BaudTiming, SegmentPolicy, TimingError};
use embedded_can::{Error as _, ErrorKind, Frame, Id, StandardId};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use heapless::Vec;

/// Setup parameters consumed by [`CanDriver::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct DriverConfig {
    /// Bus bit rate in kbit/s, at most 500.
    pub baud_kbps: u16,
    /// Clock feeding the CAN peripheral in MHz.
    pub cpu_mhz: u16,
    /// Distribution of the bit segments.
    pub segments: SegmentPolicy,
    /// Synchronisation jump width in time quanta.
    pub sync_jump_width: u8,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            baud_kbps: 500,
            cpu_mhz: 16,
            segments: SegmentPolicy::MaxPropagation,
            sync_jump_width: 1,
        }
    }
}

/// Errors reported by [`CanDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error<E> {
    /// The peripheral failed a register access or transfer.
    #[error("peripheral error: {0:?}")]
    Peripheral(E),
    /// Bit timing could not be derived.
    #[error(transparent)]
    Timing(#[from] TimingError),
    /// A received identifier does not decode to a header.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Completion reported without a send in flight.
    #[error(transparent)]
    Status(#[from] StatusError),
    /// Filters and bit timing can only be written in [`Mode::Config`].
    #[error("peripheral is in {0:?} mode, not config mode")]
    NotInConfigMode(Option<Mode>),
    /// [`Mode::Normal`] requested before any bit timing was programmed.
    #[error("bit timing not configured")]
    TimingNotConfigured,
    /// The peripheral did not confirm a mode change in time.
    #[error("timed out waiting for {0:?} mode")]
    ModeTimeout(Mode),
    /// The peripheral rejected the frame built for a send.
    #[error("frame could not be built")]
    InvalidFrame,
    /// Received a frame with a 29-bit identifier.
    #[error("extended identifiers are not supported")]
    ExtendedFrame,
    /// Received a remote frame.
    #[error("remote frames are not supported")]
    RemoteFrame,
    /// Received a frame without the switch byte.
    #[error("frame has no payload")]
    EmptyPayload,
}

/// An outbound message. The header is borrowed; the caller keeps ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<'a> {
    /// Addressing of the message.
    pub header: &'a Header,
    /// Switch state carried in payload byte 0. Semantics are up to the node.
    pub is_switch_on: bool,
    /// Application bytes placed after the switch byte.
    pub data: Vec<u8, APP_DATA_LEN>,
}

impl<'a> Message<'a> {
    /// Creates a message for `header` with the switch on and no application data.
    pub fn new(header: &'a Header) -> Self {
        Self {
            header,
            is_switch_on: true,
            data: Vec::new(),
        }
    }

    /// Sets the switch state.
    pub fn with_switch(mut self, is_switch_on: bool) -> Self {
        self.is_switch_on = is_switch_on;
        self
    }

    /// Sets the application bytes. Returns `None` if more than 7 bytes are given.
    pub fn with_data(mut self, data: &[u8]) -> Option<Self> {
        self.data = Vec::from_slice(data).ok()?;
        Some(self)
    }

    /// The full 8-byte frame payload.
    pub fn payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[0] = self.is_switch_on as u8;
        payload[1..=self.data.len()].copy_from_slice(&self.data);
        payload
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ReceivedMessage {
    /// Decoded addressing.
    pub header: Header,
    /// Payload byte 0, non-zero meaning on.
    pub is_switch_on: bool,
    /// Remaining payload bytes.
    pub data: Vec<u8, APP_DATA_LEN>,
}

/// Driver for one CAN node.
///
/// ## Type Parameters
///
/// - `P`: the chip's [`CanPeripheral`]
/// - `STB`: transceiver standby pin; pass `None` if the transceiver has none
#[derive(Debug)]
pub struct CanDriver<'a, P, STB>
where
    P: CanPeripheral,
    STB: OutputPin,
{
    /// The CAN peripheral.
    pub peripheral: P,
    /// Transceiver standby pin.
    pub standby: Option<STB>,
    standby_inverted: bool,
    tracker: &'a TransmitTracker,
    filters: FilterConfigurator,
    mode: Option<Mode>,
    requested: Option<Mode>,
    timing_configured: bool,
}

impl<'a, P, STB> CanDriver<'a, P, STB>
where
    P: CanPeripheral,
    STB: OutputPin,
{
    /// Creates a driver. Nothing is written to the peripheral until [`init`](Self::init).
    ///
    /// # Arguments
    /// - `peripheral`: the CAN peripheral
    /// - `standby`: the optional transceiver standby pin (high = standby)
    /// - `standby_inverted`: whether the standby pin is active low
    /// - `tracker`: where send outcomes are recorded
    pub fn new(
        peripheral: P,
        standby: Option<STB>,
        standby_inverted: Option<bool>,
        tracker: &'a TransmitTracker,
    ) -> Self {
        Self {
            peripheral,
            standby,
            standby_inverted: standby_inverted.unwrap_or(false),
            tracker,
            filters: FilterConfigurator::new(),
            mode: None,
            requested: None,
            timing_configured: false,
        }
    }

    /// Wakes the transceiver, enters config mode and programs the bit timing.
    ///
    /// Filters can be set up afterwards; switch to [`Mode::Normal`] when done.
    pub fn init(&mut self, config: &DriverConfig) -> Result<BaudTiming, Error<P::Error>> {
        self.write_standby(false);
        self.set_mode_blocking(Mode::Config)?;
        self.setup_bit_timing(
            config.baud_kbps,
            config.cpu_mhz,
            config.segments,
            config.sync_jump_width,
        )
    }

    /// Puts the transceiver into standby.
    pub fn sleep(&mut self) {
        self.write_standby(true);
    }

    fn write_standby(&mut self, standby: bool) {
        let state = if self.standby_inverted { !standby } else { standby };
        if let Some(ref mut pin) = self.standby {
            if state {
                let _ = pin.set_high();
            } else {
                let _ = pin.set_low();
            }
        }
    }

    /// Last mode the peripheral confirmed.
    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    /// The tracker sends are recorded in.
    pub fn tracker(&self) -> &'a TransmitTracker {
        self.tracker
    }

    /// Filter slot assignment so far.
    pub fn filters(&self) -> &FilterConfigurator {
        &self.filters
    }

    /// Requests `mode` and polls for the peripheral to confirm it.
    ///
    /// Call repeatedly (or through `nb::block!`) until it returns `Ok`.
    ///
    /// # Errors
    /// [`Error::TimingNotConfigured`] when asking for [`Mode::Normal`] before
    /// [`setup_baud_rate`](Self::setup_baud_rate) succeeded.
    pub fn set_mode(&mut self, mode: Mode) -> nb::Result<(), Error<P::Error>> {
        if self.mode == Some(mode) {
            return Ok(());
        }
        if mode == Mode::Normal && !self.timing_configured {
            return Err(nb::Error::Other(Error::TimingNotConfigured));
        }
        if self.requested != Some(mode) {
            self.peripheral
                .request_mode(mode)
                .map_err(|e| nb::Error::Other(Error::Peripheral(e)))?;
            self.requested = Some(mode);
        }
        let reported = self
            .peripheral
            .mode()
            .map_err(|e| e.map(Error::Peripheral))?;
        if reported != mode {
            return Err(nb::Error::WouldBlock);
        }
        debug!("CAN mode {:?} (request bits {})", mode, mode.bits());
        self.mode = Some(mode);
        self.requested = None;
        Ok(())
    }

    /// Switches to `mode`, spinning until the peripheral confirms it.
    pub fn set_mode_blocking(&mut self, mode: Mode) -> Result<(), Error<P::Error>> {
        nb::block!(self.set_mode(mode))
    }

    /// Switches to `mode`, polling every `poll_us` microseconds for at most `timeout_us`.
    ///
    /// A `poll_us` of zero is treated as one microsecond.
    ///
    /// # Errors
    /// [`Error::ModeTimeout`] if the peripheral does not confirm in time.
    pub fn set_mode_with_timeout<D: DelayNs>(
        &mut self,
        mode: Mode,
        delay: &mut D,
        timeout_us: u32,
        poll_us: u32,
    ) -> Result<(), Error<P::Error>> {
        let poll_us = poll_us.max(1);
        let mut waited: u32 = 0;
        loop {
            match self.set_mode(mode) {
                Ok(()) => return Ok(()),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {}
            }
            if waited >= timeout_us {
                warn!("CAN mode {:?} not confirmed after {} us", mode, waited);
                return Err(Error::ModeTimeout(mode));
            }
            delay.delay_us(poll_us);
            waited = waited.saturating_add(poll_us);
        }
    }

    fn ensure_config_mode(&self) -> Result<(), Error<P::Error>> {
        if self.mode == Some(Mode::Config) {
            Ok(())
        } else {
            Err(Error::NotInConfigMode(self.mode))
        }
    }

    /// Programs the bit timing for `baud_kbps` at `cpu_mhz` with the default segment split.
    ///
    /// # Arguments
    /// - `baud_kbps`: bit rate in kbit/s, at most 500 (16 TQ per bit)
    /// - `cpu_mhz`: clock speed in MHz (mind PLL settings)
    pub fn setup_baud_rate(
        &mut self,
        baud_kbps: u16,
        cpu_mhz: u16,
    ) -> Result<BaudTiming, Error<P::Error>> {
        self.setup_bit_timing(baud_kbps, cpu_mhz, SegmentPolicy::default(), 1)
    }

    /// Programs the bit timing with an explicit segment policy and jump width.
    ///
    /// Requires [`Mode::Config`]. Nothing is written if the combination is rejected.
    pub fn setup_bit_timing(
        &mut self,
        baud_kbps: u16,
        cpu_mhz: u16,
        segments: SegmentPolicy,
        sync_jump_width: u8,
    ) -> Result<BaudTiming, Error<P::Error>> {
        self.ensure_config_mode()?;
        let timing = BaudTiming::compute(baud_kbps, cpu_mhz, segments, sync_jump_width)
            .inspect_err(|e| warn!("bit timing rejected: {:?}", e))?;
        self.peripheral
            .write_bit_timing(&timing)
            .map_err(Error::Peripheral)?;
        self.timing_configured = true;
        debug!(
            "bit timing {} kbit/s: prescaler {}, segments {}/{}/{}/{}",
            baud_kbps,
            timing.prescaler(),
            timing.sync_seg(),
            timing.prop_seg(),
            timing.phase_seg1(),
            timing.phase_seg2()
        );
        Ok(timing)
    }

    /// Accepts only frames whose identifier equals `header`'s encoding.
    ///
    /// The first filter takes slot one, every later filter overwrites slot two; an
    /// overwritten filter is returned in [`FilterUpdate::replaced`]. A slot is only
    /// taken once the peripheral accepted the write.
    pub fn setup_strict_receive_filter(
        &mut self,
        header: &Header,
    ) -> Result<FilterUpdate, Error<P::Error>> {
        self.setup_filter(header, FilterPolicy::Strict)
    }

    /// Accepts frames matching `header`'s message type and node id MSB.
    ///
    /// Slot assignment is the same as for
    /// [`setup_strict_receive_filter`](Self::setup_strict_receive_filter).
    pub fn setup_first_bit_id_receive_filter(
        &mut self,
        header: &Header,
    ) -> Result<FilterUpdate, Error<P::Error>> {
        self.setup_filter(header, FilterPolicy::FirstBit)
    }

    fn setup_filter(
        &mut self,
        header: &Header,
        policy: FilterPolicy,
    ) -> Result<FilterUpdate, Error<P::Error>> {
        self.ensure_config_mode()?;
        let update = self.filters.plan(header, policy);
        self.peripheral
            .write_filter(&update.spec)
            .map_err(Error::Peripheral)?;
        self.filters.commit(update);
        Ok(update)
    }

    /// Hands `message` to the transmit buffer and marks the tracker as sending at `now`.
    ///
    /// Returns as soon as the frame is queued. `WouldBlock` means the transmit buffer is
    /// still busy; the tracker is left untouched in that case.
    ///
    /// If the peripheral evicted a pending lower priority frame to make room, that frame
    /// is returned and was not sent.
    ///
    /// The transmit and the tracker update happen in one critical section, so a
    /// completion interrupt always finds the tracker in [`StatusCode::Sending`].
    pub fn send(
        &mut self,
        message: &Message<'_>,
        now: u32,
    ) -> nb::Result<Option<P::Frame>, Error<P::Error>> {
        let id = message.header.encode();
        let frame = P::Frame::new(StandardId::from(id), &message.payload())
            .ok_or(nb::Error::Other(Error::InvalidFrame))?;
        let displaced = critical_section::with(|cs| {
            let displaced = self
                .peripheral
                .transmit(&frame)
                .map_err(|e| e.map(Error::Peripheral))?;
            self.tracker.mark_sending(cs, now);
            Ok::<_, nb::Error<Error<P::Error>>>(displaced)
        })?;
        if displaced.is_some() {
            warn!("pending frame displaced by {:#x}", id.raw());
        }
        trace!("sending {:#x} at {}", id.raw(), now);
        Ok(displaced)
    }

    /// Polls the peripheral's completion signal and records the outcome at `now`.
    ///
    /// This is the caller side of the status hand-off, for applications that poll
    /// instead of handling the transmit interrupt.
    pub fn poll_completion(&mut self, now: u32) -> nb::Result<StatusCode, Error<P::Error>> {
        let status = match self.peripheral.transmit_complete() {
            Ok(()) => self.tracker.mark_ok(now),
            Err(nb::Error::WouldBlock) => return Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(e)) => {
                warn!("transmit failed: {}", error_kind_name(e.kind()));
                self.tracker.mark_error(now)
            }
        }
        .map_err(|e| nb::Error::Other(Error::Status(e)))?;
        Ok(status.code)
    }

    /// Takes the next frame from the receive buffer and decodes it.
    ///
    /// # Errors
    /// Frames that do not follow the addressing scheme are consumed and reported as
    /// [`Error::ExtendedFrame`], [`Error::RemoteFrame`], [`Error::EmptyPayload`] or
    /// [`Error::Decode`]; keep receiving after them.
    pub fn receive(&mut self) -> nb::Result<ReceivedMessage, Error<P::Error>> {
        let frame = self
            .peripheral
            .receive()
            .map_err(|e| e.map(Error::Peripheral))?;
        Ok(decode_frame(&frame)?)
    }

    /// Releases the peripheral and the standby pin.
    pub fn release(self) -> (P, Option<STB>) {
        (self.peripheral, self.standby)
    }
}

fn decode_frame<F: Frame, E>(frame: &F) -> Result<ReceivedMessage, Error<E>> {
    let sid = match frame.id() {
        Id::Standard(sid) => sid,
        Id::Extended(_) => return Err(Error::ExtendedFrame),
    };
    if frame.is_remote_frame() {
        return Err(Error::RemoteFrame);
    }
    let header = Header::decode(CanIdentifier::from(sid)).inspect_err(|e| {
        warn!("dropping frame {:#x}: {:?}", sid.as_raw(), e);
    })?;
    let (&switch, rest) = frame.data().split_first().ok_or(Error::EmptyPayload)?;
    let mut data = Vec::new();
    let _ = data.extend_from_slice(&rest[..rest.len().min(APP_DATA_LEN)]);
    Ok(ReceivedMessage {
        header,
        is_switch_on: switch != 0,
        data,
    })
}

fn error_kind_name(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Overrun => "overrun",
        ErrorKind::Bit => "bit error",
        ErrorKind::Stuff => "stuff error",
        ErrorKind::Crc => "crc error",
        ErrorKind::Form => "form error",
        ErrorKind::Acknowledge => "no acknowledge",
        _ => "other",
    }
}
