//! Recording peripheral used by the unit tests.

use crate::consts::PAYLOAD_LEN;
use crate::filter::FilterSpec;
use crate::peripheral::{CanPeripheral, Mode};
use crate::status::{StatusError, TransmitStatus, TransmitTracker};
use crate::timing::BaudTiming;
use embedded_can::{ErrorKind, Id};
use heapless::Vec;
use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MockFrame {
    pub id: Id,
    pub data: Vec<u8, PAYLOAD_LEN>,
    pub remote: bool,
}

impl embedded_can::Frame for MockFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        Some(Self {
            id: id.into(),
            data: Vec::from_slice(data).ok()?,
            remote: false,
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > PAYLOAD_LEN {
            return None;
        }
        Some(Self {
            id: id.into(),
            data: Vec::new(),
            remote: true,
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.data.len()
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MockError(pub ErrorKind);

impl embedded_can::Error for MockError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Everything the driver asked the peripheral to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    RequestMode(Mode),
    Filter(FilterSpec),
    BitTiming(BaudTiming),
    Transmit(MockFrame),
}

#[derive(Debug)]
pub(crate) struct MockPeripheral {
    pub events: std::vec::Vec<Event>,
    pub mode: Mode,
    pending: Option<Mode>,
    /// Polls of `mode()` that report `WouldBlock` before a requested change lands.
    pub mode_latency: u8,
    polls: u8,
    pub tx_busy: bool,
    /// Frame evicted by the next transmit.
    pub displaced: Option<MockFrame>,
    /// Error returned by the next filter write.
    pub filter_error: Option<MockError>,
    pub rx: VecDeque<MockFrame>,
    /// `None` keeps the transmit buffer pending.
    pub completion: Option<Result<(), MockError>>,
    /// Tracker completed from another thread as soon as a frame is transmitted, the way
    /// a transmit interrupt would.
    pub completion_isr: Option<&'static TransmitTracker>,
    pub isr: Option<JoinHandle<Result<TransmitStatus, StatusError>>>,
}

impl MockPeripheral {
    pub fn new() -> Self {
        Self {
            events: std::vec::Vec::new(),
            mode: Mode::Config,
            pending: None,
            mode_latency: 0,
            polls: 0,
            tx_busy: false,
            displaced: None,
            filter_error: None,
            rx: VecDeque::new(),
            completion: None,
            completion_isr: None,
            isr: None,
        }
    }

    pub fn transmitted(&self) -> std::vec::Vec<&MockFrame> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Transmit(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }
}

impl embedded_can::nb::Can for MockPeripheral {
    type Frame = MockFrame;
    type Error = MockError;

    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        if self.tx_busy {
            return Err(nb::Error::WouldBlock);
        }
        self.events.push(Event::Transmit(frame.clone()));
        if let Some(tracker) = self.completion_isr {
            self.isr = Some(thread::spawn(move || tracker.mark_ok(1_000)));
            // Give the completion every chance to land before the sender continues.
            thread::sleep(Duration::from_millis(20));
        }
        Ok(self.displaced.take())
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        self.rx.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

impl CanPeripheral for MockPeripheral {
    fn request_mode(&mut self, mode: Mode) -> Result<(), Self::Error> {
        self.events.push(Event::RequestMode(mode));
        self.pending = Some(mode);
        self.polls = 0;
        Ok(())
    }

    fn mode(&mut self) -> nb::Result<Mode, Self::Error> {
        if let Some(mode) = self.pending {
            if self.polls < self.mode_latency {
                self.polls += 1;
                return Err(nb::Error::WouldBlock);
            }
            self.mode = mode;
            self.pending = None;
        }
        Ok(self.mode)
    }

    fn write_filter(&mut self, spec: &FilterSpec) -> Result<(), Self::Error> {
        if let Some(error) = self.filter_error.take() {
            return Err(error);
        }
        self.events.push(Event::Filter(*spec));
        Ok(())
    }

    fn write_bit_timing(&mut self, timing: &BaudTiming) -> Result<(), Self::Error> {
        self.events.push(Event::BitTiming(*timing));
        Ok(())
    }

    fn transmit_complete(&mut self) -> nb::Result<(), Self::Error> {
        match self.completion {
            None => Err(nb::Error::WouldBlock),
            Some(result) => result.map_err(nb::Error::Other),
        }
    }
}
