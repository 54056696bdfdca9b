//! Transmit status tracking.
//!
//! [`TransmitTracker`] records the outcome of the last send together with a timestamp in
//! whatever unit the application uses. The driver moves it to [`StatusCode::Sending`] when a
//! frame is handed to the peripheral; the application moves it on to
//! [`StatusCode::Ok`] or [`StatusCode::Error`] once the peripheral signals completion.
//!
//! ```text
//!  NothingSent ──send──▶ Sending ──mark_ok────▶ Ok
//!                           ▲    ──mark_error─▶ Error
//!                           └──────send───────────┘
//! ```
//!
//! The code and timestamp are stored as one record behind a `critical_section::Mutex`,
//! so an interrupt handler never observes a code without its matching timestamp.
//! A send that never completes stays in `Sending` until the next send; timeouts are up to
//! the caller.

use core::cell::Cell;
use critical_section::{CriticalSection, Mutex};

/// Outcome of the last requested send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum StatusCode {
    /// The peripheral reported a successful transmission.
    Ok = 0,
    /// The peripheral reported a bus error or lost arbitration for good.
    Error = 1,
    /// A frame was handed to the peripheral and has not completed yet.
    Sending = 2,
    /// Nothing has been sent since start-up.
    #[default]
    NothingSent = 3,
}

/// Status code together with the time of its last change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct TransmitStatus {
    /// Current status code.
    pub code: StatusCode,
    /// Application defined time of the last transition; `None` until the first send.
    pub timestamp: Option<u32>,
}

impl TransmitStatus {
    /// Start-up state: nothing sent, no timestamp.
    pub const INITIAL: Self = Self {
        code: StatusCode::NothingSent,
        timestamp: None,
    };
}

/// Invalid caller-side transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum StatusError {
    /// Completion was reported while no send was in flight.
    #[error("no send in flight (status is {0:?})")]
    NotSending(StatusCode),
}

/// Interrupt-safe record of the last send.
///
/// Usually placed in a `static` and shared by reference between the driver and the
/// completion handler:
///
/// ```ignore
/// static TRANSMIT_STATUS: TransmitTracker = TransmitTracker::new();
///
/// let mut driver = CanDriver::new(peripheral, None::<NoPin>, None, &TRANSMIT_STATUS);
/// ```
#[derive(Debug)]
pub struct TransmitTracker {
    status: Mutex<Cell<TransmitStatus>>,
}

impl Default for TransmitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TransmitTracker {
    /// Creates a tracker in the start-up state.
    pub const fn new() -> Self {
        Self {
            status: Mutex::new(Cell::new(TransmitStatus::INITIAL)),
        }
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> TransmitStatus {
        critical_section::with(|cs| self.status.borrow(cs).get())
    }

    /// Current status code.
    pub fn code(&self) -> StatusCode {
        self.status().code
    }

    /// Records that a send was issued at `now`. Only the driver issues sends.
    ///
    /// Takes the critical section the frame was handed to the peripheral in.
    pub(crate) fn mark_sending(&self, cs: CriticalSection<'_>, now: u32) {
        self.status.borrow(cs).set(TransmitStatus {
            code: StatusCode::Sending,
            timestamp: Some(now),
        });
    }

    /// Records a successful completion at `now`.
    ///
    /// # Errors
    /// [`StatusError::NotSending`] unless a send is in flight.
    pub fn mark_ok(&self, now: u32) -> Result<TransmitStatus, StatusError> {
        self.complete(StatusCode::Ok, now)
    }

    /// Records a failed completion at `now`.
    ///
    /// # Errors
    /// [`StatusError::NotSending`] unless a send is in flight.
    pub fn mark_error(&self, now: u32) -> Result<TransmitStatus, StatusError> {
        self.complete(StatusCode::Error, now)
    }

    fn complete(&self, code: StatusCode, now: u32) -> Result<TransmitStatus, StatusError> {
        critical_section::with(|cs| {
            let cell = self.status.borrow(cs);
            let current = cell.get();
            if current.code != StatusCode::Sending {
                return Err(StatusError::NotSending(current.code));
            }
            let next = TransmitStatus {
                code,
                timestamp: Some(now),
            };
            cell.set(next);
            Ok(next)
        })
    }
}
