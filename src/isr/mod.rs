//! Interrupt helpers (feature `isr`).
//!
//! Transmit completion is usually signalled by an interrupt. These helpers keep the
//! driver in a global `critical_section::Mutex<RefCell<Option<CanDriver>>>` so the main
//! flow and the interrupt handler can both reach it:
//!
//! - [`global_can_driver_init`]: const initialiser for the global
//! - [`global_can_driver_setup`]: installs and initialises a driver
//! - [`global_can_send`]: sends through the global driver
//! - [`global_transmit_complete`]: records the outcome from the transmit interrupt
//! - [`init_can_driver!`](crate::init_can_driver) and
//!   [`init_transmit_tracker!`](crate::init_transmit_tracker): declare the statics

use crate::driver::{CanDriver, DriverConfig, Error, Message};
use crate::peripheral::CanPeripheral;
use crate::status::{StatusCode, TransmitTracker};
use core::cell::RefCell;
use critical_section::Mutex;
use embedded_hal::digital::OutputPin;

mod macros;

/// A driver shared between the main flow and interrupt handlers.
pub type GlobalCanDriver<P, STB> = Mutex<RefCell<Option<CanDriver<'static, P, STB>>>>;

/// Used to initialise a global static driver slot, empty until
/// [`global_can_driver_setup`] runs.
///
/// ```ignore
/// static CAN_DRIVER: GlobalCanDriver<Ecan, StbPin> = global_can_driver_init();
/// ```
pub const fn global_can_driver_init<P, STB>() -> GlobalCanDriver<P, STB>
where
    P: CanPeripheral,
    STB: OutputPin,
{
    Mutex::new(RefCell::new(None))
}

/// Builds a driver, runs [`CanDriver::init`] and installs it in `global_driver`.
///
/// On error the slot is left empty and the error returned.
///
/// ```ignore
/// fn main() {
///     let config = DriverConfig::default();
///     global_can_driver_setup(&CAN_DRIVER, ecan, Some(stb), None, &TRANSMIT_STATUS, &config)?;
/// }
/// ```
pub fn global_can_driver_setup<P, STB>(
    global_driver: &'static GlobalCanDriver<P, STB>,
    peripheral: P,
    standby: Option<STB>,
    standby_inverted: Option<bool>,
    tracker: &'static TransmitTracker,
    config: &DriverConfig,
) -> Result<(), Error<P::Error>>
where
    P: CanPeripheral,
    STB: OutputPin,
{
    let mut driver = CanDriver::new(peripheral, standby, standby_inverted, tracker);
    let _ = driver.init(config)?;
    critical_section::with(|cs| {
        let _ = global_driver.borrow(cs).replace(Some(driver));
    });
    Ok(())
}

/// Sends `message` through the global driver.
///
/// Returns `WouldBlock` while the transmit buffer is busy or no driver is installed, and
/// the displaced frame like [`CanDriver::send`].
pub fn global_can_send<P, STB>(
    global_driver: &'static GlobalCanDriver<P, STB>,
    message: &Message<'_>,
    now: u32,
) -> nb::Result<Option<P::Frame>, Error<P::Error>>
where
    P: CanPeripheral,
    STB: OutputPin,
{
    critical_section::with(|cs| match global_driver.borrow(cs).borrow_mut().as_mut() {
        Some(driver) => driver.send(message, now),
        None => Err(nb::Error::WouldBlock),
    })
}

/// Records the transmit outcome; call from the transmit interrupt.
///
/// Returns the recorded code, or `None` if no driver is installed, the frame is still
/// pending, or no send was in flight.
///
/// ```ignore
/// #[interrupt]
/// fn CAN_TX() {
///     global_transmit_complete(&CAN_DRIVER, ticks());
/// }
/// ```
pub fn global_transmit_complete<P, STB>(
    global_driver: &'static GlobalCanDriver<P, STB>,
    now: u32,
) -> Option<StatusCode>
where
    P: CanPeripheral,
    STB: OutputPin,
{
    critical_section::with(|cs| {
        global_driver
            .borrow(cs)
            .borrow_mut()
            .as_mut()
            .and_then(|driver| driver.poll_completion(now).ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Header, MessageType};
    use crate::mock::MockPeripheral;
    use embedded_hal_mock::eh1::digital::Mock as PinMock;

    fn leak<T: 'static>(value: T) -> &'static T {
        Box::leak(Box::new(value))
    }

    #[test]
    fn test_global_driver_round_trip() {
        let global = leak(global_can_driver_init::<MockPeripheral, PinMock>());
        let tracker = leak(TransmitTracker::new());
        let header = Header::new(0x0a, MessageType::Normal);
        let message = Message::new(&header);

        assert_eq!(
            global_can_send(global, &message, 1),
            Err(nb::Error::WouldBlock)
        );
        assert_eq!(global_transmit_complete(global, 1), None);

        global_can_driver_setup(
            global,
            MockPeripheral::new(),
            None,
            None,
            tracker,
            &DriverConfig::default(),
        )
        .unwrap();

        assert_eq!(global_can_send(global, &message, 2), Ok(None));
        assert_eq!(tracker.code(), StatusCode::Sending);
        assert_eq!(global_transmit_complete(global, 3), None);

        critical_section::with(|cs| {
            if let Some(driver) = global.borrow(cs).borrow_mut().as_mut() {
                driver.peripheral.completion = Some(Ok(()));
            }
        });
        assert_eq!(global_transmit_complete(global, 4), Some(StatusCode::Ok));
        assert_eq!(tracker.status().timestamp, Some(4));
    }

    #[test]
    fn test_failed_setup_leaves_slot_empty() {
        let global = leak(global_can_driver_init::<MockPeripheral, PinMock>());
        let tracker = leak(TransmitTracker::new());
        let config = DriverConfig {
            cpu_mhz: 0,
            ..DriverConfig::default()
        };

        assert!(
            global_can_driver_setup(global, MockPeripheral::new(), None, None, tracker, &config)
                .is_err()
        );
        assert!(critical_section::with(|cs| global.borrow(cs).borrow().is_none()));
    }
}
