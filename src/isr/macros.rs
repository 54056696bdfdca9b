/// Declares a static global `CAN_DRIVER` protected by a `critical_section` mutex.
///
/// Both the main flow and the transmit interrupt reach the driver through it.
///
/// # Arguments
/// - `$p`: the concrete peripheral type (must implement `CanPeripheral`)
/// - `$stb`: the concrete standby pin type (must implement `OutputPin`)
///
/// # Example
/// ```ignore
/// init_can_driver!(Ecan, StbPin);
/// ```
#[macro_export]
macro_rules! init_can_driver {
    ( $p:ty, $stb:ty ) => {
        pub static CAN_DRIVER: $crate::isr::GlobalCanDriver<$p, $stb> =
            $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
    };
}

/// Declares the static `TRANSMIT_STATUS` tracker shared by the driver and the
/// completion handler.
///
/// # Example
/// ```ignore
/// init_transmit_tracker!();
///
/// let mut driver = CanDriver::new(ecan, None, None, &TRANSMIT_STATUS);
/// ```
#[macro_export]
macro_rules! init_transmit_tracker {
    () => {
        pub static TRANSMIT_STATUS: $crate::status::TransmitTracker =
            $crate::status::TransmitTracker::new();
    };
}
