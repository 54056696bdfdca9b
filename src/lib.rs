//! # cannode
//!
//! A portable, no_std driver layer for a single CAN bus node.
//!
//! The node addresses its traffic with a compact scheme packed into standard 11-bit
//! identifiers: an 8-bit node id followed by a 3-bit message type. On top of that the
//! driver provides:
//! - a header codec between `(node id, message type)` and CAN identifiers
//! - acceptance filter derivation for the peripheral's two filter slots
//! - bit timing for a fixed 16 time-quantum bit period
//! - interrupt-safe tracking of the last transmission's outcome with `critical-section`
//!
//! Register access stays with the chip support layer, which implements
//! [`peripheral::CanPeripheral`] on top of `embedded-can`.
//!
//! ## Crate features
//! | Feature         | Description |
//! |-----------------|-------------|
//! | `std`           | Disables `#![no_std]` |
//! | `isr` (default) | Global driver helpers and macros for interrupt handlers |
//! | `defmt-0-3`     | Uses `defmt` logging |
//! | `log`           | Uses `log` logging |
//!
//! ## Usage
//!
//! ```ignore
//! use cannode::driver::{CanDriver, DriverConfig, Message};
//! use cannode::header::{Header, MessageType};
//! use cannode::peripheral::Mode;
//!
//! cannode::init_transmit_tracker!();
//!
//! let mut driver = CanDriver::new(ecan, Some(stb), None, &TRANSMIT_STATUS);
//! driver.init(&DriverConfig::default())?;
//! driver.setup_strict_receive_filter(&Header::new(NODE_ID, MessageType::Config))?;
//! driver.set_mode_blocking(Mode::Normal)?;
//!
//! let header = Header::new(NODE_ID, MessageType::Normal);
//! nb::block!(driver.send(&Message::new(&header).with_switch(false), ticks()))?;
//! ```
//!
//! ## Integration Notes
//!
//! - Only standard identifiers are used; extended frames are rejected on receive
//! - Only one hardware transmit buffer is used
//! - A third filter overwrites the second slot; the replaced filter is reported
//! - Transmission outcome is recorded by the application from the peripheral's
//!   completion interrupt or by polling
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub use critical_section;
pub use embedded_can;
pub use heapless;

#[macro_use]
mod fmt;

pub mod consts;
pub mod driver;
pub mod filter;
pub mod header;
#[cfg(feature = "isr")]
pub mod isr;
#[cfg(test)]
mod mock;
pub mod peripheral;
pub mod status;
pub mod timing;
