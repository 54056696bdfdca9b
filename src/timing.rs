//! Bit-timing calculator for a fixed 16 time-quantum bit period.
//!
//! One bit is split into `SYNC (1) + PROP + PHASE1 + PHASE2 = 16` time quanta, and the
//! time quantum is derived from the core clock by an integer prescaler:
//!
//! ```text
//! prescaler * 16 * baud_rate == cpu_clock
//! ```
//!
//! Combinations without an exact integer prescaler are rejected; a rounded baud rate would
//! drift against every other node on the bus.
//!
//! ## Segment distribution
//!
//! | Policy                                      | PROP | PHASE1 | PHASE2 | Sample point |
//! |---------------------------------------------|------|--------|--------|--------------|
//! | [`MaxPropagation`](SegmentPolicy::MaxPropagation) (default) | 8 | 3 | 4 | 75.0 % |
//! | [`Balanced`](SegmentPolicy::Balanced)        |    5 |      5 |      5 | 68.75 %      |
//! | [`Custom`](SegmentPolicy::Custom)            |  1-8 |    1-8 |    2-8 | -            |
//!
//! `MaxPropagation` gives the longest propagation segment the peripheral allows, which
//! suits long bus runs. Match the policy to the physical topology of the deployed bus.

use crate::consts::{
    MAX_BAUD_KBPS, MAX_PRESCALER, MAX_SEGMENT, MAX_SJW, MIN_PHASE_SEG2, SYNC_SEG, TQ_PER_BIT,
};

/// Lengths of the variable bit segments, in time quanta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SegmentSplit {
    /// Propagation segment.
    pub prop_seg: u8,
    /// Phase segment 1 (before the sample point).
    pub phase_seg1: u8,
    /// Phase segment 2 (after the sample point).
    pub phase_seg2: u8,
}

impl SegmentSplit {
    const MAX_PROPAGATION: Self = Self {
        prop_seg: 8,
        phase_seg1: 3,
        phase_seg2: 4,
    };

    const BALANCED: Self = Self {
        prop_seg: 5,
        phase_seg1: 5,
        phase_seg2: 5,
    };

    /// Checks the split against the peripheral limits and the 16 TQ bit period.
    fn validate(&self, sync_jump_width: u8) -> Result<(), TimingError> {
        let total = SYNC_SEG as u16
            + self.prop_seg as u16
            + self.phase_seg1 as u16
            + self.phase_seg2 as u16;
        if total != TQ_PER_BIT as u16 {
            return Err(TimingError::InvalidSplit(*self));
        }
        if !(1..=MAX_SEGMENT).contains(&self.prop_seg)
            || !(1..=MAX_SEGMENT).contains(&self.phase_seg1)
            || !(MIN_PHASE_SEG2..=MAX_SEGMENT).contains(&self.phase_seg2)
        {
            return Err(TimingError::InvalidSplit(*self));
        }
        if sync_jump_width > self.phase_seg1 || sync_jump_width > self.phase_seg2 {
            return Err(TimingError::InvalidSyncJumpWidth(sync_jump_width));
        }
        Ok(())
    }
}

/// How the 15 non-sync time quanta are distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SegmentPolicy {
    /// Longest propagation segment: 8 / 3 / 4.
    #[default]
    MaxPropagation,
    /// Equal segments: 5 / 5 / 5.
    Balanced,
    /// Caller supplied split, validated against the peripheral limits.
    Custom(SegmentSplit),
}

impl SegmentPolicy {
    /// Segment lengths selected by this policy.
    pub const fn split(self) -> SegmentSplit {
        match self {
            SegmentPolicy::MaxPropagation => SegmentSplit::MAX_PROPAGATION,
            SegmentPolicy::Balanced => SegmentSplit::BALANCED,
            SegmentPolicy::Custom(split) => split,
        }
    }
}

/// Rejected baud rate / clock combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TimingError {
    /// Baud rate of zero.
    #[error("baud rate must be non-zero")]
    ZeroBaudRate,
    /// Clock speed of zero.
    #[error("clock speed must be non-zero")]
    ZeroClock,
    /// Baud rate above [`MAX_BAUD_KBPS`].
    #[error("baud rate {0} kbit/s exceeds 500 kbit/s")]
    BaudRateTooHigh(u16),
    /// No integer prescaler reproduces the baud rate exactly.
    #[error("{baud_kbps} kbit/s is not reachable from {cpu_mhz} MHz with 16 TQ per bit")]
    InexactPrescaler {
        /// Requested baud rate in kbit/s.
        baud_kbps: u16,
        /// Clock speed in MHz.
        cpu_mhz: u16,
    },
    /// The exact prescaler does not fit the baud rate generator.
    #[error("prescaler {0} outside 1..=64")]
    PrescalerOutOfRange(u32),
    /// Segment lengths break the 16 TQ period or the peripheral limits.
    #[error("invalid segment split {0:?}")]
    InvalidSplit(SegmentSplit),
    /// Synchronisation jump width outside `1..=4` or longer than a phase segment.
    #[error("invalid synchronisation jump width {0}")]
    InvalidSyncJumpWidth(u8),
}

/// Register-ready bit timing.
///
/// Only [`BaudTiming::compute`] builds one, so every value satisfies the segment and
/// prescaler limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct BaudTiming {
    prescaler: u8,
    sync_seg: u8,
    prop_seg: u8,
    phase_seg1: u8,
    phase_seg2: u8,
    sync_jump_width: u8,
}

impl BaudTiming {
    /// Computes the timing for `baud_kbps` at a `cpu_mhz` clock.
    ///
    /// # Arguments
    /// - `baud_kbps`: bit rate in kbit/s, at most 500
    /// - `cpu_mhz`: clock feeding the baud rate generator in MHz (mind the PLL)
    /// - `policy`: segment distribution
    /// - `sync_jump_width`: 1 to 4 TQ, no longer than either phase segment
    ///
    /// # Errors
    /// Any [`TimingError`]; nothing is rounded.
    pub fn compute(
        baud_kbps: u16,
        cpu_mhz: u16,
        policy: SegmentPolicy,
        sync_jump_width: u8,
    ) -> Result<Self, TimingError> {
        if baud_kbps == 0 {
            return Err(TimingError::ZeroBaudRate);
        }
        if cpu_mhz == 0 {
            return Err(TimingError::ZeroClock);
        }
        if baud_kbps > MAX_BAUD_KBPS {
            return Err(TimingError::BaudRateTooHigh(baud_kbps));
        }
        if !(1..=MAX_SJW).contains(&sync_jump_width) {
            return Err(TimingError::InvalidSyncJumpWidth(sync_jump_width));
        }

        let split = policy.split();
        split.validate(sync_jump_width)?;

        // Work in kHz so both sides stay integral.
        let clock_khz = cpu_mhz as u32 * 1_000;
        let bit_khz = baud_kbps as u32 * TQ_PER_BIT as u32;
        if clock_khz % bit_khz != 0 {
            return Err(TimingError::InexactPrescaler { baud_kbps, cpu_mhz });
        }
        let prescaler = clock_khz / bit_khz;
        if !(1..=MAX_PRESCALER).contains(&prescaler) {
            return Err(TimingError::PrescalerOutOfRange(prescaler));
        }

        Ok(Self {
            prescaler: prescaler as u8,
            sync_seg: SYNC_SEG,
            prop_seg: split.prop_seg,
            phase_seg1: split.phase_seg1,
            phase_seg2: split.phase_seg2,
            sync_jump_width,
        })
    }

    /// Clock divider producing one time quantum, 1 to 64.
    pub fn prescaler(&self) -> u8 {
        self.prescaler
    }

    /// Synchronisation segment, always 1 TQ.
    pub fn sync_seg(&self) -> u8 {
        self.sync_seg
    }

    /// Propagation segment length.
    pub fn prop_seg(&self) -> u8 {
        self.prop_seg
    }

    /// Phase segment 1 length.
    pub fn phase_seg1(&self) -> u8 {
        self.phase_seg1
    }

    /// Phase segment 2 length.
    pub fn phase_seg2(&self) -> u8 {
        self.phase_seg2
    }

    /// Synchronisation jump width.
    pub fn sync_jump_width(&self) -> u8 {
        self.sync_jump_width
    }

    /// Total time quanta per bit; always 16.
    pub fn quanta_per_bit(&self) -> u8 {
        self.sync_seg + self.prop_seg + self.phase_seg1 + self.phase_seg2
    }

    /// Resulting bit rate in bit/s for a `cpu_mhz` clock.
    pub fn bit_rate(&self, cpu_mhz: u16) -> u64 {
        cpu_mhz as u64 * 1_000_000 / (self.prescaler as u64 * self.quanta_per_bit() as u64)
    }

    /// Sample point position in per mille of the bit period.
    pub fn sample_point_permille(&self) -> u16 {
        let before = (self.sync_seg + self.prop_seg + self.phase_seg1) as u16;
        before * 1_000 / self.quanta_per_bit() as u16
    }

    /// Baud rate prescaler field, stored minus one.
    pub fn brp_field(&self) -> u8 {
        self.prescaler - 1
    }

    /// Segment length fields as `(sjw, prop, phase1, phase2)`, each stored minus one.
    pub fn segment_fields(&self) -> (u8, u8, u8, u8) {
        (
            self.sync_jump_width - 1,
            self.prop_seg - 1,
            self.phase_seg1 - 1,
            self.phase_seg2 - 1,
        )
    }
}
