//! Acceptance filter configuration.
//!
//! The peripheral has two mask/value filter pairs, both routing into the same receive
//! buffer. A frame is accepted when `id & mask == value` for either slot.
//!
//! [`FilterConfigurator`] hands out the slots in order: the first configuration takes
//! [`FilterSlot::First`], every later one takes [`FilterSlot::Second`] and replaces what was
//! there. The replacement is reported in [`FilterUpdate::replaced`] and logged; there is no
//! third slot.

use crate::consts::{MESSAGE_TYPE_MASK, NODE_ID_MSB_MASK, STANDARD_ID_MASK};
use crate::header::{CanIdentifier, Header};

/// Hardware acceptance filter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FilterSlot {
    /// Mask/filter pair 0.
    First,
    /// Mask/filter pair 1.
    Second,
}

/// How much of the identifier a filter compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FilterPolicy {
    /// All 11 bits must match.
    Strict,
    /// Only the node id MSB and the message type must match.
    ///
    /// Used to group every node sharing the high address bit.
    FirstBit,
}

impl FilterPolicy {
    /// Acceptance mask for this policy.
    pub const fn mask(self) -> u16 {
        match self {
            FilterPolicy::Strict => STANDARD_ID_MASK,
            FilterPolicy::FirstBit => NODE_ID_MSB_MASK | MESSAGE_TYPE_MASK,
        }
    }
}

/// A mask/value pair bound to a hardware slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FilterSpec {
    /// Bits set here are compared; clear bits are "don't care".
    pub mask: u16,
    /// Expected identifier bits, already reduced to `mask`.
    pub value: u16,
    /// Slot the pair is written to.
    pub slot: FilterSlot,
}

impl FilterSpec {
    /// Derives the mask/value pair accepting `header` under `policy`.
    pub const fn new(header: &Header, policy: FilterPolicy, slot: FilterSlot) -> Self {
        let mask = policy.mask();
        Self {
            mask,
            value: header.encode().raw() & mask,
            slot,
        }
    }

    /// Whether a frame with `id` passes this filter.
    pub const fn matches(&self, id: CanIdentifier) -> bool {
        id.raw() & self.mask == self.value
    }
}

/// Which filter slots have been handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FilterState {
    /// No filter configured yet; the next one takes the first slot.
    #[default]
    Empty,
    /// The first slot is taken; the next filter takes the second slot.
    FirstUsed,
    /// Both slots are taken; the next filter overwrites the second slot.
    BothUsed,
}

/// Result of configuring one filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FilterUpdate {
    /// The pair to program.
    pub spec: FilterSpec,
    /// The pair previously held by the same slot, if it got overwritten.
    pub replaced: Option<FilterSpec>,
}

/// Tracks slot assignment for the two acceptance filters.
#[derive(Debug, Default)]
pub struct FilterConfigurator {
    state: FilterState,
    slots: [Option<FilterSpec>; 2],
}

impl FilterConfigurator {
    /// Creates a configurator with both slots free.
    pub const fn new() -> Self {
        Self {
            state: FilterState::Empty,
            slots: [None, None],
        }
    }

    /// Current slot state.
    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Pair currently assigned to `slot`.
    pub fn slot(&self, slot: FilterSlot) -> Option<FilterSpec> {
        self.slots[Self::index(slot)]
    }

    /// Assigns the next slot to a filter for `header` and returns what to program.
    ///
    /// Same as [`plan`](Self::plan) followed by [`commit`](Self::commit).
    pub fn configure(&mut self, header: &Header, policy: FilterPolicy) -> FilterUpdate {
        let update = self.plan(header, policy);
        self.commit(update);
        update
    }

    /// Works out which slot a filter for `header` would take, without assigning it.
    ///
    /// Program the returned pair first and [`commit`](Self::commit) it once the write
    /// succeeded, so a failed write leaves the slot free for a retry.
    pub fn plan(&self, header: &Header, policy: FilterPolicy) -> FilterUpdate {
        let slot = match self.state {
            FilterState::Empty => FilterSlot::First,
            FilterState::FirstUsed | FilterState::BothUsed => FilterSlot::Second,
        };
        FilterUpdate {
            spec: FilterSpec::new(header, policy, slot),
            replaced: self.slots[Self::index(slot)],
        }
    }

    /// Records `update` as programmed.
    pub fn commit(&mut self, update: FilterUpdate) {
        let spec = update.spec;
        self.slots[Self::index(spec.slot)] = Some(spec);
        self.state = match spec.slot {
            FilterSlot::First if self.slots[1].is_none() => FilterState::FirstUsed,
            _ => FilterState::BothUsed,
        };

        if let Some(old) = update.replaced {
            warn!(
                "filter capacity exhausted: second slot {:?} overwritten by {:?}",
                old,
                spec
            );
        } else {
            debug!("filter {:?} assigned", spec);
        }
    }

    /// Whether any configured filter accepts `id`.
    ///
    /// With no filters configured every frame is accepted, as the hardware does.
    pub fn accepts(&self, id: CanIdentifier) -> bool {
        if self.state == FilterState::Empty {
            return true;
        }
        self.slots.iter().flatten().any(|spec| spec.matches(id))
    }

    fn index(slot: FilterSlot) -> usize {
        match slot {
            FilterSlot::First => 0,
            FilterSlot::Second => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MessageType;

    #[test]
    fn test_strict_filter_matches_whole_identifier() {
        let header = Header::new(0x42, MessageType::Normal);
        let spec = FilterSpec::new(&header, FilterPolicy::Strict, FilterSlot::First);

        assert_eq!(spec.mask, 0x7ff);
        assert_eq!(spec.value, header.encode().raw());
        assert!(spec.matches(header.encode()));
        assert!(!spec.matches(Header::new(0x43, MessageType::Normal).encode()));
        assert!(!spec.matches(Header::new(0x42, MessageType::Heartbeat).encode()));
    }

    #[test]
    fn test_first_bit_filter_mask_bits() {
        let header = Header::new(0b1000_0000, MessageType::Config);
        let spec = FilterSpec::new(&header, FilterPolicy::FirstBit, FilterSlot::First);

        assert_eq!(spec.mask, (1 << 10) | (1 << 2) | (1 << 1) | 1);
        assert_eq!(spec.value, (1 << 10) | MessageType::Config.bits() as u16);
    }

    #[test]
    fn test_first_bit_filter_groups_high_nodes() {
        let header = Header::new(0x80, MessageType::Config);
        let spec = FilterSpec::new(&header, FilterPolicy::FirstBit, FilterSlot::First);

        assert!(spec.matches(Header::new(0xfe, MessageType::Config).encode()));
        assert!(spec.matches(Header::new(0x81, MessageType::Config).encode()));
        assert!(!spec.matches(Header::new(0x7f, MessageType::Config).encode()));
        assert!(!spec.matches(Header::new(0x80, MessageType::Complex).encode()));
    }

    #[test]
    fn test_slots_are_assigned_first_then_second() {
        let mut filters = FilterConfigurator::new();
        assert_eq!(filters.state(), FilterState::Empty);

        let first = filters.configure(&Header::new(1, MessageType::Normal), FilterPolicy::Strict);
        assert_eq!(first.spec.slot, FilterSlot::First);
        assert_eq!(first.replaced, None);
        assert_eq!(filters.state(), FilterState::FirstUsed);

        let second = filters.configure(&Header::new(2, MessageType::Config), FilterPolicy::Strict);
        assert_eq!(second.spec.slot, FilterSlot::Second);
        assert_eq!(second.replaced, None);
        assert_eq!(filters.state(), FilterState::BothUsed);
    }

    #[test]
    fn test_third_filter_overwrites_second_slot_only() {
        let mut filters = FilterConfigurator::new();
        let first = filters.configure(&Header::new(1, MessageType::Normal), FilterPolicy::Strict);
        let second = filters.configure(&Header::new(2, MessageType::Config), FilterPolicy::Strict);
        let third =
            filters.configure(&Header::new(0x80, MessageType::Complex), FilterPolicy::FirstBit);

        assert_eq!(third.spec.slot, FilterSlot::Second);
        assert_eq!(third.replaced, Some(second.spec));
        assert_eq!(filters.slot(FilterSlot::First), Some(first.spec));
        assert_eq!(filters.slot(FilterSlot::Second), Some(third.spec));
        assert_eq!(filters.state(), FilterState::BothUsed);
    }

    #[test]
    fn test_plan_does_not_assign() {
        let mut filters = FilterConfigurator::new();
        let header = Header::new(1, MessageType::Normal);

        let planned = filters.plan(&header, FilterPolicy::Strict);
        assert_eq!(planned.spec.slot, FilterSlot::First);
        assert_eq!(filters.state(), FilterState::Empty);
        assert_eq!(filters.slot(FilterSlot::First), None);
        assert_eq!(filters.plan(&header, FilterPolicy::Strict), planned);

        filters.commit(planned);
        assert_eq!(filters.state(), FilterState::FirstUsed);
        assert_eq!(filters.slot(FilterSlot::First), Some(planned.spec));
    }

    #[test]
    fn test_accepts_either_slot() {
        let mut filters = FilterConfigurator::new();
        let any = Header::new(9, MessageType::Heartbeat).encode();
        assert!(filters.accepts(any));

        let _ = filters.configure(&Header::new(1, MessageType::Normal), FilterPolicy::Strict);
        let _ = filters.configure(&Header::new(0x80, MessageType::Config), FilterPolicy::FirstBit);

        assert!(filters.accepts(Header::new(1, MessageType::Normal).encode()));
        assert!(filters.accepts(Header::new(0xc3, MessageType::Config).encode()));
        assert!(!filters.accepts(any));
    }
}
