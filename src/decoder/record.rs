//! Record builder: payload chunks → trigger digits
//!
//! The two logical channels carry different mask kinds but are otherwise
//! decoded identically, so the channel is a small descriptor value (chunk
//! width, timing-offset formula, mask accessor) driving one shared merge
//! path.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{error, warn};

use crate::common::constants::{
    BCID_BITS, CLASS_REC_PAYLOAD, INT_REC_PAYLOAD, LINK_CLASS_REC, LINK_INT_REC,
};
use crate::common::{Digit, InteractionRecord};
use crate::config::TriggerOffsets;

use super::word::GbtWord;

/// Decoded digits keyed by corrected interaction record, timeline-ordered.
pub type DigitMap = BTreeMap<InteractionRecord, Digit>;

/// Logical link channel of the readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Interaction-record link (trigger inputs)
    IntRec,
    /// Class-record link (trigger classes)
    ClassRec,
}

impl Channel {
    /// Route a packet by the link id of its header.
    pub fn from_link(link: u8) -> Option<Self> {
        match link {
            LINK_INT_REC => Some(Self::IntRec),
            LINK_CLASS_REC => Some(Self::ClassRec),
            _ => None,
        }
    }

    /// Payload chunk width of this channel.
    pub fn payload_width(self) -> u32 {
        match self {
            Self::IntRec => INT_REC_PAYLOAD,
            Self::ClassRec => CLASS_REC_PAYLOAD,
        }
    }

    /// Mask selecting the payload region (everything above the bcid field).
    pub fn payload_mask(self) -> GbtWord {
        GbtWord::low_mask(self.payload_width() - BCID_BITS) << BCID_BITS
    }

    /// Timing correction subtracted from the bc component.
    pub fn bc_offset(self, offsets: &TriggerOffsets) -> i64 {
        match self {
            Self::IntRec => offsets.bc_shift,
            Self::ClassRec => offsets.bc_shift + offsets.lm_l0 + offsets.l0_l1 - 1,
        }
    }

    /// The mask this channel contributes to a digit.
    pub fn mask_of(self, digit: &Digit) -> u64 {
        match self {
            Self::IntRec => digit.input_mask,
            Self::ClassRec => digit.class_mask,
        }
    }

    /// Set this channel's mask on a digit.
    pub fn set_mask(self, digit: &mut Digit, mask: u64) {
        match self {
            Self::IntRec => digit.input_mask = mask,
            Self::ClassRec => digit.class_mask = mask,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::IntRec => "interaction-record",
            Self::ClassRec => "class-record",
        }
    }
}

/// Per-session decode counters, constructed fresh per interval and
/// returned alongside the output collections.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DecodeStats {
    /// Packets consumed
    pub packets: u64,
    /// 80-bit words assembled
    pub words: u64,
    /// Payload chunks extracted
    pub chunks: u64,
    /// Interaction-record chunks dropped by the timestamp underflow guard
    pub int_rec_rejected: u64,
    /// Class-record chunks dropped by the timestamp underflow guard
    pub class_rec_rejected: u64,
    /// Duplicate mask contributions (first value kept)
    pub duplicate_contributions: u64,
    /// Packets carrying an unrecognized link id (payload skipped)
    pub unknown_links: u64,
}

impl DecodeStats {
    fn rejected_mut(&mut self, channel: Channel) -> &mut u64 {
        match channel {
            Channel::IntRec => &mut self.int_rec_rejected,
            Channel::ClassRec => &mut self.class_rec_rejected,
        }
    }

    /// Rejected-chunk counter of one channel.
    pub fn rejected(&self, channel: Channel) -> u64 {
        match channel {
            Channel::IntRec => self.int_rec_rejected,
            Channel::ClassRec => self.class_rec_rejected,
        }
    }
}

/// Merge one payload chunk into the digit map.
///
/// A chunk with an all-zero payload region carries no trigger information
/// and is silently dropped. A chunk whose corrected timestamp would
/// underflow the interval start is dropped and tallied per channel. A
/// second contribution of the same kind for one record is reported and the
/// earlier value kept.
pub fn add_digit(
    channel: Channel,
    orbit: u32,
    chunk: GbtWord,
    tf_orbit: u32,
    offsets: &TriggerOffsets,
    digits: &mut DigitMap,
    stats: &mut DecodeStats,
) {
    let pld = chunk & channel.payload_mask();
    if pld.is_zero() {
        return;
    }
    let mask = (pld >> BCID_BITS).as_u64();
    let bcid = chunk.bcid();
    let uncorrected = InteractionRecord::new(bcid, orbit);
    let offset = channel.bc_offset(offsets);

    // Underflow guard: the original only protects the first orbit of the
    // interval, but a corrected timestamp before the start of the timeline
    // is equally unusable anywhere.
    let first_orbit_underflow = uncorrected.orbit <= tf_orbit && (bcid as i64) < offset;
    let corrected = match uncorrected.checked_sub_bc(offset) {
        Some(ir) if !first_orbit_underflow => ir,
        _ => {
            warn!(channel = channel.name(), %uncorrected, offset, "dropping chunk before interval start");
            *stats.rejected_mut(channel) += 1;
            return;
        }
    };

    match digits.entry(corrected) {
        std::collections::btree_map::Entry::Vacant(entry) => {
            let mut digit = Digit::new(corrected);
            channel.set_mask(&mut digit, mask);
            entry.insert(digit);
        }
        std::collections::btree_map::Entry::Occupied(mut entry) => {
            let digit = entry.get_mut();
            if channel.mask_of(digit) == 0 {
                channel.set_mask(digit, mask);
            } else {
                error!(
                    channel = channel.name(),
                    %corrected,
                    "two {} masks for the same timestamp, keeping the first",
                    channel.name()
                );
                stats.duplicate_contributions += 1;
            }
        }
    }
}
