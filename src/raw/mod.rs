//! Inverse encoder: trigger digits → raw link packets
//!
//! Produces the packet stream a readout link would carry for a given digit
//! map, one heartbeat packet per (channel, orbit). Used by the emulator to
//! generate test data; decoding its output reproduces the digits exactly.

use std::collections::BTreeMap;

use tracing::debug;

use crate::common::constants::{
    BCID_BITS, DATA_FORMAT_COMPACT, DATA_FORMAT_PADDED, HB_TRIGGER_MASK, TF_TRIGGER_MASK,
    WORD_BYTES,
};
use crate::common::{Digit, PacketHeader, RawPacket};
use crate::config::TriggerOffsets;
use crate::decoder::record::Channel;
use crate::decoder::word::GbtWord;

/// Encodes digits into the raw link format.
pub struct RawEncoder {
    offsets: TriggerOffsets,
    padded: bool,
}

impl RawEncoder {
    pub fn new(offsets: TriggerOffsets, padded: bool) -> Self {
        Self { offsets, padded }
    }

    /// Serialize digits into packets, ordered by (orbit, link).
    ///
    /// Each channel's chunk carries the digit's record shifted forward by
    /// that channel's timing offset, undoing the decoder's correction. The
    /// first packet carries the timeframe-start flag; when the earliest
    /// data orbit is nonzero it is an empty packet one orbit earlier, so
    /// that hardware timestamps near the orbit boundary stay decodable.
    pub fn encode<'a>(&self, digits: impl IntoIterator<Item = &'a Digit>) -> Vec<RawPacket> {
        // (orbit, link) → chunks, in timeline order
        let mut groups: BTreeMap<(u32, u8), Vec<GbtWord>> = BTreeMap::new();
        for digit in digits {
            for channel in [Channel::IntRec, Channel::ClassRec] {
                let mask = channel.mask_of(digit);
                if mask == 0 {
                    continue;
                }
                let shifted = digit.record.add_bc(channel.bc_offset(&self.offsets));
                let chunk =
                    GbtWord::new(shifted.bc as u128 | ((mask as u128) << BCID_BITS));
                groups
                    .entry((shifted.orbit, channel as u8))
                    .or_default()
                    .push(chunk);
            }
        }

        let mut packets = Vec::new();
        if let Some(&(first_orbit, _)) = groups.keys().next() {
            if first_orbit > 0 {
                packets.push(self.make_packet(
                    Channel::IntRec,
                    first_orbit - 1,
                    TF_TRIGGER_MASK | HB_TRIGGER_MASK,
                    Vec::new(),
                ));
            }
        }

        for ((orbit, link), chunks) in groups {
            let channel = if link == 0 {
                Channel::IntRec
            } else {
                Channel::ClassRec
            };
            let words = pack_words(&chunks, channel.payload_width());
            debug!(
                channel = channel.name(),
                orbit,
                chunks = chunks.len(),
                words = words.len(),
                "encoding heartbeat packet"
            );
            let trigger_type = if packets.is_empty() {
                TF_TRIGGER_MASK | HB_TRIGGER_MASK
            } else {
                HB_TRIGGER_MASK
            };
            packets.push(self.make_packet(channel, orbit, trigger_type, words));
        }
        packets
    }

    fn make_packet(
        &self,
        channel: Channel,
        orbit: u32,
        trigger_type: u32,
        words: Vec<GbtWord>,
    ) -> RawPacket {
        let mut payload = Vec::with_capacity(words.len() * if self.padded { 16 } else { 10 });
        for word in words {
            for lane in 0..WORD_BYTES {
                payload.push(word.byte(lane));
            }
            if self.padded {
                payload.extend([0u8; 6]);
            }
        }
        RawPacket::new(
            PacketHeader {
                fee_id: (channel as u16) << 8,
                orbit,
                trigger_type,
                page_counter: 0,
                data_format: if self.padded {
                    DATA_FORMAT_PADDED
                } else {
                    DATA_FORMAT_COMPACT
                },
            },
            payload,
        )
    }
}

/// Concatenate `npld`-bit chunks into 80-bit words, low bits first. The
/// last word is zero-padded; the zero tail unpacks into an all-zero
/// remnant or chunk, which the decoder drops as empty.
pub fn pack_words(chunks: &[GbtWord], npld: u32) -> Vec<GbtWord> {
    let mut words = Vec::new();
    let mut acc = GbtWord::ZERO;
    let mut filled = 0u32;
    for &chunk in chunks {
        acc |= chunk << filled;
        if filled + npld >= GbtWord::WIDTH {
            words.push(acc);
            acc = chunk >> (GbtWord::WIDTH - filled);
            filled = filled + npld - GbtWord::WIDTH;
        } else {
            filled += npld;
        }
    }
    if filled > 0 {
        words.push(acc);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::INT_REC_PAYLOAD;
    use crate::common::InteractionRecord;
    use crate::decoder::unpack::{unpack_word, Remnant};

    fn digit(bc: u16, orbit: u32, input_mask: u64, class_mask: u64) -> Digit {
        Digit {
            record: InteractionRecord::new(bc, orbit),
            input_mask,
            class_mask,
        }
    }

    #[test]
    fn pack_is_inverse_of_unpack() {
        let chunks: Vec<GbtWord> = (0..9u128)
            .map(|i| GbtWord::new((0x0fed_cba9_8765_4321 ^ (i * 0x1111)) & 0x0fff_ffff_ffff_ffff))
            .collect();
        let words = pack_words(&chunks, INT_REC_PAYLOAD);
        assert_eq!(words.len(), 7); // 540 bits → 7 words

        let mut remnant = Remnant::default();
        let mut unpacked = Vec::new();
        for &word in &words {
            unpacked.extend(unpack_word(word, INT_REC_PAYLOAD, &mut remnant));
        }
        // Zero padding of the last word may produce a trailing empty chunk
        while unpacked.last().is_some_and(|c| c.is_zero()) {
            unpacked.pop();
        }
        assert_eq!(unpacked, chunks);
        assert!(remnant.word.is_zero());
    }

    #[test]
    fn single_digit_makes_two_channel_packets() {
        let offsets = TriggerOffsets::default();
        let encoder = RawEncoder::new(offsets.clone(), false);
        let digits = [digit(100, 5, 0x7, 0x30)];
        let packets = encoder.encode(&digits);

        // Leading timeframe packet plus one heartbeat packet per channel
        assert_eq!(packets.len(), 3);
        assert!(packets[0].header.is_timeframe_start());
        assert_eq!(packets[0].header.orbit, 4);
        assert!(packets[0].payload.is_empty());

        assert_eq!(packets[1].header.link(), 0);
        assert_eq!(packets[1].header.orbit, 5);
        assert_eq!(packets[1].payload.len(), 10);

        // Class chunk lands in the orbit its offset shifts it into
        let class_orbit = InteractionRecord::new(100, 5)
            .add_bc(Channel::ClassRec.bc_offset(&offsets))
            .orbit;
        assert_eq!(packets[2].header.link(), 1);
        assert_eq!(packets[2].header.orbit, class_orbit);
    }

    #[test]
    fn input_only_digit_skips_class_channel() {
        let encoder = RawEncoder::new(TriggerOffsets::default(), false);
        let packets = encoder.encode(&[digit(10, 0, 0x1, 0)]);
        assert!(packets.iter().all(|p| p.header.link() == 0));
    }

    #[test]
    fn orbit_zero_needs_no_leading_packet() {
        let encoder = RawEncoder::new(TriggerOffsets::default(), false);
        let packets = encoder.encode(&[digit(10, 0, 0x1, 0)]);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].header.is_timeframe_start());
        assert!(packets[0].header.is_heartbeat());
        assert_eq!(packets[0].header.orbit, 0);
    }

    #[test]
    fn padded_framing_inserts_zero_lanes() {
        let encoder = RawEncoder::new(TriggerOffsets::default(), true);
        let packets = encoder.encode(&[digit(10, 0, 0x1, 0)]);
        let payload = &packets[0].payload;
        assert_eq!(payload.len(), 16);
        assert!(payload[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn chunk_encodes_shifted_bcid() {
        let offsets = TriggerOffsets {
            bc_shift: 7,
            ..TriggerOffsets::default()
        };
        let encoder = RawEncoder::new(offsets, false);
        let packets = encoder.encode(&[digit(100, 3, 0x1, 0)]);
        let data = packets.last().unwrap();

        let mut word = GbtWord::ZERO;
        for (lane, &byte) in data.payload.iter().enumerate() {
            word.or_byte(lane, byte);
        }
        assert_eq!(word.bcid(), 107);
    }
}
