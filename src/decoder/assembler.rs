//! Bit-word assembler: raw packet bytes → 80-bit GBT words
//!
//! The link serializes each 80-bit word as either 10 payload bytes
//! (compact framing) or 10 payload bytes followed by 6 padding bytes
//! (padded framing). Bytes fill a word low-lane first; padding bytes are
//! discarded. A group that received no payload byte produces no word, so a
//! trailing partial group shorter than the framing width is dropped when
//! it carried no data.

use crate::common::constants::{WORD_BYTES, WORD_BYTES_PADDED};

use super::word::GbtWord;

/// Assemble the payload of one packet into 80-bit words.
///
/// `padded` selects 16-byte framing; otherwise 10-byte framing is used.
pub fn assemble_words(payload: &[u8], padded: bool) -> Vec<GbtWord> {
    let group_bytes = if padded { WORD_BYTES_PADDED } else { WORD_BYTES };

    let mut words = Vec::with_capacity(payload.len() / group_bytes + 1);
    let mut word = GbtWord::ZERO;
    let mut filled = 0usize;

    for (index, &byte) in payload.iter().enumerate() {
        let lane = index % group_bytes;
        if lane == 0 && index != 0 {
            if filled > 0 {
                words.push(word);
            }
            word = GbtWord::ZERO;
            filled = 0;
        }
        if lane < WORD_BYTES {
            word.or_byte(lane, byte);
            filled += 1;
        }
    }
    if filled > 0 {
        words.push(word);
    }

    words
}
