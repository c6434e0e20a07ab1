//! Chunk unpacker: 80-bit words → fixed-width payload chunks
//!
//! Chunk width does not divide the word width, so every call may leave
//! trailing bits that only complete a chunk together with the next word.
//! Those bits are the remnant, carried across calls within one heartbeat
//! frame. The remnant always holds fewer bits than one chunk.

use super::word::GbtWord;

/// Leftover bits of the most recent word, plus their count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Remnant {
    /// Leftover bits, right-aligned
    pub word: GbtWord,
    /// Number of valid bits in `word`
    pub size: u32,
}

impl Remnant {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Extract all complete `npld`-bit chunks from `word` combined with the
/// carried-over remnant bits (remnant bits are older, so they sit below
/// the new word's bits). The incomplete tail becomes the new remnant.
///
/// Bit conservation: `remnant.size + 80` bits enter, `chunks.len() * npld
/// + remnant.size'` bits leave, and the two are equal.
pub fn unpack_word(word: GbtWord, npld: u32, remnant: &mut Remnant) -> Vec<GbtWord> {
    debug_assert!(npld > 0 && npld <= GbtWord::WIDTH);
    debug_assert!(remnant.size < npld);

    let mut chunks = Vec::new();
    let mut rest = word;
    let mut avail = GbtWord::WIDTH;

    while remnant.size + avail >= npld {
        let take = npld - remnant.size;
        let chunk = remnant.word | ((rest & GbtWord::low_mask(take)) << remnant.size);
        chunks.push(chunk);
        rest = rest >> take;
        avail -= take;
        remnant.clear();
    }

    remnant.word = rest;
    remnant.size += avail;
    chunks
}
