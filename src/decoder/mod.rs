//! Decoder for the raw CTP trigger-link payload
//!
//! Converts the packet stream of one acquisition interval into a
//! timeline-ordered digit map and per-heartbeat luminosity samples.
//!
//! Per-packet pipeline: header introspection → channel routing →
//! byte-to-word assembly → chunk unpacking with a per-channel remnant →
//! record merge and luminosity tally.

pub mod assembler;
pub mod lumi;
pub mod record;
pub mod unpack;
pub mod word;

pub use record::{Channel, DecodeStats, DigitMap};
pub use unpack::Remnant;
pub use word::GbtWord;

use tracing::{debug, error, info};

use crate::common::{DecodeResult, LumiSample, RawPacket};
use crate::config::Config;

use assembler::assemble_words;
use lumi::LumiAccumulator;
use record::add_digit;
use unpack::unpack_word;

/// Carried per-channel state. The two channels decode independently, so
/// each owns its remnant.
#[derive(Debug, Default)]
struct ChannelState {
    remnant: Remnant,
    last_orbit: u32,
}

/// Output of one decoded acquisition interval.
#[derive(Debug)]
pub struct DecodedInterval {
    /// Digits keyed by corrected interaction record
    pub digits: DigitMap,
    /// One luminosity sample per heartbeat frame plus a final one
    pub lumi: Vec<LumiSample>,
    /// Session counters
    pub stats: DecodeStats,
    /// Start orbits of the timeframes observed in the stream
    pub tf_orbits: Vec<u32>,
}

/// Single-pass decoder over the packet stream of one acquisition
/// interval. Holds only configuration; all decode state is constructed
/// fresh per [`decode`](RawDataDecoder::decode) call.
pub struct RawDataDecoder {
    config: Config,
}

impl RawDataDecoder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Decode one interval. Packets must arrive in their transport order;
    /// the remnant and frame state are carried across packets.
    ///
    /// Fails only on header-introspection errors; all other anomalies are
    /// counted in the returned [`DecodeStats`].
    pub fn decode(
        &self,
        packets: impl IntoIterator<Item = RawPacket>,
    ) -> DecodeResult<DecodedInterval> {
        let do_digits = self.config.decoder.do_digits;
        let mut digits = DigitMap::new();
        let mut stats = DecodeStats::default();
        let mut lumi = self
            .config
            .decoder
            .do_lumi
            .then(|| LumiAccumulator::new(&self.config.lumi));
        let mut tf_orbit = 0u32;
        let mut tf_orbits = Vec::new();
        let mut states = [ChannelState::default(), ChannelState::default()];

        for packet in packets {
            let header = packet.header;
            let padded = header.padded()?;
            stats.packets += 1;

            if header.is_timeframe_start() {
                tf_orbit = header.orbit;
                tf_orbits.push(tf_orbit);
            }

            let Some(channel) = Channel::from_link(header.link()) else {
                error!(
                    link = header.link(),
                    orbit = header.orbit,
                    "unexpected CTP link id, skipping packet payload"
                );
                stats.unknown_links += 1;
                continue;
            };
            // Class records are irrelevant when only lumi is requested
            if channel == Channel::ClassRec && !do_digits {
                continue;
            }

            let state = &mut states[channel as usize];
            if header.is_heartbeat() || header.is_timeframe_start() {
                if channel == Channel::IntRec {
                    if let Some(lumi) = lumi.as_mut() {
                        lumi.frame_boundary(header.orbit);
                    }
                }
                state.remnant.clear();
            }
            state.last_orbit = header.orbit;

            debug!(
                channel = channel.name(),
                orbit = header.orbit,
                payload_bytes = packet.payload.len(),
                padded,
                "decoding packet"
            );

            let words = assemble_words(&packet.payload, padded);
            stats.words += words.len() as u64;
            for word in words {
                let chunks = unpack_word(word, channel.payload_width(), &mut state.remnant);
                stats.chunks += chunks.len() as u64;
                for chunk in chunks {
                    if channel == Channel::IntRec {
                        if let Some(lumi) = lumi.as_mut() {
                            lumi.tally(chunk);
                        }
                    }
                    if do_digits {
                        add_digit(
                            channel,
                            header.orbit,
                            chunk,
                            tf_orbit,
                            &self.config.offsets,
                            &mut digits,
                            &mut stats,
                        );
                    }
                }
            }
        }

        // Stream end: a nonzero remnant is one final (truncated) chunk.
        for (index, state) in states.iter_mut().enumerate() {
            if state.remnant.word.is_zero() {
                continue;
            }
            let channel = if index == 0 {
                Channel::IntRec
            } else {
                Channel::ClassRec
            };
            let chunk = state.remnant.word;
            stats.chunks += 1;
            if channel == Channel::IntRec {
                if let Some(lumi) = lumi.as_mut() {
                    lumi.tally(chunk);
                }
            }
            if do_digits {
                add_digit(
                    channel,
                    state.last_orbit,
                    chunk,
                    tf_orbit,
                    &self.config.offsets,
                    &mut digits,
                    &mut stats,
                );
            }
            state.remnant.clear();
        }

        let lumi = lumi.map(LumiAccumulator::finish).unwrap_or_default();

        info!(
            packets = stats.packets,
            words = stats.words,
            chunks = stats.chunks,
            digits = digits.len(),
            lumi_samples = lumi.len(),
            int_rec_rejected = stats.int_rec_rejected,
            class_rec_rejected = stats.class_rec_rejected,
            "interval decoded"
        );

        Ok(DecodedInterval {
            digits,
            lumi,
            stats,
            tf_orbits,
        })
    }
}
