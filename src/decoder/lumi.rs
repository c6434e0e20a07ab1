//! Luminosity accumulator
//!
//! Tallies two fixed trigger-input patterns over the chunks of the
//! interaction-record channel and emits one sample per heartbeat frame.
//! Counting is independent of digit production: a chunk contributes to
//! the counters even when its payload yields no digit.

use crate::common::constants::BCID_BITS;
use crate::common::LumiSample;
use crate::config::LumiPatterns;

use super::word::GbtWord;

/// Per-interval luminosity state. One frame is open at a time; closing it
/// emits a sample carrying the frame's start orbit.
#[derive(Debug)]
pub struct LumiAccumulator {
    mb_trigger_mask: u64,
    mb_veto_mask: u64,
    frame_orbit: Option<u32>,
    mb_trigger: u64,
    mb_veto: u64,
    samples: Vec<LumiSample>,
}

impl LumiAccumulator {
    pub fn new(patterns: &LumiPatterns) -> Self {
        Self {
            mb_trigger_mask: patterns.mb_trigger_mask,
            mb_veto_mask: patterns.mb_veto_mask,
            frame_orbit: None,
            mb_trigger: 0,
            mb_veto: 0,
            samples: Vec::new(),
        }
    }

    /// Test one chunk's payload bits against both patterns. The patterns
    /// are not mutually exclusive.
    pub fn tally(&mut self, chunk: GbtWord) {
        let payload = (chunk >> BCID_BITS).as_u64();
        if payload & self.mb_trigger_mask != 0 {
            self.mb_trigger += 1;
        }
        if payload & self.mb_veto_mask != 0 {
            self.mb_veto += 1;
        }
    }

    /// Close the open frame (if any) and open a new one at `orbit`.
    pub fn frame_boundary(&mut self, orbit: u32) {
        if let Some(open) = self.frame_orbit {
            self.samples
                .push(LumiSample::new(open, self.mb_trigger, self.mb_veto));
        }
        self.mb_trigger = 0;
        self.mb_veto = 0;
        self.frame_orbit = Some(orbit);
    }

    /// Close the last open frame and return all samples.
    pub fn finish(mut self) -> Vec<LumiSample> {
        self.samples.push(LumiSample::new(
            self.frame_orbit.unwrap_or(0),
            self.mb_trigger,
            self.mb_veto,
        ));
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> LumiPatterns {
        LumiPatterns {
            mb_trigger_mask: 0x4,
            mb_veto_mask: 0x20,
        }
    }

    fn chunk_with_payload(payload: u64) -> GbtWord {
        GbtWord::new((payload as u128) << BCID_BITS)
    }

    #[test]
    fn counts_both_patterns_independently() {
        let mut lumi = LumiAccumulator::new(&patterns());
        lumi.frame_boundary(1);
        lumi.tally(chunk_with_payload(0x4)); // trigger only
        lumi.tally(chunk_with_payload(0x20)); // veto only
        lumi.tally(chunk_with_payload(0x24)); // both
        lumi.tally(chunk_with_payload(0x1)); // neither
        let samples = lumi.finish();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].mb_trigger_count, 2);
        assert_eq!(samples[0].mb_veto_count, 2);
    }

    #[test]
    fn sample_per_frame_at_frame_start_orbit() {
        let mut lumi = LumiAccumulator::new(&patterns());
        lumi.frame_boundary(10);
        lumi.tally(chunk_with_payload(0x4));
        lumi.frame_boundary(11);
        lumi.tally(chunk_with_payload(0x4));
        let samples = lumi.finish();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].orbit, 10);
        assert_eq!(samples[0].mb_trigger_count, 1);
        assert_eq!(samples[0].mb_veto_count, 0);
        assert_eq!(samples[1].orbit, 11);
        assert_eq!(samples[1].mb_trigger_count, 1);
    }

    #[test]
    fn first_boundary_emits_no_sample() {
        let mut lumi = LumiAccumulator::new(&patterns());
        lumi.frame_boundary(42);
        assert_eq!(lumi.finish().len(), 1);
    }

    #[test]
    fn finish_without_frames_emits_one_empty_sample() {
        let lumi = LumiAccumulator::new(&patterns());
        let samples = lumi.finish();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].orbit, 0);
        assert_eq!(samples[0].mb_trigger_count, 0);
    }

    #[test]
    fn bcid_bits_do_not_count() {
        let mut lumi = LumiAccumulator::new(&patterns());
        lumi.frame_boundary(0);
        // A bcid of 0x4 sits below the payload region
        lumi.tally(GbtWord::new(0x4));
        let samples = lumi.finish();
        assert_eq!(samples[0].mb_trigger_count, 0);
    }
}
