//! Tag-word processor.
//!
//! Tag words are the negative words of the list-mode stream. The top three
//! bits select the tag type:
//!
//! ```text
//! 31  29 28        19 18              0
//! [100 ][        scan-time tick         ]   one tick of scan time
//! [101 ][  block   ][   singles rate    ]   singles sample of one detector block
//! [11x ]                                    gantry / patient tags, ignored
//! ```

use crate::frames::FrameDescriptor;
use crate::geometry::SinglesPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shift of the 3-bit type code.
pub const TYPE_SHIFT: u32 = 29;
/// Type code of a scan-time tick tag.
pub const TAG_TIME: u32 = 0b100;
/// Type code of a singles-rate tag.
pub const TAG_SINGLES: u32 = 0b101;

const BLOCK_SHIFT: u32 = 19;
const BLOCK_MASK: u32 = 0x3FF;
const RATE_MASK: u32 = 0x7_FFFF;

/// What a tag word did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOutcome {
    /// Unknown tag or out-of-range block
    NoAction,
    /// Tag counted
    Tallied,
    /// Tick pushed the scan time past the end of a duration frame
    EndOfFrame,
}

/// Build a scan-time tick tag word.
pub fn time_tag() -> u32 {
    TAG_TIME << TYPE_SHIFT
}

/// Build a singles tag word for `block` with `rate`.
pub fn singles_tag(block: u32, rate: u32) -> u32 {
    (TAG_SINGLES << TYPE_SHIFT) | ((block & BLOCK_MASK) << BLOCK_SHIFT) | (rate & RATE_MASK)
}

/// Singles bookkeeping of one detector block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSingles {
    /// Samples received this frame
    pub samples: u64,
    /// Latest sample or running sum, depending on the policy
    pub rate: u64,
}

/// Per-block singles summary written to the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglesSummary {
    /// Rate per block (counts per second)
    pub per_block: Vec<f64>,
    /// Global average over every sample of every block
    pub average: f64,
}

/// Running tag state of the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TagState {
    ticks: u64,
    epoch: Duration,
    tick_period: Duration,
    policy: SinglesPolicy,
    blocks: Vec<BlockSingles>,
    total_singles: u64,
    total_samples: u64,
}

impl TagState {
    /// Fresh state for a scanner with `blocks` detector blocks.
    pub fn new(blocks: usize, policy: SinglesPolicy, tick_period: Duration) -> Self {
        Self {
            ticks: 0,
            epoch: Duration::ZERO,
            tick_period,
            policy,
            blocks: vec![BlockSingles::default(); blocks],
            total_singles: 0,
            total_samples: 0,
        }
    }

    /// Decode one tag word. `frame` is the frame being acquired, if any.
    pub fn process(&mut self, tag: u32, frame: Option<&mut FrameDescriptor>) -> TagOutcome {
        match tag >> TYPE_SHIFT {
            TAG_TIME => self.tick(frame),
            TAG_SINGLES => self.singles(tag),
            _ => TagOutcome::NoAction,
        }
    }

    fn tick(&mut self, frame: Option<&mut FrameDescriptor>) -> TagOutcome {
        self.ticks += 1;
        let now = self.elapsed();
        match frame {
            Some(frame) if frame.switch_time.is_none() => match frame.end_time() {
                Some(end) if now >= end => {
                    frame.complete_at(now);
                    TagOutcome::EndOfFrame
                }
                _ => TagOutcome::Tallied,
            },
            _ => TagOutcome::Tallied,
        }
    }

    fn singles(&mut self, tag: u32) -> TagOutcome {
        let block = ((tag >> BLOCK_SHIFT) & BLOCK_MASK) as usize;
        let rate = u64::from(tag & RATE_MASK);
        let policy = self.policy;
        let Some(entry) = self.blocks.get_mut(block) else {
            return TagOutcome::NoAction;
        };

        entry.samples += 1;
        match policy {
            SinglesPolicy::Latest => entry.rate = rate,
            SinglesPolicy::Averaged => entry.rate += rate,
        }
        self.total_singles += rate;
        self.total_samples += 1;
        TagOutcome::Tallied
    }

    /// Ticks seen in the current frame.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Scan time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.epoch + self.frame_elapsed()
    }

    /// Scan time since the current frame started.
    pub fn frame_elapsed(&self) -> Duration {
        let nanos = self.tick_period.as_nanos() * u128::from(self.ticks);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Singles rate of one block under the configured policy.
    pub fn block_rate(&self, block: usize) -> f64 {
        match self.blocks.get(block) {
            Some(entry) if entry.samples > 0 => match self.policy {
                SinglesPolicy::Latest => entry.rate as f64,
                SinglesPolicy::Averaged => entry.rate as f64 / entry.samples as f64,
            },
            _ => 0.0,
        }
    }

    /// Average singles over every sample of every block.
    pub fn average_singles(&self) -> f64 {
        if self.total_samples == 0 {
            0.0
        } else {
            self.total_singles as f64 / self.total_samples as f64
        }
    }

    /// Raw per-block bookkeeping.
    pub fn blocks(&self) -> &[BlockSingles] {
        &self.blocks
    }

    /// Finalized singles figures for the header.
    pub fn summary(&self) -> SinglesSummary {
        SinglesSummary {
            per_block: (0..self.blocks.len()).map(|b| self.block_rate(b)).collect(),
            average: self.average_singles(),
        }
    }

    /// Start a new frame: singles and tick count are cleared, scan time keeps running.
    pub fn reset_frame(&mut self) {
        self.epoch = self.elapsed();
        self.ticks = 0;
        self.blocks.fill(BlockSingles::default());
        self.total_singles = 0;
        self.total_samples = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{FrameCriterion, FrameTable};

    fn state(policy: SinglesPolicy) -> TagState {
        TagState::new(4, policy, Duration::from_millis(1))
    }

    #[test]
    fn test_tag_words_are_negative() {
        assert!((time_tag() as i32) < 0);
        assert!((singles_tag(3, 100) as i32) < 0);
    }

    #[test]
    fn test_ticks_advance_elapsed() {
        let mut tags = state(SinglesPolicy::Latest);
        for _ in 0..250 {
            assert_eq!(tags.process(time_tag(), None), TagOutcome::Tallied);
        }
        assert_eq!(tags.ticks(), 250);
        assert_eq!(tags.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_duration_frame_ends_on_tick() {
        let mut table = FrameTable::uniform(1, FrameCriterion::Duration(Duration::from_millis(3)));
        let mut tags = state(SinglesPolicy::Latest);

        assert_eq!(tags.process(time_tag(), table.current_mut()), TagOutcome::Tallied);
        assert_eq!(tags.process(time_tag(), table.current_mut()), TagOutcome::Tallied);
        assert_eq!(tags.process(time_tag(), table.current_mut()), TagOutcome::EndOfFrame);

        let frame = table.current().unwrap();
        assert_eq!(frame.switch_time, Some(Duration::from_millis(3)));
        assert_eq!(frame.duration, Some(Duration::from_millis(3)));

        // An already switched frame does not switch again
        assert_eq!(tags.process(time_tag(), table.current_mut()), TagOutcome::Tallied);
    }

    #[test]
    fn test_count_frame_never_ends_on_tick() {
        let mut table = FrameTable::uniform(1, FrameCriterion::NetTrues(10));
        let mut tags = state(SinglesPolicy::Latest);
        for _ in 0..1000 {
            assert_eq!(tags.process(time_tag(), table.current_mut()), TagOutcome::Tallied);
        }
    }

    #[test]
    fn test_singles_latest_policy() {
        let mut tags = state(SinglesPolicy::Latest);
        tags.process(singles_tag(1, 100), None);
        tags.process(singles_tag(1, 300), None);
        assert_eq!(tags.block_rate(1), 300.0);
        assert_eq!(tags.average_singles(), 200.0);
    }

    #[test]
    fn test_singles_averaged_policy() {
        let mut tags = state(SinglesPolicy::Averaged);
        tags.process(singles_tag(2, 100), None);
        tags.process(singles_tag(2, 300), None);
        tags.process(singles_tag(0, 50), None);
        assert_eq!(tags.block_rate(2), 200.0);
        assert_eq!(tags.block_rate(0), 50.0);
        assert_eq!(tags.block_rate(3), 0.0);
        assert_eq!(tags.average_singles(), 150.0);

        let summary = tags.summary();
        assert_eq!(summary.per_block, vec![50.0, 0.0, 200.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_block_ignored() {
        let mut tags = state(SinglesPolicy::Averaged);
        assert_eq!(tags.process(singles_tag(4, 100), None), TagOutcome::NoAction);
        assert_eq!(tags.average_singles(), 0.0);
    }

    #[test]
    fn test_unknown_tag_type() {
        let mut tags = state(SinglesPolicy::Latest);
        assert_eq!(tags.process(0b110 << TYPE_SHIFT, None), TagOutcome::NoAction);
        assert_eq!(tags.process(0b111 << TYPE_SHIFT | 5, None), TagOutcome::NoAction);
        assert_eq!(tags.ticks(), 0);
    }

    #[test]
    fn test_reset_frame_keeps_scan_clock() {
        let mut tags = state(SinglesPolicy::Averaged);
        for _ in 0..10 {
            tags.process(time_tag(), None);
        }
        tags.process(singles_tag(0, 10), None);
        tags.reset_frame();

        assert_eq!(tags.ticks(), 0);
        assert_eq!(tags.elapsed(), Duration::from_millis(10));
        assert_eq!(tags.frame_elapsed(), Duration::ZERO);
        assert_eq!(tags.average_singles(), 0.0);
        tags.process(time_tag(), None);
        assert_eq!(tags.elapsed(), Duration::from_millis(11));
    }
}
