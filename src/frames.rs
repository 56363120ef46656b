//! Frame table: the time- or count-bounded segments of an acquisition.

use crate::acquisition::{Channel, CHANNELS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on frames in one definition.
pub const MAX_FRAMES: usize = 256;

/// Termination criterion of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameCriterion {
    /// Frame ends after this much scan time
    Duration(Duration),
    /// Frame ends once cumulative net trues reach this value
    NetTrues(u64),
    /// Frame ends only on an external preset, a stop or end of input
    External,
}

/// One frame of the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    /// Scan time at which the frame started
    pub start: Duration,
    /// Termination criterion
    pub criterion: FrameCriterion,
    /// Scan time at which the frame switched, once it has
    pub switch_time: Option<Duration>,
    /// Recorded frame duration, once complete
    pub duration: Option<Duration>,
    /// Prompts per channel
    pub prompts: [u64; CHANNELS],
    /// Randoms per channel
    pub randoms: [u64; CHANNELS],
}

impl FrameDescriptor {
    fn new(criterion: FrameCriterion) -> Self {
        Self {
            start: Duration::ZERO,
            criterion,
            switch_time: None,
            duration: None,
            prompts: [0; CHANNELS],
            randoms: [0; CHANNELS],
        }
    }

    /// Net trues of one channel.
    pub fn net_trues(&self, channel: Channel) -> i64 {
        let i = channel.index();
        self.prompts[i] as i64 - self.randoms[i] as i64
    }

    /// Net trues summed over both channels.
    pub fn total_net_trues(&self) -> i64 {
        Channel::ALL.iter().map(|c| self.net_trues(*c)).sum()
    }

    /// Scan time at which a duration frame is due to end.
    pub fn end_time(&self) -> Option<Duration> {
        match self.criterion {
            FrameCriterion::Duration(duration) => self.start.checked_add(duration),
            FrameCriterion::NetTrues(_) | FrameCriterion::External => None,
        }
    }

    /// Mark the frame complete at scan time `now`.
    pub fn complete_at(&mut self, now: Duration) {
        self.switch_time = Some(now);
        self.duration = Some(now.saturating_sub(self.start));
    }

    /// Clear the per-frame counters.
    pub fn clear_counters(&mut self) {
        self.prompts = [0; CHANNELS];
        self.randoms = [0; CHANNELS];
    }
}

/// Ordered frames and the index of the frame being acquired.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTable {
    frames: Vec<FrameDescriptor>,
    current: usize,
}

impl FrameTable {
    /// Table of `count` identical frames.
    pub fn uniform(count: usize, criterion: FrameCriterion) -> Self {
        Self {
            frames: vec![FrameDescriptor::new(criterion); count],
            current: 0,
        }
    }

    /// Number of defined frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Table of one frame ended only by external presets or stop requests.
    pub fn open_ended() -> Self {
        Self::uniform(1, FrameCriterion::External)
    }

    /// Whether no frame is defined.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Index of the frame being acquired.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Frame being acquired.
    pub fn current(&self) -> Option<&FrameDescriptor> {
        self.frames.get(self.current)
    }

    /// Mutable access to the frame being acquired.
    pub fn current_mut(&mut self) -> Option<&mut FrameDescriptor> {
        self.frames.get_mut(self.current)
    }

    /// Whether the current frame is the last one.
    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.frames.len()
    }

    /// Move to the next frame, starting it at scan time `start`.
    ///
    /// Returns `false` when no frame remains.
    pub fn advance(&mut self, start: Duration) -> bool {
        if self.is_last() {
            return false;
        }
        self.current += 1;
        if let Some(frame) = self.frames.get_mut(self.current) {
            frame.start = start;
        }
        true
    }

    /// All frames.
    pub fn frames(&self) -> &[FrameDescriptor] {
        &self.frames
    }

    /// Drop every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_frame_end_time() {
        let mut table = FrameTable::uniform(2, FrameCriterion::Duration(Duration::from_secs(10)));
        assert_eq!(table.current().unwrap().end_time(), Some(Duration::from_secs(10)));

        table.current_mut().unwrap().complete_at(Duration::from_secs(10));
        assert!(table.advance(Duration::from_secs(10)));
        assert_eq!(table.current_index(), 1);
        assert_eq!(table.current().unwrap().end_time(), Some(Duration::from_secs(20)));
        assert!(table.is_last());
        assert!(!table.advance(Duration::from_secs(20)));
    }

    #[test]
    fn test_net_trues() {
        let mut table = FrameTable::uniform(1, FrameCriterion::NetTrues(100));
        let frame = table.current_mut().unwrap();
        frame.prompts = [120, 5];
        frame.randoms = [30, 1];
        assert_eq!(frame.net_trues(Channel::Emission), 90);
        assert_eq!(frame.total_net_trues(), 94);
        assert_eq!(frame.end_time(), None);
    }

    #[test]
    fn test_complete_records_duration() {
        let mut frame = FrameDescriptor::new(FrameCriterion::NetTrues(1));
        frame.start = Duration::from_millis(200);
        frame.complete_at(Duration::from_millis(1200));
        assert_eq!(frame.duration, Some(Duration::from_secs(1)));
        assert_eq!(frame.switch_time, Some(Duration::from_millis(1200)));
    }
}
