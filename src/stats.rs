//! Statistics snapshot published after every fed buffer.

use crate::acquisition::CHANNELS;
use crate::session::state::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of a running scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanStatistics {
    /// Session state when the snapshot was taken
    pub state: SessionState,
    /// Index of the frame being acquired
    pub frame: usize,
    /// Number of defined frames
    pub frames: usize,
    /// Scan time in seconds
    pub elapsed_secs: f64,
    /// Prompts per channel (emission, transmission)
    pub prompts: [u64; CHANNELS],
    /// Randoms per channel
    pub randoms: [u64; CHANNELS],
    /// Prompts minus randoms over both channels
    pub net_trues: i64,
    /// Prompts per second of scan time
    pub prompt_rate: f64,
    /// Randoms per second of scan time
    pub random_rate: f64,
    /// Average singles per block sample
    pub average_singles: f64,
    /// Wall-clock time of the snapshot
    pub timestamp: DateTime<Utc>,
}

impl ScanStatistics {
    /// Snapshot of a session that has not acquired anything.
    pub fn idle(state: SessionState) -> Self {
        Self {
            state,
            frame: 0,
            frames: 0,
            elapsed_secs: 0.0,
            prompts: [0; CHANNELS],
            randoms: [0; CHANNELS],
            net_trues: 0,
            prompt_rate: 0.0,
            random_rate: 0.0,
            average_singles: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Total prompts over both channels.
    pub fn total_prompts(&self) -> u64 {
        self.prompts.iter().sum()
    }

    /// Total randoms over both channels.
    pub fn total_randoms(&self) -> u64 {
        self.randoms.iter().sum()
    }
}

/// Events per second, 0 before the first tick.
pub(crate) fn rate(count: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        count as f64 / elapsed_secs
    } else {
        0.0
    }
}
