//! Session lifecycle states and the lock-free pending-command flag.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Histogramming session state.
///
/// # State Machine
///
/// ```text
/// Initialized ──set_*──> Unconfigured ──configure──> Configured ──start──> Active
///                             ▲                                          │   ▲
///                             │                                     feed │   │ feed
///                        unconfigure                                     ▼   │
///                        (any state)                                     Wait
///                                                                         │
///                     ┌────────────────────┬──────────────────┬──────────┤
///                     ▼                    ▼                  ▼          │
///                  Stopped              Aborted           Complete ◄─────┘
///                     │                                       │
///                     └──────────── store_frame ──────────────┤
///                                                             ▼
///                                              StoreComplete | StoreError
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Session created, nothing set yet
    Initialized,
    /// Parameters may be set; no layout planned
    Unconfigured,
    /// Layout planned, ready to start
    Configured,
    /// Currently decoding a buffer
    Active,
    /// Between buffers, waiting for more data
    Wait,
    /// Frame or scan complete, waiting to be stored
    Complete,
    /// Stopped by request; data is kept and stored
    Stopped,
    /// Aborted by request; data is discarded
    Aborted,
    /// Final frame stored
    StoreComplete,
    /// Storing failed; state kept for diagnosis
    StoreError,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionState::Initialized => "INITIALIZED",
            SessionState::Unconfigured => "UNCONFIGURED",
            SessionState::Configured => "CONFIGURED",
            SessionState::Active => "ACTIVE",
            SessionState::Wait => "WAIT",
            SessionState::Complete => "COMPLETE",
            SessionState::Stopped => "STOPPED",
            SessionState::Aborted => "ABORTED",
            SessionState::StoreComplete => "STORE_COMPLETE",
            SessionState::StoreError => "STORE_ERROR",
        };
        write!(f, "{}", label)
    }
}

impl SessionState {
    /// Check if acquisition parameters may still be changed.
    pub fn can_set_parameters(&self) -> bool {
        matches!(self, SessionState::Initialized | SessionState::Unconfigured)
    }

    /// Check if the state accepts event buffers.
    pub fn can_feed(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Wait)
    }

    /// Check if the state holds a frame that is waiting to be stored.
    pub fn can_store(&self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Stopped)
    }

    /// Terminal states end the acquisition; only `unconfigure` leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Aborted | SessionState::StoreComplete | SessionState::StoreError
        )
    }
}

/// Command posted asynchronously by control operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PendingCommand {
    /// Nothing pending
    None = 0,
    /// Stop after the current buffer and store what was collected
    Stop = 1,
    /// Abort after the current buffer and discard
    Abort = 2,
}

impl PendingCommand {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PendingCommand::Stop,
            2 => PendingCommand::Abort,
            _ => PendingCommand::None,
        }
    }
}

/// Preset condition supplied with each buffer by the acquisition-control layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PresetSignal {
    /// No preset condition
    #[default]
    None,
    /// Hardware requests a stop
    Stop,
    /// Hardware requests an abort
    Abort,
    /// Hardware preset (time or counts) reached
    PresetComplete,
}

/// Why a scan (or frame) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanEndReason {
    /// Stop requested by control operation or preset signal
    Stopped,
    /// Abort requested by control operation or preset signal
    Aborted,
    /// External preset reached
    PresetComplete,
    /// Frame duration elapsed (tag-driven frame switch)
    FrameDuration,
    /// Net-trues threshold reached
    NetTruesReached,
    /// Offline input exhausted
    InputExhausted,
}

impl std::fmt::Display for ScanEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ScanEndReason::Stopped => "stopped",
            ScanEndReason::Aborted => "aborted",
            ScanEndReason::PresetComplete => "preset complete",
            ScanEndReason::FrameDuration => "frame duration elapsed",
            ScanEndReason::NetTruesReached => "net trues reached",
            ScanEndReason::InputExhausted => "input exhausted",
        };
        write!(f, "{}", label)
    }
}

/// Cloneable control handle for posting stop/abort from another task.
///
/// The flag is a plain atomic; the binning loop reads it once per buffer, so a
/// command posted while a buffer is being decoded takes effect at the end of
/// that buffer. No lock is taken, which keeps `stop()` usable while `feed()`
/// holds the session.
///
/// `start` clears the flag, so a command posted before acquisition begins is
/// dropped; post it once the session is ACTIVE.
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    pending: Arc<AtomicU8>,
}

impl SessionControl {
    /// Create a control handle with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    pub fn stop(&self) {
        self.pending
            .store(PendingCommand::Stop as u8, Ordering::Release);
    }

    /// Request an abort. Abort wins over a previously posted stop.
    pub fn abort(&self) {
        self.pending
            .store(PendingCommand::Abort as u8, Ordering::Release);
    }

    /// Current pending command without consuming it.
    pub fn pending(&self) -> PendingCommand {
        PendingCommand::from_u8(self.pending.load(Ordering::Acquire))
    }

    /// Consume the pending command.
    pub fn take(&self) -> PendingCommand {
        PendingCommand::from_u8(
            self.pending
                .swap(PendingCommand::None as u8, Ordering::AcqRel),
        )
    }

    /// Clear any pending command.
    pub fn clear(&self) {
        self.pending
            .store(PendingCommand::None as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::Initialized.can_set_parameters());
        assert!(SessionState::Unconfigured.can_set_parameters());
        assert!(!SessionState::Configured.can_set_parameters());

        assert!(SessionState::Active.can_feed());
        assert!(SessionState::Wait.can_feed());
        assert!(!SessionState::Complete.can_feed());

        assert!(SessionState::Stopped.can_store());
        assert!(!SessionState::Aborted.can_store());
        assert!(SessionState::Aborted.is_terminal());
    }

    #[test]
    fn test_control_take_consumes() {
        let control = SessionControl::new();
        assert_eq!(control.pending(), PendingCommand::None);

        control.stop();
        let remote = control.clone();
        assert_eq!(remote.pending(), PendingCommand::Stop);
        assert_eq!(remote.take(), PendingCommand::Stop);
        assert_eq!(control.pending(), PendingCommand::None);
    }

    #[test]
    fn test_control_abort_overrides_stop() {
        let control = SessionControl::new();
        control.stop();
        control.abort();
        assert_eq!(control.take(), PendingCommand::Abort);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::StoreComplete.to_string(), "STORE_COMPLETE");
        assert_eq!(SessionState::Wait.to_string(), "WAIT");
    }
}
