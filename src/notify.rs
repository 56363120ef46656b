//! Notification boundary towards the acquisition-control layer.
//!
//! The engine reports progress synchronously through a [`NotificationSink`]
//! injected at session construction. Two implementations ship with the crate:
//! [`TracingSink`] logs every notification, [`ChannelSink`] forwards them as
//! [`Notification`] values over an unbounded tokio channel so another task can
//! react (the CLI and the pipeline tests use it).

use crate::session::state::{ScanEndReason, SessionState};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Receiver of engine notifications.
///
/// Called from whichever task drives the session (replay or store task), so
/// implementations must be cheap and must not call back into the session.
pub trait NotificationSink: Send + Sync {
    /// General status message.
    fn notify(&self, state: SessionState, message: &str);

    /// A scan (or frame) ended.
    fn scan_complete(&self, reason: ScanEndReason);

    /// A store attempt finished.
    fn store_complete(&self, reason: ScanEndReason, success: bool);
}

/// Notification value forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// Status message
    Status {
        /// State at the time of the message
        state: SessionState,
        /// Human-readable message
        message: String,
    },
    /// Scan end
    ScanComplete(ScanEndReason),
    /// Store outcome
    StoreComplete {
        /// Why the stored frame ended
        reason: ScanEndReason,
        /// Whether every file was written
        success: bool,
    },
}

/// Sink that logs notifications with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, state: SessionState, message: &str) {
        info!(%state, "{}", message);
    }

    fn scan_complete(&self, reason: ScanEndReason) {
        info!(%reason, "Scan complete");
    }

    fn store_complete(&self, reason: ScanEndReason, success: bool) {
        if success {
            info!(%reason, "Frame stored");
        } else {
            warn!(%reason, "Frame store failed");
        }
    }
}

/// Sink that forwards notifications over a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, notification: Notification) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.tx.send(notification);
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, state: SessionState, message: &str) {
        self.send(Notification::Status {
            state,
            message: message.to_string(),
        });
    }

    fn scan_complete(&self, reason: ScanEndReason) {
        self.send(Notification::ScanComplete(reason));
    }

    fn store_complete(&self, reason: ScanEndReason, success: bool) {
        self.send(Notification::StoreComplete { reason, success });
    }
}
