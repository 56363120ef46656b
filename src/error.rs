//! Custom error types for the histogramming engine.
//!
//! This module defines the error taxonomy used across the crate. Using the
//! `thiserror` crate, each engine concern gets its own enum so callers can
//! match on the kind of failure without parsing messages.
//!
//! ## Error Hierarchy
//!
//! - **`ConfigError`**: Raised while planning or configuring a session. Covers
//!   invalid dimensions, memory shortage, multi-pass or multi-frame requests
//!   and disk-space feasibility.
//! - **`StoreError`**: Raised by the frame writer. Output creation, partial
//!   binary writes (usually a full disk) and header creation are reported as
//!   distinct kinds.
//! - **`StateError`**: An operation was requested in a session state that does
//!   not allow it. The session state is left untouched.
//! - **`HistogramError`**: Umbrella type that wraps the above plus settings
//!   and I/O errors, so the `?` operator works at the application boundary.
//!
//! Malformed event words are intentionally *not* an error: a word whose bin
//! index falls outside the active bound is simply ignored by the binning loop.

use crate::session::state::SessionState;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the umbrella error type.
pub type HistResult<T> = std::result::Result<T, HistogramError>;

/// Errors raised while validating and planning a session configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A dimension or count is outside its allowed range
    #[error("Invalid dimension '{name}' = {value} (allowed {min}..={max})")]
    InvalidDimension {
        /// Parameter name
        name: &'static str,
        /// Rejected value
        value: u64,
        /// Smallest allowed value
        min: u64,
        /// Largest allowed value
        max: u64,
    },

    /// A required parameter was never set
    #[error("Missing configuration parameter: {0}")]
    MissingParameter(&'static str),

    /// Available memory cannot hold the I/O reserve and overhead
    #[error("Insufficient memory: {required} bytes required, {available} bytes available")]
    InsufficientMemory {
        /// Bytes the configuration needs
        required: u64,
        /// Bytes available
        available: u64,
    },

    /// The histogram does not fit in memory in one pass
    #[error("Histogram needs {passes} passes to fit in memory; only single-pass histogramming is supported")]
    MultiPassUnsupported {
        /// Passes that would be needed
        passes: u64,
    },

    /// More than one frame was defined
    #[error("{frames} frames defined; only single-frame acquisition is supported")]
    MultiFrameUnsupported {
        /// Frames defined
        frames: usize,
    },

    /// Not enough free space for every frame
    #[error("Not enough disk space at {path:?}: {required} bytes required, {available} bytes available")]
    DiskSpace {
        /// Output destination
        path: PathBuf,
        /// Bytes all frames need
        required: u64,
        /// Free bytes at the destination
        available: u64,
    },

    /// Network destination whose free space cannot be measured
    #[error("Free space on network path {0:?} cannot be verified")]
    UncUnverified(PathBuf),

    /// The accumulator reservation failed
    #[error("Failed to allocate {bytes} bytes for the sinogram accumulator")]
    AllocationFailed {
        /// Bytes requested
        bytes: u64,
    },
}

/// Errors raised while storing a frame.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The sinogram file could not be created
    #[error("Failed to create output file {path:?}: {source}")]
    OutputCreate {
        /// File being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The sinogram write stopped early
    #[error("Partial write to {path:?} after {written} of {expected} bytes (probable disk full): {source}")]
    PartialWrite {
        /// File being written
        path: PathBuf,
        /// Bytes written before the failure
        written: u64,
        /// Bytes the file should hold
        expected: u64,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The header file could not be created or written
    #[error("Failed to create header file {path:?}: {source}")]
    HeaderCreation {
        /// File being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised when an operation is not legal in the current session state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// The operation is not legal in the current state
    #[error("Operation '{op}' is not allowed in state {state}")]
    IllegalTransition {
        /// Operation name
        op: &'static str,
        /// State the session was in
        state: SessionState,
    },
}

/// Umbrella error type for the crate.
#[derive(Error, Debug)]
pub enum HistogramError {
    /// Configuration or planning failure
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Frame store failure
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Illegal state transition
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Settings file or environment could not be loaded
    #[error("Settings error: {0}")]
    Settings(#[from] Box<figment::Error>),

    /// Settings loaded but hold invalid values
    #[error("Settings validation error: {0}")]
    SettingsValidation(String),

    /// I/O failure outside frame storage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline task failed or exited early
    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<figment::Error> for HistogramError {
    fn from(value: figment::Error) -> Self {
        HistogramError::Settings(Box::new(value))
    }
}

impl StoreError {
    /// Short label used in notifications and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::OutputCreate { .. } => "output-create",
            StoreError::PartialWrite { .. } => "partial-write",
            StoreError::HeaderCreation { .. } => "header-creation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_kinds_are_distinct() {
        let io = || std::io::Error::from(std::io::ErrorKind::Other);
        let kinds = [
            StoreError::OutputCreate {
                path: PathBuf::from("a.s"),
                source: io(),
            }
            .kind(),
            StoreError::PartialWrite {
                path: PathBuf::from("a.s"),
                written: 1,
                expected: 2,
                source: io(),
            }
            .kind(),
            StoreError::HeaderCreation {
                path: PathBuf::from("a.s.hdr"),
                source: io(),
            }
            .kind(),
        ];
        assert_eq!(kinds, ["output-create", "partial-write", "header-creation"]);
    }

    #[test]
    fn test_partial_write_message_mentions_disk_full() {
        let err = StoreError::PartialWrite {
            path: PathBuf::from("scan.s"),
            written: 10,
            expected: 20,
            source: std::io::Error::from(std::io::ErrorKind::WriteZero),
        };
        assert!(err.to_string().contains("probable disk full"));
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: HistogramError = ConfigError::MultiPassUnsupported { passes: 3 }.into();
        assert!(matches!(
            err,
            HistogramError::Config(ConfigError::MultiPassUnsupported { passes: 3 })
        ));
    }
}
