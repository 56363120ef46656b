//! # PET Histogrammer Core Library
//!
//! This crate is the histogramming engine of a PET data-acquisition stack. It
//! consumes a stream of 32-bit list-mode words produced by the detector
//! front end and aggregates them, in real time, into sinograms: stacks of
//! projection × view count arrays.
//!
//! ## Crate Structure
//!
//! - **`layout`**: Plans the accumulator layout for a configuration and checks
//!   memory and disk feasibility.
//! - **`accumulator`**: The flat array of wrapping 16-bit counters.
//! - **`binning`**: The decode/accumulate hot loop and word format.
//! - **`tags`**: Tag-word processing (scan-time ticks, per-block singles).
//! - **`frames`**: Frame table with duration or net-trues criteria.
//! - **`session`**: The `Session` owning all of the above plus the lifecycle
//!   state machine (`session::state`).
//! - **`writer`** / **`header`**: Stores a completed frame as a binary
//!   sinogram file and an Interfile-style header.
//! - **`pipeline`** / **`source`**: Replay, store and statistics tasks on the
//!   tokio runtime, and the buffer sources feeding them.
//! - **`notify`**: Notification sink trait with tracing and channel
//!   implementations.
//! - **`geometry`**: Scanner geometry lookup.
//! - **`config`**, **`logging`**, **`error`**, **`stats`**: Settings, tracing
//!   setup, error taxonomy and statistics snapshots.
//!
//! ## Example
//!
//! ```no_run
//! use pet_histogrammer::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> pet_histogrammer::error::HistResult<()> {
//! let mut session = Session::new(&ScannerModel::Hrrt, Arc::new(TracingSink));
//! session.set_attributes(256, 288, 207, 0)?;
//! session.set_sinogram_mode(
//!     SinogramMode::NetTrues,
//!     SinogramMode::NetTrues,
//!     AcquisitionMode::EmissionOnly,
//! )?;
//! session.configure("scan.s", None)?;
//! session.start()?;
//!
//! let words = [prompt_word(0), random_word(0)];
//! session.feed(&words, PresetSignal::None)?;
//! session.stop()?;
//! session.feed(&[], PresetSignal::None)?;
//! session.store_frame(&FrameWriter::new())?;
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod acquisition;
pub mod binning;
pub mod config;
pub mod error;
pub mod frames;
pub mod geometry;
pub mod header;
pub mod layout;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod stats;
pub mod tags;
pub mod writer;

/// Commonly used types.
pub mod prelude {
    pub use crate::acquisition::{AcquisitionMode, Channel, SinogramMode};
    pub use crate::binning::{prompt_word, random_word, BinResult};
    pub use crate::error::{HistResult, HistogramError};
    pub use crate::frames::FrameCriterion;
    pub use crate::geometry::ScannerModel;
    pub use crate::notify::{ChannelSink, TracingSink};
    pub use crate::pipeline::Histogrammer;
    pub use crate::session::state::{PresetSignal, ScanEndReason, SessionState};
    pub use crate::session::Session;
    pub use crate::writer::FrameWriter;
}
