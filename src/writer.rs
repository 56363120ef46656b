//! Frame writer: stores a completed frame as sinogram files plus headers.
//!
//! For every active channel the writer produces
//!
//! - `<name>.s`: prompts (or net trues), followed by randoms when the channel
//!   keeps them separately, as little-endian `i16`
//! - `<name>.s.hdr`: Interfile-style header (see [`crate::header`])
//!
//! Files are opened through an [`OutputFactory`] so storage failures can be
//! simulated. The writer never touches session state; [`Session::store_frame`]
//! decides what happens to the accumulator once the write returns.
//!
//! [`Session::store_frame`]: crate::session::Session::store_frame

use crate::accumulator::{Accumulator, Counter};
use crate::acquisition::{header_path, Channel, SessionConfig};
use crate::error::StoreError;
use crate::frames::FrameDescriptor;
use crate::geometry::ScannerGeometry;
use crate::header::{self, HeaderFields};
use crate::layout::{Region, RegionLayout, COUNTER_BYTES};
use crate::session::state::ScanEndReason;
use crate::tags::SinglesSummary;
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Counters converted and written per chunk.
const CHUNK_COUNTERS: usize = 64 * 1024;

/// Opens output streams for the writer.
pub trait OutputFactory: Send + Sync {
    /// Create (or truncate) the file at `path`.
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>>;
}

/// Factory writing to the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsOutput;

impl OutputFactory for FsOutput {
    fn create(&self, path: &Path) -> io::Result<Box<dyn Write + Send>> {
        let file = File::create(path)?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Borrowed view of a completed frame.
pub struct FrameData<'a> {
    /// Configuration the frame was acquired with
    pub config: &'a SessionConfig,
    /// Accumulator layout
    pub layout: &'a RegionLayout,
    /// Counters to store
    pub accumulator: &'a Accumulator,
    /// Frame being stored
    pub frame: &'a FrameDescriptor,
    /// Index of that frame
    pub frame_index: usize,
    /// Scanner geometry for the header
    pub geometry: &'a ScannerGeometry,
    /// Singles summary for the header
    pub singles: SinglesSummary,
    /// Acquisition start time
    pub study_time: DateTime<Local>,
    /// Why the frame ended
    pub end_reason: Option<ScanEndReason>,
}

/// What a successful store produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOutcome {
    /// Sinogram and header files written
    pub files: Vec<PathBuf>,
    /// Sinogram bytes written over all channels
    pub bytes_written: u64,
}

/// Writes frames through an [`OutputFactory`].
#[derive(Clone)]
pub struct FrameWriter {
    factory: Arc<dyn OutputFactory>,
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter").finish_non_exhaustive()
    }
}

impl FrameWriter {
    /// Writer backed by the file system.
    pub fn new() -> Self {
        Self::with_factory(Arc::new(FsOutput))
    }

    /// Writer backed by a custom factory.
    pub fn with_factory(factory: Arc<dyn OutputFactory>) -> Self {
        Self { factory }
    }

    /// Store every active channel of `frame`.
    pub fn write(&self, frame: &FrameData<'_>) -> Result<StoreOutcome, StoreError> {
        let mut outcome = StoreOutcome::default();

        for channel in frame.config.modes.acquisition.channels() {
            let data_path = frame.config.output_path(channel);
            let written = self.write_sinograms(frame, channel, &data_path)?;
            outcome.bytes_written += written;
            outcome.files.push(data_path.clone());

            let hdr_path = header_path(&data_path);
            self.write_header(frame, channel, &data_path, &hdr_path)?;
            outcome.files.push(hdr_path);

            debug!(%channel, path = %data_path.display(), bytes = written, "Channel stored");
        }

        info!(
            frame = frame.frame_index,
            files = outcome.files.len(),
            bytes = outcome.bytes_written,
            "Frame stored"
        );
        Ok(outcome)
    }

    fn write_sinograms(
        &self,
        frame: &FrameData<'_>,
        channel: Channel,
        path: &Path,
    ) -> Result<u64, StoreError> {
        let mut regions = vec![frame.accumulator.region(frame.layout, Region::prompts(channel))];
        if frame.layout.separates_randoms(channel) {
            regions.push(frame.accumulator.region(frame.layout, Region::randoms(channel)));
        }
        let expected: u64 = regions
            .iter()
            .map(|r| r.len() as u64 * COUNTER_BYTES)
            .sum();

        let mut out = self
            .factory
            .create(path)
            .map_err(|source| StoreError::OutputCreate {
                path: path.to_path_buf(),
                source,
            })?;

        let mut written = 0u64;
        let mut bytes = Vec::with_capacity(CHUNK_COUNTERS * COUNTER_BYTES as usize);
        let partial = |written: u64, source: io::Error| StoreError::PartialWrite {
            path: path.to_path_buf(),
            written,
            expected,
            source,
        };

        for region in regions {
            for chunk in region.chunks(CHUNK_COUNTERS) {
                encode_le(chunk, &mut bytes);
                out.write_all(&bytes).map_err(|e| partial(written, e))?;
                written += bytes.len() as u64;
            }
        }
        out.flush().map_err(|e| partial(written, e))?;
        Ok(written)
    }

    fn write_header(
        &self,
        frame: &FrameData<'_>,
        channel: Channel,
        data_path: &Path,
        hdr_path: &Path,
    ) -> Result<(), StoreError> {
        let header_error = |source| StoreError::HeaderCreation {
            path: hdr_path.to_path_buf(),
            source,
        };

        let i = channel.index();
        let fields = HeaderFields {
            geometry: frame.geometry,
            channel,
            data_file: data_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            projections: frame.config.attributes.projections,
            views: frame.config.attributes.views,
            sinograms: frame.config.attributes.sinograms(channel),
            mode: frame.layout.modes().mode(channel),
            frame_index: frame.frame_index,
            frame_start: frame.frame.start,
            frame_duration: frame.frame.duration.unwrap_or(Duration::ZERO),
            prompts: frame.frame.prompts[i],
            randoms: frame.frame.randoms[i],
            singles: &frame.singles,
            study_time: frame.study_time,
            end_reason: frame.end_reason,
        };
        let text = header::render(&fields);

        let mut out = self.factory.create(hdr_path).map_err(header_error)?;
        out.write_all(text.as_bytes()).map_err(header_error)?;
        out.flush().map_err(header_error)
    }
}

fn encode_le(counters: &[Counter], bytes: &mut Vec<u8>) {
    bytes.clear();
    for counter in counters {
        bytes.extend_from_slice(&counter.to_le_bytes());
    }
}
