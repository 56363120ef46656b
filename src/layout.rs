//! Region layout planner.
//!
//! Turns a [`SessionConfig`] into the byte layout of the accumulator and checks
//! that the histogram fits in memory in a single pass and on disk once stored.
//!
//! # Memory Layout
//! ```text
//! [em prompts][tx prompts][em randoms][tx randoms]
//!  ^ 0                      ^ only for channels in prompts-and-randoms mode
//! ```
//! A net-trues channel has no randoms region; its randoms offset aliases its
//! prompts offset and randoms are subtracted in place.

use crate::acquisition::{Channel, ModeSettings, SessionConfig, SinogramAttributes, CHANNELS};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, warn};

/// Width of one accumulator counter in bytes.
pub const COUNTER_BYTES: u64 = std::mem::size_of::<i16>() as u64;

/// Largest accepted sinogram count per channel.
pub const MAX_SINOGRAMS: u32 = 10_000;

/// Largest accepted projection or view count.
pub const MAX_SINOGRAM_DIMENSION: u32 = 4096;

/// Event words carry a 29-bit bin index.
pub const BIN_INDEX_BITS: u32 = 29;

/// Disk allowance for one header file.
const HEADER_ALLOWANCE: u64 = 16 * 1024;

/// One logical sub-region of the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// Emission prompts (or net trues)
    EmissionPrompts,
    /// Emission randoms
    EmissionRandoms,
    /// Transmission prompts (or net trues)
    TransmissionPrompts,
    /// Transmission randoms
    TransmissionRandoms,
}

impl Region {
    /// Prompts region of a channel.
    pub fn prompts(channel: Channel) -> Self {
        match channel {
            Channel::Emission => Region::EmissionPrompts,
            Channel::Transmission => Region::TransmissionPrompts,
        }
    }

    /// Randoms region of a channel.
    pub fn randoms(channel: Channel) -> Self {
        match channel {
            Channel::Emission => Region::EmissionRandoms,
            Channel::Transmission => Region::TransmissionRandoms,
        }
    }

    fn slot(self) -> usize {
        match self {
            Region::EmissionPrompts => 0,
            Region::EmissionRandoms => 1,
            Region::TransmissionPrompts => 2,
            Region::TransmissionRandoms => 3,
        }
    }
}

/// Outcome of the disk-space feasibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiskCheck {
    /// Free space was measured and is sufficient
    Verified {
        /// Free bytes at the destination
        available: u64,
    },
    /// Free space could not be measured (network share or unknown mount)
    Unverified {
        /// Destination that could not be checked
        path: PathBuf,
    },
}

/// Byte layout of the accumulator for one configured session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionLayout {
    offsets: [u64; 4],
    bins: [u64; CHANNELS],
    modes: ModeSettings,
    total_counters: u64,
    emission_bound: u64,
    active_bound: u64,
    /// Histogram bytes plus I/O reserve and overhead
    pub required_bytes: u64,
    /// Passes needed to fit in memory (always 1 for a valid layout)
    pub passes: u64,
    /// Bytes all frames occupy once stored
    pub output_bytes: u64,
    /// Disk feasibility outcome
    pub disk: DiskCheck,
}

impl RegionLayout {
    /// Counter offset of a region.
    pub fn offset(&self, region: Region) -> u64 {
        self.offsets[region.slot()]
    }

    /// Counters in one sinogram set of a channel (0 when inactive).
    pub fn bins(&self, channel: Channel) -> u64 {
        self.bins[channel.index()]
    }

    /// Channel modes the layout was planned for.
    pub fn modes(&self) -> &ModeSettings {
        &self.modes
    }

    /// Whether a channel stores randoms separately.
    pub fn separates_randoms(&self, channel: Channel) -> bool {
        self.bins(channel) > 0 && self.modes.mode(channel).separates_randoms()
    }

    /// Counter range of a region, empty for aliased or inactive regions.
    pub fn range(&self, region: Region) -> Range<usize> {
        let channel = match region {
            Region::EmissionPrompts | Region::EmissionRandoms => Channel::Emission,
            Region::TransmissionPrompts | Region::TransmissionRandoms => Channel::Transmission,
        };
        let is_randoms = matches!(
            region,
            Region::EmissionRandoms | Region::TransmissionRandoms
        );
        let len = if is_randoms && !self.separates_randoms(channel) {
            0
        } else {
            self.bins(channel)
        };
        let start = self.offset(region) as usize;
        start..start + len as usize
    }

    /// Total counters in the accumulator.
    pub fn total_counters(&self) -> u64 {
        self.total_counters
    }

    /// Bin indices below this bound are emission events.
    pub fn emission_bound(&self) -> u64 {
        self.emission_bound
    }

    /// Bin indices at or above this bound are ignored.
    pub fn active_bound(&self) -> u64 {
        self.active_bound
    }
}

/// Memory and disk figures the planner compares against.
pub trait ResourceSource: Send + Sync {
    /// Physical memory currently available, in bytes.
    fn available_memory(&self) -> u64;

    /// Free space on the file system holding `path`, `None` when unknown.
    fn available_disk(&self, path: &Path) -> Option<u64>;
}

/// Resource source backed by `sysinfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResources;

impl ResourceSource for SystemResources {
    fn available_memory(&self) -> u64 {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::everything()),
        );
        system.refresh_memory();
        system.available_memory()
    }

    fn available_disk(&self, path: &Path) -> Option<u64> {
        let target = existing_ancestor(path)?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Resource source returning fixed figures, for dry runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedResources {
    /// Reported available memory
    pub memory: u64,
    /// Reported free disk space
    pub disk: Option<u64>,
}

impl ResourceSource for FixedResources {
    fn available_memory(&self) -> u64 {
        self.memory
    }

    fn available_disk(&self, _path: &Path) -> Option<u64> {
        self.disk
    }
}

/// Engine limits applied while planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    /// Memory kept for I/O working buffers
    pub io_reserve_bytes: u64,
    /// Fixed process overhead
    pub overhead_bytes: u64,
    /// Fail instead of warning when free space cannot be measured
    pub require_verified_disk: bool,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            io_reserve_bytes: 64 * 1024 * 1024,
            overhead_bytes: 32 * 1024 * 1024,
            require_verified_disk: false,
        }
    }
}

/// Plan the accumulator layout for `config` with `frames` defined frames.
pub fn plan(
    config: &SessionConfig,
    frames: usize,
    limits: &PlanLimits,
    resources: &dyn ResourceSource,
) -> Result<RegionLayout, ConfigError> {
    validate_attributes(&config.attributes, &config.modes)?;
    if frames > 1 {
        return Err(ConfigError::MultiFrameUnsupported { frames });
    }

    let modes = config.modes;
    let mut bins = [0u64; CHANNELS];
    for channel in modes.acquisition.channels() {
        bins[channel.index()] = config.attributes.bins(channel);
    }

    let active_bound: u64 = bins.iter().sum();
    if active_bound > 1u64 << BIN_INDEX_BITS {
        return Err(ConfigError::InvalidDimension {
            name: "bin space",
            value: active_bound,
            min: 1,
            max: 1u64 << BIN_INDEX_BITS,
        });
    }

    // Prompts of every active channel first, then separated randoms
    let mut offsets = [0u64; 4];
    let mut next = 0u64;
    for channel in modes.acquisition.channels() {
        offsets[Region::prompts(channel).slot()] = next;
        next += bins[channel.index()];
    }
    for channel in modes.acquisition.channels() {
        let prompts = offsets[Region::prompts(channel).slot()];
        offsets[Region::randoms(channel).slot()] = if modes.mode(channel).separates_randoms() {
            let offset = next;
            next += bins[channel.index()];
            offset
        } else {
            prompts
        };
    }
    let total_counters = next;

    let histogram_bytes = total_counters * COUNTER_BYTES;
    let fixed = limits.io_reserve_bytes + limits.overhead_bytes;
    let required_bytes = histogram_bytes + fixed;
    let available = resources.available_memory();
    if available <= fixed {
        return Err(ConfigError::InsufficientMemory {
            required: required_bytes,
            available,
        });
    }
    let passes = histogram_bytes.div_ceil(available - fixed).max(1);
    if passes > 1 {
        return Err(ConfigError::MultiPassUnsupported { passes });
    }

    let channels = modes.acquisition.channels().count() as u64;
    let output_bytes = (histogram_bytes + channels * HEADER_ALLOWANCE) * frames.max(1) as u64;
    let disk = check_disk(&config.output, output_bytes, limits, resources)?;

    debug!(
        total_counters,
        required_bytes, available, output_bytes, "Planned accumulator layout"
    );

    Ok(RegionLayout {
        offsets,
        bins,
        modes,
        total_counters,
        emission_bound: bins[Channel::Emission.index()],
        active_bound,
        required_bytes,
        passes,
        output_bytes,
        disk,
    })
}

fn validate_attributes(
    attributes: &SinogramAttributes,
    modes: &ModeSettings,
) -> Result<(), ConfigError> {
    let dimension = |name, value: u32, min: u32, max: u32| {
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(ConfigError::InvalidDimension {
                name,
                value: u64::from(value),
                min: u64::from(min),
                max: u64::from(max),
            })
        }
    };

    dimension("projections", attributes.projections, 1, MAX_SINOGRAM_DIMENSION)?;
    dimension("views", attributes.views, 1, MAX_SINOGRAM_DIMENSION)?;
    dimension("em_sinograms", attributes.em_sinograms, 0, MAX_SINOGRAMS)?;
    dimension("tx_sinograms", attributes.tx_sinograms, 0, MAX_SINOGRAMS)?;

    // An active channel needs at least one sinogram
    for channel in modes.acquisition.channels() {
        let name = match channel {
            Channel::Emission => "em_sinograms",
            Channel::Transmission => "tx_sinograms",
        };
        dimension(name, attributes.sinograms(channel), 1, MAX_SINOGRAMS)?;
    }
    Ok(())
}

fn check_disk(
    output: &Path,
    required: u64,
    limits: &PlanLimits,
    resources: &dyn ResourceSource,
) -> Result<DiskCheck, ConfigError> {
    let destination = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let available = if is_unc_path(output) {
        None
    } else {
        resources.available_disk(&destination)
    };

    match available {
        Some(available) if available < required => Err(ConfigError::DiskSpace {
            path: destination,
            required,
            available,
        }),
        Some(available) => Ok(DiskCheck::Verified { available }),
        None if limits.require_verified_disk => Err(ConfigError::UncUnverified(destination)),
        None => {
            warn!(
                path = %destination.display(),
                required,
                "Free disk space not verified for output destination"
            );
            Ok(DiskCheck::Unverified { path: destination })
        }
    }
}

/// Whether a path names a network share (`\\server\share` or `//server/share`).
pub fn is_unc_path(path: &Path) -> bool {
    let s = path.to_string_lossy();
    s.starts_with(r"\\") || s.starts_with("//")
}

fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    absolute
        .ancestors()
        .find(|p| p.exists())
        .and_then(|p| p.canonicalize().ok())
}
