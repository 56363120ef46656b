//! Acquisition parameters of a histogramming session.
//!
//! These types describe *what* is being histogrammed: which channels are
//! active, how prompts and randoms are kept, the sinogram dimensions and where
//! the data comes from and goes to. They are assembled by the session's
//! configuration operations and frozen into a [`SessionConfig`] by
//! `configure()`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of histogram channels (emission, transmission).
pub const CHANNELS: usize = 2;

/// One histogram channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Emission data
    Emission,
    /// Transmission data
    Transmission,
}

impl Channel {
    /// Both channels in packing order.
    pub const ALL: [Channel; CHANNELS] = [Channel::Emission, Channel::Transmission];

    /// Index into per-channel arrays.
    pub fn index(self) -> usize {
        match self {
            Channel::Emission => 0,
            Channel::Transmission => 1,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Emission => write!(f, "emission"),
            Channel::Transmission => write!(f, "transmission"),
        }
    }
}

/// Which channels are acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcquisitionMode {
    /// Emission only
    #[default]
    EmissionOnly,
    /// Transmission only
    TransmissionOnly,
    /// Emission and transmission at the same time
    Simultaneous,
}

impl AcquisitionMode {
    /// Whether `channel` is acquired in this mode.
    pub fn is_active(self, channel: Channel) -> bool {
        match (self, channel) {
            (AcquisitionMode::Simultaneous, _) => true,
            (AcquisitionMode::EmissionOnly, Channel::Emission) => true,
            (AcquisitionMode::TransmissionOnly, Channel::Transmission) => true,
            _ => false,
        }
    }

    /// Active channels in packing order.
    pub fn channels(self) -> impl Iterator<Item = Channel> {
        Channel::ALL
            .into_iter()
            .filter(move |channel| self.is_active(*channel))
    }
}

impl std::str::FromStr for AcquisitionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "emission" | "emission-only" => Ok(AcquisitionMode::EmissionOnly),
            "transmission" | "transmission-only" => Ok(AcquisitionMode::TransmissionOnly),
            "simultaneous" => Ok(AcquisitionMode::Simultaneous),
            other => Err(format!(
                "Invalid acquisition mode '{}'. Must be one of: emission, transmission, simultaneous",
                other
            )),
        }
    }
}

/// How prompts and randoms are kept for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinogramMode {
    /// Randoms are subtracted on the fly; one sinogram set holds prompts - randoms
    #[default]
    NetTrues,
    /// Prompts and randoms are histogrammed into separate sinogram sets
    PromptsAndRandoms,
}

impl SinogramMode {
    /// Whether randoms get their own storage.
    pub fn separates_randoms(self) -> bool {
        matches!(self, SinogramMode::PromptsAndRandoms)
    }
}

impl std::str::FromStr for SinogramMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "net-trues" | "trues" => Ok(SinogramMode::NetTrues),
            "prompts-and-randoms" | "separate" => Ok(SinogramMode::PromptsAndRandoms),
            other => Err(format!(
                "Invalid sinogram mode '{}'. Must be one of: net-trues, prompts-and-randoms",
                other
            )),
        }
    }
}

/// Sinogram dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinogramAttributes {
    /// Radial bins per view
    pub projections: u32,
    /// Angular views
    pub views: u32,
    /// Emission sinogram (plane) count
    pub em_sinograms: u32,
    /// Transmission sinogram (plane) count
    pub tx_sinograms: u32,
}

impl SinogramAttributes {
    /// Sinogram count of a channel.
    pub fn sinograms(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Emission => self.em_sinograms,
            Channel::Transmission => self.tx_sinograms,
        }
    }

    /// Cells in one sinogram set of `channel`.
    pub fn bins(&self, channel: Channel) -> u64 {
        u64::from(self.projections) * u64::from(self.views) * u64::from(self.sinograms(channel))
    }
}

/// Sinogram modes of both channels plus the acquisition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModeSettings {
    /// Emission sinogram mode
    pub em_mode: SinogramMode,
    /// Transmission sinogram mode
    pub tx_mode: SinogramMode,
    /// Active channels
    pub acquisition: AcquisitionMode,
}

impl ModeSettings {
    /// Sinogram mode of a channel.
    pub fn mode(&self, channel: Channel) -> SinogramMode {
        match channel {
            Channel::Emission => self.em_mode,
            Channel::Transmission => self.tx_mode,
        }
    }
}

/// Where event buffers come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionSource {
    /// Live buffers from the acquisition hardware
    Online,
    /// Replay of a recorded list-mode file
    Offline(PathBuf),
}

/// Frozen configuration of a configured session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sinogram dimensions
    pub attributes: SinogramAttributes,
    /// Channel modes
    pub modes: ModeSettings,
    /// Emission (or sole) output path
    pub output: PathBuf,
    /// Event source
    pub source: AcquisitionSource,
}

impl SessionConfig {
    /// Output sinogram path for a channel.
    ///
    /// In simultaneous mode the transmission file gets a `_tx` suffix on the
    /// file stem; otherwise the active channel writes to the configured path.
    pub fn output_path(&self, channel: Channel) -> PathBuf {
        match (self.modes.acquisition, channel) {
            (AcquisitionMode::Simultaneous, Channel::Transmission) => {
                with_stem_suffix(&self.output, "_tx")
            }
            _ => self.output.clone(),
        }
    }
}

/// Header path paired with a sinogram file (`scan.s` → `scan.s.hdr`).
pub fn header_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_owned();
    name.push(".hdr");
    PathBuf::from(name)
}

fn with_stem_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}
