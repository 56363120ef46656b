//! Histogramming session: configuration, acquisition and storage lifecycle.
//!
//! A [`Session`] owns everything one acquisition needs: the frozen
//! configuration, the planned [`RegionLayout`], the [`Accumulator`], the tag
//! state, the frame table and the lifecycle [`SessionState`]. All operations
//! check the current state first and return [`StateError`] without side
//! effects when the transition is not allowed.
//!
//! ## Lifecycle
//!
//! 1. `set_attributes`, `set_sinogram_mode`, `define_frames` (INITIALIZED or
//!    UNCONFIGURED)
//! 2. `configure` plans the layout (UNCONFIGURED → CONFIGURED)
//! 3. `start` allocates the accumulator (CONFIGURED → ACTIVE)
//! 4. `feed` bins buffers until a termination cause ends the scan
//! 5. `store_frame` writes the frame (→ STORE_COMPLETE or STORE_ERROR)
//! 6. `unconfigure` returns to UNCONFIGURED from anywhere
//!
//! `stop` and `abort` only post a command on the shared [`SessionControl`];
//! the next `feed` acts on it.

pub mod state;

use crate::accumulator::Accumulator;
use crate::acquisition::{
    AcquisitionMode, AcquisitionSource, ModeSettings, SessionConfig, SinogramAttributes,
    SinogramMode,
};
use crate::binning::{accumulate_totals, BinResult, Binner, EventCounts, MAX_WORDS_PER_FEED};
use crate::config::HistogrammerConfig;
use crate::error::{ConfigError, HistResult, HistogramError, StateError};
use crate::frames::{FrameCriterion, FrameTable, MAX_FRAMES};
use crate::geometry::{GeometryProvider, ScannerGeometry};
use crate::layout::{self, DiskCheck, PlanLimits, RegionLayout, ResourceSource, SystemResources};
use crate::notify::NotificationSink;
use crate::stats::{self, ScanStatistics};
use crate::tags::TagState;
use crate::writer::{FrameData, FrameWriter, StoreOutcome};
use chrono::{DateTime, Local};
use state::{PendingCommand, PresetSignal, ScanEndReason, SessionControl, SessionState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One histogramming session.
pub struct Session {
    state: SessionState,
    attributes: Option<SinogramAttributes>,
    modes: ModeSettings,
    frames: FrameTable,
    config: Option<SessionConfig>,
    layout: Option<RegionLayout>,
    accumulator: Option<Accumulator>,
    tags: TagState,
    totals: EventCounts,
    control: SessionControl,
    store_trigger: bool,
    end_reason: Option<ScanEndReason>,
    started_at: Option<DateTime<Local>>,
    geometry: ScannerGeometry,
    limits: PlanLimits,
    tick_period: Duration,
    resources: Arc<dyn ResourceSource>,
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("frame", &self.frames.current_index())
            .field("totals", &self.totals)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session for the scanner described by `geometry`.
    pub fn new(geometry: &dyn GeometryProvider, sink: Arc<dyn NotificationSink>) -> Self {
        let geometry = geometry.geometry();
        let tick_period = Duration::from_millis(1);
        Self {
            state: SessionState::Initialized,
            attributes: None,
            modes: ModeSettings::default(),
            frames: FrameTable::default(),
            config: None,
            layout: None,
            accumulator: None,
            tags: TagState::new(geometry.blocks, geometry.singles_policy, tick_period),
            totals: EventCounts::default(),
            control: SessionControl::new(),
            store_trigger: false,
            end_reason: None,
            started_at: None,
            geometry,
            limits: PlanLimits::default(),
            tick_period,
            resources: Arc::new(SystemResources),
            sink,
        }
    }

    /// Create a session from loaded engine settings.
    pub fn from_settings(settings: &HistogrammerConfig, sink: Arc<dyn NotificationSink>) -> Self {
        Self::new(&settings.engine.scanner, sink)
            .with_limits(PlanLimits {
                io_reserve_bytes: settings.engine.io_reserve_bytes(),
                overhead_bytes: settings.engine.overhead_bytes(),
                require_verified_disk: settings.storage.require_verified_disk,
            })
            .with_tick_period(settings.engine.tick_period())
    }

    /// Use planning limits other than the defaults.
    pub fn with_limits(mut self, limits: PlanLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Query memory and disk through `resources` instead of the system.
    pub fn with_resources(mut self, resources: Arc<dyn ResourceSource>) -> Self {
        self.resources = resources;
        self
    }

    /// Duration of one tick tag.
    pub fn with_tick_period(mut self, tick_period: Duration) -> Self {
        self.tick_period = tick_period;
        self.tags = self.fresh_tags();
        self
    }

    fn fresh_tags(&self) -> TagState {
        TagState::new(
            self.geometry.blocks,
            self.geometry.singles_policy,
            self.tick_period,
        )
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle for posting stop/abort from other tasks.
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Configuration frozen by `configure`.
    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    /// Layout planned by `configure`.
    pub fn layout(&self) -> Option<&RegionLayout> {
        self.layout.as_ref()
    }

    /// Accumulator, allocated by `start`.
    pub fn accumulator(&self) -> Option<&Accumulator> {
        self.accumulator.as_ref()
    }

    /// Frame table.
    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    /// Tick and singles state.
    pub fn tags(&self) -> &TagState {
        &self.tags
    }

    /// Geometry of the scanner this session histograms for.
    pub fn geometry(&self) -> &ScannerGeometry {
        &self.geometry
    }

    /// Prompts and randoms binned since `start`.
    pub fn totals(&self) -> &EventCounts {
        &self.totals
    }

    /// Why the scan ended, once it has.
    pub fn end_reason(&self) -> Option<ScanEndReason> {
        self.end_reason
    }

    fn require(&self, op: &'static str, allowed: bool) -> Result<(), StateError> {
        if allowed {
            Ok(())
        } else {
            Err(StateError::IllegalTransition {
                op,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: SessionState, message: &str) {
        debug!(from = %self.state, to = %next, "Session state transition");
        self.state = next;
        self.sink.notify(next, message);
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Set sinogram dimensions.
    pub fn set_attributes(
        &mut self,
        projections: u32,
        views: u32,
        em_sinograms: u32,
        tx_sinograms: u32,
    ) -> Result<(), StateError> {
        self.require("set_attributes", self.state.can_set_parameters())?;
        self.attributes = Some(SinogramAttributes {
            projections,
            views,
            em_sinograms,
            tx_sinograms,
        });
        self.state = SessionState::Unconfigured;
        Ok(())
    }

    /// Set the sinogram mode of both channels and the acquisition mode.
    pub fn set_sinogram_mode(
        &mut self,
        em_mode: SinogramMode,
        tx_mode: SinogramMode,
        acquisition: AcquisitionMode,
    ) -> Result<(), StateError> {
        self.require("set_sinogram_mode", self.state.can_set_parameters())?;
        self.modes = ModeSettings {
            em_mode,
            tx_mode,
            acquisition,
        };
        self.state = SessionState::Unconfigured;
        Ok(())
    }

    /// Define `count` frames sharing one termination criterion.
    pub fn define_frames(&mut self, count: usize, criterion: FrameCriterion) -> HistResult<()> {
        self.require("define_frames", self.state.can_set_parameters())?;
        if !(1..=MAX_FRAMES).contains(&count) {
            return Err(ConfigError::InvalidDimension {
                name: "frames",
                value: count as u64,
                min: 1,
                max: MAX_FRAMES as u64,
            }
            .into());
        }
        match criterion {
            FrameCriterion::Duration(d) if d.is_zero() => {
                return Err(ConfigError::InvalidDimension {
                    name: "frame duration",
                    value: 0,
                    min: 1,
                    max: u64::MAX,
                }
                .into());
            }
            FrameCriterion::NetTrues(threshold) if threshold == 0 || threshold > i64::MAX as u64 => {
                return Err(ConfigError::InvalidDimension {
                    name: "net trues threshold",
                    value: threshold,
                    min: 1,
                    max: i64::MAX as u64,
                }
                .into());
            }
            _ => {}
        }

        self.frames = FrameTable::uniform(count, criterion);
        self.state = SessionState::Unconfigured;
        Ok(())
    }

    /// Plan the layout and freeze the configuration.
    ///
    /// `input` selects offline replay of a recorded file; `None` means online
    /// acquisition. On failure the session stays UNCONFIGURED.
    pub fn configure(
        &mut self,
        output: impl Into<PathBuf>,
        input: Option<PathBuf>,
    ) -> HistResult<&RegionLayout> {
        self.require("configure", self.state == SessionState::Unconfigured)?;
        let attributes = self
            .attributes
            .ok_or(ConfigError::MissingParameter("sinogram attributes"))?;
        if self.frames.is_empty() {
            self.frames = FrameTable::open_ended();
        }

        let config = SessionConfig {
            attributes,
            modes: self.modes,
            output: output.into(),
            source: match input {
                Some(path) => AcquisitionSource::Offline(path),
                None => AcquisitionSource::Online,
            },
        };

        let planned = layout::plan(&config, self.frames.len(), &self.limits, self.resources.as_ref());
        let planned = match planned {
            Ok(planned) => planned,
            Err(e) => {
                warn!(error = %e, "Configuration rejected");
                self.sink.notify(self.state, &e.to_string());
                return Err(e.into());
            }
        };

        if let DiskCheck::Unverified { path } = &planned.disk {
            self.sink.notify(
                self.state,
                &format!("Free disk space at {} could not be verified", path.display()),
            );
        }

        info!(
            output = %config.output.display(),
            counters = planned.total_counters(),
            required_bytes = planned.required_bytes,
            "Session configured"
        );
        self.config = Some(config);
        self.transition(SessionState::Configured, "Session configured");
        Ok(self.layout.insert(planned))
    }

    /// Release the accumulator and return to UNCONFIGURED from any state.
    ///
    /// Sinogram attributes and modes are kept; frames must be defined again.
    pub fn unconfigure(&mut self) {
        self.accumulator = None;
        self.layout = None;
        self.config = None;
        self.frames.clear();
        self.tags = self.fresh_tags();
        self.totals = EventCounts::default();
        self.control.clear();
        self.store_trigger = false;
        self.end_reason = None;
        self.started_at = None;
        self.transition(SessionState::Unconfigured, "Session unconfigured");
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    /// Allocate the accumulator and begin acquiring.
    pub fn start(&mut self) -> HistResult<()> {
        self.require("start", self.state == SessionState::Configured)?;
        let layout = self
            .layout
            .as_ref()
            .ok_or(ConfigError::MissingParameter("layout"))?;

        let accumulator = Accumulator::allocate(layout).inspect_err(|e| {
            warn!(error = %e, "Accumulator allocation failed");
        })?;
        self.accumulator = Some(accumulator);

        self.tags = self.fresh_tags();
        self.totals = EventCounts::default();
        self.control.clear();
        self.store_trigger = false;
        self.end_reason = None;
        self.started_at = Some(Local::now());

        info!(frames = self.frames.len(), "Acquisition started");
        self.transition(SessionState::Active, "Acquisition started");
        Ok(())
    }

    /// Post a stop request, acted on by the next `feed`.
    ///
    /// Only legal while acquiring (ACTIVE or WAIT). Other tasks post through
    /// [`SessionControl`] instead.
    pub fn stop(&self) -> Result<(), StateError> {
        self.require("stop", self.state.can_feed())?;
        self.control.stop();
        Ok(())
    }

    /// Post an abort request, acted on by the next `feed`.
    ///
    /// Only legal while acquiring (ACTIVE or WAIT).
    pub fn abort(&self) -> Result<(), StateError> {
        self.require("abort", self.state.can_feed())?;
        self.control.abort();
        Ok(())
    }

    /// Decode one buffer of list-mode words.
    ///
    /// At most [`MAX_WORDS_PER_FEED`] words are decoded; `Consumed(n)` tells
    /// the caller how many were taken so the rest can be fed again. A tag that
    /// ends the current frame stops decoding at that word.
    ///
    /// After the buffer, termination causes are checked in priority order:
    /// stop, abort, external preset, frame switch, net-trues threshold.
    pub fn feed(&mut self, words: &[i32], preset: PresetSignal) -> Result<BinResult, StateError> {
        self.require("feed", self.state.can_feed())?;

        let take = words.len().min(MAX_WORDS_PER_FEED);
        let (Some(layout), Some(accumulator)) = (self.layout.as_ref(), self.accumulator.as_mut())
        else {
            return Err(StateError::IllegalTransition {
                op: "feed",
                state: self.state,
            });
        };
        self.state = SessionState::Active;
        let decoded =
            Binner::new(layout, accumulator, &mut self.tags, &mut self.frames).run(&words[..take]);
        accumulate_totals(&mut self.totals, &decoded);

        let pending = self.control.take();
        if pending == PendingCommand::Stop || preset == PresetSignal::Stop {
            return Ok(self.end_scan(SessionState::Stopped, ScanEndReason::Stopped, true));
        }
        if pending == PendingCommand::Abort || preset == PresetSignal::Abort {
            return Ok(self.end_scan(SessionState::Aborted, ScanEndReason::Aborted, false));
        }
        if preset == PresetSignal::PresetComplete {
            return Ok(self.end_scan(
                SessionState::Complete,
                ScanEndReason::PresetComplete,
                true,
            ));
        }
        if decoded.frame_ended {
            return Ok(self.end_scan(SessionState::Complete, ScanEndReason::FrameDuration, true));
        }
        if let Some(frame) = self.frames.current() {
            if let FrameCriterion::NetTrues(threshold) = frame.criterion {
                let reached = i64::try_from(threshold)
                    .is_ok_and(|threshold| frame.total_net_trues() >= threshold);
                if reached {
                    return Ok(self.end_scan(
                        SessionState::Complete,
                        ScanEndReason::NetTruesReached,
                        true,
                    ));
                }
            }
        }

        self.state = SessionState::Wait;
        Ok(BinResult::Consumed(decoded.words))
    }

    /// Offline input ran out: complete the current frame.
    pub fn finish_input(&mut self) -> Result<ScanEndReason, StateError> {
        self.require("finish_input", self.state.can_feed())?;
        self.end_scan(
            SessionState::Complete,
            ScanEndReason::InputExhausted,
            true,
        );
        Ok(ScanEndReason::InputExhausted)
    }

    fn end_scan(&mut self, next: SessionState, reason: ScanEndReason, store: bool) -> BinResult {
        let now = self.tags.elapsed();
        if let Some(frame) = self.frames.current_mut() {
            if frame.switch_time.is_none() {
                frame.complete_at(now);
            }
        }
        self.end_reason = Some(reason);
        self.store_trigger = store;

        info!(
            %reason,
            elapsed_ms = now.as_millis() as u64,
            net_trues = self.totals.total_net_trues(),
            "Scan ended"
        );
        self.transition(next, &format!("Scan ended: {}", reason));
        self.sink.scan_complete(reason);
        BinResult::EndOfScan(reason)
    }

    /// Consume the store trigger. Returns `true` once per ended scan that
    /// has data to store.
    pub fn take_store_trigger(&mut self) -> bool {
        std::mem::take(&mut self.store_trigger)
    }

    // =========================================================================
    // Storage
    // =========================================================================

    /// Write the completed frame.
    ///
    /// On success with frames remaining the accumulator is zeroed and the next
    /// frame starts (ACTIVE); otherwise the session ends in STORE_COMPLETE. On
    /// failure the session moves to STORE_ERROR and the accumulator and frame
    /// table are left as they were.
    pub fn store_frame(&mut self, writer: &FrameWriter) -> HistResult<StoreOutcome> {
        self.require("store_frame", self.state.can_store())?;
        let reason = self.end_reason.unwrap_or(ScanEndReason::Stopped);

        let (Some(config), Some(layout), Some(accumulator), Some(frame)) = (
            self.config.as_ref(),
            self.layout.as_ref(),
            self.accumulator.as_ref(),
            self.frames.current(),
        ) else {
            return Err(ConfigError::MissingParameter("accumulator").into());
        };

        let data = FrameData {
            config,
            layout,
            accumulator,
            frame,
            frame_index: self.frames.current_index(),
            geometry: &self.geometry,
            singles: self.tags.summary(),
            study_time: self.started_at.unwrap_or_else(Local::now),
            end_reason: Some(reason),
        };

        match writer.write(&data) {
            Ok(outcome) => {
                self.sink.store_complete(reason, true);
                let continues = self.state == SessionState::Complete && !self.frames.is_last();
                if continues {
                    self.next_frame();
                } else {
                    self.transition(SessionState::StoreComplete, "Frame stored");
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Frame store failed");
                self.transition(SessionState::StoreError, &e.to_string());
                self.sink.store_complete(reason, false);
                Err(HistogramError::Store(e))
            }
        }
    }

    fn next_frame(&mut self) {
        if let Some(acc) = self.accumulator.as_mut() {
            acc.reset();
        }
        let start = self.tags.elapsed();
        self.frames.advance(start);
        if let Some(frame) = self.frames.current_mut() {
            frame.clear_counters();
        }
        self.tags.reset_frame();
        self.end_reason = None;
        self.transition(SessionState::Active, "Next frame started");
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Current statistics snapshot.
    pub fn statistics(&self) -> ScanStatistics {
        let elapsed_secs = self.tags.elapsed().as_secs_f64();
        let prompts = self.totals.prompts;
        let randoms = self.totals.randoms;
        ScanStatistics {
            state: self.state,
            frame: self.frames.current_index(),
            frames: self.frames.len(),
            elapsed_secs,
            prompts,
            randoms,
            net_trues: self.totals.total_net_trues(),
            prompt_rate: stats::rate(prompts.iter().sum(), elapsed_secs),
            random_rate: stats::rate(randoms.iter().sum(), elapsed_secs),
            average_singles: self.tags.average_singles(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::{prompt_word, random_word};
    use crate::geometry::ScannerModel;
    use crate::layout::FixedResources;
    use crate::notify::{ChannelSink, Notification, TracingSink};

    fn session() -> Session {
        Session::new(&ScannerModel::Hrrt, Arc::new(TracingSink))
            .with_resources(Arc::new(FixedResources {
                memory: 1 << 34,
                disk: Some(1 << 40),
            }))
            .with_limits(PlanLimits {
                io_reserve_bytes: 0,
                overhead_bytes: 0,
                require_verified_disk: false,
            })
    }

    fn configured(criterion: FrameCriterion) -> Session {
        let mut s = session();
        s.set_attributes(8, 8, 2, 0).unwrap();
        s.define_frames(1, criterion).unwrap();
        s.configure("/tmp/unit.s", None).unwrap();
        s
    }

    #[test]
    fn test_parameters_move_to_unconfigured() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::Initialized);
        s.set_sinogram_mode(
            SinogramMode::NetTrues,
            SinogramMode::NetTrues,
            AcquisitionMode::EmissionOnly,
        )
        .unwrap();
        assert_eq!(s.state(), SessionState::Unconfigured);
    }

    #[test]
    fn test_configure_requires_attributes() {
        let mut s = session();
        s.define_frames(1, FrameCriterion::External).unwrap();
        let err = s.configure("/tmp/x.s", None).unwrap_err();
        assert!(matches!(
            err,
            HistogramError::Config(ConfigError::MissingParameter(_))
        ));
        assert_eq!(s.state(), SessionState::Unconfigured);
    }

    #[test]
    fn test_configure_from_initialized_is_illegal() {
        let mut s = session();
        let err = s.configure("/tmp/x.s", None).unwrap_err();
        assert!(matches!(
            err,
            HistogramError::State(StateError::IllegalTransition {
                op: "configure",
                state: SessionState::Initialized
            })
        ));
    }

    #[test]
    fn test_define_frames_rejects_zero() {
        let mut s = session();
        assert!(s.define_frames(0, FrameCriterion::External).is_err());
        assert!(s.define_frames(1, FrameCriterion::NetTrues(0)).is_err());
        assert!(s
            .define_frames(1, FrameCriterion::Duration(Duration::ZERO))
            .is_err());
    }

    #[test]
    fn test_parameters_frozen_after_configure() {
        let mut s = configured(FrameCriterion::External);
        assert_eq!(s.state(), SessionState::Configured);
        assert!(s.set_attributes(1, 1, 1, 0).is_err());
        assert_eq!(s.state(), SessionState::Configured);
    }

    #[test]
    fn test_offline_source_recorded() {
        let mut s = session();
        s.set_attributes(8, 8, 2, 0).unwrap();
        s.configure("/tmp/unit.s", Some(PathBuf::from("/tmp/scan.l32")))
            .unwrap();
        assert_eq!(
            s.config().unwrap().source,
            AcquisitionSource::Offline(PathBuf::from("/tmp/scan.l32"))
        );
        // No frames defined: one open-ended frame
        assert_eq!(s.frames().len(), 1);
    }

    #[test]
    fn test_feed_before_start_is_illegal() {
        let mut s = configured(FrameCriterion::External);
        assert!(s.feed(&[prompt_word(0)], PresetSignal::None).is_err());
        assert_eq!(s.state(), SessionState::Configured);
    }

    #[test]
    fn test_feed_then_wait() {
        let mut s = configured(FrameCriterion::External);
        s.start().unwrap();
        let result = s
            .feed(&[prompt_word(0), prompt_word(1), random_word(0)], PresetSignal::None)
            .unwrap();
        assert_eq!(result, BinResult::Consumed(3));
        assert_eq!(s.state(), SessionState::Wait);
        assert_eq!(s.accumulator().unwrap().get(0), Some(0));
        assert_eq!(s.accumulator().unwrap().get(1), Some(1));
        assert!(!s.take_store_trigger());
    }

    #[test]
    fn test_stop_beats_abort_preset() {
        let mut s = configured(FrameCriterion::External);
        s.start().unwrap();
        s.stop().unwrap();
        let result = s.feed(&[prompt_word(0)], PresetSignal::Abort).unwrap();
        assert_eq!(result, BinResult::EndOfScan(ScanEndReason::Stopped));
        assert_eq!(s.state(), SessionState::Stopped);
        assert!(s.take_store_trigger());
        assert!(!s.take_store_trigger());
    }

    #[test]
    fn test_abort_beats_preset_complete() {
        let mut s = configured(FrameCriterion::External);
        s.start().unwrap();
        s.abort().unwrap();
        let result = s
            .feed(&[prompt_word(0)], PresetSignal::PresetComplete)
            .unwrap();
        assert_eq!(result, BinResult::EndOfScan(ScanEndReason::Aborted));
        assert_eq!(s.state(), SessionState::Aborted);
        assert!(!s.take_store_trigger());
    }

    #[test]
    fn test_preset_complete_beats_net_trues_threshold() {
        let mut s = configured(FrameCriterion::NetTrues(2));
        s.start().unwrap();
        let words = [prompt_word(0), prompt_word(1), prompt_word(2)];
        let result = s.feed(&words, PresetSignal::PresetComplete).unwrap();
        assert_eq!(result, BinResult::EndOfScan(ScanEndReason::PresetComplete));
        assert_eq!(s.state(), SessionState::Complete);
        assert_eq!(s.end_reason(), Some(ScanEndReason::PresetComplete));
        assert!(s.take_store_trigger());
    }

    #[test]
    fn test_stop_outside_acquisition_is_illegal() {
        let mut s = configured(FrameCriterion::External);
        assert_eq!(
            s.stop(),
            Err(StateError::IllegalTransition {
                op: "stop",
                state: SessionState::Configured,
            })
        );
        assert!(s.abort().is_err());
        assert_eq!(s.control().pending(), PendingCommand::None);

        s.start().unwrap();
        let result = s.feed(&[prompt_word(0)], PresetSignal::None).unwrap();
        assert_eq!(result, BinResult::Consumed(1));
        s.stop().unwrap();
        let result = s.feed(&[prompt_word(0)], PresetSignal::None).unwrap();
        assert_eq!(result, BinResult::EndOfScan(ScanEndReason::Stopped));
    }

    #[test]
    fn test_net_trues_threshold_beyond_i64_rejected() {
        let mut s = session();
        let err = s
            .define_frames(1, FrameCriterion::NetTrues(u64::MAX))
            .unwrap_err();
        assert!(matches!(
            err,
            HistogramError::Config(ConfigError::InvalidDimension {
                name: "net trues threshold",
                ..
            })
        ));

        s.define_frames(1, FrameCriterion::NetTrues(i64::MAX as u64))
            .unwrap();
        s.set_attributes(8, 8, 2, 0).unwrap();
        s.configure("/tmp/unit.s", None).unwrap();
        s.start().unwrap();
        let result = s.feed(&[prompt_word(0)], PresetSignal::None).unwrap();
        assert_eq!(result, BinResult::Consumed(1));

        // A table built without validation never reaches an unrepresentable threshold
        s.frames = FrameTable::uniform(1, FrameCriterion::NetTrues(u64::MAX));
        let result = s.feed(&[prompt_word(0)], PresetSignal::None).unwrap();
        assert_eq!(result, BinResult::Consumed(1));
        assert_eq!(s.state(), SessionState::Wait);
    }

    #[test]
    fn test_store_with_frames_remaining_starts_next_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = session();
        s.set_attributes(8, 8, 2, 0).unwrap();
        s.configure(dir.path().join("multi.s"), None).unwrap();
        s.start().unwrap();
        // configure accepts a single frame; install a two-frame table directly
        s.frames = FrameTable::uniform(2, FrameCriterion::Duration(Duration::from_millis(3)));

        let tick = crate::tags::time_tag() as i32;
        let words = [
            prompt_word(1),
            random_word(2),
            tick,
            tick,
            prompt_word(1),
            tick,
        ];
        let result = s.feed(&words, PresetSignal::None).unwrap();
        assert_eq!(result, BinResult::EndOfScan(ScanEndReason::FrameDuration));
        assert_eq!(s.state(), SessionState::Complete);
        let switch_time = s.frames().current().unwrap().switch_time;
        assert_eq!(switch_time, Some(Duration::from_millis(3)));
        assert_eq!(s.frames().current().unwrap().prompts[0], 2);

        s.store_frame(&FrameWriter::new()).unwrap();

        assert_eq!(s.state(), SessionState::Active);
        assert!(s.accumulator().unwrap().as_slice().iter().all(|&c| c == 0));
        assert_eq!(s.frames().current_index(), 1);
        let frame = s.frames().current().unwrap();
        assert_eq!(Some(frame.start), switch_time);
        assert_eq!(frame.switch_time, None);
        assert_eq!(frame.prompts, [0, 0]);
        assert_eq!(frame.randoms, [0, 0]);
        assert_eq!(s.tags().ticks(), 0);
        assert_eq!(s.tags().elapsed(), Duration::from_millis(3));
        assert_eq!(s.end_reason(), None);
        assert!(dir.path().join("multi.s").exists());

        // The second frame acquires into a clean accumulator
        let result = s.feed(&[prompt_word(4)], PresetSignal::None).unwrap();
        assert_eq!(result, BinResult::Consumed(1));
        assert_eq!(s.accumulator().unwrap().get(4), Some(1));
        assert_eq!(s.accumulator().unwrap().get(1), Some(0));
    }

    #[test]
    fn test_abort_has_no_store_trigger() {
        let mut s = configured(FrameCriterion::External);
        s.start().unwrap();
        s.control().abort();
        let result = s.feed(&[], PresetSignal::None).unwrap();
        assert_eq!(result, BinResult::EndOfScan(ScanEndReason::Aborted));
        assert_eq!(s.state(), SessionState::Aborted);
        assert!(!s.take_store_trigger());
        assert!(s.store_frame(&FrameWriter::new()).is_err());
    }

    #[test]
    fn test_preset_complete() {
        let mut s = configured(FrameCriterion::External);
        s.start().unwrap();
        let result = s
            .feed(&[prompt_word(2)], PresetSignal::PresetComplete)
            .unwrap();
        assert_eq!(result, BinResult::EndOfScan(ScanEndReason::PresetComplete));
        assert_eq!(s.state(), SessionState::Complete);
        assert!(s.take_store_trigger());
    }

    #[test]
    fn test_finish_input_completes() {
        let mut s = configured(FrameCriterion::External);
        s.start().unwrap();
        s.feed(&[prompt_word(2)], PresetSignal::None).unwrap();
        assert_eq!(s.finish_input(), Ok(ScanEndReason::InputExhausted));
        assert_eq!(s.state(), SessionState::Complete);
        assert_eq!(s.end_reason(), Some(ScanEndReason::InputExhausted));
        assert!(s.take_store_trigger());
    }

    #[test]
    fn test_feed_clamps_to_max_words() {
        let mut s = configured(FrameCriterion::External);
        s.start().unwrap();
        let words = vec![prompt_word(3); MAX_WORDS_PER_FEED + 10];
        let result = s.feed(&words, PresetSignal::None).unwrap();
        assert_eq!(result, BinResult::Consumed(MAX_WORDS_PER_FEED));
        let rest = s.feed(&words[MAX_WORDS_PER_FEED..], PresetSignal::None).unwrap();
        assert_eq!(rest, BinResult::Consumed(10));
        assert_eq!(s.totals().prompts[0], (MAX_WORDS_PER_FEED + 10) as u64);
    }

    #[test]
    fn test_unconfigure_resets_everything() {
        let mut s = configured(FrameCriterion::External);
        s.start().unwrap();
        s.feed(&[prompt_word(0)], PresetSignal::None).unwrap();
        s.stop().unwrap();
        s.unconfigure();

        assert_eq!(s.state(), SessionState::Unconfigured);
        assert!(s.accumulator().is_none());
        assert!(s.layout().is_none());
        assert!(s.frames().is_empty());
        assert_eq!(s.control().pending(), PendingCommand::None);
        assert_eq!(s.totals(), &EventCounts::default());

        // Attributes survive; configuring again works
        s.configure("/tmp/unit.s", None).unwrap();
        assert_eq!(s.state(), SessionState::Configured);
    }

    #[test]
    fn test_notifications_emitted() {
        let (sink, mut rx) = ChannelSink::new();
        let mut s = Session::new(&ScannerModel::Petlink, Arc::new(sink)).with_resources(Arc::new(
            FixedResources {
                memory: 1 << 34,
                disk: Some(1 << 40),
            },
        ));
        s.set_attributes(8, 8, 2, 0).unwrap();
        s.configure("/tmp/unit.s", None).unwrap();
        s.start().unwrap();
        s.stop().unwrap();
        s.feed(&[], PresetSignal::None).unwrap();

        let mut seen = Vec::new();
        while let Ok(n) = rx.try_recv() {
            seen.push(n);
        }
        assert!(seen.contains(&Notification::ScanComplete(ScanEndReason::Stopped)));
        assert!(seen.iter().any(|n| matches!(
            n,
            Notification::Status {
                state: SessionState::Stopped,
                ..
            }
        )));
    }

    #[test]
    fn test_statistics_snapshot() {
        let mut s = configured(FrameCriterion::External);
        s.start().unwrap();
        let mut words = vec![prompt_word(0); 10];
        words.push(random_word(0));
        for _ in 0..500 {
            words.push(crate::tags::time_tag() as i32);
        }
        s.feed(&words, PresetSignal::None).unwrap();

        let stats = s.statistics();
        assert_eq!(stats.state, SessionState::Wait);
        assert_eq!(stats.prompts[0], 10);
        assert_eq!(stats.randoms[0], 1);
        assert_eq!(stats.net_trues, 9);
        assert_eq!(stats.elapsed_secs, 0.5);
        assert_eq!(stats.prompt_rate, 20.0);
    }
}
