//! Task pipeline around a [`Session`].
//!
//! # Tasks
//!
//! ```text
//!  BufferSource ──> replay task ──feed──> Session ──watch──> statistics reporter
//!                        │
//!                        └── StoreRequest (mpsc) ──> store task ──> FrameWriter
//! ```
//!
//! - **Replay** runs on the blocking pool. It waits for the start signal,
//!   turns buffers into words, feeds the session and publishes a statistics
//!   snapshot after every feed. When the scan ends with data to store it sends
//!   one [`StoreRequest`] and exits.
//! - **Store** waits for requests and calls [`Session::store_frame`] while
//!   holding the session mutex, so the accumulator cannot be modified while it
//!   is written.
//! - **Statistics reporter** logs the latest snapshot at a fixed interval.
//!
//! Stop and abort go through [`SessionControl`] and never take the mutex.

use crate::binning::BinResult;
use crate::error::{HistResult, HistogramError};
use crate::session::state::{ScanEndReason, SessionControl, SessionState};
use crate::session::Session;
use crate::source::{BufferSource, WordAssembler};
use crate::stats::ScanStatistics;
use crate::writer::{FrameWriter, StoreOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Request for the store task to write the completed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreRequest {
    /// Why the scan ended
    pub reason: ScanEndReason,
}

/// Result of one store request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReport {
    /// Why the scan ended
    pub reason: ScanEndReason,
    /// Files written, or the store error message
    pub result: Result<StoreOutcome, String>,
    /// Session state after the store
    pub state: SessionState,
}

impl StoreReport {
    /// Whether the frame was written.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// What the replay task did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Buffers read from the source
    pub buffers: u64,
    /// Words fed to the session
    pub words: u64,
    /// Why the scan ended, if it did
    pub end: Option<ScanEndReason>,
    /// Bytes of a trailing partial word that were dropped
    pub dropped_bytes: usize,
}

/// Outcome of [`Histogrammer::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Replay task report
    pub replay: ReplayReport,
    /// Store task reports
    pub stores: Vec<StoreReport>,
    /// Final statistics snapshot
    pub statistics: ScanStatistics,
}

/// Shared session plus the tasks that drive it.
#[derive(Clone)]
pub struct Histogrammer {
    session: Arc<Mutex<Session>>,
    control: SessionControl,
    writer: FrameWriter,
    stats: Arc<watch::Sender<ScanStatistics>>,
}

impl std::fmt::Debug for Histogrammer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogrammer")
            .field("state", &self.session.lock().state())
            .finish_non_exhaustive()
    }
}

impl Histogrammer {
    /// Wrap a session. Frames are stored with `writer`.
    pub fn new(session: Session, writer: FrameWriter) -> Self {
        let control = session.control();
        let (stats, _) = watch::channel(session.statistics());
        Self {
            session: Arc::new(Mutex::new(session)),
            control,
            writer,
            stats: Arc::new(stats),
        }
    }

    /// Shared session handle.
    pub fn session(&self) -> Arc<Mutex<Session>> {
        Arc::clone(&self.session)
    }

    /// Lock-free stop/abort handle.
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// Request a stop; takes effect on the next fed buffer.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Request an abort; takes effect on the next fed buffer.
    pub fn abort(&self) {
        self.control.abort();
    }

    /// Subscribe to statistics snapshots.
    pub fn statistics(&self) -> watch::Receiver<ScanStatistics> {
        self.stats.subscribe()
    }

    /// Spawn the replay task on the blocking pool.
    ///
    /// Nothing is read from `source` until `start` fires. A dropped start
    /// sender cancels the replay.
    pub fn spawn_replay<S>(
        &self,
        source: S,
        start: oneshot::Receiver<()>,
        store: mpsc::Sender<StoreRequest>,
    ) -> JoinHandle<HistResult<ReplayReport>>
    where
        S: BufferSource + 'static,
    {
        let session = self.session();
        let stats = Arc::clone(&self.stats);
        tokio::task::spawn_blocking(move || {
            if start.blocking_recv().is_err() {
                debug!("Replay cancelled before start");
                return Ok(ReplayReport::default());
            }
            replay(source, &session, &stats, &store)
        })
    }

    /// Spawn the store task.
    ///
    /// The task exits after a store that leaves the session outside ACTIVE,
    /// or when every request sender is dropped.
    pub fn spawn_store_task(
        &self,
        mut requests: mpsc::Receiver<StoreRequest>,
    ) -> JoinHandle<Vec<StoreReport>> {
        let session = self.session();
        let writer = self.writer.clone();
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let mut reports = Vec::new();
            while let Some(request) = requests.recv().await {
                let session = Arc::clone(&session);
                let writer = writer.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let mut guard = session.lock();
                    let result = guard.store_frame(&writer).map_err(|e| e.to_string());
                    (result, guard.state(), guard.statistics())
                })
                .await;

                let report = match joined {
                    Ok((result, state, snapshot)) => {
                        stats.send_replace(snapshot);
                        StoreReport {
                            reason: request.reason,
                            result,
                            state,
                        }
                    }
                    Err(e) => StoreReport {
                        reason: request.reason,
                        result: Err(format!("store task panicked: {}", e)),
                        state: SessionState::StoreError,
                    },
                };

                match &report.result {
                    Ok(outcome) => info!(
                        reason = %report.reason,
                        files = outcome.files.len(),
                        "Store request completed"
                    ),
                    Err(e) => warn!(reason = %report.reason, error = %e, "Store request failed"),
                }
                let more = report.state == SessionState::Active;
                reports.push(report);
                if !more {
                    break;
                }
            }
            reports
        })
    }

    /// Spawn the periodic statistics logger, `None` when `interval` is `None`.
    pub fn spawn_statistics_reporter(&self, interval: Option<Duration>) -> Option<JoinHandle<()>> {
        let interval = interval?;
        let mut rx = self.statistics();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let snapshot = rx.borrow_and_update().clone();
                info!(
                    state = %snapshot.state,
                    elapsed_secs = snapshot.elapsed_secs,
                    prompts = snapshot.total_prompts(),
                    randoms = snapshot.total_randoms(),
                    net_trues = snapshot.net_trues,
                    prompt_rate = snapshot.prompt_rate,
                    random_rate = snapshot.random_rate,
                    average_singles = snapshot.average_singles,
                    "Scan statistics"
                );
                if snapshot.state.is_terminal() {
                    break;
                }
            }
        }))
    }

    /// Start the session if needed and run replay and store to completion.
    pub async fn run<S>(&self, source: S, report_interval: Option<Duration>) -> HistResult<RunSummary>
    where
        S: BufferSource + 'static,
    {
        {
            let mut session = self.session.lock();
            if session.state() == SessionState::Configured {
                session.start()?;
            }
        }

        let (store_tx, store_rx) = mpsc::channel(4);
        let (start_tx, start_rx) = oneshot::channel();
        let store = self.spawn_store_task(store_rx);
        let replay = self.spawn_replay(source, start_rx, store_tx);
        let reporter = self.spawn_statistics_reporter(report_interval);

        start_tx
            .send(())
            .map_err(|_| HistogramError::Task("replay task exited before start".into()))?;

        let replay = replay
            .await
            .map_err(|e| HistogramError::Task(e.to_string()))??;
        let stores = store
            .await
            .map_err(|e| HistogramError::Task(e.to_string()))?;
        if let Some(reporter) = reporter {
            reporter.abort();
        }

        let statistics = self.session.lock().statistics();
        Ok(RunSummary {
            replay,
            stores,
            statistics,
        })
    }
}

fn replay<S: BufferSource>(
    mut source: S,
    session: &Mutex<Session>,
    stats: &watch::Sender<ScanStatistics>,
    store: &mpsc::Sender<StoreRequest>,
) -> HistResult<ReplayReport> {
    let mut report = ReplayReport::default();
    let mut assembler = WordAssembler::default();
    let mut words = Vec::new();

    'buffers: loop {
        let Some(buffer) = source.next_buffer()? else {
            report.dropped_bytes = assembler.pending_bytes();
            let (ended, trigger) = {
                let mut guard = session.lock();
                let ended = if guard.state().can_feed() {
                    Some(guard.finish_input()?)
                } else {
                    None
                };
                stats.send_replace(guard.statistics());
                (ended, guard.take_store_trigger())
            };
            if let Some(reason) = ended {
                report.end = Some(reason);
                if trigger {
                    request_store(store, reason)?;
                }
            }
            break;
        };
        report.buffers += 1;

        words.clear();
        assembler.push(&buffer.bytes, &mut words);

        let mut offset = 0;
        loop {
            let (result, trigger) = {
                let mut guard = session.lock();
                let result = guard.feed(&words[offset..], buffer.preset)?;
                stats.send_replace(guard.statistics());
                (result, guard.take_store_trigger())
            };

            match result {
                BinResult::Consumed(n) => {
                    offset += n;
                    report.words += n as u64;
                    if offset >= words.len() {
                        break;
                    }
                }
                BinResult::EndOfScan(reason) => {
                    report.end = Some(reason);
                    if trigger {
                        request_store(store, reason)?;
                    }
                    break 'buffers;
                }
            }
        }
    }

    info!(
        buffers = report.buffers,
        words = report.words,
        end = ?report.end,
        "Replay finished"
    );
    Ok(report)
}

fn request_store(store: &mpsc::Sender<StoreRequest>, reason: ScanEndReason) -> HistResult<()> {
    store
        .blocking_send(StoreRequest { reason })
        .map_err(|_| HistogramError::Task("store task is not running".into()))
}
