//! Background pyramid rebuild pipeline.
//!
//! A producer thread stages freshly rendered content and commits it; a
//! low-priority worker coalesces bursts of commits behind a debounce window,
//! builds a brand-new [`MipMap`] from the latest staged content and publishes
//! it with a single atomic pointer swap. Real-time consumers load the
//! published handle lock-free and compare identity per processing buffer to
//! detect a hot-swap; a retiring pyramid stays alive for as long as any
//! lane's fade-out still holds its `Arc`.
//!
//! Multiple commits before the worker wakes collapse into one rebuild of the
//! newest content only; there is no backlog queue. Shutdown is cooperative:
//! the stop request is observed once per poll, and an in-flight build always
//! completes and publishes before the worker exits.

use crate::error::{Error, Result};
use crate::mipmap::{MipMap, MipMapBuilder, MipMapSpec};
use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Shape and timing of the rebuild pipeline.
#[derive(Debug, Clone)]
pub struct RebuildConfig {
    /// Pyramid shape handed to every build.
    pub spec: MipMapSpec,
    /// Odd-length, centered, symmetric half-band FIR for level decimation.
    pub fir: Vec<f64>,
    /// Quiet window after the last commit before a build starts.
    pub debounce: Duration,
    /// Worker wake cadence while waiting.
    pub poll: Duration,
}

impl RebuildConfig {
    pub fn new(spec: MipMapSpec, fir: Vec<f64>) -> Self {
        Self {
            spec,
            fir,
            debounce: Duration::from_millis(60),
            poll: Duration::from_millis(5),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.spec.len == 0 {
            return Err(Error::InvalidConfig("table length must be non-zero".into()));
        }
        if self.spec.levels == 0 {
            return Err(Error::InvalidConfig("level count must be non-zero".into()));
        }
        if self.fir.len() % 2 == 0 || self.fir.is_empty() {
            return Err(Error::InvalidConfig(
                "half-band FIR must have odd length".into(),
            ));
        }
        Ok(())
    }
}

enum Command {
    /// Build staged content without waiting out the debounce window.
    BuildNow,
    Shutdown,
}

/// Staged content plus its commit bookkeeping, guarded by one mutex so the
/// worker's snapshot and the producer's commit are atomic with respect to
/// each other. Never touched by the audio path.
struct Staging {
    data: Vec<f32>,
    committed_at: Option<Instant>,
    dirty: bool,
}

struct Shared {
    staging: Mutex<Staging>,
    published: ArcSwapOption<MipMap>,
    build_count: AtomicU64,
    building: AtomicBool,
    shutdown: AtomicBool,
}

/// Owned rebuild coordinator with an explicit start/stop lifecycle.
///
/// Dropping the pipeline stops the worker, waiting for an in-flight build
/// to finish first.
pub struct MipRebuilder {
    shared: Arc<Shared>,
    tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl MipRebuilder {
    /// Validate the configuration and spawn the worker thread.
    pub fn start(config: RebuildConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            staging: Mutex::new(Staging {
                data: vec![0.0; config.spec.len],
                committed_at: None,
                dirty: false,
            }),
            published: ArcSwapOption::empty(),
            build_count: AtomicU64::new(0),
            building: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });

        let (tx, rx) = bounded(16);
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("mip-rebuild".to_string())
            .spawn(move || worker_loop(worker_shared, rx, config))
            .map_err(|e| Error::InvalidConfig(format!("failed to spawn worker: {e}")))?;

        tracing::info!("rebuild pipeline started");
        Ok(Self {
            shared,
            tx,
            worker: Some(worker),
        })
    }

    /// Copy a full table of freshly rendered content into the staging
    /// buffer without committing it.
    pub fn stage(&self, data: &[f32]) -> Result<()> {
        let mut staging = self.shared.staging.lock();
        if data.len() != staging.data.len() {
            return Err(Error::StagingLength {
                expected: staging.data.len(),
                got: data.len(),
            });
        }
        staging.data.copy_from_slice(data);
        Ok(())
    }

    /// Mark staged content ready and restart the debounce window. Commits
    /// arriving faster than the window coalesce into a single rebuild.
    pub fn commit(&self) {
        let mut staging = self.shared.staging.lock();
        staging.committed_at = Some(Instant::now());
        staging.dirty = true;
    }

    /// Stage and commit in one call.
    pub fn submit(&self, data: &[f32]) -> Result<()> {
        self.stage(data)?;
        self.commit();
        Ok(())
    }

    /// Ask the worker to build any committed content immediately, skipping
    /// the debounce window.
    pub fn build_now(&self) -> Result<()> {
        self.tx
            .send(Command::BuildNow)
            .map_err(|_| Error::WorkerStopped)
    }

    /// Most recent fully built pyramid, or `None` before the first build.
    /// Lock-free; callable from any thread, including the audio thread.
    pub fn published(&self) -> Option<Arc<MipMap>> {
        self.shared.published.load_full()
    }

    /// Number of builds published so far; a cheap version stamp.
    pub fn build_count(&self) -> u64 {
        self.shared.build_count.load(Ordering::Acquire)
    }

    /// Whether the worker is building a pyramid right now. Diagnostic only;
    /// by the time the caller acts on it the build may have published.
    pub fn is_building(&self) -> bool {
        self.shared.building.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it to exit. An in-flight build
    /// completes and publishes before the thread winds down.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.shared.shutdown.store(true, Ordering::Release);
            let _ = self.tx.send(Command::Shutdown);
            if worker.join().is_err() {
                tracing::error!("rebuild worker panicked");
            }
            tracing::info!("rebuild pipeline stopped");
        }
    }
}

impl Drop for MipRebuilder {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<Shared>, rx: Receiver<Command>, config: RebuildConfig) {
    if let Err(e) = thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Min)
    {
        tracing::debug!("could not lower rebuild thread priority: {e:?}");
    }

    loop {
        match rx.recv_timeout(config.poll) {
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Command::BuildNow) => {
                if let Some(snap) = take_snapshot(&shared, None) {
                    build_and_publish(&shared, &config, snap);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                if let Some(snap) = take_snapshot(&shared, Some(config.debounce)) {
                    build_and_publish(&shared, &config, snap);
                }
            }
        }
    }

    // Drain one last time so content committed just before shutdown is not
    // silently dropped.
    if let Some(snap) = take_snapshot(&shared, None) {
        build_and_publish(&shared, &config, snap);
    }
}

/// Snapshot staged content if it is dirty and, when a debounce window is
/// given, quiet for at least that long. Clears the dirty flag under the same
/// lock, so a commit racing the snapshot re-arms another build.
fn take_snapshot(shared: &Shared, debounce: Option<Duration>) -> Option<Vec<f32>> {
    let mut staging = shared.staging.lock();
    if !staging.dirty {
        return None;
    }
    if let (Some(window), Some(at)) = (debounce, staging.committed_at) {
        if at.elapsed() < window {
            return None;
        }
    }
    staging.dirty = false;
    Some(staging.data.clone())
}

fn build_and_publish(shared: &Shared, config: &RebuildConfig, snapshot: Vec<f32>) {
    shared.building.store(true, Ordering::Release);
    let started = Instant::now();
    let mut builder = MipMapBuilder::new(config.spec, &config.fir);
    builder.fill(&snapshot);
    let mip = Arc::new(builder.build());

    shared.published.store(Some(mip));
    // Flag drops before the count bumps, so a published count implies the
    // flag for that build is already down.
    shared.building.store(false, Ordering::Release);
    shared.build_count.fetch_add(1, Ordering::Release);
    tracing::debug!(
        levels = config.spec.levels,
        elapsed_us = started.elapsed().as_micros() as u64,
        "pyramid rebuilt and published"
    );
}
