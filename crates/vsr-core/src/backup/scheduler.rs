use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, select, Sender};
use rand::Rng;
use tracing::{debug, info};

use super::cycle::{BackupCycle, CycleReport};
use crate::error::{Result, VsrError};

pub type StartCallback = Arc<dyn Fn() + Send + Sync>;
pub type CompleteCallback = Arc<dyn Fn(&Result<CycleReport>, Duration) + Send + Sync>;
/// Told how long until the next periodic cycle.
pub type ScheduledCallback = Arc<dyn Fn(Duration) + Send + Sync>;

pub fn random_jitter(jitter_seconds: u64) -> Duration {
    if jitter_seconds == 0 {
        return Duration::ZERO;
    }
    let secs = rand::thread_rng().gen_range(0..=jitter_seconds);
    Duration::from_secs(secs)
}

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Runs a [`BackupCycle`] every `interval` on a background thread.
///
/// The timer is re-armed only after the previous cycle returns, so periodic
/// cycles never overlap. [`BackupManager::run_backup_now`] bypasses the
/// timer and may run alongside a periodic cycle.
pub struct BackupManager {
    cycle: Arc<BackupCycle>,
    interval: Duration,
    jitter_seconds: u64,
    on_start: Option<StartCallback>,
    on_complete: Option<CompleteCallback>,
    on_scheduled: Option<ScheduledCallback>,
    shutdown: Arc<AtomicBool>,
    running: Mutex<Option<Running>>,
}

impl BackupManager {
    pub fn new(cycle: BackupCycle, interval: Duration) -> Self {
        Self {
            cycle: Arc::new(cycle),
            interval,
            jitter_seconds: 0,
            on_start: None,
            on_complete: None,
            on_scheduled: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        }
    }

    pub fn with_jitter_seconds(mut self, jitter_seconds: u64) -> Self {
        self.jitter_seconds = jitter_seconds;
        self
    }

    pub fn on_backup_start(mut self, callback: StartCallback) -> Self {
        self.on_start = Some(callback);
        self
    }

    pub fn on_backup_complete(mut self, callback: CompleteCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn on_scheduled(mut self, callback: ScheduledCallback) -> Self {
        self.on_scheduled = Some(callback);
        self
    }

    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return Err(VsrError::Other("backup manager already started".into()));
        }
        if self.interval.is_zero() {
            return Err(VsrError::Config("backup interval must be positive".into()));
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let cycle = self.cycle.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.interval;
        let jitter_seconds = self.jitter_seconds;
        let on_start = self.on_start.clone();
        let on_complete = self.on_complete.clone();
        let on_scheduled = self.on_scheduled.clone();

        let handle = std::thread::Builder::new()
            .name("backup-scheduler".into())
            .spawn(move || loop {
                let delay = interval + random_jitter(jitter_seconds);
                if let Some(cb) = &on_scheduled {
                    cb(delay);
                }
                let stopped = select! {
                    recv(stop_rx) -> _ => true,
                    recv(after(delay)) -> _ => false,
                };
                if stopped || shutdown.load(Ordering::SeqCst) {
                    break;
                }
                run_reported(&cycle, &shutdown, on_start.as_ref(), on_complete.as_ref());
            })?;

        info!(
            interval = ?self.interval,
            jitter_seconds = self.jitter_seconds,
            "backup manager started"
        );
        *running = Some(Running { stop_tx, handle });
        Ok(())
    }

    /// Stop the loop, interrupting a cycle in progress, and wait for the
    /// thread to exit. A no-op when not started.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(running) = running else {
            return;
        };
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = running.stop_tx.try_send(());
        if running.handle.join().is_err() {
            tracing::error!("backup scheduler thread panicked");
        }
        debug!("backup manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Run one cycle immediately on the calling thread. Callbacks are not
    /// invoked; the caller gets the outcome directly.
    pub fn run_backup_now(&self, skip_player_check: bool) -> Result<CycleReport> {
        self.cycle.run(skip_player_check, &self.shutdown)
    }
}

impl Drop for BackupManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_reported(
    cycle: &BackupCycle,
    shutdown: &AtomicBool,
    on_start: Option<&StartCallback>,
    on_complete: Option<&CompleteCallback>,
) {
    let started = Instant::now();
    if let Some(cb) = on_start {
        cb();
    }
    let outcome = cycle.run(false, shutdown);
    if let Some(cb) = on_complete {
        cb(&outcome, started.elapsed());
    }
}
