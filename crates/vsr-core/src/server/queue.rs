use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

use crate::backup::ServerCommander;
use crate::error::{Result, VsrError};

pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(100);
pub const QUEUE_CAPACITY: usize = 100;

/// Told about commands that were dropped (`None`: queue full) or that the
/// underlying commander rejected.
pub type QueueErrorCallback = Arc<dyn Fn(&str, Option<&VsrError>) + Send + Sync>;

struct Running {
    tx: Sender<String>,
    handle: JoinHandle<()>,
}

/// FIFO relay that spaces console commands at least `min_delay` apart.
///
/// Submitting never blocks. Implements [`ServerCommander`] so it can stand
/// in for the server; delivery errors go to the error callback instead of
/// the caller.
pub struct CommandQueue {
    target: Arc<dyn ServerCommander>,
    min_delay: Duration,
    on_error: Option<QueueErrorCallback>,
    running: Mutex<Option<Running>>,
}

impl CommandQueue {
    pub fn new(target: Arc<dyn ServerCommander>) -> Self {
        Self {
            target,
            min_delay: DEFAULT_MIN_DELAY,
            on_error: None,
            running: Mutex::new(None),
        }
    }

    /// A zero delay falls back to [`DEFAULT_MIN_DELAY`].
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = if min_delay.is_zero() {
            DEFAULT_MIN_DELAY
        } else {
            min_delay
        };
        self
    }

    pub fn on_error(mut self, callback: QueueErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Start the relay thread. Starting an already started queue is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if running.is_some() {
            return Ok(());
        }
        let (tx, rx) = bounded::<String>(QUEUE_CAPACITY);
        let target = self.target.clone();
        let on_error = self.on_error.clone();
        let min_delay = self.min_delay;
        let handle = std::thread::Builder::new()
            .name("command-queue".into())
            .spawn(move || relay(rx, target.as_ref(), min_delay, on_error.as_ref()))?;
        *running = Some(Running { tx, handle });
        Ok(())
    }

    /// Enqueue `command`. Dropped silently before [`CommandQueue::start`]
    /// and reported through the error callback when the queue is full.
    pub fn submit(&self, command: &str) {
        let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        let Some(running) = running.as_ref() else {
            debug!(command, "command queue not started, dropping command");
            return;
        };
        match running.tx.try_send(command.to_string()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                warn!(command, "command queue full, dropping command");
                if let Some(cb) = &self.on_error {
                    cb(command, None);
                }
            }
        }
    }

    /// Deliver everything still queued, then stop the relay thread.
    pub fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(Running { tx, handle }) = running else {
            return;
        };
        drop(tx);
        if handle.join().is_err() {
            tracing::error!("command queue thread panicked");
        }
    }
}

impl ServerCommander for CommandQueue {
    fn send_command(&self, command: &str) -> Result<()> {
        self.submit(command);
        Ok(())
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

fn relay(
    rx: Receiver<String>,
    target: &dyn ServerCommander,
    min_delay: Duration,
    on_error: Option<&QueueErrorCallback>,
) {
    let mut last_sent: Option<Instant> = None;
    for command in rx {
        if let Some(last) = last_sent {
            let elapsed = last.elapsed();
            if elapsed < min_delay {
                std::thread::sleep(min_delay - elapsed);
            }
        }
        let result = target.send_command(&command);
        last_sent = Some(Instant::now());
        if let Err(e) = result {
            debug!(command = %command, error = %e, "command delivery failed");
            if let Some(cb) = on_error {
                cb(&command, Some(&e));
            }
        }
    }
}
