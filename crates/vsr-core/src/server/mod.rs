//! Supervision of the game server process.

mod queue;

use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

pub use queue::{CommandQueue, QueueErrorCallback, DEFAULT_MIN_DELAY, QUEUE_CAPACITY};

use crate::backup::{BootChecker, CompletionWaiter, ServerCommander, BACKUP_COMPLETE_PATTERN};
use crate::error::{Result, VsrError};

/// Console line fragment that marks the end of server startup.
pub const BOOT_PATTERN: &str = "Dedicated Server now running";

pub const STOP_COMMAND: &str = "/stop";

/// Longer lines are delivered in pieces of this size.
const MAX_LINE_BYTES: u64 = 1024 * 1024;
const WAIT_SLICE: Duration = Duration::from_millis(100);
/// How long the exit watcher lets the output readers catch up after the
/// process is gone. A grandchild holding the pipes open must not stall it.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

pub type OutputCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type BootCallback = Arc<dyn Fn() + Send + Sync>;
/// Subscriber for output lines; returning `false` unsubscribes it.
type LineHandler = Box<dyn FnMut(&str) -> bool + Send>;

struct Shared {
    booted: AtomicBool,
    boot_once: Once,
    exited: AtomicBool,
    exit_status: Mutex<Option<ExitStatus>>,
    handlers: Mutex<Vec<LineHandler>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            booted: AtomicBool::new(false),
            boot_once: Once::new(),
            exited: AtomicBool::new(false),
            exit_status: Mutex::new(None),
            handlers: Mutex::new(Vec::new()),
        }
    }
}

#[derive(Default)]
struct State {
    started: bool,
    stdin: Option<ChildStdin>,
    pid: Option<u32>,
    done: Option<Receiver<()>>,
}

/// The game server child process, its console pipes and lifecycle flags.
///
/// Configure with the builder methods, then [`Server::start`] it once.
pub struct Server {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    on_output: Option<OutputCallback>,
    on_boot: Option<BootCallback>,
    shared: Arc<Shared>,
    state: Mutex<State>,
}

impl Server {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            on_output: None,
            on_boot: None,
            shared: Arc::new(Shared::new()),
            state: Mutex::new(State::default()),
        }
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Called for every output line, from the reader threads.
    pub fn on_output(mut self, callback: OutputCallback) -> Self {
        self.on_output = Some(callback);
        self
    }

    /// Called once, from a reader thread, when the boot line appears.
    pub fn on_boot(mut self, callback: BootCallback) -> Self {
        self.on_boot = Some(callback);
        self
    }

    /// Spawn the process and its reader and exit-watcher threads.
    /// Returns as soon as the process is running.
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.started {
            return Err(VsrError::Other("server already started".into()));
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|e| {
            VsrError::Other(format!(
                "failed to start {}: {e}",
                self.program.display()
            ))
        })?;

        let (drained_tx, drained_rx) = bounded::<()>(0);
        if let Some(out) = child.stdout.take() {
            self.spawn_reader("server-stdout", out, drained_tx.clone())?;
        }
        if let Some(err) = child.stderr.take() {
            self.spawn_reader("server-stderr", err, drained_tx.clone())?;
        }
        drop(drained_tx);

        let (done_tx, done_rx) = bounded::<()>(0);
        let pid = child.id();
        state.stdin = child.stdin.take();
        state.pid = Some(pid);
        state.done = Some(done_rx);
        state.started = true;

        let shared = self.shared.clone();
        std::thread::Builder::new()
            .name("server-exit".into())
            .spawn(move || watch_exit(child, shared, drained_rx, done_tx))?;

        info!(pid, program = %self.program.display(), "server started");
        Ok(())
    }

    fn spawn_reader<R: Read + Send + 'static>(
        &self,
        name: &str,
        pipe: R,
        drained: Sender<()>,
    ) -> Result<()> {
        let shared = self.shared.clone();
        let on_output = self.on_output.clone();
        let on_boot = self.on_boot.clone();
        std::thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                read_lines(pipe, |line| {
                    dispatch_line(&shared, line, on_output.as_ref(), on_boot.as_ref())
                });
                drop(drained);
            })?;
        Ok(())
    }

    /// Write `command` plus a newline to the server console.
    pub fn send_command(&self, command: &str) -> Result<()> {
        let mut state = self.lock_state();
        if !state.started || self.shared.exited.load(Ordering::SeqCst) {
            return Err(VsrError::ServerNotRunning);
        }
        let Some(stdin) = state.stdin.as_mut() else {
            return Err(VsrError::ServerNotRunning);
        };
        stdin
            .write_all(format!("{command}\n").as_bytes())
            .and_then(|_| stdin.flush())
            .map_err(|e| VsrError::Other(format!("failed to send command: {e}")))?;
        debug!(command, "sent console command");
        Ok(())
    }

    /// Block until an output line satisfies `matches`, returning that line.
    ///
    /// Only lines produced after the call are seen. Fails with
    /// `ServerNotRunning` if the process is already gone, `ServerExited` if
    /// it ends first, `Timeout` at `deadline` and `Interrupted` once
    /// `shutdown` is raised.
    pub fn wait_for_line<F>(
        &self,
        matches: F,
        deadline: Instant,
        shutdown: &AtomicBool,
    ) -> Result<String>
    where
        F: Fn(&str) -> bool + Send + 'static,
    {
        let done = self.done();
        if !self.is_running() {
            return Err(VsrError::ServerNotRunning);
        }

        let (match_tx, match_rx) = bounded::<String>(1);
        let active = Arc::new(AtomicBool::new(true));
        let subscribed = active.clone();
        self.subscribe(Box::new(move |line| {
            if !subscribed.load(Ordering::SeqCst) {
                return false;
            }
            if matches(line) {
                let _ = match_tx.try_send(line.to_string());
                return false;
            }
            true
        }));

        let outcome = loop {
            if shutdown.load(Ordering::Relaxed) {
                break Err(VsrError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                break Err(VsrError::Timeout("server output did not match".into()));
            }
            let slice = WAIT_SLICE.min(deadline - now);
            let step = select! {
                recv(match_rx) -> line => line.ok().map(Ok),
                recv(done) -> _ => Some(match_rx.try_recv().map_err(|_| VsrError::ServerExited)),
                default(slice) => None,
            };
            if let Some(result) = step {
                break result;
            }
        };
        active.store(false, Ordering::SeqCst);
        outcome
    }

    /// Wait for the console line that ends a `/genbackup`.
    pub fn wait_for_backup_complete(&self, deadline: Instant, shutdown: &AtomicBool) -> Result<()> {
        self.wait_for_line(
            |line| line.ends_with(BACKUP_COMPLETE_PATTERN),
            deadline,
            shutdown,
        )
        .map(|_| ())
    }

    /// Ask the server to shut down: `/stop` on the console, then SIGINT.
    /// Does not wait; watch [`Server::done`] for the exit.
    pub fn stop(&self) {
        if let Err(e) = self.send_command(STOP_COMMAND) {
            debug!(error = %e, "could not send /stop");
        }
        self.signal(Signal::SIGINT);
    }

    pub fn kill(&self) {
        self.signal(Signal::SIGKILL);
    }

    fn signal(&self, signal: Signal) {
        if self.shared.exited.load(Ordering::SeqCst) {
            return;
        }
        let Some(pid) = self.lock_state().pid else {
            return;
        };
        if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
            warn!(pid, ?signal, error = %e, "failed to signal server");
        }
    }

    /// A receiver that disconnects once the process has exited and its
    /// output has been dispatched. Already disconnected when never started.
    pub fn done(&self) -> Receiver<()> {
        match &self.lock_state().done {
            Some(rx) => rx.clone(),
            None => bounded::<()>(0).1,
        }
    }

    /// Block until the process exits.
    pub fn wait(&self) -> Result<ExitStatus> {
        if !self.lock_state().started {
            return Err(VsrError::ServerNotRunning);
        }
        let _ = self.done().recv();
        self.exit_status()
            .ok_or_else(|| VsrError::Other("server exit status unavailable".into()))
    }

    pub fn is_running(&self) -> bool {
        self.lock_state().started && !self.shared.exited.load(Ordering::SeqCst)
    }

    /// True once the boot line has been seen; never reset.
    pub fn has_booted(&self) -> bool {
        self.shared.booted.load(Ordering::SeqCst)
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock_state().pid
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self
            .shared
            .exit_status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn subscribe(&self, handler: LineHandler) {
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ServerCommander for Server {
    fn send_command(&self, command: &str) -> Result<()> {
        Server::send_command(self, command)
    }
}

impl BootChecker for Server {
    fn has_booted(&self) -> bool {
        Server::has_booted(self)
    }
}

impl CompletionWaiter for Server {
    fn wait_for_backup_complete(&self, deadline: Instant, shutdown: &AtomicBool) -> Result<()> {
        Server::wait_for_backup_complete(self, deadline, shutdown)
    }
}

fn read_lines<R: Read>(pipe: R, mut on_line: impl FnMut(&str)) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match (&mut reader).take(MAX_LINE_BYTES).read_until(b'\n', &mut buf) {
            Ok(0) => return,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                on_line(text.trim_end_matches(['\r', '\n']));
            }
            Err(e) => {
                debug!(error = %e, "server output read failed");
                return;
            }
        }
    }
}

fn dispatch_line(
    shared: &Shared,
    line: &str,
    on_output: Option<&OutputCallback>,
    on_boot: Option<&BootCallback>,
) {
    if line.contains(BOOT_PATTERN) {
        shared.boot_once.call_once(|| {
            shared.booted.store(true, Ordering::SeqCst);
            info!("server finished booting");
            if let Some(cb) = on_boot {
                cb();
            }
        });
    }

    if let Some(cb) = on_output {
        cb(line);
    }

    let mut handlers = shared.handlers.lock().unwrap_or_else(|e| e.into_inner());
    handlers.retain_mut(|handler| handler(line));
}

fn watch_exit(mut child: Child, shared: Arc<Shared>, drained: Receiver<()>, done: Sender<()>) {
    let status = child.wait();
    shared.exited.store(true, Ordering::SeqCst);
    match status {
        Ok(status) => {
            info!(%status, "server exited");
            *shared
                .exit_status
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(status);
        }
        Err(e) => warn!(error = %e, "failed to reap server process"),
    }
    let _ = drained.recv_timeout(DRAIN_GRACE);
    drop(done);
}
