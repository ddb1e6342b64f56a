use std::io::Read;
use std::process::{Child, Command, Output, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{Result, VsrError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Run an already-configured `Command` to completion with piped
/// stdout/stderr.
///
/// The child is killed and reaped if `deadline` passes or `shutdown` is
/// raised while it runs, so it never outlives the caller's cycle.
pub fn run_command(
    cmd: &mut Command,
    deadline: Option<Instant>,
    shutdown: Option<&AtomicBool>,
) -> Result<Output> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Output {
                status,
                stdout: collect(stdout),
                stderr: collect(stderr),
            });
        }
        if shutdown.is_some_and(|s| s.load(Ordering::Relaxed)) {
            kill_and_reap(&mut child);
            return Err(VsrError::Interrupted);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            kill_and_reap(&mut child);
            return Err(VsrError::Timeout(format!(
                "{} did not finish in time",
                describe(cmd)
            )));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Program name and arguments, for log lines and errors.
pub fn describe(cmd: &Command) -> String {
    let mut out = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        out.push(' ');
        out.push_str(&arg.to_string_lossy());
    }
    out
}

/// Exit code of a finished child; `-1` when it was ended by a signal.
pub fn exit_code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut r| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_output_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err >&2; exit 3");
        let output = run_command(&mut cmd, None, None).unwrap();
        assert_eq!(exit_code(&output), 3);
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "err");
    }

    #[test]
    fn deadline_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let started = Instant::now();
        let err = run_command(
            &mut cmd,
            Some(Instant::now() + Duration::from_millis(200)),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, VsrError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn shutdown_flag_interrupts_child() {
        let flag = AtomicBool::new(true);
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let err = run_command(&mut cmd, None, Some(&flag)).unwrap_err();
        assert!(matches!(err, VsrError::Interrupted));
    }

    #[test]
    fn describe_joins_program_and_args() {
        let mut cmd = Command::new("restic");
        cmd.args(["forget", "--keep-last", "3", "--prune"]);
        assert_eq!(describe(&cmd), "restic forget --keep-last 3 --prune");
    }
}
