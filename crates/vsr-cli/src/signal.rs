use std::sync::atomic::{AtomicI32, Ordering};

/// Number of the first SIGINT/SIGTERM received, 0 while none has arrived.
static RECEIVED: AtomicI32 = AtomicI32::new(0);

/// Route SIGINT and SIGTERM to the launcher's shutdown path.
///
/// The first signal is recorded and the default disposition restored, so a
/// second Ctrl-C ends the launcher at once even if the server hangs. The
/// child inherits neither handler.
pub(crate) fn install_signal_handlers() {
    #[cfg(unix)]
    for sig in [libc::SIGINT, libc::SIGTERM] {
        // Safety: the handler only stores an atomic and resets the disposition,
        // both async-signal-safe.
        unsafe {
            libc::signal(sig, on_signal as *const () as libc::sighandler_t);
        }
    }
}

#[cfg(unix)]
extern "C" fn on_signal(sig: libc::c_int) {
    let _ = RECEIVED.compare_exchange(0, sig, Ordering::SeqCst, Ordering::SeqCst);
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
    }
}

pub(crate) fn shutdown_requested() -> bool {
    RECEIVED.load(Ordering::SeqCst) != 0
}

/// Name of the signal that requested shutdown, for the log line.
pub(crate) fn received_signal_name() -> &'static str {
    match RECEIVED.load(Ordering::SeqCst) {
        #[cfg(unix)]
        libc::SIGINT => "SIGINT",
        #[cfg(unix)]
        libc::SIGTERM => "SIGTERM",
        0 => "none",
        _ => "signal",
    }
}
