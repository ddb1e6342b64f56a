use std::path::Path;
use std::time::SystemTime;

use crate::error::Result;

/// Probe whether another process still holds `path` open for writing.
///
/// Takes a non-blocking exclusive advisory lock and releases it again right
/// away. `Ok(false)` means someone else holds a conflicting lock.
pub fn is_file_unlocked(path: &Path) -> Result<bool> {
    let file = std::fs::File::open(path)?;

    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                drop(lock);
                Ok(true)
            }
            Err((_, Errno::EWOULDBLOCK)) => Ok(false),
            Err((_, errno)) => Err(std::io::Error::from(errno).into()),
        }
    }

    #[cfg(not(unix))]
    {
        drop(file);
        Ok(true)
    }
}

/// Modification time, or `None` when the platform cannot report it.
pub fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
