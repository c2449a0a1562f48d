//! Single-writer repository lock.

use crate::error::{MuseError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Retry interval while waiting for a contended lock.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive advisory lock on `.muse/LOCK`, released on drop.
///
/// Held for the whole of every ref- or merge-state-mutating command. The
/// holder's PID is written into the file so a waiting process can say who
/// it is waiting for. The file itself is left in place: unlinking it would
/// let a second writer lock a fresh inode while the first still holds the
/// old one.
#[derive(Debug)]
pub struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    /// Acquires the lock, retrying until `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryBusy` if another holder keeps the lock past the
    /// timeout.
    pub fn acquire(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let start = Instant::now();
        let mut logged = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if is_lock_contended(&e) => {
                    if !logged {
                        debug!(path = %path.display(), "waiting for repository lock");
                        logged = true;
                    }
                    if start.elapsed() >= timeout {
                        let holder = read_holder(&mut file);
                        warn!(
                            ?holder,
                            timeout_ms = timeout.as_millis() as u64,
                            "repository lock timed out"
                        );
                        return Err(MuseError::RepositoryBusy { holder });
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(MuseError::Io(e)),
            }
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

fn read_holder(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}
