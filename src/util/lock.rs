use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("feed {0} is locked by another appcast-sync run")]
    Busy(String),
    #[error("{context} {path}: {source}")]
    Io {
        context: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Exclusive advisory lock guarding one feed file.
///
/// The lock lives on a sidecar `<feed>.lock` file because the feed itself is
/// replaced by rename on every save. Released when dropped.
#[derive(Debug)]
pub struct FeedLock {
    _file: File,
    path: PathBuf,
}

impl FeedLock {
    /// Takes the lock without waiting; a held lock is reported as [`LockError::Busy`].
    pub fn acquire(feed_path: &Path) -> Result<Self, LockError> {
        let path = lock_path(feed_path);
        let io_err = |context: &'static str, source: std::io::Error| LockError::Io {
            context,
            path: path.display().to_string(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_err("failed to open lock file", e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                return Err(LockError::Busy(feed_path.display().to_string()));
            }
            Err(e) => return Err(io_err("failed to lock", e)),
        }

        file.set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
            .map_err(|e| io_err("failed to write lock metadata to", e))?;

        tracing::debug!(lock = %path.display(), "Acquired feed lock");
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(feed_path: &Path) -> PathBuf {
    let mut name = feed_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "appcast.xml".into());
    name.push(".lock");
    feed_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_is_sidecar() {
        assert_eq!(
            lock_path(Path::new("/srv/site/appcast.xml")),
            PathBuf::from("/srv/site/appcast.xml.lock")
        );
    }

    #[test]
    fn test_second_acquire_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let feed = dir.path().join("appcast.xml");

        let first = FeedLock::acquire(&feed).unwrap();
        assert!(first.path().exists());
        assert!(matches!(FeedLock::acquire(&feed), Err(LockError::Busy(_))));

        drop(first);
        assert!(FeedLock::acquire(&feed).is_ok());
    }
}
