//! Stale file janitor
//!
//! Periodically removes files from the shared download folder that were never
//! cleaned up after delivery.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Shortest allowed pause between two sweeps.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic sweep over one directory.
#[derive(Debug, Clone)]
pub struct Janitor {
    dir: PathBuf,
    stale_after: Duration,
    interval: Duration,
}

/// Handle to a running janitor task.
pub struct JanitorHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl JanitorHandle {
    /// Stops the janitor and waits for the current pass to finish.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            warn!(error = %e, "Janitor task ended abnormally");
        }
    }
}

impl Janitor {
    /// Create a janitor for `dir`.
    ///
    /// `interval` is raised to [`MIN_SWEEP_INTERVAL`] when shorter.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, stale_after: Duration, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            stale_after,
            interval: interval.max(MIN_SWEEP_INTERVAL),
        }
    }

    /// Runs one pass and returns the number of files removed.
    ///
    /// Per-file errors are logged and skipped. A missing directory makes the
    /// pass a no-op.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn sweep(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Download folder does not exist, skipping sweep");
                return 0;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read download folder");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read directory entry");
                    break;
                }
            };

            let path = entry.path();
            match self.remove_if_stale(&path, now).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to clean up file"),
            }
        }

        info!(files_deleted = removed, "Cleaned up stale download files");
        removed
    }

    async fn remove_if_stale(&self, path: &Path, now: SystemTime) -> std::io::Result<bool> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Ok(false);
        }

        let age = now
            .duration_since(metadata.modified()?)
            .unwrap_or(Duration::ZERO);
        if age <= self.stale_after {
            return Ok(false);
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "Removed stale file");
                Ok(true)
            }
            // Already taken by the per-delivery cleanup
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Starts sweeping every `interval` until stopped.
    #[must_use]
    pub fn spawn(self) -> JanitorHandle {
        let token = CancellationToken::new();
        let child = token.clone();

        let join = tokio::spawn(async move {
            info!(
                dir = %self.dir.display(),
                interval_secs = self.interval.as_secs(),
                stale_after_secs = self.stale_after.as_secs(),
                "Janitor started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    biased;
                    () = child.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            info!("Janitor stopped");
        });

        JanitorHandle { token, join }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};

    fn age_file(path: &Path, age: Duration) -> std::io::Result<()> {
        let file = File::options().write(true).open(path)?;
        let past = SystemTime::now() - age;
        file.set_times(FileTimes::new().set_modified(past))
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_files() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let stale = dir.path().join("stale.mp4");
        let fresh = dir.path().join("fresh.mp4");
        std::fs::write(&stale, b"old")?;
        std::fs::write(&fresh, b"new")?;
        age_file(&stale, Duration::from_secs(3600))?;

        let janitor = Janitor::new(
            dir.path(),
            Duration::from_secs(1800),
            Duration::from_secs(300),
        );

        assert_eq!(janitor.sweep().await, 1);
        assert!(!stale.exists());
        assert!(fresh.exists());

        // Second pass finds nothing
        assert_eq!(janitor.sweep().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_missing_directory_is_noop() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let janitor = Janitor::new(
            dir.path().join("nope"),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert_eq!(janitor.sweep().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_skips_subdirectories() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir(dir.path().join("nested"))?;

        let janitor = Janitor::new(dir.path(), Duration::ZERO, Duration::from_secs(1));
        assert_eq!(janitor.sweep().await, 0);
        assert!(dir.path().join("nested").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let stale = dir.path().join("stale.jpg");
        std::fs::write(&stale, b"old")?;
        age_file(&stale, Duration::from_secs(120))?;

        let janitor = Janitor::new(dir.path(), Duration::from_secs(60), Duration::ZERO);
        assert_eq!(janitor.interval, MIN_SWEEP_INTERVAL);

        let handle = janitor.spawn();
        for _ in 0..50 {
            if !stale.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;
        assert!(!stale.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_spawned_janitor_sweeps_and_stops() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let stale = dir.path().join("stale.jpg");
        std::fs::write(&stale, b"old")?;
        age_file(&stale, Duration::from_secs(120))?;

        let handle = Janitor::new(
            dir.path(),
            Duration::from_secs(60),
            Duration::from_millis(20),
        )
        .spawn();

        // The first tick fires immediately
        for _ in 0..50 {
            if !stale.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;
        assert!(!stale.exists());
        Ok(())
    }
}
