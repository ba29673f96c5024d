//! # Garbage Collection
//!
//! Time-based sweep of the store tree.
//!
//! A blob is stale when its modification time is at or before
//! `now - lifetime`. Writes and dedup hits both refresh the modification
//! time, and blobs only appear through an atomic rename, so a sweep running
//! next to writers never sees a half-written blob and never removes one
//! that was just written (given a lifetime longer than a single write).

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::error::{is_missing, Result, StoreError};
use crate::{is_temp_file, Store};

/// Number of shard directory levels above each blob.
const SHARD_DEPTH: usize = 2;

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanStats {
    /// The whole store was removed (zero lifetime).
    pub reset: bool,
    pub removed_blobs: u64,
    pub removed_bytes: u64,
    /// Orphaned temporary files left by interrupted writes; not counted
    /// as blobs.
    pub removed_temp_files: u64,
    /// Shard directories pruned after their last blob went away.
    pub removed_dirs: u64,
    /// Entries that could not be inspected or removed.
    pub skipped: u64,
}

/// Result of pruning the directories above one removed blob.
#[derive(Debug, Default)]
pub(crate) struct Pruned {
    pub removed: usize,
    /// Pruning stopped on something other than a non-empty directory.
    pub failed: bool,
}

impl Store {
    /// Remove stale blobs.
    ///
    /// A zero `lifetime` removes the entire store root. Otherwise every
    /// file whose modification time is at or before `now - lifetime` is
    /// deleted and its shard directories are pruned if left empty. Per-entry
    /// failures are skipped; a missing root is a successful no-op.
    #[instrument(skip(self), level = "debug")]
    pub fn clean(&self, lifetime: Duration) -> Result<CleanStats> {
        let root = self.root();
        let mut stats = CleanStats::default();

        if lifetime.is_zero() {
            match fs::remove_dir_all(root) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io("clean", root.display().to_string(), e)),
            }
            info!(root = %root.display(), "store reset");
            stats.reset = true;
            return Ok(stats);
        }

        let cutoff = SystemTime::now()
            .checked_sub(lifetime)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for entry in WalkDir::new(root).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 && e.io_error().is_some_and(is_missing) => {
                    debug!("store root missing, nothing to clean");
                    return Ok(stats);
                }
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    stats.skipped += 1;
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "skipping entry");
                    stats.skipped += 1;
                    continue;
                }
            };
            let fresh = metadata.modified().map(|m| m > cutoff).unwrap_or(true);
            if fresh {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    if is_temp_file(entry.path()) {
                        debug!(path = %entry.path().display(), "orphaned temp file removed");
                        stats.removed_temp_files += 1;
                    } else {
                        debug!(path = %entry.path().display(), "stale blob removed");
                        stats.removed_blobs += 1;
                        stats.removed_bytes += metadata.len();
                    }
                    let pruned = prune_shard_dirs(entry.path(), root);
                    stats.removed_dirs += pruned.removed as u64;
                    if pruned.failed {
                        stats.skipped += 1;
                    }
                }
                // Removed concurrently.
                Err(e) if is_missing(&e) => {}
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "failed to remove blob");
                    stats.skipped += 1;
                }
            }
        }

        info!(
            removed_blobs = stats.removed_blobs,
            removed_bytes = stats.removed_bytes,
            removed_temp_files = stats.removed_temp_files,
            removed_dirs = stats.removed_dirs,
            skipped = stats.skipped,
            "gc sweep complete"
        );
        Ok(stats)
    }
}

/// Remove the (up to two) now-empty directories above `blob`, innermost
/// first, stopping at the first one that can't be removed.
///
/// Never removes `root` or anything outside it.
pub(crate) fn prune_shard_dirs(blob: &Path, root: &Path) -> Pruned {
    prune_with(blob, root, |dir| fs::remove_dir(dir))
}

fn prune_with<F>(blob: &Path, root: &Path, mut remove_dir: F) -> Pruned
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let mut pruned = Pruned::default();
    let mut current = blob;

    for _ in 0..SHARD_DEPTH {
        let Some(dir) = current.parent() else { break };
        if dir == root || !dir.starts_with(root) {
            break;
        }
        match remove_dir(dir) {
            Ok(()) => pruned.removed += 1,
            Err(e) if is_not_empty(&e) || is_missing(&e) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to prune shard directory");
                pruned.failed = true;
                break;
            }
        }
        current = dir;
    }
    pruned
}

fn is_not_empty(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOTEMPTY) | Some(libc::EEXIST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    #[test]
    fn test_prune_stops_at_nonempty() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let l2 = root.join("a/bc");
        fs::create_dir_all(&l2).unwrap();
        fs::write(root.join("a/other"), b"x").unwrap();

        let pruned = prune_shard_dirs(&l2.join("blob"), root);
        assert_eq!(pruned.removed, 1);
        assert!(!pruned.failed);
        assert!(!l2.exists());
        assert!(root.join("a").is_dir());
    }

    #[test]
    fn test_prune_never_removes_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("store");
        fs::create_dir_all(&root).unwrap();

        // A stray file directly under the root.
        let pruned = prune_shard_dirs(&root.join("stray"), &root);
        assert_eq!(pruned.removed, 0);
        assert!(root.is_dir());

        let nested = root.join("a");
        fs::create_dir_all(&nested).unwrap();
        let pruned = prune_shard_dirs(&nested.join("stray"), &root);
        assert_eq!(pruned.removed, 1);
        assert!(root.is_dir());
    }

    #[test]
    fn test_clean_missing_root_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join("blobs")).unwrap();
        fs::remove_dir_all(store.root()).unwrap();

        let stats = store.clean(Duration::from_secs(60)).unwrap();
        assert_eq!(stats, CleanStats::default());
    }

    #[test]
    fn test_clean_removes_orphaned_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join("blobs")).unwrap();

        let orphan = store.root().join("~tmp123abc");
        fs::write(&orphan, b"crashed upload").unwrap();
        filetime::set_file_mtime(&orphan, FileTime::from_unix_time(1_000, 0)).unwrap();

        let stats = store.clean(Duration::from_secs(3600)).unwrap();
        assert_eq!(stats.removed_temp_files, 1);
        assert_eq!(stats.removed_blobs, 0);
        assert_eq!(stats.removed_bytes, 0);
        assert_eq!(stats.removed_dirs, 0);
        assert!(!orphan.exists());
        assert!(store.root().is_dir());
    }

    #[test]
    fn test_prune_unexpected_error_is_reported() {
        let root = Path::new("/store");
        let blob = root.join("a/bc/defg");

        let mut calls = 0;
        let pruned = prune_with(&blob, root, |_| {
            calls += 1;
            Err(io::Error::from_raw_os_error(libc::EACCES))
        });
        assert_eq!(calls, 1);
        assert_eq!(pruned.removed, 0);
        assert!(pruned.failed);

        // Second level fails after the first was removed.
        let pruned = prune_with(&blob, root, |dir| {
            if dir.ends_with("bc") {
                Ok(())
            } else {
                Err(io::Error::from_raw_os_error(libc::EROFS))
            }
        });
        assert_eq!(pruned.removed, 1);
        assert!(pruned.failed);
    }

    #[test]
    fn test_prune_expected_errors_stop_quietly() {
        let root = Path::new("/store");
        let blob = root.join("a/bc/defg");

        for errno in [libc::ENOTEMPTY, libc::EEXIST, libc::ENOENT, libc::ENOTDIR] {
            let mut calls = 0;
            let pruned = prune_with(&blob, root, |_| {
                calls += 1;
                Err(io::Error::from_raw_os_error(errno))
            });
            assert_eq!(calls, 1, "errno {errno}");
            assert_eq!(pruned.removed, 0);
            assert!(!pruned.failed, "errno {errno}");
        }
    }

    #[test]
    fn test_prune_visits_at_most_two_levels() {
        let root = Path::new("/store");
        let blob = root.join("pfx/a/bc/defg");

        let mut visited = Vec::new();
        let pruned = prune_with(&blob, root, |dir| {
            visited.push(dir.to_path_buf());
            Ok(())
        });
        assert_eq!(pruned.removed, 2);
        assert_eq!(visited, vec![root.join("pfx/a/bc"), root.join("pfx/a")]);
    }
}
