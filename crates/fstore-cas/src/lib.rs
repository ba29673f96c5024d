//! # fstore-cas
//!
//! Content-addressable blob storage on a local filesystem.
//!
//! Blobs are named by a fingerprint of their bytes (CRC-32 + MD5, see
//! [`ContentName`]) and stored in a 3-level fan-out layout under the store
//! root, optionally inside a caller-supplied prefix directory.
//!
//! ## Directory Layout
//!
//! ```text
//! <root>/
//! ├── A/
//! │   └── bc/
//! │       └── defghijklmnopqrstuvwxy     # name = "Abcdefghijklmnopqrstuvwxy"
//! └── <prefix>/
//!     └── Q/
//!         └── rs/
//!             └── ...
//! ```
//!
//! The filesystem tree is the only index. Writes go to a temporary file in
//! the destination directory and are installed with a single `rename`, so
//! readers and the garbage collector never see a partially written blob.

mod error;
pub mod fingerprint;
mod gc;
pub mod name;
pub mod sandbox;
pub mod sniff;

pub use error::{ErrorKind, Result, StoreError, TEMP_FILE_NAME};
pub use gc::CleanStats;
pub use name::{split_request_path, ContentName, CONTENT_NAME_LEN};

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::fingerprint::{copy_and_fingerprint, StreamSummary};

/// File name prefix of in-flight temporary files.
pub const TEMP_PREFIX: &str = "~tmp";

/// Attempts at installing a blob when a concurrent prune removes its shard
/// directories while they are being created or before the `rename`.
const INSTALL_ATTEMPTS: usize = 3;

/// Information about a stored blob, returned by [`Store::create`].
///
/// Never persisted by the store; it can always be derived again from the
/// blob's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Content name (or a location built from it).
    #[serde(rename = "location")]
    pub name: String,
    #[serde(rename = "mimetype")]
    pub media_type: String,
    pub size: u64,
    #[serde(rename = "crc32")]
    pub checksum: u32,
    /// Lowercase hex MD5.
    #[serde(rename = "md5")]
    pub digest: String,
}

impl BlobInfo {
    /// Replace the name with `base/name`, e.g. a request path for a
    /// `Location` header.
    pub fn with_location_base(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.name = format!("{}/{}", base, self.name);
        self
    }
}

impl From<StreamSummary> for BlobInfo {
    fn from(summary: StreamSummary) -> Self {
        Self {
            name: summary.name.to_string(),
            media_type: summary.media_type.to_string(),
            size: summary.size,
            checksum: summary.checksum,
            digest: hex::encode(summary.digest),
        }
    }
}

/// Statistics about the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of blobs stored (temporary files excluded)
    pub blob_count: u64,
    /// Total bytes stored
    pub total_bytes: u64,
}

impl StoreStats {
    pub fn avg_blob_size(&self) -> u64 {
        if self.blob_count == 0 {
            0
        } else {
            self.total_bytes / self.blob_count
        }
    }
}

/// Content-addressable blob store rooted at a local directory.
///
/// Cheap to clone; holds no open handles or locks. All coordination between
/// concurrent callers goes through filesystem atomicity.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open the store at `root`, creating the directory if it doesn't exist.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        ensure_dir(root).map_err(|e| StoreError::io("mkdir", root.display().to_string(), e))?;
        let root = root
            .canonicalize()
            .map_err(|e| StoreError::io("open", root.display().to_string(), e))?;
        Ok(Self { root })
    }

    /// Canonical root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store the bytes of `reader` under `prefix`.
    ///
    /// The stream is read once; its content name, media type, size, and
    /// hashes are computed while it is buffered to a temporary file. If a
    /// blob with that name already exists its timestamps are refreshed and
    /// nothing is rewritten.
    #[instrument(skip(self, reader), level = "debug")]
    pub fn create<R: Read>(&self, prefix: &str, reader: R) -> Result<BlobInfo> {
        let dir = self.prefix_dir(prefix)?;
        ensure_dir(&dir).map_err(|e| StoreError::io("mkdir", prefix, e))?;

        // Removed on drop unless persisted.
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&dir)
            .map_err(|e| StoreError::temp("create", e))?;

        let (temp, summary) =
            copy_and_fingerprint(reader, temp).map_err(|e| StoreError::temp("write", e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| StoreError::temp("close", e))?;
        let mut temp_path = temp.into_temp_path();

        let blob_path = summary.name.shard_path(&dir);
        let info = BlobInfo::from(summary);

        if touch(&blob_path).is_ok() {
            debug!(name = %info.name, "blob already stored");
            return Ok(info);
        }

        let mut attempt = 1;
        loop {
            let (op, error) = match blob_path.parent().map_or(Ok(()), ensure_dir) {
                Ok(()) => match temp_path.persist(&blob_path) {
                    Ok(()) => {
                        debug!(name = %info.name, size = info.size, "blob installed");
                        return Ok(info);
                    }
                    Err(e) => {
                        temp_path = e.path;
                        ("rename", e.error)
                    }
                },
                Err(e) => ("mkdir", e),
            };
            // A shard directory was pruned concurrently; recreate it.
            if error.kind() == io::ErrorKind::NotFound && attempt < INSTALL_ATTEMPTS {
                debug!(name = %info.name, attempt, op, "shard directory vanished, retrying");
                attempt += 1;
                continue;
            }
            return Err(StoreError::io(op, info.name.as_str(), error));
        }
    }

    /// Open a blob for reading.
    ///
    /// Malformed names are reported as `NotFound` without touching the
    /// filesystem. The blob's timestamps are refreshed on a best-effort
    /// basis so the garbage collector treats it as recently used.
    #[instrument(skip(self), level = "debug")]
    pub fn open_blob(&self, prefix: &str, name: &str) -> Result<File> {
        let (name, path) = self.lookup(prefix, name)?;

        let file = File::open(&path).map_err(|e| StoreError::lookup("open", name.as_str(), e))?;
        let metadata = file
            .metadata()
            .map_err(|e| StoreError::lookup("stat", name.as_str(), e))?;
        if metadata.is_dir() {
            return Err(StoreError::IsDirectory {
                name: name.to_string(),
            });
        }

        if let Err(e) = touch(&path) {
            debug!(%name, error = %e, "failed to refresh blob timestamps");
        }
        Ok(file)
    }

    /// Read a whole blob into memory.
    pub fn read(&self, prefix: &str, name: &str) -> Result<Vec<u8>> {
        let mut file = self.open_blob(prefix, name)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| StoreError::io("read", name, e))?;
        Ok(data)
    }

    /// Check whether a blob exists without refreshing its timestamps.
    pub fn exists(&self, prefix: &str, name: &str) -> bool {
        self.lookup(prefix, name)
            .map(|(_, path)| path.is_file())
            .unwrap_or(false)
    }

    /// Delete a blob, then prune its shard directories if they became empty.
    #[instrument(skip(self), level = "debug")]
    pub fn remove(&self, prefix: &str, name: &str) -> Result<()> {
        let (name, path) = self.lookup(prefix, name)?;

        fs::remove_file(&path).map_err(|e| StoreError::lookup("remove", name.as_str(), e))?;
        let pruned = gc::prune_shard_dirs(&path, &self.root);
        debug!(%name, pruned_dirs = pruned.removed, "blob removed");
        Ok(())
    }

    /// Get statistics about the store.
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    if e.io_error().is_some_and(error::is_missing) {
                        return Ok(stats);
                    }
                    let path = self.root.display().to_string();
                    return Err(StoreError::io("walk", path, e.into()));
                }
                Err(e) => {
                    debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || is_temp_file(entry.path()) {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                stats.blob_count += 1;
                stats.total_bytes += metadata.len();
            }
        }
        Ok(stats)
    }

    /// Directory for `prefix`, confined to the store root.
    fn prefix_dir(&self, prefix: &str) -> Result<PathBuf> {
        if prefix.is_empty() {
            return Ok(self.root.clone());
        }
        sandbox::resolve(&self.root, prefix, "")
    }

    /// Validate `name` and compute its sharded path.
    fn lookup(&self, prefix: &str, name: &str) -> Result<(ContentName, PathBuf)> {
        if name.len() < CONTENT_NAME_LEN {
            return Err(StoreError::not_found(name));
        }
        let name = ContentName::parse(name).ok_or_else(|| StoreError::not_found(name))?;
        let path = name.shard_path(&self.prefix_dir(prefix)?);
        Ok((name, path))
    }
}

/// Set access and modification time to now. Fails if `path` doesn't exist.
fn touch(path: &Path) -> io::Result<()> {
    let now = FileTime::now();
    filetime::set_file_times(path, now, now)
}

/// Create `path` and its parents, owner-only on unix.
fn ensure_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

pub(crate) fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TEMP_PREFIX))
}
