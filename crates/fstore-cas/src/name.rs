//! Content names and their sharded layout.
//!
//! A content name is the URL-safe, unpadded base64 encoding of
//! `crc32 (4 bytes, big-endian) ++ md5 (16 bytes)`, which is always
//! [`CONTENT_NAME_LEN`] characters long.
//!
//! ```text
//! <root>/<prefix>/
//! └── A/            # name[0..1]
//!     └── bc/       # name[1..3]
//!         └── defghijklmnopqrstuvwxy   # name[3..]
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

/// Length of every content name (20 raw bytes, base64 without padding).
pub const CONTENT_NAME_LEN: usize = 27;

const RAW_LEN: usize = 20;

/// MD5 digest bytes.
pub type Md5Digest = [u8; 16];

/// A validated content name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentName(String);

impl ContentName {
    /// Build the name for a checksum/digest pair.
    pub fn from_digests(checksum: u32, digest: &Md5Digest) -> Self {
        let mut raw = [0u8; RAW_LEN];
        raw[..4].copy_from_slice(&checksum.to_be_bytes());
        raw[4..].copy_from_slice(digest);
        Self(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Parse a caller-supplied name.
    ///
    /// Returns `None` for anything that is not exactly a name this store
    /// could have produced, so lookups never build a path from it.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != CONTENT_NAME_LEN {
            return None;
        }
        let raw = URL_SAFE_NO_PAD.decode(s).ok()?;
        (raw.len() == RAW_LEN).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// CRC-32 encoded in the name.
    pub fn checksum(&self) -> u32 {
        let raw = self.raw();
        u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])
    }

    /// MD5 digest encoded in the name.
    pub fn digest(&self) -> Md5Digest {
        let raw = self.raw();
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&raw[4..]);
        digest
    }

    /// The three path components: 1 char, 2 chars, remainder.
    pub fn shard_components(&self) -> (&str, &str, &str) {
        (&self.0[..1], &self.0[1..3], &self.0[3..])
    }

    /// Path of this blob under `dir`.
    pub fn shard_path(&self, dir: &Path) -> PathBuf {
        let (l1, l2, rest) = self.shard_components();
        dir.join(l1).join(l2).join(rest)
    }

    fn raw(&self) -> [u8; RAW_LEN] {
        let mut raw = [0u8; RAW_LEN];
        // Only constructed from validated input, so decoding cannot fail.
        if let Ok(bytes) = URL_SAFE_NO_PAD.decode(&self.0) {
            raw.copy_from_slice(&bytes);
        }
        raw
    }
}

impl fmt::Display for ContentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Split a request path of the form `NAME[/anything/file.ext]`.
///
/// Everything after the first separator is ignored except its extension,
/// which is returned (with the leading dot) as a download name hint.
pub fn split_request_path(path: &str) -> (&str, Option<&str>) {
    let path = path.trim_start_matches('/');
    match path.find(['/', '\\']) {
        Some(idx) => {
            let tail = &path[idx..];
            let file = tail.rsplit(['/', '\\']).next().unwrap_or("");
            let ext = file.rfind('.').filter(|&i| i > 0).map(|i| &file[i..]);
            (&path[..idx], ext)
        }
        None => (path, None),
    }
}
