//! Single-pass fingerprinting.
//!
//! Input is read exactly once. The first [`SNIFF_LEN`] bytes are peeked for
//! media type detection and then replayed, so every byte reaches both the
//! sink and the two hash accumulators (CRC-32 and MD5).

use std::io::{self, Read, Write};

use md5::{Digest, Md5};

use crate::name::{ContentName, Md5Digest};
use crate::sniff::{detect_content_type, SNIFF_LEN};

/// Running CRC-32 + MD5 over a byte stream.
#[derive(Clone)]
pub struct Fingerprint {
    crc: crc32fast::Hasher,
    md5: Md5,
    size: u64,
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprint {
    pub fn new() -> Self {
        Self {
            crc: crc32fast::Hasher::new(),
            md5: Md5::new(),
            size: 0,
        }
    }

    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.md5.update(data);
        self.size += data.len() as u64;
    }

    /// Bytes fed so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn finalize(self) -> (u32, Md5Digest, u64) {
        (self.crc.finalize(), self.md5.finalize().into(), self.size)
    }
}

/// Fan-out writer: each write goes to `inner` and, for the bytes `inner`
/// accepted, into the fingerprint.
pub struct HashingWriter<W> {
    inner: W,
    fingerprint: Fingerprint,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            fingerprint: Fingerprint::new(),
        }
    }

    pub fn into_parts(self) -> (W, Fingerprint) {
        (self.inner, self.fingerprint)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.fingerprint.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Everything learned about a stream in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub name: ContentName,
    pub media_type: &'static str,
    pub size: u64,
    pub checksum: u32,
    pub digest: Md5Digest,
}

/// Copy `reader` into `sink`, fingerprinting and sniffing along the way.
///
/// The sink is handed back so the caller decides what happens to it
/// (flush, close, rename). On error the sink is dropped.
pub fn copy_and_fingerprint<R: Read, W: Write>(
    mut reader: R,
    sink: W,
) -> io::Result<(W, StreamSummary)> {
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut reader).take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    let media_type = detect_content_type(&head);

    let mut writer = HashingWriter::new(sink);
    io::copy(&mut head.as_slice().chain(reader), &mut writer)?;
    writer.flush()?;

    let (sink, fingerprint) = writer.into_parts();
    let (checksum, digest, size) = fingerprint.finalize();
    Ok((
        sink,
        StreamSummary {
            name: ContentName::from_digests(checksum, &digest),
            media_type,
            size,
            checksum,
            digest,
        },
    ))
}

/// Fingerprint a stream without keeping its bytes.
pub fn fingerprint_reader<R: Read>(reader: R) -> io::Result<StreamSummary> {
    copy_and_fingerprint(reader, io::sink()).map(|(_, summary)| summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `chunk` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_known_digests() {
        let summary = fingerprint_reader(&b"hello world"[..]).unwrap();
        assert_eq!(summary.checksum, 0x0d4a_1185);
        assert_eq!(
            hex::encode(summary.digest),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(summary.size, 11);
        assert_eq!(summary.media_type, "text/plain; charset=utf-8");
        assert_eq!(summary.name.checksum(), summary.checksum);
        assert_eq!(summary.name.digest(), summary.digest);
    }

    #[test]
    fn test_empty_stream() {
        let summary = fingerprint_reader(io::empty()).unwrap();
        assert_eq!(summary.size, 0);
        assert_eq!(summary.checksum, 0);
        assert_eq!(
            hex::encode(summary.digest),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_sniffed_prefix_is_written_and_hashed() {
        let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
        data.extend((0..5000u32).map(|i| (i % 251) as u8));

        // Short reads must not shrink the sniff window or drop bytes.
        let reader = Trickle {
            data: &data,
            chunk: 7,
        };
        let (written, summary) = copy_and_fingerprint(reader, Vec::new()).unwrap();

        assert_eq!(written, data);
        assert_eq!(summary.size, data.len() as u64);
        assert_eq!(summary.media_type, "image/png");
        assert_eq!(summary, fingerprint_reader(&data[..]).unwrap());
    }

    #[test]
    fn test_identical_bytes_identical_name() {
        let a = fingerprint_reader(&b"same bytes"[..]).unwrap();
        let b = fingerprint_reader(&b"same bytes"[..]).unwrap();
        let c = fingerprint_reader(&b"same bytez"[..]).unwrap();
        assert_eq!(a.name, b.name);
        assert_ne!(a.name, c.name);
    }
}
