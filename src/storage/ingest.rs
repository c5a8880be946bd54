//! Content ingestion stream
//!
//! [`ContentIngestStream`] wraps any [`Read`] and combines two behaviours:
//!
//! - **Header capture**: the first bytes (64 KiB by default) are read ahead
//!   on construction and kept for content-type sniffing. They are replayed to
//!   the consumer, so nothing is lost downstream.
//! - **Digest accumulation**: every byte handed to the consumer is fed into
//!   the digest and counted.
//!
//! The digest only describes the whole content after the stream has been
//! drained; [`ContentIngestStream::digest_hex`] on a partially read stream
//! returns the digest of the bytes read so far.

use crate::error::{Result, StoreError};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

pub const DEFAULT_HEADER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl FromStr for DigestAlgorithm {
    type Err = StoreError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha-256" | "sha256" => Ok(DigestAlgorithm::Sha256),
            other => Err(StoreError::configuration(format!(
                "Digest algorithm '{}' is not available",
                other
            ))),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Md5 => write!(f, "MD5"),
            DigestAlgorithm::Sha256 => write!(f, "SHA-256"),
        }
    }
}

#[derive(Clone)]
enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(bytes),
            Hasher::Sha256(h) => h.update(bytes),
        }
    }

    fn hex(&self) -> String {
        match self.clone() {
            Hasher::Md5(h) => format!("{:x}", h.finalize()),
            Hasher::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Lowercase hex MD5 of `content`.
pub fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", Md5::digest(content))
}

/// Streams `reader` to its end and returns the lowercase hex MD5.
pub fn md5_hex_of_reader<R: Read>(reader: R) -> io::Result<String> {
    let mut stream = ContentIngestStream::with_header_size(reader, 0)?;
    io::copy(&mut stream, &mut io::sink())?;
    Ok(stream.digest_hex())
}

pub struct ContentIngestStream<R> {
    inner: R,
    header: Vec<u8>,
    replayed: usize,
    hasher: Hasher,
    algorithm: DigestAlgorithm,
    length: u64,
    drained: bool,
}

impl<R: Read> ContentIngestStream<R> {
    /// MD5 stream with the default 64 KiB header.
    pub fn new(inner: R) -> io::Result<Self> {
        Self::with_header_size(inner, DEFAULT_HEADER_SIZE)
    }

    pub fn with_header_size(inner: R, header_size: usize) -> io::Result<Self> {
        Self::build(inner, header_size, DigestAlgorithm::Md5)
    }

    /// Stream using the digest named `algorithm` (`"md5"` or `"sha-256"`).
    pub fn with_algorithm(inner: R, algorithm: &str, header_size: usize) -> Result<Self> {
        let algorithm: DigestAlgorithm = algorithm.parse()?;
        Self::build(inner, header_size, algorithm)
            .map_err(|e| StoreError::Persistence {
                message: format!("Failed to read content header: {}", e),
                path: None,
                source: Some(Box::new(e)),
            })
    }

    fn build(mut inner: R, header_size: usize, algorithm: DigestAlgorithm) -> io::Result<Self> {
        let mut header = Vec::with_capacity(header_size.min(DEFAULT_HEADER_SIZE));
        (&mut inner)
            .take(header_size as u64)
            .read_to_end(&mut header)?;

        Ok(Self {
            inner,
            header,
            replayed: 0,
            hasher: Hasher::new(algorithm),
            algorithm,
            length: 0,
            drained: false,
        })
    }

    /// The bytes captured ahead on construction.
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Number of bytes handed to the consumer so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// True once a read returned end of stream.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    /// Lowercase hex digest of everything read so far.
    pub fn digest_hex(&self) -> String {
        self.hasher.hex()
    }

    /// Guesses a MIME type from the captured header, falling back to the
    /// extension of `file_name`.
    pub fn sniff_content_type(&self, file_name: &str) -> String {
        sniff_content_type(&self.header, file_name)
    }
}

impl<R: Read> Read for ContentIngestStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let count = if self.replayed < self.header.len() {
            let pending = &self.header[self.replayed..];
            let count = pending.len().min(buf.len());
            buf[..count].copy_from_slice(&pending[..count]);
            self.replayed += count;
            count
        } else {
            self.inner.read(buf)?
        };

        if count == 0 {
            self.drained = true;
        } else {
            self.hasher.update(&buf[..count]);
            self.length += count as u64;
        }
        Ok(count)
    }
}

/// XML is recognised by its leading markup; anything else is guessed from the
/// file extension.
pub fn sniff_content_type(header: &[u8], file_name: &str) -> String {
    let start = header
        .strip_prefix(&[0xEF, 0xBB, 0xBF][..])
        .unwrap_or(header);
    let first = start.iter().position(|b| !b.is_ascii_whitespace());
    if let Some(pos) = first {
        let rest = &start[pos..];
        if rest.starts_with(b"<?xml") {
            return "text/xml".to_string();
        }
    }
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
