//! Checksum Service
//!
//! Streams a file through a digest and compares two files by digest.
//!
//! - `sha256` (default): 256-bit SHA-2
//! - `md5`: 128-bit, faster, still fine for detecting copy corruption
//! - `blake3`: 256-bit, fastest on modern CPUs
//!
//! The replace protocol only ever talks to the [`Digester`] trait, so callers
//! can plug in any file→digest function.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest;
use thiserror::Error;

/// Read buffer for streaming hashes (1 MiB).
const HASH_BUF_SIZE: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ChecksumError {
    #[error("unknown checksum type '{0}' (expected sha256, md5 or blake3)")]
    UnknownAlgorithm(String),

    #[error("error hashing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{algorithm} mismatch: {original} != {copy}")]
    Mismatch {
        algorithm: String,
        original: String,
        copy: String,
    },
}

/// Pluggable file→digest function.
pub trait Digester: Send + Sync {
    /// Short algorithm name used in logs and error messages.
    fn name(&self) -> &str;

    /// Hex digest of the file's full content.
    fn digest_file(&self, path: &Path) -> io::Result<String>;
}

/// Built-in digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Md5,
    Blake3,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Blake3 => "blake3",
        }
    }

    pub fn digest_bits(&self) -> u32 {
        match self {
            ChecksumAlgorithm::Md5 => 128,
            ChecksumAlgorithm::Sha256 | ChecksumAlgorithm::Blake3 => 256,
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = ChecksumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "blake3" => Ok(ChecksumAlgorithm::Blake3),
            _ => Err(ChecksumError::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl Digester for ChecksumAlgorithm {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn digest_file(&self, path: &Path) -> io::Result<String> {
        match self {
            ChecksumAlgorithm::Sha256 => digest_with::<sha2::Sha256>(path),
            ChecksumAlgorithm::Md5 => digest_with::<md5::Md5>(path),
            ChecksumAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                stream_file(path, |chunk| {
                    hasher.update(chunk);
                })?;
                Ok(hasher.finalize().to_hex().to_string())
            }
        }
    }
}

/// Hex digest of `path` using `algorithm`.
pub fn file_digest(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    algorithm.digest_file(path)
}

/// Compare two files by digest.
///
/// Returns the shared digest when both files hash identically.
pub fn compare_files(
    original: &Path,
    copy: &Path,
    digester: &dyn Digester,
) -> Result<String, ChecksumError> {
    let original_hash = digester
        .digest_file(original)
        .map_err(|source| ChecksumError::Io {
            path: original.to_path_buf(),
            source,
        })?;
    let copy_hash = digester
        .digest_file(copy)
        .map_err(|source| ChecksumError::Io {
            path: copy.to_path_buf(),
            source,
        })?;

    if original_hash != copy_hash {
        return Err(ChecksumError::Mismatch {
            algorithm: digester.name().to_string(),
            original: original_hash,
            copy: copy_hash,
        });
    }
    Ok(original_hash)
}

fn digest_with<D: Digest>(path: &Path) -> io::Result<String> {
    let mut hasher = D::new();
    stream_file(path, |chunk| hasher.update(chunk))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Feed the file to `update` in fixed-size chunks (never reads it whole).
fn stream_file(path: &Path, mut update: impl FnMut(&[u8])) -> io::Result<()> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        update(&buf[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();

        assert_eq!(
            file_digest(&path, ChecksumAlgorithm::Sha256).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            file_digest(&path, ChecksumAlgorithm::Md5).unwrap(),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            file_digest(&path, ChecksumAlgorithm::Blake3).unwrap(),
            blake3::hash(b"abc").to_hex().to_string()
        );
    }

    #[test]
    fn test_empty_file_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty");
        fs::write(&path, b"").unwrap();

        assert_eq!(
            file_digest(&path, ChecksumAlgorithm::Sha256).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_compare_files_match_and_mismatch() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"same bytes").unwrap();
        fs::write(&b, b"same bytes").unwrap();

        for algo in [
            ChecksumAlgorithm::Sha256,
            ChecksumAlgorithm::Md5,
            ChecksumAlgorithm::Blake3,
        ] {
            assert!(compare_files(&a, &b, &algo).is_ok(), "{algo} should match");
        }

        fs::write(&b, b"other bytes").unwrap();
        let err = compare_files(&a, &b, &ChecksumAlgorithm::Md5).unwrap_err();
        match err {
            ChecksumError::Mismatch { algorithm, .. } => assert_eq!(algorithm, "md5"),
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_compare_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        fs::write(&a, b"x").unwrap();
        let missing = temp.path().join("missing");

        let err = compare_files(&a, &missing, &ChecksumAlgorithm::Sha256).unwrap_err();
        assert!(matches!(err, ChecksumError::Io { ref path, .. } if path == &missing));
    }

    #[test]
    fn test_large_file_spans_multiple_chunks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.bin");
        let data: Vec<u8> = (0..(HASH_BUF_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        assert_eq!(
            file_digest(&path, ChecksumAlgorithm::Blake3).unwrap(),
            blake3::hash(&data).to_hex().to_string()
        );
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("SHA256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert_eq!("md5".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Md5);
        assert_eq!(" blake3 ".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Blake3);
        assert!(matches!(
            "crc32".parse::<ChecksumAlgorithm>(),
            Err(ChecksumError::UnknownAlgorithm(_))
        ));
        assert_eq!(ChecksumAlgorithm::default(), ChecksumAlgorithm::Sha256);
        assert_eq!(ChecksumAlgorithm::Md5.digest_bits(), 128);
    }
}
