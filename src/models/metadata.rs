use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use super::catalog::CatalogEntry;

pub fn compute_sha256(path: &Path) -> Result<String> {
    let file =
        File::open(path).with_context(|| format!("open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let read = reader.read(&mut buffer).context("hash read")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Sizes are printed in MiB.
#[must_use]
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Missing,
    Matched { sha256: String },
    /// No digest in the catalog; the computed one is reported so it can be pinned.
    Unpinned { sha256: String, bytes: u64 },
    SizeMismatch { expected: u64, actual: u64 },
    DigestMismatch { expected: String, actual: String },
}

impl Verification {
    pub fn is_ok(&self) -> bool {
        matches!(self, Verification::Matched { .. } | Verification::Unpinned { .. })
    }
}

pub fn verify_artifact(entry: &CatalogEntry, path: &Path) -> Result<Verification> {
    if !path.exists() {
        return Ok(Verification::Missing);
    }
    let bytes = std::fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    if let Some(expected) = entry.size_bytes {
        if expected != bytes {
            return Ok(Verification::SizeMismatch {
                expected,
                actual: bytes,
            });
        }
    }
    let sha256 = compute_sha256(path)?;
    Ok(match &entry.sha256 {
        Some(expected) if expected.eq_ignore_ascii_case(&sha256) => {
            Verification::Matched { sha256 }
        }
        Some(expected) => Verification::DigestMismatch {
            expected: expected.clone(),
            actual: sha256,
        },
        None => Verification::Unpinned { sha256, bytes },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::tests::url_entry;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn hashes_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(compute_sha256(&path).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn formats_megabytes() {
        assert_eq!(format_megabytes(0), "0.0 MB");
        assert_eq!(format_megabytes(529 * 1024 * 1024), "529.0 MB");
    }

    #[test]
    fn verification_states() {
        let dir = tempfile::tempdir().unwrap();
        let mut entry = url_entry("m1", "http://x/y.bin", "m1.bin");
        let path = entry.path(dir.path());
        assert_eq!(verify_artifact(&entry, &path).unwrap(), Verification::Missing);

        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(
            verify_artifact(&entry, &path).unwrap(),
            Verification::Unpinned {
                sha256: HELLO_SHA256.into(),
                bytes: 5
            }
        );

        entry.sha256 = Some(HELLO_SHA256.to_uppercase());
        assert!(verify_artifact(&entry, &path).unwrap().is_ok());

        entry.sha256 = Some("00".into());
        assert!(matches!(
            verify_artifact(&entry, &path).unwrap(),
            Verification::DigestMismatch { .. }
        ));

        entry.size_bytes = Some(4);
        assert_eq!(
            verify_artifact(&entry, &path).unwrap(),
            Verification::SizeMismatch {
                expected: 4,
                actual: 5
            }
        );
    }
}
