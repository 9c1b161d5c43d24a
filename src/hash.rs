// src/hash.rs

//! SHA-256 checksums for fetched sources
//!
//! Recipes pin downloaded archives and remote patches by SHA-256. Checksums
//! are written either bare (`abc123...`) or prefixed (`sha256:abc123...`).

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// A validated SHA-256 checksum
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    value: String,
}

impl Checksum {
    /// Parse a bare or `sha256:`-prefixed checksum
    pub fn parse(s: &str) -> Result<Self> {
        let value = match s.split_once(':') {
            Some(("sha256", value)) => value,
            Some((algo, _)) => {
                return Err(Error::ParseError(format!(
                    "Unsupported checksum algorithm '{}', expected sha256",
                    algo
                )));
            }
            None => s,
        };

        let bytes = hex::decode(value)
            .map_err(|e| Error::ParseError(format!("Invalid checksum '{}': {}", s, e)))?;
        if bytes.len() != 32 {
            return Err(Error::ParseError(format!(
                "Invalid checksum length: expected 64 hex characters, got {}",
                value.len()
            )));
        }

        Ok(Self {
            value: value.to_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.value)
    }
}

/// Compute the SHA-256 of a byte slice as lowercase hex
pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute the SHA-256 of data from a reader
pub fn hash_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file matches an expected checksum
///
/// Streams the file content to avoid loading it entirely into memory.
pub fn verify_file(path: &Path, expected: &Checksum) -> Result<()> {
    let file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
    let actual = hash_reader(&mut BufReader::new(file))?;

    if actual == expected.value {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.value.clone(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(sha256(b"hello world"), HELLO);
    }

    #[test]
    fn test_checksum_parse() {
        let bare = Checksum::parse(HELLO).unwrap();
        let prefixed = Checksum::parse(&format!("sha256:{}", HELLO.to_uppercase())).unwrap();
        assert_eq!(bare, prefixed);
        assert_eq!(bare.to_string(), format!("sha256:{}", HELLO));

        assert!(Checksum::parse("sha512:abcd").is_err());
        assert!(Checksum::parse("abcd").is_err());
        assert!(Checksum::parse("zz").is_err());
    }

    #[test]
    fn test_verify_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        let good = Checksum::parse(HELLO).unwrap();
        assert!(verify_file(file.path(), &good).is_ok());

        let bad = Checksum::parse(&"0".repeat(64)).unwrap();
        match verify_file(file.path(), &bad) {
            Err(Error::ChecksumMismatch { actual, .. }) => assert_eq!(actual, HELLO),
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }
}
