//! Checksum verification for downloaded files.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::{DepsError, Result};

/// Compute the SHA-256 of a file as lowercase hex, streaming its content
pub fn compute_sha256(path: &Path) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| DepsError::io("open file for calculating sha", path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| DepsError::io("calculate sha for file", path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that a file's SHA-256 matches `expected` (hex, any case)
pub fn verify_digest(path: &Path, expected: &str) -> Result<()> {
    let actual = compute_sha256(path)?;

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(DepsError::DigestMismatch {
            path: path.to_path_buf(),
            expected: expected.to_ascii_lowercase(),
            actual,
        });
    }

    log::debug!("SHA256 of {} verified", path.display());
    Ok(())
}

/// Check that a string looks like a SHA-256 hex digest
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // SHA-256 of "hello world"
    const HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn file_with(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_compute_sha256() {
        let file = file_with(b"hello world");
        assert_eq!(compute_sha256(file.path()).unwrap(), HELLO);
    }

    #[test]
    fn test_verify_sha256() {
        let file = file_with(b"hello world");
        assert!(verify_digest(file.path(), HELLO).is_ok());
        assert!(verify_digest(file.path(), &HELLO.to_uppercase()).is_ok());
    }

    #[test]
    fn test_verify_single_altered_byte() {
        let file = file_with(b"hello worle");
        let err = verify_digest(file.path(), HELLO).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Integrity);
        match err {
            DepsError::DigestMismatch { expected, actual, .. } => {
                assert_eq!(expected, HELLO);
                assert_ne!(actual, HELLO);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = compute_sha256(Path::new("/nonexistent/loot/file")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(HELLO));
        assert!(is_sha256_hex(&HELLO.to_uppercase()));
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&"g".repeat(64)));
    }
}
