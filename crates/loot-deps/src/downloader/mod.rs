//! Fetching, verifying and unpacking artifacts.
//!
//! This module provides the leaf operations the procurement engine chains
//! together: HTTP download to a file, SHA-256 verification and archive
//! extraction.

mod archive;
mod checksum;
mod file;

pub use archive::{extract, ArchiveExtractor, ArchiveFormat, MAX_ENTRY_SIZE};
pub use checksum::{compute_sha256, is_sha256_hex, verify_digest};
pub use file::{Downloader, DownloaderConfig};
