//! SHA-512 fingerprints used for deduplication and chunk traceability.

use crate::error::IngestError;
use crate::models::FileFingerprint;
use sha2::{Digest, Sha512};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const READ_BLOCK: usize = 8 * 1024;

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn digest_text(text: &str) -> String {
    digest_bytes(text.as_bytes())
}

/// Hashes the raw bytes of a file without loading it whole.
pub fn digest_file(path: &Path) -> Result<FileFingerprint, IngestError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha512::new();
    let mut buffer = [0u8; READ_BLOCK];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(FileFingerprint::new(format!("{:x}", hasher.finalize())))
}
