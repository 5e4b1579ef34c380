//! Input checksum and configuration fingerprint
//!
//! The checksum is a single running XXH3-64 accumulator, seeded with the
//! configuration fingerprint, over every resolved input's path and bytes in
//! order. It only has to detect accidental drift between builds.

use crate::pattern::ResolvedInputs;
use crate::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use xxhash_rust::xxh3::Xxh3;

fn fold_file(hasher: &mut Xxh3, path: &Path, display: &Path) -> Result<u64> {
    let mut file = fs::File::open(path).map_err(|e| Error::input_unreadable(e, display))?;
    let mut buf = [0u8; 1024 * 64];
    let mut total: u64 = 0;
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| Error::input_unreadable(e, display))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok(total)
}

/// Compute the checksum of `inputs` under `fingerprint`.
///
/// Each input contributes its relative path string followed by its full
/// content, read from `base_dir`. Any unreadable input aborts the whole
/// computation: freshness cannot be established without it.
pub fn checksum(base_dir: &Path, inputs: &ResolvedInputs, fingerprint: u64) -> Result<String> {
    let span = tracing::debug_span!(
        "checksum",
        base = %base_dir.display(),
        inputs = inputs.len(),
        fingerprint
    );
    let _guard = span.enter();

    let mut hasher = Xxh3::with_seed(fingerprint);
    let mut total_bytes: u64 = 0;
    for rel in inputs {
        hasher.update(rel.as_os_str().as_encoded_bytes());
        total_bytes += fold_file(&mut hasher, &base_dir.join(rel), rel)?;
    }

    let value = hasher.digest();
    tracing::trace!(checksum = value, total_bytes, "Checksummed inputs");
    Ok(value.to_string())
}

/// Derive a configuration fingerprint from any serializable configuration.
///
/// The configuration is encoded as canonical JSON (object keys sorted), hashed
/// with SHA-256, and the first eight digest bytes are read as a big-endian
/// integer.
pub fn fingerprint<T>(config: &T) -> Result<u64>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(config)
        .map_err(|e| Error::serialization(format!("Failed to encode configuration: {e}")))?;
    let bytes = serde_json::to_vec(&value)
        .map_err(|e| Error::serialization(format!("Failed to serialize configuration: {e}")))?;
    let digest = Sha256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    Ok(u64::from_be_bytes(head))
}
