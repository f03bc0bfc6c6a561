//! Utility functions used in all other neuroconnectivity modules.

use std::path::Path;
use std::io::Write;
use std::time::UNIX_EPOCH;

use crate::error::Result;

use sha2::{Digest, Sha256};

/// Check whether the file extension ends with ".gz".
pub fn is_gz_file<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false)
}


/// Write the string into a fixed length field, truncating or padding with '\0' as needed.
pub fn write_fixed_length_string<S>(output: &mut S, value: &str, len: usize) -> Result<()>
where
    S: Write,
{
    let mut field = vec![0u8; len];
    for (dst, src) in field.iter_mut().zip(value.bytes()) {
        *dst = src;
    }
    output.write_all(&field)?;
    Ok(())
}


/// Feed a file's identity (canonical path, size and modification time) into a hasher.
///
/// The file content is not read, so this is cheap even for large 4D images. It changes whenever the
/// file is replaced or rewritten.
pub fn hash_file_identity<P: AsRef<Path>>(hasher: &mut Sha256, path: P) -> Result<()> {
    let canonical = path.as_ref().canonicalize()?;
    let meta = std::fs::metadata(&canonical)?;
    let mtime_nanos = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    hasher.update(canonical.to_string_lossy().as_bytes());
    hasher.update(meta.len().to_le_bytes());
    hasher.update(mtime_nanos.to_le_bytes());
    Ok(())
}
