//! On-disk layout for encrypted files.
//!
//! A ciphertext file `<name>.enc` is accompanied by a metadata sidecar
//! `<name>.enc.lit` holding the canonical metadata JSON.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

use haven_crypt_core::{decode_metadata, encode_metadata, EncryptionMetadata};

use crate::error::{EngineError, Result};

/// Extension appended to plaintext paths for ciphertext output.
pub const CIPHERTEXT_EXTENSION: &str = "enc";

/// Extension appended to ciphertext paths for the metadata sidecar.
pub const SIDECAR_EXTENSION: &str = "lit";

fn append_extension(path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// `<path>.lit`
pub fn sidecar_path(ciphertext_path: &Path) -> PathBuf {
    append_extension(ciphertext_path, SIDECAR_EXTENSION)
}

/// `<path>.enc`
pub fn default_ciphertext_path(input: &Path) -> PathBuf {
    append_extension(input, CIPHERTEXT_EXTENSION)
}

/// Strip a trailing `.enc`, otherwise `<stem>_decrypted<.ext>` next to the input.
pub fn default_decrypt_output(input: &Path) -> PathBuf {
    if input.extension().is_some_and(|ext| ext == CIPHERTEXT_EXTENSION) {
        return input.with_extension("");
    }

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}_decrypted.{}", ext.to_string_lossy()),
        None => format!("{stem}_decrypted"),
    };
    input.with_file_name(name)
}

/// Write `metadata` to `path` as canonical JSON.
pub async fn write_sidecar(path: &Path, metadata: &EncryptionMetadata) -> Result<()> {
    let json = encode_metadata(metadata)?;
    tokio::fs::write(path, json.as_bytes())
        .await
        .map_err(|e| EngineError::storage(path, e))?;
    debug!(path = %path.display(), "wrote metadata sidecar");
    Ok(())
}

/// Read and validate a sidecar.
pub async fn read_sidecar(path: &Path) -> Result<EncryptionMetadata> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EngineError::storage(path, e))?;
    Ok(decode_metadata(&json)?)
}

/// Remove a sidecar. Returns false if it did not exist.
pub async fn remove_sidecar(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(EngineError::storage(path, e)),
    }
}
