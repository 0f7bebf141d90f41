use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};

use fins_core::{JobId, SourceFile, SourceFormat};
use tracing::warn;

/// Compute SHA-256 of an in-memory byte slice.
pub fn sha256_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Encode a raw 32-byte hash as a lowercase hex string (64 chars).
pub fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Layout: `<upload_dir>/<job_id>.<ext>`
pub fn staged_path(upload_dir: &Path, job_id: JobId, format: SourceFormat) -> PathBuf {
    upload_dir.join(format!("{job_id}.{}", format.extension()))
}

/// Writes the upload to its staging path and fingerprints it.
pub async fn stage_upload(
    upload_dir: &Path,
    job_id: JobId,
    format: SourceFormat,
    original_name: &str,
    data: &[u8],
) -> io::Result<SourceFile> {
    tokio::fs::create_dir_all(upload_dir).await?;
    let path = staged_path(upload_dir, job_id, format);
    tokio::fs::write(&path, data).await?;

    Ok(SourceFile {
        path,
        format,
        original_name: original_name.to_string(),
        sha256: to_hex(&sha256_bytes(data)),
        size_bytes: data.len() as u64,
    })
}

/// Removes a staged upload. Failure is logged, never propagated.
pub async fn discard_upload(source: &SourceFile) {
    match tokio::fs::remove_file(&source.path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %source.path.display(), "failed to remove staged upload: {e}"),
    }
}
