//! Upload-time registration of a local media file.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use bandhub_decode::{DecodeError, extract_peaks_from_file};
use bandhub_store::{AnnotationBackend, AssetId, Identity, MediaRecord, StoreError};
use bandhub_transport::MediaKind;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot decode audio: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" | "oga" => "audio/ogg",
        "m4a" | "aac" => "audio/aac",
        "aif" | "aiff" => "audio/aiff",
        "opus" => "audio/opus",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

/// Classify `path`, compute duration and envelope for audio, and register the asset.
/// A decode failure aborts the ingest so no partial envelope is ever stored.
pub fn ingest_file(
    backend: &dyn AnnotationBackend,
    path: &Path,
    uploader: &Identity,
    peak_count: usize,
) -> Result<AssetId, IngestError> {
    let size = std::fs::metadata(path)?.len();
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let mime_type = mime_for_extension(ext);
    let kind = match mime_type {
        Some(mime) => MediaKind::from_mime(mime),
        None => MediaKind::from_extension(ext),
    };

    let (duration, peaks) = if kind == MediaKind::Audio {
        let extraction = extract_peaks_from_file(path, peak_count, &AtomicBool::new(false))?;
        (
            Some(extraction.duration_secs),
            Some(extraction.envelope.into()),
        )
    } else {
        (None, None)
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let download_url = std::path::absolute(path)?.to_string_lossy().into_owned();

    let id = backend.register_asset(MediaRecord {
        name,
        kind,
        mime_type: mime_type.map(str::to_string),
        size,
        duration,
        peaks,
        download_url,
        lyrics: None,
        song_structure: None,
        uploaded_by: Some(uploader.uid.0.clone()),
        comment_count: 0,
    })?;

    log::info!("ingested {} as {kind} asset {id}", path.display());
    Ok(id)
}
