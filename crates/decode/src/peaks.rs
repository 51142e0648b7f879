//! Upload-time peak extraction.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use bandhub_transport::{AudioArc, PeakEnvelope};

use crate::{DecodeError, decode_bytes, decode_file_cancellable};

/// Envelope plus the asset duration it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakExtraction {
    pub envelope: PeakEnvelope,
    pub duration_secs: f64,
}

pub fn extract_peaks(audio: &AudioArc, count: usize) -> PeakExtraction {
    PeakExtraction {
        envelope: PeakEnvelope::from_audio_arc(audio, count),
        duration_secs: audio.duration_secs(),
    }
}

/// Decode `path` and compute its envelope. Nothing is returned unless the whole
/// asset decoded, so a caller never sees a partial envelope.
pub fn extract_peaks_from_file(
    path: &Path,
    count: usize,
    cancel: &AtomicBool,
) -> Result<PeakExtraction, DecodeError> {
    let audio = decode_file_cancellable(path, cancel)?;
    Ok(extract_peaks(&audio, count))
}

pub fn extract_peaks_from_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
    count: usize,
) -> Result<PeakExtraction, DecodeError> {
    let audio = decode_bytes(bytes, extension)?;
    Ok(extract_peaks(&audio, count))
}
