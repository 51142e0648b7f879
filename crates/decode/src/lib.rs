mod peaks;

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use bandhub_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub use peaks::{PeakExtraction, extract_peaks, extract_peaks_from_bytes, extract_peaks_from_file};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media error: {0}")]
    Media(#[from] symphonia::core::errors::Error),

    #[error("no decodable track")]
    NoTrack,

    #[error("media not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported media url: {0}")]
    UnsupportedUrl(String),

    #[error("decoding cancelled")]
    Cancelled,
}

/// Basic stream information read from container metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Resolve a media URL to a local path the decoder can open.
/// Accepts plain paths and `file://` URLs. Remote URLs must be fetched into the
/// local cache first.
pub fn resolve_media_url(url: &str) -> Result<PathBuf, DecodeError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Err(DecodeError::UnsupportedUrl(url.to_string()));
    }

    let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
    if path.exists() {
        Ok(path)
    } else {
        Err(DecodeError::NotFound(path))
    }
}

pub fn decode_file(path: &Path) -> Result<AudioArc, DecodeError> {
    decode_file_cancellable(path, &AtomicBool::new(false))
}

/// Decode a whole file, checking `cancel` between packets.
pub fn decode_file_cancellable(path: &Path, cancel: &AtomicBool) -> Result<AudioArc, DecodeError> {
    if !path.exists() {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let audio = decode_stream(mss, hint_for(path), cancel)?;
    log::debug!("decoded {}: {:?}", path.display(), audio);
    Ok(audio)
}

/// Decode an in-memory encoded asset. `extension` is a format hint such as `"wav"`.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioArc, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    decode_stream(mss, hint, &AtomicBool::new(false))
}

/// Read duration and layout without decoding the whole asset when the container
/// declares its frame count.
pub fn probe_file(path: &Path) -> Result<MediaInfo, DecodeError> {
    if !path.exists() {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let format = open_format(mss, hint_for(path))?;

    let track = format.default_track().ok_or(DecodeError::NoTrack)?;
    let params = &track.codec_params;
    let channels = params.channels.map(|c| c.count()).unwrap_or(2) as u16;

    if let (Some(frames), Some(sample_rate)) = (params.n_frames, params.sample_rate) {
        if sample_rate > 0 {
            return Ok(MediaInfo {
                duration_secs: frames as f64 / sample_rate as f64,
                sample_rate,
                channels,
            });
        }
    }

    // Frame count unknown (e.g. some streamed formats); fall back to a full decode.
    let audio = decode_file(path)?;
    Ok(MediaInfo {
        duration_secs: audio.duration_secs(),
        sample_rate: audio.sample_rate(),
        channels: audio.channels(),
    })
}

fn hint_for(path: &Path) -> Hint {
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    hint
}

fn open_format(mss: MediaSourceStream, hint: Hint) -> Result<Box<dyn FormatReader>, DecodeError> {
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    Ok(probed.format)
}

fn decode_stream(
    mss: MediaSourceStream,
    hint: Hint,
    cancel: &AtomicBool,
) -> Result<AudioArc, DecodeError> {
    let mut format = open_format(mss, hint)?;

    let track = format.default_track().ok_or(DecodeError::NoTrack)?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(DecodeError::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;

        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if channels == 0 {
        return Err(DecodeError::NoTrack);
    }

    Ok(AudioArc::new(samples, sample_rate, channels))
}
