use serde::{Deserialize, Serialize};

/// Simplified media category stored on every asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Image,
    Pdf,
    Other,
}

impl MediaKind {
    /// Classify a MIME type by prefix.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("audio/") {
            MediaKind::Audio
        } else if mime.starts_with("video/") {
            MediaKind::Video
        } else if mime.starts_with("image/") {
            MediaKind::Image
        } else if mime.starts_with("application/pdf") {
            MediaKind::Pdf
        } else {
            MediaKind::Other
        }
    }

    /// Classify a local file by extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "wav" | "mp3" | "flac" | "ogg" | "oga" | "m4a" | "aac" | "aif" | "aiff" | "opus" => {
                MediaKind::Audio
            }
            "mp4" | "mov" | "mkv" | "webm" | "avi" | "m4v" => MediaKind::Video,
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "svg" => MediaKind::Image,
            "pdf" => MediaKind::Pdf,
            _ => MediaKind::Other,
        }
    }

    /// Timeline media: comments anchor to a playback position.
    pub fn is_seekable(self) -> bool {
        matches!(self, MediaKind::Audio | MediaKind::Video)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Image => "image",
            MediaKind::Pdf => "pdf",
            MediaKind::Other => "other",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
