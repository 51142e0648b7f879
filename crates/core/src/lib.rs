pub mod annotations;
pub mod config;
pub mod ingest;
pub mod keys;
pub mod markers;
pub mod peaks;
pub mod playback;
pub mod session;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub use annotations::{AnnotationStore, FeedStatus};
pub use config::{KeyConfig, ResubscribeConfig, ReviewConfig};
pub use ingest::{IngestError, ingest_file};
pub use keys::{Focus, Key, Keymap, ShortcutAction, ShortcutHub, ShortcutRegistration};
pub use markers::{MARKER_WIDTH, MarkerColor, MarkerSync, Region, SeekRequest, TimelineClick};
pub use peaks::PeakJob;
pub use playback::{PlaybackEngine, PlaybackError, PlaybackEvent, PlaybackState};
pub use session::{CommentFilter, ReviewSession, SessionChanges, SessionError};
pub use time::{Timecode, Timeline};

pub use bandhub_decode::{DecodeError, PeakExtraction, extract_peaks_from_file};
pub use bandhub_engine::ClockOpener;
pub use bandhub_store::{
    AnnotationBackend, AssetId, AssetNotes, CacheStatus, Comment, CommentId, Identity, MediaAsset,
    MemoryBackend, StoreError, UserId, load_store, save_store, save_store_packed,
};
pub use bandhub_transport::{MediaKind, PeakEnvelope};
