//! Lock-free link between the playback engine and a media source.
//!
//! The engine owns a [`MediaLink`] and pushes [`Command`]s; the source owns the matching
//! [`SourceLink`] and pushes [`Status`] updates back. Dropping either end detaches it, which
//! the other side observes through `is_detached`.

/// Transport command sent from the engine to the media source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Seek { seconds: f64 },
    SetRate(f64),
}

/// Status reported by the media source.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// Metadata is available; `duration` is authoritative from here on.
    Ready { duration: f64 },
    /// Current position in seconds.
    Position(f64),
    /// Playback reached the end of the media.
    Ended,
    /// The source could not be opened or decoded.
    Failed(String),
}

pub struct MediaLink {
    pub commands: rtrb::Producer<Command>,
    pub status: rtrb::Consumer<Status>,
}

impl MediaLink {
    /// True once the source end has been dropped.
    pub fn is_detached(&self) -> bool {
        self.status.is_abandoned()
    }
}

pub struct SourceLink {
    pub commands: rtrb::Consumer<Command>,
    pub status: rtrb::Producer<Status>,
}

impl SourceLink {
    /// True once the engine end has been dropped.
    pub fn is_detached(&self) -> bool {
        self.commands.is_abandoned()
    }
}

/// Create a connected engine/source pair with `capacity` slots in each direction.
pub fn media_link(capacity: usize) -> (MediaLink, SourceLink) {
    let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(capacity);
    let (status_tx, status_rx) = rtrb::RingBuffer::<Status>::new(capacity);

    (
        MediaLink {
            commands: command_tx,
            status: status_rx,
        },
        SourceLink {
            commands: command_rx,
            status: status_tx,
        },
    )
}

/// Opens a media URL and returns the engine end of its link.
///
/// Implementations must not block on decoding; readiness is reported later
/// through [`Status::Ready`].
pub trait MediaOpener {
    fn open(&mut self, url: &str) -> anyhow::Result<MediaLink>;
}
