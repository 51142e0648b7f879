//! Headless media clock.
//!
//! Stands in for the platform media decoder: it opens a media URL on a background
//! thread, reports readiness once container metadata is known, and advances a
//! rate-scaled position while playing. The engine side talks to it only through the
//! `rtrb` rings of a [`MediaLink`]; dropping the link stops the thread.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use bandhub_decode::{probe_file, resolve_media_url};
use bandhub_transport::{
    Command, MediaLink, MediaOpener, SourceLink, Status, clamp_rate, media_link,
};

const LINK_CAPACITY: usize = 256;

/// Position update interval (~60 Hz).
pub const DEFAULT_TICK: Duration = Duration::from_millis(16);

/// Transport state owned by the clock thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockState {
    pub playing: bool,
    pub position: f64,
    pub rate: f64,
    pub duration: f64,
}

impl ClockState {
    pub fn new(duration: f64) -> Self {
        Self {
            playing: false,
            position: 0.0,
            rate: 1.0,
            duration: duration.max(0.0),
        }
    }

    /// Apply one command, returning the status updates it produces.
    pub fn apply(&mut self, command: Command) -> Vec<Status> {
        match command {
            Command::Play => {
                self.playing = true;
                Vec::new()
            }
            Command::Pause => {
                self.playing = false;
                Vec::new()
            }
            Command::Seek { seconds } => {
                let target = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
                if target > self.duration {
                    self.finish()
                } else {
                    self.position = target;
                    vec![Status::Position(target)]
                }
            }
            Command::SetRate(rate) => {
                self.rate = clamp_rate(rate);
                Vec::new()
            }
        }
    }

    /// Advance the position by `elapsed` wall time scaled by the playback rate.
    pub fn advance(&mut self, elapsed: Duration) -> Vec<Status> {
        if !self.playing {
            return Vec::new();
        }

        self.position += elapsed.as_secs_f64() * self.rate;
        if self.position >= self.duration {
            self.finish()
        } else {
            vec![Status::Position(self.position)]
        }
    }

    fn finish(&mut self) -> Vec<Status> {
        self.position = self.duration;
        self.playing = false;
        vec![Status::Position(self.duration), Status::Ended]
    }
}

/// Opens media URLs as clock-driven sources.
#[derive(Debug, Clone)]
pub struct ClockOpener {
    tick: Duration,
}

impl ClockOpener {
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }
}

impl Default for ClockOpener {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

impl MediaOpener for ClockOpener {
    fn open(&mut self, url: &str) -> anyhow::Result<MediaLink> {
        let path = resolve_media_url(url)?;
        let (link, source) = media_link(LINK_CAPACITY);
        let tick = self.tick;

        thread::Builder::new()
            .name("media-clock".to_string())
            .spawn(move || run_clock(path, source, tick))?;

        Ok(link)
    }
}

fn run_clock(path: PathBuf, mut source: SourceLink, tick: Duration) {
    let mut outbox = Outbox::default();
    let info = match probe_file(&path) {
        Ok(info) => info,
        Err(e) => {
            log::warn!("failed to open {}: {e}", path.display());
            outbox.send(&mut source, Status::Failed(e.to_string()));
            wait_for_room(&mut outbox, &mut source, tick);
            return;
        }
    };

    let mut clock = ClockState::new(info.duration_secs);
    outbox.send(
        &mut source,
        Status::Ready {
            duration: clock.duration,
        },
    );

    let mut last = Instant::now();

    while !source.is_detached() {
        outbox.flush(&mut source);

        while let Ok(command) = source.commands.pop() {
            for status in clock.apply(command) {
                outbox.send(&mut source, status);
            }
        }

        let now = Instant::now();
        for status in clock.advance(now - last) {
            outbox.send(&mut source, status);
        }
        last = now;

        thread::sleep(tick);
    }

    log::debug!("media clock for {} detached", path.display());
}

/// Keep retrying held statuses until they are delivered or the engine goes away.
fn wait_for_room(outbox: &mut Outbox, source: &mut SourceLink, tick: Duration) {
    while !outbox.is_empty() && !source.is_detached() {
        thread::sleep(tick);
        outbox.flush(source);
    }
}

/// Statuses waiting for room in the ring.
///
/// Position updates are dropped when the ring is full since a newer one follows. Every
/// other status is held and delivered in order once the engine drains the ring.
#[derive(Debug, Default)]
struct Outbox {
    held: VecDeque<Status>,
}

impl Outbox {
    fn send(&mut self, source: &mut SourceLink, status: Status) {
        self.flush(source);
        let is_position = matches!(status, Status::Position(_));

        if self.held.is_empty() && source.status.slots() > 0 {
            let _ = source.status.push(status);
        } else if is_position {
            log::trace!("status ring full, dropping position update");
        } else {
            self.held.push_back(status);
        }
    }

    fn flush(&mut self, source: &mut SourceLink) {
        while source.status.slots() > 0 {
            let Some(status) = self.held.pop_front() else {
                break;
            };
            let _ = source.status.push(status);
        }
    }

    fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}
