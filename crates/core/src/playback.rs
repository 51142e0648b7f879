//! Transport control for one loaded media asset.
//!
//! The engine never touches media data itself. It forwards [`Command`]s to a source
//! opened through a [`MediaOpener`] and folds the [`Status`] updates it gets back into
//! its own state. [`PlaybackEngine::poll`] must be called regularly, typically once
//! per frame.

use bandhub_transport::{
    Command, MediaLink, MediaOpener, PeakEnvelope, Status, clamp_rate,
};
use crossbeam::channel::{self, Receiver, Sender};

use crate::time::Timeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Unloaded,
    Loading,
    Paused,
    Playing,
    Ended,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }

    /// Metadata is known and transport commands take effect.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            PlaybackState::Paused | PlaybackState::Playing | PlaybackState::Ended
        )
    }
}

/// Published to every observer, in the order the engine applied them.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Ready { duration: f64 },
    Play,
    Pause,
    PositionChanged(f64),
    Ended,
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("failed to open {url}: {reason}")]
    Open { url: String, reason: String },
}

pub struct PlaybackEngine {
    opener: Box<dyn MediaOpener + Send>,
    link: Option<MediaLink>,
    state: PlaybackState,
    position: f64,
    duration: f64,
    rate: f64,
    url: Option<String>,
    peaks: Option<PeakEnvelope>,
    observers: Vec<Sender<PlaybackEvent>>,
}

impl PlaybackEngine {
    pub fn new(opener: impl MediaOpener + Send + 'static) -> Self {
        Self {
            opener: Box::new(opener),
            link: None,
            state: PlaybackState::Unloaded,
            position: 0.0,
            duration: 0.0,
            rate: 1.0,
            url: None,
            peaks: None,
            observers: Vec::new(),
        }
    }

    /// Register an observer. It is dropped from the list once its receiver goes away.
    pub fn subscribe(&mut self) -> Receiver<PlaybackEvent> {
        let (sender, receiver) = channel::unbounded();
        self.observers.push(sender);
        receiver
    }

    /// Open `url` and start buffering. Returns once the source is opened; readiness
    /// arrives later through [`Self::poll`]. Until then `duration_hint` stands in for
    /// the duration.
    pub fn load(
        &mut self,
        url: &str,
        peaks: Option<PeakEnvelope>,
        duration_hint: Option<f64>,
    ) -> Result<(), PlaybackError> {
        self.unload();

        let link = match self.opener.open(url) {
            Ok(link) => link,
            Err(e) => {
                log::warn!("failed to open {url}: {e:#}");
                self.emit(PlaybackEvent::Error(e.to_string()));
                return Err(PlaybackError::Open {
                    url: url.to_string(),
                    reason: format!("{e:#}"),
                });
            }
        };

        self.link = Some(link);
        self.url = Some(url.to_string());
        self.peaks = peaks;
        self.duration = duration_hint
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0);
        self.state = PlaybackState::Loading;
        if self.rate != 1.0 {
            self.send(Command::SetRate(self.rate));
        }

        log::debug!("loading {url}");
        Ok(())
    }

    /// Detach the current source. The playback rate is kept for the next load.
    pub fn unload(&mut self) {
        if self.link.take().is_some() {
            log::debug!("unloaded {}", self.url.as_deref().unwrap_or_default());
        }
        self.state = PlaybackState::Unloaded;
        self.position = 0.0;
        self.duration = 0.0;
        self.url = None;
        self.peaks = None;
    }

    /// Apply every status the source has reported since the last poll. Returns the
    /// latest position if it changed.
    pub fn poll(&mut self) -> Option<f64> {
        let link = self.link.as_mut()?;
        let statuses: Vec<Status> = std::iter::from_fn(|| link.status.pop().ok()).collect();
        let detached = link.is_detached();

        let mut position_changed = None;
        for status in statuses {
            match status {
                Status::Ready { duration } => {
                    if duration.is_finite() && duration > 0.0 {
                        self.duration = duration;
                    }
                    if self.state == PlaybackState::Loading {
                        self.state = PlaybackState::Paused;
                    }
                    log::debug!("media ready, duration {:.3}s", self.duration);
                    self.emit(PlaybackEvent::Ready {
                        duration: self.duration,
                    });
                }
                Status::Position(seconds) => {
                    self.position = seconds;
                    position_changed = Some(seconds);
                    self.emit(PlaybackEvent::PositionChanged(seconds));
                }
                Status::Ended => {
                    self.state = PlaybackState::Ended;
                    self.emit(PlaybackEvent::Ended);
                }
                Status::Failed(reason) => {
                    log::warn!("media source failed: {reason}");
                    self.link = None;
                    self.state = PlaybackState::Unloaded;
                    self.emit(PlaybackEvent::Error(reason));
                    return position_changed;
                }
            }
        }

        if detached {
            log::warn!("media source closed unexpectedly");
            self.link = None;
            self.state = PlaybackState::Unloaded;
            self.emit(PlaybackEvent::Error("media source closed".to_string()));
        }

        position_changed
    }

    /// Start playback. From `Ended` this restarts at 0. Ignored until the media is ready.
    pub fn play(&mut self) {
        match self.state {
            PlaybackState::Paused => {}
            PlaybackState::Ended => {
                self.send(Command::Seek { seconds: 0.0 });
                self.position = 0.0;
                self.emit(PlaybackEvent::PositionChanged(0.0));
            }
            PlaybackState::Playing => return,
            PlaybackState::Unloaded | PlaybackState::Loading => {
                log::debug!("play ignored while {:?}", self.state);
                return;
            }
        }

        self.send(Command::Play);
        self.state = PlaybackState::Playing;
        self.emit(PlaybackEvent::Play);
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        self.send(Command::Pause);
        self.state = PlaybackState::Paused;
        self.emit(PlaybackEvent::Pause);
    }

    pub fn toggle_play(&mut self) {
        if self.state.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Seek to `seconds`, clamped to the media's range.
    pub fn seek_to(&mut self, seconds: f64) {
        if self.link.is_none() {
            return;
        }
        let target = Timeline::new(self.duration).clamp(seconds);
        self.move_to(target);
    }

    /// Relative seek. Only the lower bound is enforced; moving past the end lets the
    /// source report the media as ended.
    pub fn skip(&mut self, delta: f64) {
        if self.link.is_none() || !delta.is_finite() {
            return;
        }
        let target = (self.position + delta).max(0.0);
        self.move_to(target);
    }

    fn move_to(&mut self, target: f64) {
        self.send(Command::Seek { seconds: target });
        self.position = target;
        if self.state == PlaybackState::Ended && target < self.duration {
            self.state = PlaybackState::Paused;
        }
        self.emit(PlaybackEvent::PositionChanged(target));
    }

    /// Returns the rate actually applied.
    pub fn set_playback_rate(&mut self, rate: f64) -> f64 {
        self.rate = clamp_rate(rate);
        self.send(Command::SetRate(self.rate));
        self.rate
    }

    /// Step the rate by `step`, rounding to one decimal so repeated steps do not drift.
    pub fn change_rate(&mut self, step: f64) -> f64 {
        let stepped = ((self.rate + step) * 10.0).round() / 10.0;
        self.set_playback_rate(stepped)
    }

    pub fn current_time(&self) -> f64 {
        self.position
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn playback_rate(&self) -> f64 {
        self.rate
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn peaks(&self) -> Option<&PeakEnvelope> {
        self.peaks.as_ref()
    }

    /// Attach an envelope computed after loading.
    pub fn set_peaks(&mut self, peaks: PeakEnvelope) {
        self.peaks = Some(peaks);
    }

    fn send(&mut self, command: Command) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if let Err(e) = link.commands.push(command) {
            log::warn!("dropping transport command: {e:?}");
        }
    }

    fn emit(&mut self, event: PlaybackEvent) {
        self.observers
            .retain(|observer| observer.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeOpener;

    fn ready_engine(duration: f64) -> (PlaybackEngine, FakeOpener) {
        let opener = FakeOpener::new();
        let mut engine = PlaybackEngine::new(opener.clone());
        engine.load("/media/take.wav", None, None).expect("load");
        opener.send(Status::Ready { duration });
        engine.poll();
        opener.commands();
        (engine, opener)
    }

    #[test]
    fn test_load_uses_duration_hint_until_ready() {
        let opener = FakeOpener::new();
        let mut engine = PlaybackEngine::new(opener.clone());

        engine.load("/media/take.wav", None, Some(90.0)).expect("load");
        assert_eq!(engine.state(), PlaybackState::Loading);
        assert_eq!(engine.duration(), 90.0);

        opener.send(Status::Ready { duration: 91.5 });
        engine.poll();

        assert_eq!(engine.state(), PlaybackState::Paused);
        assert_eq!(engine.duration(), 91.5);
    }

    #[test]
    fn test_play_ignored_while_loading() {
        let opener = FakeOpener::new();
        let mut engine = PlaybackEngine::new(opener.clone());
        engine.load("/media/take.wav", None, None).expect("load");

        engine.play();

        assert_eq!(engine.state(), PlaybackState::Loading);
        assert!(opener.commands().is_empty());
    }

    #[test]
    fn test_play_pause_are_idempotent() {
        let (mut engine, opener) = ready_engine(30.0);

        engine.play();
        engine.play();
        assert_eq!(opener.commands(), vec![Command::Play]);

        engine.pause();
        engine.pause();
        assert_eq!(opener.commands(), vec![Command::Pause]);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let (mut engine, _opener) = ready_engine(30.0);

        for (target, expected) in [(12.0, 12.0), (-3.0, 0.0), (45.0, 30.0), (30.0, 30.0)] {
            engine.seek_to(target);
            assert_eq!(engine.current_time(), expected);
        }
    }

    #[test]
    fn test_skip_has_no_upper_clamp() {
        let (mut engine, opener) = ready_engine(10.0);
        engine.seek_to(8.0);
        engine.skip(5.0);
        engine.skip(-20.0);

        assert_eq!(opener.seeks(), vec![8.0, 13.0, 0.0]);
        assert_eq!(engine.current_time(), 0.0);
    }

    #[test]
    fn test_rate_is_clamped_and_rounded() {
        let (mut engine, _opener) = ready_engine(10.0);

        assert_eq!(engine.set_playback_rate(5.0), 2.0);
        assert_eq!(engine.set_playback_rate(0.1), 0.25);

        engine.set_playback_rate(1.0);
        engine.change_rate(0.1);
        engine.change_rate(0.1);
        assert_eq!(engine.change_rate(0.1), 1.3);
    }

    #[test]
    fn test_play_after_end_restarts() {
        let (mut engine, opener) = ready_engine(10.0);
        engine.play();
        opener.send(Status::Position(10.0));
        opener.send(Status::Ended);
        engine.poll();
        assert_eq!(engine.state(), PlaybackState::Ended);
        opener.commands();

        engine.play();

        assert_eq!(
            opener.commands(),
            vec![Command::Seek { seconds: 0.0 }, Command::Play]
        );
        assert_eq!(engine.current_time(), 0.0);
        assert!(engine.is_playing());
    }

    #[test]
    fn test_observers_receive_transitions() {
        let opener = FakeOpener::new();
        let mut engine = PlaybackEngine::new(opener.clone());
        let events = engine.subscribe();

        engine.load("/media/take.wav", None, None).expect("load");
        opener.send(Status::Ready { duration: 4.0 });
        engine.poll();
        engine.play();
        opener.send(Status::Position(1.5));
        engine.poll();
        engine.pause();

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                PlaybackEvent::Ready { duration: 4.0 },
                PlaybackEvent::Play,
                PlaybackEvent::PositionChanged(1.5),
                PlaybackEvent::Pause,
            ]
        );
    }

    #[test]
    fn test_dropped_observers_are_pruned() {
        let (mut engine, _opener) = ready_engine(4.0);
        drop(engine.subscribe());

        engine.play();

        assert!(engine.observers.is_empty());
    }

    #[test]
    fn test_open_failure_reports_error() {
        let mut engine = PlaybackEngine::new(FakeOpener::new());
        let events = engine.subscribe();

        let result = engine.load("/media/missing.wav", None, None);

        assert!(matches!(result, Err(PlaybackError::Open { .. })));
        assert_eq!(engine.state(), PlaybackState::Unloaded);
        assert!(matches!(events.try_recv(), Ok(PlaybackEvent::Error(_))));
    }

    #[test]
    fn test_source_failure_unloads() {
        let opener = FakeOpener::new();
        let mut engine = PlaybackEngine::new(opener.clone());
        engine.load("/media/take.wav", None, None).expect("load");

        opener.send(Status::Failed("corrupt header".to_string()));
        engine.poll();

        assert_eq!(engine.state(), PlaybackState::Unloaded);
    }

    #[test]
    fn test_rate_survives_reload() {
        let (mut engine, opener) = ready_engine(10.0);
        engine.set_playback_rate(1.5);

        engine.load("/media/other.wav", None, None).expect("load");

        assert_eq!(opener.commands(), vec![Command::SetRate(1.5)]);
    }
}
