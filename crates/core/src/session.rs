use std::sync::Arc;
use std::time::Instant;

use bandhub_decode::resolve_media_url;
use bandhub_store::{
    AnnotationBackend, AssetId, CacheStatus, Comment, CommentId, Identity, MediaAsset, Reply,
    StoreError,
};
use bandhub_transport::{MediaKind, MediaOpener};
use crossbeam::channel::Receiver;
use serde::{Deserialize, Serialize};

use crate::annotations::{AnnotationStore, FeedStatus};
use crate::config::ReviewConfig;
use crate::keys::{Keymap, ShortcutAction, ShortcutHub, ShortcutRegistration};
use crate::markers::{MarkerSync, Region, SeekRequest, TimelineClick};
use crate::peaks::PeakJob;
use crate::playback::{PlaybackEngine, PlaybackError, PlaybackEvent};

/// Which comments the list view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentFilter {
    #[default]
    All,
    Unresolved,
    /// Authored by the current user.
    Mine,
}

impl CommentFilter {
    pub fn matches(self, comment: &Comment, me: &Identity) -> bool {
        match self {
            CommentFilter::All => true,
            CommentFilter::Unresolved => !comment.resolved,
            CommentFilter::Mine => comment.is_authored_by(&me.uid),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no asset loaded")]
    NoAsset,

    #[error("no comment position selected")]
    NoAnchor,

    #[error("text is empty")]
    EmptyText,

    #[error("only the author can delete this comment")]
    NotOwner,

    #[error("unknown comment: {0}")]
    UnknownComment(CommentId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// What a [`ReviewSession::poll`] call changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionChanges {
    pub position: Option<f64>,
    pub comments: bool,
    pub peaks: bool,
}

#[derive(Debug, Default)]
struct Retry {
    attempts: u32,
    next_at: Option<Instant>,
}

/// Review of one media asset at a time: playback, the live comment list, timeline
/// markers and shortcuts.
pub struct ReviewSession {
    config: ReviewConfig,
    identity: Identity,
    backend: Arc<dyn AnnotationBackend>,
    cache: CacheStatus,
    engine: PlaybackEngine,
    engine_events: Receiver<PlaybackEvent>,
    annotations: AnnotationStore,
    markers: MarkerSync,
    asset: Option<MediaAsset>,
    peak_job: Option<PeakJob>,
    filter: CommentFilter,
    retry: Retry,
    keymap: Keymap,
    shortcuts: Option<ShortcutRegistration>,
}

impl ReviewSession {
    pub fn new(
        backend: Arc<dyn AnnotationBackend>,
        opener: impl MediaOpener + Send + 'static,
        identity: Identity,
        cache: CacheStatus,
        config: ReviewConfig,
    ) -> Self {
        let mut engine = PlaybackEngine::new(opener);
        let engine_events = engine.subscribe();

        Self {
            annotations: AnnotationStore::new(Arc::clone(&backend)),
            markers: MarkerSync::new(config.marker_width),
            keymap: Keymap::from_config(&config),
            filter: config.default_filter,
            config,
            identity,
            backend,
            cache,
            engine,
            engine_events,
            asset: None,
            peak_job: None,
            retry: Retry::default(),
            shortcuts: None,
        }
    }

    /// Switch to `id`. Everything tied to the previous asset is torn down first, so
    /// nothing it delivers late can reach the new comment list.
    ///
    /// A playback failure is returned after the comment feed is attached; the
    /// comments stay reviewable.
    pub fn load_asset(&mut self, id: &AssetId) -> Result<(), SessionError> {
        self.close();

        let asset = self.backend.asset(id)?;
        log::info!("loading {} asset {} ({})", asset.kind, asset.id, asset.name);

        if let Err(e) = self.annotations.subscribe(id) {
            log::warn!("comments for {id} unavailable: {e}");
        }

        let url = match self.cache.local_path(id) {
            Some(path) => path.to_string_lossy().into_owned(),
            None => asset.url.clone(),
        };
        let needs_peaks = asset.kind == MediaKind::Audio && asset.peaks.is_none();
        let seekable = asset.is_seekable();
        let (peaks, duration) = (asset.peaks.clone(), asset.duration);
        self.asset = Some(asset);

        if needs_peaks {
            match resolve_media_url(&url) {
                Ok(path) => {
                    self.peak_job = Some(PeakJob::spawn(id.clone(), path, self.config.peak_count))
                }
                Err(e) => log::debug!("no local audio for peaks: {e}"),
            }
        }

        if seekable {
            self.engine.load(&url, peaks, duration)?;
        }
        self.render_markers();
        Ok(())
    }

    /// Tear down the loaded asset, if any.
    pub fn close(&mut self) {
        if let Some(job) = self.peak_job.take() {
            job.cancel();
        }
        self.annotations.detach();
        self.engine.unload();
        self.markers.reset();
        self.retry = Retry::default();
        self.asset = None;
    }

    /// Drive the session forward: shortcuts, playback status, comment feed, peak job.
    pub fn poll(&mut self) -> SessionChanges {
        let mut changes = SessionChanges::default();

        let actions = self
            .shortcuts
            .as_ref()
            .map(ShortcutRegistration::drain)
            .unwrap_or_default();
        for action in actions {
            self.apply_shortcut(action);
        }

        changes.position = self.engine.poll();
        let mut rerender = false;
        for event in self.engine_events.try_iter() {
            match event {
                PlaybackEvent::Ready { .. } => rerender = true,
                PlaybackEvent::Error(reason) => log::warn!("playback error: {reason}"),
                _ => {}
            }
        }

        if self.annotations.poll() {
            changes.comments = true;
            rerender = true;
        }
        self.poll_retry();

        let finished = self.peak_job.as_ref().and_then(PeakJob::try_finish);
        if let Some(result) = finished {
            self.peak_job = None;
            if let Ok(extraction) = result {
                self.engine.set_peaks(extraction.envelope);
                changes.peaks = true;
            }
        }

        if rerender {
            self.render_markers();
        }
        changes
    }

    fn poll_retry(&mut self) {
        match self.annotations.status() {
            FeedStatus::Failed(_) => {}
            FeedStatus::Live => {
                self.retry = Retry::default();
                return;
            }
            FeedStatus::Pending | FeedStatus::Detached => return,
        }
        let Some(asset) = self.asset.as_ref().map(|a| a.id.clone()) else {
            return;
        };

        let now = Instant::now();
        if self.retry.next_at.is_none() && self.retry.attempts < self.config.resubscribe.max_attempts
        {
            self.retry.next_at = Some(now + self.config.resubscribe.delay(self.retry.attempts));
        }
        if self.retry.next_at.is_some_and(|at| now >= at) {
            self.retry.next_at = None;
            self.retry.attempts += 1;
            log::info!(
                "resubscribing to comments on {asset} (attempt {})",
                self.retry.attempts
            );
            if let Err(e) = self.annotations.subscribe(&asset) {
                log::warn!("resubscribe failed: {e}");
            }
        }
    }

    /// Resubscribe now, with a fresh retry budget.
    pub fn retry_comments(&mut self) -> Result<(), SessionError> {
        let asset = self.asset.as_ref().ok_or(SessionError::NoAsset)?.id.clone();
        self.retry = Retry::default();
        self.annotations.subscribe(&asset)?;
        Ok(())
    }

    fn render_markers(&mut self) {
        let seekable = self.asset.as_ref().is_some_and(MediaAsset::is_seekable);
        self.markers
            .render(self.annotations.comments(), self.engine.duration(), seekable);
    }

    fn timeline_ready(&self) -> bool {
        self.asset.as_ref().is_some_and(MediaAsset::is_seekable) && self.engine.url().is_some()
    }

    /// Start composing a comment anchored at the current playback position.
    pub fn request_comment_at_playhead(&mut self) -> Option<f64> {
        if !self.timeline_ready() {
            return None;
        }
        self.markers.compose_at(self.engine.current_time());
        self.markers.pending_anchor()
    }

    /// Start composing a comment on non-timeline media.
    pub fn request_comment(&mut self) -> Result<(), SessionError> {
        if self.asset.is_none() {
            return Err(SessionError::NoAsset);
        }
        self.markers.compose_at(0.0);
        Ok(())
    }

    /// A click on the waveform at `relative` (0.0..=1.0). Hitting a marker selects it
    /// and seeks; empty space captures an anchor for a new comment.
    /// Refused until the media duration is known, so a click never maps to a guessed time.
    pub fn click_timeline(&mut self, relative: f64) -> Option<TimelineClick> {
        if !self.timeline_ready() || self.engine.duration() <= 0.0 {
            return None;
        }
        let click = self.markers.click(relative, self.engine.duration());
        if let TimelineClick::Selected { seek, .. } = &click {
            self.engine.seek_to(seek.seconds);
            self.render_markers();
        }
        Some(click)
    }

    pub fn pending_anchor(&self) -> Option<f64> {
        self.markers.pending_anchor()
    }

    pub fn cancel_comment(&mut self) {
        self.markers.cancel_compose();
    }

    /// Create a comment at the pending anchor. The comment appears with the next
    /// snapshot; the anchor is kept if the store rejects the write.
    pub fn add_comment(&mut self, text: &str) -> Result<CommentId, SessionError> {
        let asset = self.asset.as_ref().ok_or(SessionError::NoAsset)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyText);
        }

        // Non-timeline media stores a 0 sentinel that is never rendered.
        let anchor = if asset.is_seekable() {
            self.markers.pending_anchor().ok_or(SessionError::NoAnchor)?
        } else {
            0.0
        };

        match self.annotations.create(anchor, text, &self.identity) {
            Ok(id) => {
                self.markers.take_anchor();
                log::debug!("created comment {id} at {anchor:.2}s");
                Ok(id)
            }
            Err(e) => {
                log::warn!("failed to create comment: {e}");
                Err(e.into())
            }
        }
    }

    pub fn resolve_comment(&mut self, id: &CommentId, resolved: bool) -> Result<(), SessionError> {
        self.known_comment(id)?;
        self.annotations.set_resolved(id, resolved).map_err(|e| {
            log::warn!("failed to update comment {id}: {e}");
            e.into()
        })
    }

    pub fn delete_comment(&mut self, id: &CommentId) -> Result<(), SessionError> {
        if !self.can_delete(self.known_comment(id)?) {
            return Err(SessionError::NotOwner);
        }
        self.annotations.delete(id, &self.identity.uid).map_err(|e| {
            log::warn!("failed to delete comment {id}: {e}");
            e.into()
        })
    }

    /// Append a reply. It is shown at once and replaced by the stored copy when the
    /// store confirms, or removed again if it fails.
    pub fn reply_to_comment(&mut self, id: &CommentId, text: &str) -> Result<(), SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyText);
        }
        self.known_comment(id)?;

        self.annotations.append_pending_reply(
            id,
            Reply {
                author: self.identity.display_name.clone(),
                author_uid: Some(self.identity.uid.clone()),
                text: text.to_string(),
                created_at: None,
                pending: true,
            },
        );

        match self.annotations.add_reply(id, text, &self.identity) {
            Ok(reply) => {
                self.annotations.settle_pending_reply(id, Some(reply));
                Ok(())
            }
            Err(e) => {
                log::warn!("failed to reply to {id}: {e}");
                self.annotations.settle_pending_reply(id, None);
                Err(e.into())
            }
        }
    }

    /// Highlight `id` and seek to it. Selecting the same comment again seeks again.
    pub fn select_comment(&mut self, id: &CommentId) -> Result<Option<SeekRequest>, SessionError> {
        let comment = self.known_comment(id)?.clone();
        let seek = self.markers.select(&comment);

        let seek = seek.filter(|_| self.timeline_ready());
        if let Some(request) = seek {
            self.engine.seek_to(request.seconds);
        }
        self.render_markers();
        Ok(seek)
    }

    pub fn clear_selection(&mut self) {
        self.markers.clear_selection();
        self.render_markers();
    }

    fn known_comment(&self, id: &CommentId) -> Result<&Comment, SessionError> {
        self.annotations
            .comment(id)
            .ok_or_else(|| SessionError::UnknownComment(id.clone()))
    }

    pub fn can_delete(&self, comment: &Comment) -> bool {
        comment.is_authored_by(&self.identity.uid)
    }

    /// Comments for the list view: ascending by timestamp, filtered.
    pub fn visible_comments(&self) -> Vec<&Comment> {
        self.annotations
            .comments()
            .iter()
            .filter(|c| self.filter.matches(c, &self.identity))
            .collect()
    }

    /// Message for an empty list view.
    pub fn empty_message(&self) -> &'static str {
        match self.annotations.status() {
            FeedStatus::Failed(_) => "Comments unavailable",
            FeedStatus::Pending => "Loading comments",
            _ if self.annotations.comments().is_empty() => "No comments yet",
            _ => "No comments match this filter",
        }
    }

    pub fn filter(&self) -> CommentFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: CommentFilter) {
        self.filter = filter;
    }

    pub fn comments_status(&self) -> &FeedStatus {
        self.annotations.status()
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry.attempts
    }

    /// Route the shared keyboard to this session until it is dropped or unmounted.
    pub fn mount_shortcuts(&mut self, hub: &ShortcutHub) {
        self.shortcuts = Some(hub.register(self.keymap.clone()));
    }

    pub fn unmount_shortcuts(&mut self) {
        self.shortcuts = None;
    }

    pub fn apply_shortcut(&mut self, action: ShortcutAction) {
        match action {
            ShortcutAction::TogglePlay => self.engine.toggle_play(),
            ShortcutAction::Skip(delta) => self.engine.skip(delta),
            ShortcutAction::ChangeRate(step) => {
                self.engine.change_rate(step);
            }
            ShortcutAction::CommentAtPlayhead => {
                self.request_comment_at_playhead();
            }
        }
    }

    pub fn asset(&self) -> Option<&MediaAsset> {
        self.asset.as_ref()
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PlaybackEngine {
        &mut self.engine
    }

    pub fn regions(&self) -> &[Region] {
        self.markers.regions()
    }

    pub fn selection(&self) -> Option<&CommentId> {
        self.markers.selection()
    }

    pub fn is_loading_peaks(&self) -> bool {
        self.peak_job.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{Focus, Key};
    use crate::testing::FakeOpener;
    use bandhub_store::{MediaRecord, MemoryBackend, NewComment};
    use bandhub_transport::Status;

    struct Harness {
        backend: MemoryBackend,
        opener: FakeOpener,
        session: ReviewSession,
    }

    fn record(name: &str, kind: MediaKind, duration: Option<f64>) -> MediaRecord {
        MediaRecord {
            name: name.to_string(),
            kind,
            mime_type: None,
            size: 0,
            duration,
            peaks: Some(vec![0.5; 8]),
            download_url: format!("/media/{name}"),
            lyrics: None,
            song_structure: None,
            uploaded_by: Some("u1".to_string()),
            comment_count: 0,
        }
    }

    fn harness() -> Harness {
        let backend = MemoryBackend::new();
        let opener = FakeOpener::new();
        let mut config = ReviewConfig::default();
        config.resubscribe.base_delay_ms = 0;
        let session = ReviewSession::new(
            Arc::new(backend.clone()),
            opener.clone(),
            Identity::new("u1", "Robin"),
            CacheStatus::new(),
            config,
        );
        Harness {
            backend,
            opener,
            session,
        }
    }

    impl Harness {
        fn audio(&self, name: &str, duration: f64) -> AssetId {
            self.backend
                .register_asset(record(name, MediaKind::Audio, Some(duration)))
                .expect("register")
        }

        fn comment(&self, asset: &AssetId, t: f64, uid: &str) -> CommentId {
            self.backend
                .create_comment(
                    asset,
                    NewComment {
                        timestamp: t,
                        text: format!("at {t}"),
                        author: Identity::new(uid, uid),
                    },
                )
                .expect("create")
        }

        fn open(&mut self, asset: &AssetId, duration: f64) {
            self.session.load_asset(asset).expect("load");
            self.opener.send(Status::Ready { duration });
            self.session.poll();
            self.opener.commands();
        }

        fn timestamps(&self) -> Vec<Option<f64>> {
            self.session
                .visible_comments()
                .iter()
                .map(|c| c.timestamp)
                .collect()
        }
    }

    #[test]
    fn test_selecting_same_comment_twice_seeks_twice() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        let id = h.comment(&asset, 42.0, "u2");
        h.open(&asset, 120.0);

        h.session.select_comment(&id).expect("select");
        h.session.select_comment(&id).expect("select");

        assert_eq!(h.opener.seeks(), vec![42.0, 42.0]);
        assert_eq!(h.session.selection(), Some(&id));
    }

    #[test]
    fn test_resolve_then_reopen_restores_comment() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        let id = h.comment(&asset, 10.0, "u2");
        h.open(&asset, 120.0);
        let before = h.session.visible_comments()[0].clone();

        h.session.resolve_comment(&id, true).expect("resolve");
        h.session.poll();
        h.session.resolve_comment(&id, true).expect("resolve again");
        h.session.poll();
        assert!(h.session.visible_comments()[0].resolved);

        h.session.resolve_comment(&id, false).expect("reopen");
        h.session.poll();
        assert_eq!(h.session.visible_comments()[0], &before);
    }

    #[test]
    fn test_delete_removes_marker_and_list_entry_under_every_filter() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        let keep = h.comment(&asset, 5.0, "u2");
        let mine = h.comment(&asset, 20.0, "u1");
        h.open(&asset, 120.0);
        assert_eq!(h.session.regions().len(), 2);

        h.session.delete_comment(&mine).expect("delete");
        h.session.poll();

        let region_ids: Vec<_> = h.session.regions().iter().map(|r| &r.comment).collect();
        assert_eq!(region_ids, vec![&keep]);
        for filter in [
            CommentFilter::All,
            CommentFilter::Unresolved,
            CommentFilter::Mine,
        ] {
            h.session.set_filter(filter);
            assert!(h.session.visible_comments().iter().all(|c| c.id != mine));
        }
    }

    #[test]
    fn test_delete_is_author_only() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        let theirs = h.comment(&asset, 5.0, "u2");
        h.open(&asset, 120.0);

        let comment = h.session.visible_comments()[0].clone();
        assert!(!h.session.can_delete(&comment));
        assert!(matches!(
            h.session.delete_comment(&theirs),
            Err(SessionError::NotOwner)
        ));
    }

    #[test]
    fn test_switching_assets_ignores_late_snapshot_from_previous() {
        let mut h = harness();
        let a = h.audio("a.wav", 120.0);
        let b = h.audio("b.wav", 60.0);
        h.comment(&a, 1.0, "u2");
        h.comment(&b, 30.0, "u2");

        h.backend.hold_deliveries(true);
        h.session.load_asset(&a).expect("load a");
        h.session.load_asset(&b).expect("load b");
        h.comment(&a, 2.0, "u2");
        h.backend.hold_deliveries(false);
        h.backend.flush_held();
        h.session.poll();

        assert_eq!(h.timestamps(), vec![Some(30.0)]);
        assert_eq!(h.session.asset().map(|a| &a.id), Some(&b));
    }

    #[test]
    fn test_click_at_half_of_two_minutes_anchors_at_sixty() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        h.open(&asset, 120.0);

        let click = h.session.click_timeline(0.5);
        assert_eq!(click, Some(TimelineClick::Compose { anchor: 60.0 }));

        // Playback moves on while the comment is typed.
        h.session.engine_mut().play();
        h.opener.send(Status::Position(75.0));
        h.session.poll();

        h.session.add_comment("  chorus entry  ").expect("add");
        h.session.poll();

        let comments = h.session.visible_comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].timestamp, Some(60.0));
        assert_eq!(comments[0].text, "chorus entry");
        assert_eq!(h.session.pending_anchor(), None);
    }

    #[test]
    fn test_click_waits_for_known_duration() {
        let mut h = harness();
        let asset = h
            .backend
            .register_asset(record("b.wav", MediaKind::Audio, None))
            .expect("register");
        h.session.load_asset(&asset).expect("load");

        assert_eq!(h.session.click_timeline(0.5), None);
        assert_eq!(h.session.pending_anchor(), None);

        h.opener.send(Status::Ready { duration: 90.0 });
        h.session.poll();

        assert_eq!(
            h.session.click_timeline(0.5),
            Some(TimelineClick::Compose { anchor: 45.0 })
        );
    }

    #[test]
    fn test_filter_and_sort_scenario() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        let late = h.comment(&asset, 10.0, "u2");
        let early = h.comment(&asset, 5.0, "u1");
        h.backend.set_resolved(&asset, &early, true).expect("resolve");
        h.open(&asset, 120.0);

        h.session.set_filter(CommentFilter::Unresolved);
        let unresolved: Vec<_> = h.session.visible_comments().iter().map(|c| c.id.clone()).collect();
        assert_eq!(unresolved, vec![late]);

        h.session.set_filter(CommentFilter::All);
        assert_eq!(h.timestamps(), vec![Some(5.0), Some(10.0)]);

        h.session.set_filter(CommentFilter::Mine);
        assert_eq!(h.timestamps(), vec![Some(5.0)]);
    }

    #[test]
    fn test_reply_shows_immediately_and_is_not_duplicated() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        let id = h.comment(&asset, 10.0, "u2");
        h.open(&asset, 120.0);

        h.session.reply_to_comment(&id, " on it ").expect("reply");
        let replies = &h.session.visible_comments()[0].replies;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, "on it");

        h.session.poll();

        let replies = &h.session.visible_comments()[0].replies;
        assert_eq!(replies.len(), 1);
        assert!(!replies[0].pending);
    }

    #[test]
    fn test_failed_reply_is_rolled_back() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        let id = h.comment(&asset, 10.0, "u2");
        h.open(&asset, 120.0);
        h.backend.set_offline(true);

        let result = h.session.reply_to_comment(&id, "on it");

        assert!(matches!(
            result,
            Err(SessionError::Store(StoreError::Unavailable(_)))
        ));
        assert!(h.session.visible_comments()[0].replies.is_empty());
    }

    #[test]
    fn test_add_comment_validation() {
        let mut h = harness();
        assert!(matches!(
            h.session.add_comment("hi"),
            Err(SessionError::NoAsset)
        ));

        let asset = h.audio("a.wav", 120.0);
        h.open(&asset, 120.0);
        assert!(matches!(
            h.session.add_comment("hi"),
            Err(SessionError::NoAnchor)
        ));

        h.session.click_timeline(0.25);
        assert!(matches!(
            h.session.add_comment("   "),
            Err(SessionError::EmptyText)
        ));
        assert_eq!(h.session.pending_anchor(), Some(30.0));
    }

    #[test]
    fn test_failed_feed_retries_then_stays_unavailable() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        h.open(&asset, 120.0);
        assert_eq!(h.session.comments_status(), &FeedStatus::Live);

        h.backend.set_offline(true);
        h.backend.fail_subscriptions(&asset, "network lost");
        for _ in 0..10 {
            h.session.poll();
        }

        assert!(matches!(h.session.comments_status(), FeedStatus::Failed(_)));
        assert_eq!(h.session.retry_attempts(), 3);
        assert_eq!(h.session.empty_message(), "Comments unavailable");

        h.backend.set_offline(false);
        h.session.retry_comments().expect("retry");
        h.session.poll();
        assert_eq!(h.session.comments_status(), &FeedStatus::Live);
        assert_eq!(h.session.empty_message(), "No comments yet");
    }

    #[test]
    fn test_shortcuts_drive_playback_and_are_released_on_drop() {
        let mut h = harness();
        let asset = h.audio("a.wav", 120.0);
        h.open(&asset, 120.0);
        let hub = ShortcutHub::new();
        h.session.mount_shortcuts(&hub);

        hub.dispatch(Key::Char(' '), Focus::None);
        hub.dispatch(Key::Char('\''), Focus::None);
        hub.dispatch(Key::Char(' '), Focus::TextInput);
        h.session.poll();

        assert!(h.session.engine().is_playing());
        assert_eq!(h.session.engine().playback_rate(), 1.1);

        hub.dispatch(Key::Char('c'), Focus::None);
        h.session.poll();
        assert_eq!(h.session.pending_anchor(), Some(0.0));

        drop(h);
        assert_eq!(hub.handler_count(), 0);
    }

    #[test]
    fn test_non_timeline_media_uses_sentinel_anchor() {
        let mut h = harness();
        let asset = h
            .backend
            .register_asset(record("chart.pdf", MediaKind::Pdf, None))
            .expect("register");
        h.session.load_asset(&asset).expect("load");
        h.session.poll();

        assert!(h.opener.opened().is_empty());
        assert_eq!(h.session.click_timeline(0.5), None);

        h.session.add_comment("bar 12 has a typo").expect("add");
        h.session.poll();

        assert_eq!(h.timestamps(), vec![Some(0.0)]);
        assert!(h.session.regions().is_empty());
    }

    #[test]
    fn test_cached_copy_is_preferred() {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = dir.path().join("a.wav");
        std::fs::write(&local, b"RIFF").expect("write");

        let backend = MemoryBackend::new();
        let asset = backend
            .register_asset(record("a.wav", MediaKind::Audio, Some(3.0)))
            .expect("register");
        let cache = CacheStatus::new();
        cache.mark_saved(asset.clone(), &local);
        let opener = FakeOpener::new();
        let mut session = ReviewSession::new(
            Arc::new(backend),
            opener.clone(),
            Identity::new("u1", "Robin"),
            cache,
            ReviewConfig::default(),
        );

        session.load_asset(&asset).expect("load");

        assert_eq!(opener.opened(), vec![local.to_string_lossy().into_owned()]);
    }

    #[test]
    fn test_missing_peaks_are_computed_in_background() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("raw.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
        for _ in 0..8000 {
            writer.write_sample(8192i16).expect("write");
        }
        writer.finalize().expect("finalize");

        let mut h = harness();
        let mut raw = record("raw.wav", MediaKind::Audio, Some(1.0));
        raw.peaks = None;
        raw.download_url = path.to_string_lossy().into_owned();
        let asset = h.backend.register_asset(raw).expect("register");
        h.session.load_asset(&asset).expect("load");
        assert!(h.session.is_loading_peaks());

        let deadline = Instant::now() + std::time::Duration::from_secs(10);
        while !h.session.poll().peaks && Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let peaks = h.session.engine().peaks().expect("peaks");
        assert_eq!(peaks.len(), 200);
        assert!(peaks.peaks().iter().all(|p| *p == 0.25));
        assert!(!h.session.is_loading_peaks());

        let other = h.audio("b.wav", 5.0);
        h.session.load_asset(&other).expect("load");
        assert!(!h.session.is_loading_peaks());
    }

    #[test]
    fn test_playback_failure_keeps_comments() {
        let mut h = harness();
        let asset = h
            .backend
            .register_asset(record("missing.wav", MediaKind::Audio, Some(3.0)))
            .expect("register");
        h.comment(&asset, 1.0, "u2");

        let result = h.session.load_asset(&asset);
        h.session.poll();

        assert!(matches!(result, Err(SessionError::Playback(_))));
        assert_eq!(h.timestamps(), vec![Some(1.0)]);
    }
}
