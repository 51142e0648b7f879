//! Comment markers on the waveform timeline.
//!
//! Forward: every anchored comment inside the media range gets one fixed-width region.
//! Reverse: clicks on the timeline become either a selection plus seek, or a pending
//! comment anchor captured at click time.

use bandhub_store::{Comment, CommentId};

use crate::time::Timeline;

/// Region width in seconds. Only there to make a marker clickable.
pub const MARKER_WIDTH: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerColor {
    Unresolved,
    Active,
    Resolved,
}

impl MarkerColor {
    pub fn rgba(self) -> &'static str {
        match self {
            MarkerColor::Unresolved => "rgba(0, 255, 50, 0.6)",
            MarkerColor::Active => "rgba(0, 255, 100, 0.9)",
            MarkerColor::Resolved => "rgba(100, 100, 100, 0.4)",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub comment: CommentId,
    pub start: f64,
    pub end: f64,
    pub color: MarkerColor,
}

impl Region {
    fn contains(&self, seconds: f64) -> bool {
        (self.start..=self.end).contains(&seconds)
    }
}

/// A seek the playback engine must perform. `seq` differs on every request, so two
/// requests for the same time are never merged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    pub seconds: f64,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineClick {
    /// An existing marker was hit.
    Selected {
        comment: CommentId,
        seek: SeekRequest,
    },
    /// Empty space was hit; a comment may be composed at `anchor`.
    Compose { anchor: f64 },
}

#[derive(Debug)]
pub struct MarkerSync {
    marker_width: f64,
    regions: Vec<Region>,
    selection: Option<CommentId>,
    pending_anchor: Option<f64>,
    seek_seq: u64,
}

impl MarkerSync {
    pub fn new(marker_width: f64) -> Self {
        Self {
            marker_width,
            regions: Vec::new(),
            selection: None,
            pending_anchor: None,
            seek_seq: 0,
        }
    }

    /// Rebuild every region from `comments`. Non-timeline media gets no regions.
    /// A selection whose comment is gone is cleared.
    pub fn render(&mut self, comments: &[Comment], duration: f64, seekable: bool) {
        let selection_gone = self
            .selection
            .as_ref()
            .is_some_and(|selected| !comments.iter().any(|c| &c.id == selected));
        if selection_gone {
            self.selection = None;
        }

        self.regions.clear();
        if !seekable {
            return;
        }

        let timeline = Timeline::new(duration);
        for comment in comments {
            let Some(start) = comment.timestamp.filter(|t| timeline.contains(*t)) else {
                continue;
            };
            self.regions.push(Region {
                comment: comment.id.clone(),
                start,
                end: start + self.marker_width,
                color: self.color_for(comment),
            });
        }
    }

    fn color_for(&self, comment: &Comment) -> MarkerColor {
        if comment.resolved {
            MarkerColor::Resolved
        } else if self.selection.as_ref() == Some(&comment.id) {
            MarkerColor::Active
        } else {
            MarkerColor::Unresolved
        }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn selection(&self) -> Option<&CommentId> {
        self.selection.as_ref()
    }

    /// Make `comment` the active selection and request a seek to its anchor, even if
    /// playback is already there.
    pub fn select(&mut self, comment: &Comment) -> Option<SeekRequest> {
        self.selection = Some(comment.id.clone());
        comment.timestamp.map(|seconds| self.seek(seconds))
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Handle a click at `relative` (0.0..=1.0) across a waveform of `duration` seconds.
    pub fn click(&mut self, relative: f64, duration: f64) -> TimelineClick {
        let seconds = Timeline::new(duration).relative_to_seconds(relative);

        // Later regions draw on top.
        let hit = self
            .regions
            .iter()
            .rev()
            .find(|r| r.contains(seconds))
            .map(|r| (r.comment.clone(), r.start));

        match hit {
            Some((comment, start)) => {
                self.selection = Some(comment.clone());
                TimelineClick::Selected {
                    comment,
                    seek: self.seek(start),
                }
            }
            None => {
                self.pending_anchor = Some(seconds);
                TimelineClick::Compose { anchor: seconds }
            }
        }
    }

    /// Capture an anchor for a comment about to be composed.
    pub fn compose_at(&mut self, seconds: f64) {
        self.pending_anchor = Some(seconds.max(0.0));
    }

    pub fn pending_anchor(&self) -> Option<f64> {
        self.pending_anchor
    }

    pub fn take_anchor(&mut self) -> Option<f64> {
        self.pending_anchor.take()
    }

    pub fn cancel_compose(&mut self) {
        self.pending_anchor = None;
    }

    /// Forget everything tied to the loaded asset.
    pub fn reset(&mut self) {
        self.regions.clear();
        self.selection = None;
        self.pending_anchor = None;
    }

    fn seek(&mut self, seconds: f64) -> SeekRequest {
        self.seek_seq += 1;
        SeekRequest {
            seconds,
            seq: self.seek_seq,
        }
    }
}

impl Default for MarkerSync {
    fn default() -> Self {
        Self::new(MARKER_WIDTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandhub_store::{Author, UserId};

    fn comment(id: &str, timestamp: Option<f64>, resolved: bool) -> Comment {
        Comment {
            id: CommentId::from(id),
            timestamp,
            text: format!("note {id}"),
            author: Author {
                uid: UserId::from("u1"),
                name: "Robin".to_string(),
            },
            resolved,
            created_at: None,
            replies: Vec::new(),
        }
    }

    #[test]
    fn test_one_region_per_anchored_comment_in_range() {
        let mut sync = MarkerSync::default();
        let comments = vec![
            comment("a", Some(0.0), false),
            comment("b", Some(30.0), true),
            comment("c", None, false),
            comment("d", Some(61.0), false),
            comment("e", Some(60.0), false),
        ];

        sync.render(&comments, 60.0, true);

        let ids: Vec<_> = sync.regions().iter().map(|r| r.comment.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "e"]);
        assert_eq!(sync.regions()[1].end, 30.5);
    }

    #[test]
    fn test_non_timeline_media_has_no_regions() {
        let mut sync = MarkerSync::default();
        sync.render(&[comment("a", Some(0.0), false)], 0.0, false);
        assert!(sync.regions().is_empty());
    }

    #[test]
    fn test_colors() {
        let mut sync = MarkerSync::default();
        let comments = vec![
            comment("a", Some(1.0), false),
            comment("b", Some(2.0), true),
            comment("c", Some(3.0), false),
        ];
        sync.select(&comments[2]);
        sync.render(&comments, 10.0, true);

        let colors: Vec<_> = sync.regions().iter().map(|r| r.color).collect();
        assert_eq!(
            colors,
            vec![
                MarkerColor::Unresolved,
                MarkerColor::Resolved,
                MarkerColor::Active
            ]
        );
    }

    #[test]
    fn test_selecting_twice_seeks_twice() {
        let mut sync = MarkerSync::default();
        let target = comment("a", Some(42.0), false);

        let first = sync.select(&target).expect("seek");
        let second = sync.select(&target).expect("seek");

        assert_eq!(first.seconds, second.seconds);
        assert_ne!(first, second);
    }

    #[test]
    fn test_click_empty_space_captures_anchor() {
        let mut sync = MarkerSync::default();

        let click = sync.click(0.5, 120.0);

        assert_eq!(click, TimelineClick::Compose { anchor: 60.0 });
        assert_eq!(sync.pending_anchor(), Some(60.0));
    }

    #[test]
    fn test_click_region_selects_and_seeks_to_anchor() {
        let mut sync = MarkerSync::default();
        let comments = vec![comment("a", Some(10.0), false)];
        sync.render(&comments, 100.0, true);

        let click = sync.click(0.102, 100.0);

        match click {
            TimelineClick::Selected { comment, seek } => {
                assert_eq!(comment, CommentId::from("a"));
                assert_eq!(seek.seconds, 10.0);
            }
            other => panic!("expected selection, got {other:?}"),
        }
        assert_eq!(sync.selection(), Some(&CommentId::from("a")));
        assert_eq!(sync.pending_anchor(), None);
    }

    #[test]
    fn test_deleted_selection_is_cleared() {
        let mut sync = MarkerSync::default();
        let comments = vec![comment("a", Some(1.0), false)];
        sync.select(&comments[0]);

        sync.render(&[], 10.0, true);

        assert!(sync.selection().is_none());
        assert!(sync.regions().is_empty());
    }
}
