//! Live, ordered comment set for the loaded asset.

use std::sync::Arc;

use bandhub_store::{
    AnnotationBackend, AssetId, Comment, CommentId, FeedEvent, Identity, NewComment, Reply,
    StoreError, Subscription, UserId,
};

/// Where the comment feed for the current asset stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Detached,
    /// Subscribed, first snapshot not yet received.
    Pending,
    Live,
    /// The feed ended with an error. The comment list is unavailable, not empty.
    Failed(String),
}

pub struct AnnotationStore {
    backend: Arc<dyn AnnotationBackend>,
    subscription: Option<Subscription>,
    comments: Vec<Comment>,
    status: FeedStatus,
}

impl AnnotationStore {
    pub fn new(backend: Arc<dyn AnnotationBackend>) -> Self {
        Self {
            backend,
            subscription: None,
            comments: Vec::new(),
            status: FeedStatus::Detached,
        }
    }

    /// Replace any current subscription with one on `asset`. The previous feed is
    /// dropped before the new one is attached.
    pub fn subscribe(&mut self, asset: &AssetId) -> Result<(), StoreError> {
        self.detach();

        match self.backend.subscribe(asset) {
            Ok(subscription) => {
                log::debug!("subscribed to comments on {asset}");
                self.subscription = Some(subscription);
                self.status = FeedStatus::Pending;
                Ok(())
            }
            Err(e) => {
                log::warn!("comment subscription on {asset} failed: {e}");
                self.status = FeedStatus::Failed(e.to_string());
                Err(e)
            }
        }
    }

    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            log::debug!("detached comments on {}", subscription.asset());
        }
        self.comments.clear();
        self.status = FeedStatus::Detached;
    }

    /// Apply whatever the feed delivered since the last call. Only the newest snapshot
    /// matters since each one replaces the whole set. Returns true if the comment set
    /// or the feed status changed.
    pub fn poll(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_ref() else {
            return false;
        };
        let asset = subscription.asset().clone();
        let (events, closed) = subscription.drain();

        let mut latest = None;
        let mut failure = None;
        for event in events {
            if event.asset() != &asset {
                log::debug!("dropping stale feed event for {}", event.asset());
                continue;
            }
            match event {
                FeedEvent::Snapshot { documents, .. } => latest = Some(documents),
                FeedEvent::Failed { reason, .. } => failure = Some(reason),
            }
        }
        if failure.is_none() && closed {
            failure = Some("comment feed closed".to_string());
        }

        let mut changed = false;
        if let Some(documents) = latest {
            self.comments = parse_snapshot(&asset, &documents);
            self.status = FeedStatus::Live;
            changed = true;
        }
        if let Some(reason) = failure {
            log::warn!("comment feed on {asset} failed: {reason}");
            self.subscription = None;
            self.status = FeedStatus::Failed(reason);
            changed = true;
        }
        changed
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn comment(&self, id: &CommentId) -> Option<&Comment> {
        self.comments.iter().find(|c| &c.id == id)
    }

    pub fn status(&self) -> &FeedStatus {
        &self.status
    }

    pub fn asset(&self) -> Option<&AssetId> {
        self.subscription.as_ref().map(Subscription::asset)
    }

    fn subscribed_asset(&self) -> Result<AssetId, StoreError> {
        self.asset()
            .cloned()
            .ok_or_else(|| StoreError::Unavailable("no comment feed attached".to_string()))
    }

    /// The new comment shows up with the next snapshot, not before.
    pub fn create(
        &self,
        timestamp: f64,
        text: &str,
        author: &Identity,
    ) -> Result<CommentId, StoreError> {
        let asset = self.subscribed_asset()?;
        self.backend.create_comment(
            &asset,
            NewComment {
                timestamp,
                text: text.to_string(),
                author: author.clone(),
            },
        )
    }

    pub fn set_resolved(&self, id: &CommentId, resolved: bool) -> Result<(), StoreError> {
        let asset = self.subscribed_asset()?;
        self.backend.set_resolved(&asset, id, resolved)
    }

    pub fn delete(&self, id: &CommentId, requester: &UserId) -> Result<(), StoreError> {
        let asset = self.subscribed_asset()?;
        self.backend.delete_comment(&asset, id, requester)
    }

    pub fn add_reply(
        &self,
        id: &CommentId,
        text: &str,
        author: &Identity,
    ) -> Result<Reply, StoreError> {
        let asset = self.subscribed_asset()?;
        self.backend.add_reply(&asset, id, text, author)
    }

    /// Show a reply before the store acknowledges it.
    pub(crate) fn append_pending_reply(&mut self, id: &CommentId, reply: Reply) -> bool {
        match self.comments.iter_mut().find(|c| &c.id == id) {
            Some(comment) => {
                comment.replies.push(reply);
                true
            }
            None => false,
        }
    }

    /// Swap the oldest pending reply on `id` for the acknowledged one, or drop it
    /// when `confirmed` is `None`. A snapshot may already have replaced it.
    pub(crate) fn settle_pending_reply(&mut self, id: &CommentId, confirmed: Option<Reply>) {
        let Some(comment) = self.comments.iter_mut().find(|c| &c.id == id) else {
            return;
        };
        let Some(index) = comment.replies.iter().position(|r| r.pending) else {
            return;
        };
        match confirmed {
            Some(reply) => comment.replies[index] = reply,
            None => {
                comment.replies.remove(index);
            }
        }
    }
}

fn parse_snapshot(asset: &AssetId, documents: &[bandhub_store::Document]) -> Vec<Comment> {
    let mut comments: Vec<Comment> = documents
        .iter()
        .filter_map(|doc| match Comment::from_document(doc) {
            Ok(comment) => Some(comment),
            Err(e) => {
                log::warn!("skipping invalid comment on {asset}: {e}");
                None
            }
        })
        .collect();
    sort_by_timestamp(&mut comments);
    comments
}

pub(crate) fn sort_by_timestamp(comments: &mut [Comment]) {
    comments.sort_by(|a, b| {
        a.timestamp
            .unwrap_or(0.0)
            .total_cmp(&b.timestamp.unwrap_or(0.0))
    });
}
