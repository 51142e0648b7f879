use crossbeam::channel::{Receiver, TryRecvError};

use crate::{
    AssetId, AssetNotes, CommentId, Document, Identity, MediaAsset, MediaRecord, Reply,
    StoreError, UserId,
};

/// Delivered on a subscription whenever the comment set of an asset changes.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Full, ordered replacement of the asset's comments.
    Snapshot {
        asset: AssetId,
        documents: Vec<Document>,
    },
    /// The feed failed and will deliver nothing further.
    Failed { asset: AssetId, reason: String },
}

impl FeedEvent {
    pub fn asset(&self) -> &AssetId {
        match self {
            FeedEvent::Snapshot { asset, .. } | FeedEvent::Failed { asset, .. } => asset,
        }
    }
}

/// Live query over one asset's comments. Dropping it cancels the query.
#[derive(Debug)]
pub struct Subscription {
    asset: AssetId,
    events: Receiver<FeedEvent>,
}

impl Subscription {
    pub fn new(asset: AssetId, events: Receiver<FeedEvent>) -> Self {
        Self { asset, events }
    }

    pub fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// Take every event delivered since the last drain. The flag is true once the
    /// producer side has gone away.
    pub fn drain(&self) -> (Vec<FeedEvent>, bool) {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) => return (events, false),
                Err(TryRecvError::Disconnected) => return (events, true),
            }
        }
    }
}

/// A comment about to be written. The store assigns id and creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub timestamp: f64,
    pub text: String,
    pub author: Identity,
}

/// Remote document store holding media metadata and comment threads.
///
/// Every write is eventually reflected on the asset's subscriptions as a fresh
/// snapshot; callers never patch their local view from a write's return value
/// except for replies, which are shown optimistically.
pub trait AnnotationBackend: Send + Sync {
    fn asset(&self, id: &AssetId) -> Result<MediaAsset, StoreError>;

    fn register_asset(&self, record: MediaRecord) -> Result<AssetId, StoreError>;

    /// Replace lyrics and song structure. Only the uploader may do this.
    fn update_asset_notes(
        &self,
        id: &AssetId,
        notes: AssetNotes,
        requester: &UserId,
    ) -> Result<(), StoreError>;

    fn subscribe(&self, asset: &AssetId) -> Result<Subscription, StoreError>;

    fn create_comment(&self, asset: &AssetId, comment: NewComment)
    -> Result<CommentId, StoreError>;

    fn set_resolved(
        &self,
        asset: &AssetId,
        comment: &CommentId,
        resolved: bool,
    ) -> Result<(), StoreError>;

    /// Delete a comment. The store rejects requesters other than the author.
    fn delete_comment(
        &self,
        asset: &AssetId,
        comment: &CommentId,
        requester: &UserId,
    ) -> Result<(), StoreError>;

    fn add_reply(
        &self,
        asset: &AssetId,
        comment: &CommentId,
        text: &str,
        author: &Identity,
    ) -> Result<Reply, StoreError>;
}
