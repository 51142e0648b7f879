//! In-process document store with live queries.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use crossbeam::channel::{self, Sender};

use crate::{
    AnnotationBackend, AssetFile, AssetId, AssetNotes, CommentFile, CommentId, CommentRecord,
    Document, DocumentError, FeedEvent, Identity, MediaAsset, MediaRecord, NewComment, Reply,
    ReplyRecord, StoreError, StoreFile, Subscription, UserId,
};

/// Shared, cloneable store. Every mutation pushes a full ordered snapshot to the
/// subscribers of the touched asset.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    assets: BTreeMap<AssetId, StoredAsset>,
    subscribers: Vec<Subscriber>,
    offline: bool,
    holding: bool,
    held: Vec<(Sender<FeedEvent>, FeedEvent)>,
}

#[derive(Debug, Clone)]
struct StoredAsset {
    media: MediaRecord,
    comments: Vec<(CommentId, CommentRecord)>,
}

#[derive(Debug)]
struct Subscriber {
    asset: AssetId,
    sender: Sender<FeedEvent>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// While offline every write fails with [`StoreError::Unavailable`] and new
    /// subscriptions fail immediately.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Queue snapshot deliveries instead of sending them, until [`Self::flush_held`].
    pub fn hold_deliveries(&self, hold: bool) {
        self.state().holding = hold;
    }

    /// Deliver queued snapshots. Returns how many reached a live subscription.
    pub fn flush_held(&self) -> usize {
        let held = std::mem::take(&mut self.state().held);
        held.into_iter()
            .map(|(sender, event)| sender.send(event).is_ok())
            .filter(|delivered| *delivered)
            .count()
    }

    /// Terminate every live query on `asset` with a failure.
    pub fn fail_subscriptions(&self, asset: &AssetId, reason: &str) {
        let mut state = self.state();
        state.subscribers.retain(|sub| {
            if &sub.asset != asset {
                return true;
            }
            let _ = sub.sender.send(FeedEvent::Failed {
                asset: asset.clone(),
                reason: reason.to_string(),
            });
            false
        });
    }

    /// Current ordered comment documents for `asset`.
    pub fn snapshot(&self, asset: &AssetId) -> Result<Vec<Document>, StoreError> {
        self.state().documents(asset)
    }

    pub fn asset_ids(&self) -> Vec<AssetId> {
        self.state().assets.keys().cloned().collect()
    }

    pub(crate) fn to_file(&self) -> StoreFile {
        let state = self.state();
        StoreFile {
            next_id: state.next_id,
            assets: state
                .assets
                .iter()
                .map(|(id, stored)| AssetFile {
                    id: id.0.clone(),
                    media: stored.media.clone(),
                    comments: stored
                        .comments
                        .iter()
                        .map(|(comment_id, record)| CommentFile {
                            id: comment_id.0.clone(),
                            record: record.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub(crate) fn from_file(file: StoreFile) -> Self {
        let assets = file
            .assets
            .into_iter()
            .map(|asset| {
                let mut comments: Vec<_> = asset
                    .comments
                    .into_iter()
                    .map(|c| (CommentId(c.id), c.record))
                    .collect();
                sort_by_timestamp(&mut comments);
                (
                    AssetId(asset.id),
                    StoredAsset {
                        media: asset.media,
                        comments,
                    },
                )
            })
            .collect();

        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                next_id: file.next_id,
                assets,
                ..Default::default()
            })),
        }
    }
}

impl MemoryState {
    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable("store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn allocate(&mut self, prefix: char) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn stored(&self, asset: &AssetId) -> Result<&StoredAsset, StoreError> {
        self.assets.get(asset).ok_or_else(|| asset_not_found(asset))
    }

    fn stored_mut(&mut self, asset: &AssetId) -> Result<&mut StoredAsset, StoreError> {
        self.assets
            .get_mut(asset)
            .ok_or_else(|| asset_not_found(asset))
    }

    fn documents(&self, asset: &AssetId) -> Result<Vec<Document>, StoreError> {
        self.stored(asset)?
            .comments
            .iter()
            .map(|(id, record)| {
                Ok::<_, StoreError>(Document {
                    id: id.0.clone(),
                    fields: serde_json::to_value(record)?,
                })
            })
            .collect()
    }

    fn send(&mut self, sender: &Sender<FeedEvent>, event: FeedEvent) -> bool {
        if self.holding {
            self.held.push((sender.clone(), event));
            true
        } else {
            sender.send(event).is_ok()
        }
    }

    fn broadcast(&mut self, asset: &AssetId) {
        let documents = match self.documents(asset) {
            Ok(documents) => documents,
            Err(e) => {
                log::error!("failed to build snapshot for {asset}: {e}");
                return;
            }
        };

        let subscribers = std::mem::take(&mut self.subscribers);
        let mut live = Vec::with_capacity(subscribers.len());
        for sub in subscribers {
            if &sub.asset != asset {
                live.push(sub);
                continue;
            }
            let event = FeedEvent::Snapshot {
                asset: asset.clone(),
                documents: documents.clone(),
            };
            if self.send(&sub.sender, event) {
                live.push(sub);
            } else {
                log::trace!("pruning closed subscription on {asset}");
            }
        }
        self.subscribers = live;
    }
}

fn asset_not_found(asset: &AssetId) -> StoreError {
    StoreError::NotFound {
        kind: "asset",
        id: asset.0.clone(),
    }
}

fn comment_not_found(comment: &CommentId) -> StoreError {
    StoreError::NotFound {
        kind: "comment",
        id: comment.0.clone(),
    }
}

fn sort_by_timestamp(comments: &mut [(CommentId, CommentRecord)]) {
    comments.sort_by(|a, b| {
        a.1.timestamp
            .unwrap_or(0.0)
            .total_cmp(&b.1.timestamp.unwrap_or(0.0))
    });
}

fn find_comment<'a>(
    stored: &'a mut StoredAsset,
    comment: &CommentId,
) -> Result<&'a mut CommentRecord, StoreError> {
    stored
        .comments
        .iter_mut()
        .find(|(id, _)| id == comment)
        .map(|(_, record)| record)
        .ok_or_else(|| comment_not_found(comment))
}

impl AnnotationBackend for MemoryBackend {
    fn asset(&self, id: &AssetId) -> Result<MediaAsset, StoreError> {
        let state = self.state();
        let stored = state.stored(id)?;
        Ok(MediaAsset::from_record(id.clone(), stored.media.clone()))
    }

    fn register_asset(&self, mut record: MediaRecord) -> Result<AssetId, StoreError> {
        let mut state = self.state();
        state.ensure_online()?;

        let id = AssetId(state.allocate('m'));
        record.comment_count = 0;
        log::debug!("registered {} asset {id} ({})", record.kind, record.name);
        state.assets.insert(
            id.clone(),
            StoredAsset {
                media: record,
                comments: Vec::new(),
            },
        );
        Ok(id)
    }

    fn update_asset_notes(
        &self,
        id: &AssetId,
        notes: AssetNotes,
        requester: &UserId,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.ensure_online()?;

        let stored = state.stored_mut(id)?;
        if stored.media.uploaded_by.as_deref() != Some(requester.as_str()) {
            return Err(StoreError::PermissionDenied(
                "only the uploader can edit notes".to_string(),
            ));
        }
        stored.media.lyrics = notes.lyrics;
        stored.media.song_structure = notes.song_structure;
        Ok(())
    }

    fn subscribe(&self, asset: &AssetId) -> Result<Subscription, StoreError> {
        let mut state = self.state();
        let documents = state.documents(asset)?;
        let (sender, receiver) = channel::unbounded();

        if state.offline {
            let _ = sender.send(FeedEvent::Failed {
                asset: asset.clone(),
                reason: "store is offline".to_string(),
            });
            return Ok(Subscription::new(asset.clone(), receiver));
        }

        state.send(
            &sender,
            FeedEvent::Snapshot {
                asset: asset.clone(),
                documents,
            },
        );
        state.subscribers.push(Subscriber {
            asset: asset.clone(),
            sender,
        });
        Ok(Subscription::new(asset.clone(), receiver))
    }

    fn create_comment(
        &self,
        asset: &AssetId,
        comment: NewComment,
    ) -> Result<CommentId, StoreError> {
        let mut state = self.state();
        state.ensure_online()?;
        state.stored(asset)?;

        if !comment.timestamp.is_finite() || comment.timestamp < 0.0 {
            return Err(DocumentError::InvalidField {
                id: String::new(),
                field: "timestamp",
                reason: format!("{} is not a valid anchor", comment.timestamp),
            }
            .into());
        }

        let id = CommentId(state.allocate('c'));
        let record = CommentRecord {
            timestamp: Some(comment.timestamp),
            text: comment.text,
            author: comment.author.display_name,
            author_uid: comment.author.uid.0,
            resolved: false,
            created_at: Some(Utc::now()),
            replies: Vec::new(),
            reply_count: 0,
        };

        let stored = state.stored_mut(asset)?;
        stored.comments.push((id.clone(), record));
        sort_by_timestamp(&mut stored.comments);
        stored.media.comment_count += 1;

        state.broadcast(asset);
        Ok(id)
    }

    fn set_resolved(
        &self,
        asset: &AssetId,
        comment: &CommentId,
        resolved: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.ensure_online()?;

        find_comment(state.stored_mut(asset)?, comment)?.resolved = resolved;
        state.broadcast(asset);
        Ok(())
    }

    fn delete_comment(
        &self,
        asset: &AssetId,
        comment: &CommentId,
        requester: &UserId,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.ensure_online()?;

        let stored = state.stored_mut(asset)?;
        let index = stored
            .comments
            .iter()
            .position(|(id, _)| id == comment)
            .ok_or_else(|| comment_not_found(comment))?;
        if stored.comments[index].1.author_uid != requester.0 {
            return Err(StoreError::PermissionDenied(
                "only the author can delete this comment".to_string(),
            ));
        }

        stored.comments.remove(index);
        stored.media.comment_count = stored.media.comment_count.saturating_sub(1);

        state.broadcast(asset);
        Ok(())
    }

    fn add_reply(
        &self,
        asset: &AssetId,
        comment: &CommentId,
        text: &str,
        author: &Identity,
    ) -> Result<Reply, StoreError> {
        let mut state = self.state();
        state.ensure_online()?;

        let reply = ReplyRecord {
            author: author.display_name.clone(),
            author_uid: Some(author.uid.0.clone()),
            text: text.to_string(),
            created_at: Some(Utc::now()),
        };

        let record = find_comment(state.stored_mut(asset)?, comment)?;
        record.replies.push(reply.clone());
        record.reply_count = record.replies.len() as u32;

        state.broadcast(asset);
        Ok(Reply::from_record(reply))
    }
}
