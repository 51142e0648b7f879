//! Wire records and their validated domain forms.
//!
//! The live-query feed delivers schemaless [`Document`]s. Nothing downstream trusts
//! their fields until they pass through [`Comment::from_document`] or
//! [`MediaAsset::from_record`].

use bandhub_transport::{MediaKind, PeakEnvelope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AssetId, CommentId, UserId};

/// One record as delivered by a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("document {id}: field `{field}` {reason}")]
    InvalidField {
        id: String,
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    pub text: String,
    pub author: String,
    pub author_uid: String,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub replies: Vec<ReplyRecord>,
    #[serde(default)]
    pub reply_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRecord {
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_uid: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub uid: UserId,
    pub name: String,
}

/// A time-anchored note on a media asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    /// Anchor in seconds. `None` for comments on media without a timeline.
    pub timestamp: Option<f64>,
    pub text: String,
    pub author: Author,
    pub resolved: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub replies: Vec<Reply>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub author: String,
    pub author_uid: Option<UserId>,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Appended locally and not yet confirmed by the store.
    pub pending: bool,
}

impl Comment {
    pub fn from_document(doc: &Document) -> Result<Self, DocumentError> {
        let record: CommentRecord =
            serde_json::from_value(doc.fields.clone()).map_err(|source| {
                DocumentError::Malformed {
                    id: doc.id.clone(),
                    source,
                }
            })?;
        Self::from_record(&doc.id, record)
    }

    pub fn from_record(id: &str, record: CommentRecord) -> Result<Self, DocumentError> {
        let invalid = |field, reason: &str| DocumentError::InvalidField {
            id: id.to_string(),
            field,
            reason: reason.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("id", "is empty"));
        }
        if let Some(t) = record.timestamp {
            if !t.is_finite() {
                return Err(invalid("timestamp", "is not a finite number"));
            }
            if t < 0.0 {
                return Err(invalid("timestamp", "is negative"));
            }
        }
        if record.author_uid.is_empty() {
            return Err(invalid("authorUid", "is empty"));
        }

        Ok(Self {
            id: CommentId(id.to_string()),
            timestamp: record.timestamp,
            text: record.text,
            author: Author {
                uid: UserId(record.author_uid),
                name: record.author,
            },
            resolved: record.resolved,
            created_at: record.created_at,
            replies: record.replies.into_iter().map(Reply::from_record).collect(),
        })
    }

    pub fn to_record(&self) -> CommentRecord {
        let replies: Vec<ReplyRecord> = self
            .replies
            .iter()
            .filter(|r| !r.pending)
            .map(Reply::to_record)
            .collect();

        CommentRecord {
            timestamp: self.timestamp,
            text: self.text.clone(),
            author: self.author.name.clone(),
            author_uid: self.author.uid.0.clone(),
            resolved: self.resolved,
            created_at: self.created_at,
            reply_count: replies.len() as u32,
            replies,
        }
    }

    pub fn is_authored_by(&self, uid: &UserId) -> bool {
        &self.author.uid == uid
    }
}

impl Reply {
    pub fn from_record(record: ReplyRecord) -> Self {
        Self {
            author: record.author,
            author_uid: record.author_uid.map(UserId),
            text: record.text,
            created_at: record.created_at,
            pending: false,
        }
    }

    pub fn to_record(&self) -> ReplyRecord {
        ReplyRecord {
            author: self.author.clone(),
            author_uid: self.author_uid.as_ref().map(|uid| uid.0.clone()),
            text: self.text.clone(),
            created_at: self.created_at,
        }
    }
}

/// Media metadata as stored alongside the uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peaks: Option<Vec<f32>>,
    #[serde(alias = "url")]
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_structure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    #[serde(default)]
    pub comment_count: u32,
}

/// Free-form notes an uploader keeps with an audio asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetNotes {
    pub lyrics: Option<String>,
    pub song_structure: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub id: AssetId,
    pub name: String,
    pub kind: MediaKind,
    pub mime_type: Option<String>,
    pub size: u64,
    pub duration: Option<f64>,
    pub peaks: Option<PeakEnvelope>,
    pub url: String,
    pub notes: AssetNotes,
    pub uploaded_by: Option<UserId>,
    pub comment_count: u32,
}

impl MediaAsset {
    /// Build the domain view of a stored record. Bad optional fields are dropped
    /// rather than failing the whole asset.
    pub fn from_record(id: AssetId, record: MediaRecord) -> Self {
        let duration = record.duration.filter(|d| d.is_finite() && *d > 0.0);

        let peaks = record
            .peaks
            .and_then(|raw| match PeakEnvelope::try_from(raw) {
                Ok(envelope) if !envelope.is_empty() => Some(envelope),
                Ok(_) => None,
                Err(e) => {
                    log::warn!("asset {id}: ignoring stored peaks: {e}");
                    None
                }
            });

        Self {
            id,
            name: record.name,
            kind: record.kind,
            mime_type: record.mime_type,
            size: record.size,
            duration,
            peaks,
            url: record.download_url,
            notes: AssetNotes {
                lyrics: record.lyrics,
                song_structure: record.song_structure,
            },
            uploaded_by: record.uploaded_by.map(UserId),
            comment_count: record.comment_count,
        }
    }

    pub fn is_seekable(&self) -> bool {
        self.kind.is_seekable()
    }
}
