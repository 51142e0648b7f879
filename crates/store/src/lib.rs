mod backend;
mod cache;
mod documents;
mod load;
mod memory;
mod save;

use serde::{Deserialize, Serialize};

pub use backend::{AnnotationBackend, FeedEvent, NewComment, Subscription};
pub use cache::CacheStatus;
pub use documents::{
    AssetNotes, Author, Comment, CommentRecord, Document, DocumentError, MediaAsset, MediaRecord,
    Reply, ReplyRecord,
};
pub use load::load_store;
pub use memory::MemoryBackend;
pub use save::{save_store, save_store_packed};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_type!(
    /// Identity of a media asset within the band's collection.
    AssetId
);
id_type!(CommentId);
id_type!(
    /// Stable user identifier from the identity provider.
    UserId
);

/// The signed-in participant, as far as the review core cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            uid: UserId(uid.into()),
            display_name: display_name.into(),
        }
    }
}

/// On-disk form of a [`MemoryBackend`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreFile {
    pub next_id: u64,
    pub assets: Vec<AssetFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFile {
    pub id: String,
    pub media: MediaRecord,
    pub comments: Vec<CommentFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentFile {
    pub id: String,
    pub record: CommentRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid document: {0}")]
    InvalidDocument(#[from] DocumentError),
}
