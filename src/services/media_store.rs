use async_trait::async_trait;

use crate::models::media::MediaKind;

#[derive(Debug, thiserror::Error)]
pub enum MediaStoreError {
    #[error("media store request failed: {0}")]
    Transport(String),

    #[error("media store answered {status}: {body}")]
    Status { status: u16, body: String },

    /// The store answered, but not with a success result.
    #[error("media store rejected the request: {0}")]
    Rejected(String),

    #[error("media store call timed out")]
    Timeout,
}

impl From<reqwest::Error> for MediaStoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MediaStoreError::Timeout
        } else {
            MediaStoreError::Transport(err.to_string())
        }
    }
}

/// A stored object as reported by the media store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub public_id: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing was stored under the id, e.g. removed by an earlier attempt.
    AlreadyGone,
}

/// Remote binary storage for post media.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, kind: MediaKind) -> Result<UploadedMedia, MediaStoreError>;

    async fn delete(&self, public_id: &str, kind: MediaKind) -> Result<DeleteOutcome, MediaStoreError>;
}
