// src/db/mod.rs

pub mod forest;
pub mod memory;
pub mod post_repo;
pub mod post_views;

use async_trait::async_trait;

use crate::{error::AppError, models::media::MediaRef};

pub use memory::MemoryPostStore;
pub use post_repo::PgPostStore;

/// Identity and ownership of a single post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostRef {
    pub id: i64,
    pub author_id: i64,
}

/// Tree-aware access to posts and the media they own.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn find_post(&self, id: i64) -> Result<Option<PostRef>, AppError>;

    /// `root` plus every transitive reply, read in one consistent step.
    async fn descendant_ids(&self, root: i64) -> Result<Vec<i64>, AppError>;

    /// All media rows owned by any post in `ids`.
    async fn media_for(&self, ids: &[i64]) -> Result<Vec<MediaRef>, AppError>;

    /// Deletes every post in `ids` atomically, together with their media and
    /// likes. Nothing is deleted unless every id was present.
    async fn delete_posts(&self, ids: &[i64]) -> Result<Vec<i64>, AppError>;
}
