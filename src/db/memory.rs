//! In-process `PostStore` backed by a [`PostForest`].
//!
//! Used by the test suites and for running the deletion path without a
//! database. All state sits behind one lock, so every operation observes a
//! consistent snapshot.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;

use super::{PostRef, PostStore, forest::PostForest};
use crate::{error::AppError, models::media::MediaRef};

#[derive(Debug, Default)]
struct Inner {
    forest: PostForest,
    authors: HashMap<i64, i64>,
    media: Vec<MediaRef>,
    likes: HashSet<(i64, i64)>,
}

#[derive(Debug, Default)]
pub struct MemoryPostStore {
    inner: Mutex<Inner>,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalServerError("post store lock poisoned".into()))
    }

    /// Adds a post; replies must name an existing parent.
    pub fn add_post(&self, id: i64, author_id: i64, parent: Option<i64>) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if !inner.forest.insert(id, parent) {
            return Err(AppError::BadRequest("Invalid parent post id provided".into()));
        }
        inner.authors.insert(id, author_id);
        Ok(())
    }

    pub fn add_media(&self, media: MediaRef) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if !inner.forest.contains(media.post_id) {
            return Err(AppError::NotFound("No post found with provided ID".into()));
        }
        inner.media.push(media);
        Ok(())
    }

    pub fn add_like(&self, post_id: i64, user_id: i64) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if !inner.forest.contains(post_id) {
            return Err(AppError::NotFound("No post found with given ID".into()));
        }
        inner.likes.insert((post_id, user_id));
        Ok(())
    }

    pub fn post_count(&self) -> usize {
        self.lock().map(|inner| inner.forest.len()).unwrap_or(0)
    }

    pub fn media_count(&self) -> usize {
        self.lock().map(|inner| inner.media.len()).unwrap_or(0)
    }

    pub fn like_count(&self) -> usize {
        self.lock().map(|inner| inner.likes.len()).unwrap_or(0)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.lock().map(|inner| inner.forest.contains(id)).unwrap_or(false)
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn find_post(&self, id: i64) -> Result<Option<PostRef>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .authors
            .get(&id)
            .map(|&author_id| PostRef { id, author_id }))
    }

    async fn descendant_ids(&self, root: i64) -> Result<Vec<i64>, AppError> {
        Ok(self.lock()?.forest.descendants(root))
    }

    async fn media_for(&self, ids: &[i64]) -> Result<Vec<MediaRef>, AppError> {
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        let inner = self.lock()?;
        Ok(inner
            .media
            .iter()
            .filter(|m| wanted.contains(&m.post_id))
            .cloned()
            .collect())
    }

    async fn delete_posts(&self, ids: &[i64]) -> Result<Vec<i64>, AppError> {
        let mut inner = self.lock()?;

        let missing: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| !inner.forest.contains(*id))
            .collect();
        if !missing.is_empty() {
            return Err(AppError::PersistenceFailure(format!(
                "posts {missing:?} vanished before they could be deleted"
            )));
        }

        // A surviving reply would be orphaned by this delete.
        let doomed: HashSet<i64> = ids.iter().copied().collect();
        let orphaned = doomed.iter().any(|&id| {
            inner
                .forest
                .children_of(id)
                .iter()
                .any(|child| !doomed.contains(child))
        });
        if orphaned {
            return Err(AppError::PersistenceFailure(
                "a reply outside the deleted set still references it".into(),
            ));
        }

        let removed = inner.forest.remove_all(ids);
        for id in &removed {
            inner.authors.remove(id);
        }
        inner.media.retain(|m| !doomed.contains(&m.post_id));
        inner.likes.retain(|(post_id, _)| !doomed.contains(post_id));
        Ok(removed)
    }
}
