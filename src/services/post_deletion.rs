//! Deletion of a post together with its whole reply tree and remote media.
//!
//! Remote objects and database rows are not covered by one transaction, so
//! the work runs in two phases: every media object of the subtree is removed
//! from the media store first, and only when all of those calls succeeded are
//! the rows deleted in one atomic step. A failed cleanup leaves the rows in
//! place and the caller may simply retry; objects that are already gone count
//! as cleaned up.

use std::{fmt, time::Duration};

use futures::future::join_all;

use crate::{
    db::PostStore,
    error::AppError,
    models::media::MediaRef,
    services::media_store::{DeleteOutcome, MediaStore},
    utils::jwt::Principal,
};

/// Progress of one deletion, reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    ResolvingTree,
    CleaningMedia,
    DeletingRows,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::ResolvingTree => "resolving-tree",
            Stage::CleaningMedia => "cleaning-media",
            Stage::DeletingRows => "deleting-rows",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

pub struct PostDeletion<'a> {
    posts: &'a dyn PostStore,
    media: &'a dyn MediaStore,
    media_timeout: Duration,
}

impl<'a> PostDeletion<'a> {
    pub fn new(posts: &'a dyn PostStore, media: &'a dyn MediaStore, media_timeout: Duration) -> Self {
        Self {
            posts,
            media,
            media_timeout,
        }
    }

    /// Deletes `root_id` and every reply below it. Only the author of the
    /// root may do this; replies written by others go with it.
    ///
    /// Returns the ids of all deleted posts, sorted.
    pub async fn delete_tree(&self, requester: &Principal, root_id: i64) -> Result<Vec<i64>, AppError> {
        let mut stage = Stage::Validating;
        let result = self.run(requester, root_id, &mut stage).await;
        match &result {
            Ok(ids) => tracing::info!(
                root_id,
                requester = requester.user_id,
                deleted = ids.len(),
                "post tree deleted"
            ),
            Err(err) => tracing::warn!(
                root_id,
                requester = requester.user_id,
                %stage,
                error = %err,
                "post tree deletion failed"
            ),
        }
        result
    }

    async fn run(&self, requester: &Principal, root_id: i64, stage: &mut Stage) -> Result<Vec<i64>, AppError> {
        let root = self
            .posts
            .find_post(root_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No post found with provided ID".to_string()))?;

        if root.author_id != requester.user_id {
            return Err(AppError::Forbidden(
                "Post must belong to the logged in user to delete".to_string(),
            ));
        }

        advance(stage, Stage::ResolvingTree, root_id);
        let mut ids = self.posts.descendant_ids(root_id).await?;
        ids.sort_unstable();
        if ids.is_empty() {
            // Deleted by a concurrent request since the lookup above.
            return Err(AppError::NotFound("No post found with provided ID".to_string()));
        }

        advance(stage, Stage::CleaningMedia, root_id);
        let media = self.posts.media_for(&ids).await?;
        self.clean_media(&media).await?;

        advance(stage, Stage::DeletingRows, root_id);
        let mut deleted = self.posts.delete_posts(&ids).await?;
        deleted.sort_unstable();
        if deleted != ids {
            return Err(AppError::PersistenceFailure(format!(
                "resolved {} post(s) under {}, deleted {}",
                ids.len(),
                root_id,
                deleted.len()
            )));
        }

        advance(stage, Stage::Done, root_id);
        Ok(deleted)
    }

    /// Issues every remote delete at once and waits for all of them.
    async fn clean_media(&self, media: &[MediaRef]) -> Result<(), AppError> {
        if media.is_empty() {
            return Ok(());
        }

        let attempts = media.iter().map(|item| async move {
            let Some(public_id) = item.remote_id() else {
                return Err(format!("no remote id derivable from '{}'", item.url));
            };

            match tokio::time::timeout(self.media_timeout, self.media.delete(&public_id, item.kind)).await {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(err)) => Err(err.to_string()),
                Err(_) => Err(format!("timed out after {:?}", self.media_timeout)),
            }
        });
        let results = join_all(attempts).await;

        let mut failed = 0;
        for (item, result) in media.iter().zip(&results) {
            match result {
                Ok(DeleteOutcome::Deleted) => {}
                Ok(DeleteOutcome::AlreadyGone) => {
                    tracing::debug!(media_id = item.id, "media already absent from store");
                }
                Err(reason) => {
                    failed += 1;
                    tracing::warn!(media_id = item.id, post_id = item.post_id, %reason, "media delete failed");
                }
            }
        }

        if failed > 0 {
            return Err(AppError::MediaCleanupFailed(format!(
                "Error while deleting post media: {failed} of {} item(s) could not be removed",
                media.len()
            )));
        }
        Ok(())
    }
}

fn advance(stage: &mut Stage, next: Stage, root_id: i64) {
    tracing::debug!(root_id, from = %stage, to = %next, "post deletion stage");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        db::MemoryPostStore,
        models::media::MediaKind,
        services::media_store::{MediaStoreError, UploadedMedia},
    };

    /// Records deletes; ids listed in `failing` error, ids in `absent`
    /// report already gone, ids in `hanging` never answer.
    #[derive(Default)]
    struct ScriptedMediaStore {
        failing: HashSet<String>,
        absent: HashSet<String>,
        hanging: HashSet<String>,
        deleted: Mutex<Vec<String>>,
    }

    impl ScriptedMediaStore {
        fn deleted(&self) -> Vec<String> {
            let mut ids = self.deleted.lock().unwrap().clone();
            ids.sort();
            ids
        }
    }

    #[async_trait]
    impl MediaStore for ScriptedMediaStore {
        async fn upload(&self, _bytes: Vec<u8>, _kind: MediaKind) -> Result<UploadedMedia, MediaStoreError> {
            Err(MediaStoreError::Rejected("uploads are not scripted".into()))
        }

        async fn delete(&self, public_id: &str, _kind: MediaKind) -> Result<DeleteOutcome, MediaStoreError> {
            if self.hanging.contains(public_id) {
                std::future::pending::<()>().await;
            }
            if self.failing.contains(public_id) {
                return Err(MediaStoreError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            if self.absent.contains(public_id) {
                return Ok(DeleteOutcome::AlreadyGone);
            }
            self.deleted.lock().unwrap().push(public_id.to_string());
            Ok(DeleteOutcome::Deleted)
        }
    }

    const ALICE: Principal = Principal { user_id: 1 };
    const BOB: Principal = Principal { user_id: 2 };

    fn media(id: i64, post_id: i64) -> MediaRef {
        MediaRef {
            id,
            post_id,
            url: format!("https://res.cloudinary.com/demo/image/upload/v1/m{id}.jpg"),
            public_id: None,
            kind: MediaKind::Image,
        }
    }

    /// 1 (alice) ─┬─ 2 (bob) ── 4 (alice)
    ///            └─ 3 (bob)
    /// 5 (bob), unrelated
    fn two_branch_store() -> MemoryPostStore {
        let store = MemoryPostStore::new();
        store.add_post(1, 1, None).unwrap();
        store.add_post(2, 2, Some(1)).unwrap();
        store.add_post(3, 2, Some(1)).unwrap();
        store.add_post(4, 1, Some(2)).unwrap();
        store.add_post(5, 2, None).unwrap();
        store.add_media(media(10, 1)).unwrap();
        store.add_media(media(11, 2)).unwrap();
        store.add_media(media(12, 4)).unwrap();
        store.add_media(media(13, 5)).unwrap();
        store.add_like(3, 1).unwrap();
        store.add_like(5, 1).unwrap();
        store
    }

    fn deletion<'a>(posts: &'a MemoryPostStore, media: &'a ScriptedMediaStore) -> PostDeletion<'a> {
        PostDeletion::new(posts, media, Duration::from_millis(200))
    }

    #[tokio::test]
    async fn deletes_both_branches_and_their_media() {
        let posts = two_branch_store();
        let store = ScriptedMediaStore::default();

        let deleted = deletion(&posts, &store).delete_tree(&ALICE, 1).await.unwrap();

        assert_eq!(deleted, vec![1, 2, 3, 4]);
        assert_eq!(store.deleted(), vec!["m10", "m11", "m12"]);
        assert_eq!(posts.post_count(), 1);
        assert_eq!(posts.media_count(), 1);
        assert_eq!(posts.like_count(), 1);
    }

    #[tokio::test]
    async fn leaf_root_deletes_only_itself() {
        let posts = two_branch_store();
        let store = ScriptedMediaStore::default();

        let deleted = deletion(&posts, &store).delete_tree(&BOB, 5).await.unwrap();

        assert_eq!(deleted, vec![5]);
        assert_eq!(store.deleted(), vec!["m13"]);
        assert_eq!(posts.post_count(), 4);
    }

    #[tokio::test]
    async fn chain_is_deleted_whole() {
        let posts = MemoryPostStore::new();
        posts.add_post(100, 1, None).unwrap();
        posts.add_post(101, 2, Some(100)).unwrap();
        posts.add_post(102, 3, Some(101)).unwrap();
        posts.add_post(103, 2, Some(102)).unwrap();
        let store = ScriptedMediaStore::default();

        let deleted = deletion(&posts, &store).delete_tree(&ALICE, 100).await.unwrap();

        assert_eq!(deleted, vec![100, 101, 102, 103]);
        assert_eq!(posts.post_count(), 0);
    }

    #[tokio::test]
    async fn non_author_is_forbidden_and_nothing_is_touched() {
        let posts = two_branch_store();
        let store = ScriptedMediaStore::default();

        let err = deletion(&posts, &store).delete_tree(&BOB, 1).await.unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(store.deleted().is_empty());
        assert_eq!(posts.post_count(), 5);
        assert_eq!(posts.media_count(), 4);
    }

    #[tokio::test]
    async fn reply_author_cannot_delete_from_the_middle_of_anothers_tree() {
        let posts = two_branch_store();
        let store = ScriptedMediaStore::default();

        // Bob owns post 2, so he may delete it with its reply 4 written by Alice.
        let deleted = deletion(&posts, &store).delete_tree(&BOB, 2).await.unwrap();
        assert_eq!(deleted, vec![2, 4]);

        let err = deletion(&posts, &store).delete_tree(&BOB, 1).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn one_failed_media_delete_keeps_every_row() {
        let posts = two_branch_store();
        let store = ScriptedMediaStore {
            failing: HashSet::from(["m11".to_string()]),
            ..Default::default()
        };

        let err = deletion(&posts, &store).delete_tree(&ALICE, 1).await.unwrap_err();

        assert!(matches!(err, AppError::MediaCleanupFailed(_)));
        assert_eq!(posts.post_count(), 5);
        assert_eq!(posts.media_count(), 4);
        assert_eq!(posts.like_count(), 2);
        // The other deletes were still issued and awaited.
        assert_eq!(store.deleted(), vec!["m10", "m12"]);
    }

    #[tokio::test]
    async fn hanging_media_store_times_out_without_deleting_rows() {
        let posts = two_branch_store();
        let store = ScriptedMediaStore {
            hanging: HashSet::from(["m12".to_string()]),
            ..Default::default()
        };

        let err = deletion(&posts, &store).delete_tree(&ALICE, 1).await.unwrap_err();

        assert!(matches!(err, AppError::MediaCleanupFailed(_)));
        assert_eq!(posts.post_count(), 5);
    }

    #[tokio::test]
    async fn already_absent_media_does_not_block_deletion() {
        let posts = two_branch_store();
        let store = ScriptedMediaStore {
            absent: HashSet::from(["m10".to_string(), "m12".to_string()]),
            ..Default::default()
        };

        let deleted = deletion(&posts, &store).delete_tree(&ALICE, 1).await.unwrap();

        assert_eq!(deleted, vec![1, 2, 3, 4]);
        assert_eq!(store.deleted(), vec!["m11"]);
    }

    #[tokio::test]
    async fn retry_after_failed_cleanup_succeeds() {
        let posts = two_branch_store();
        let flaky = ScriptedMediaStore {
            failing: HashSet::from(["m12".to_string()]),
            ..Default::default()
        };
        assert!(deletion(&posts, &flaky).delete_tree(&ALICE, 1).await.is_err());

        // m10 and m11 are gone remotely now; the store reports them absent.
        let healed = ScriptedMediaStore {
            absent: HashSet::from(["m10".to_string(), "m11".to_string()]),
            ..Default::default()
        };
        let deleted = deletion(&posts, &healed).delete_tree(&ALICE, 1).await.unwrap();

        assert_eq!(deleted, vec![1, 2, 3, 4]);
        assert_eq!(healed.deleted(), vec!["m12"]);
    }

    #[tokio::test]
    async fn deleting_twice_is_not_found() {
        let posts = two_branch_store();
        let store = ScriptedMediaStore::default();

        deletion(&posts, &store).delete_tree(&ALICE, 1).await.unwrap();
        let err = deletion(&posts, &store).delete_tree(&ALICE, 1).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn underivable_remote_id_fails_cleanup() {
        let posts = MemoryPostStore::new();
        posts.add_post(1, 1, None).unwrap();
        posts
            .add_media(MediaRef {
                id: 1,
                post_id: 1,
                url: "not a url".into(),
                public_id: None,
                kind: MediaKind::Raw,
            })
            .unwrap();
        let store = ScriptedMediaStore::default();

        let err = deletion(&posts, &store).delete_tree(&ALICE, 1).await.unwrap_err();

        assert!(matches!(err, AppError::MediaCleanupFailed(_)));
        assert!(posts.contains(1));
    }
}
