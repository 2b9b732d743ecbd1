// src/db/post_repo.rs

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;

use super::{PostRef, PostStore};
use crate::{
    error::AppError,
    models::media::{Media, MediaRef},
};

/// `PostStore` over the Postgres `posts` and `media` tables.
#[derive(Debug, Clone)]
pub struct PgPostStore {
    pool: PgPool,
}

impl PgPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PostOwnerRow {
    id: i64,
    user_id: i64,
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn find_post(&self, id: i64) -> Result<Option<PostRef>, AppError> {
        let row = sqlx::query_as::<_, PostOwnerRow>("SELECT id, user_id FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to fetch post {}: {:?}", id, e);
                AppError::from(e)
            })?;

        Ok(row.map(|r| PostRef {
            id: r.id,
            author_id: r.user_id,
        }))
    }

    async fn descendant_ids(&self, root: i64) -> Result<Vec<i64>, AppError> {
        // UNION rather than UNION ALL: a malformed cycle still reaches a fixed point.
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            WITH RECURSIVE post_tree AS (
                SELECT id FROM posts WHERE id = $1
                UNION
                SELECT p.id
                FROM posts p
                JOIN post_tree pt ON p.parent_post_id = pt.id
            )
            SELECT id FROM post_tree ORDER BY id
            "#,
        )
        .bind(root)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to resolve reply tree of post {}: {:?}", root, e);
            AppError::from(e)
        })?;

        Ok(ids)
    }

    async fn media_for(&self, ids: &[i64]) -> Result<Vec<MediaRef>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, Media>(
            r#"
            SELECT id, post_id, url, thumbnail_url, public_id, type, created_at
            FROM media
            WHERE post_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list media for posts {:?}: {:?}", ids, e);
            AppError::from(e)
        })?;

        Ok(rows.into_iter().map(MediaRef::from).collect())
    }

    async fn delete_posts(&self, ids: &[i64]) -> Result<Vec<i64>, AppError> {
        let mut tx = self.pool.begin().await?;

        // One statement, so the parent key is checked against the final state
        // and replies may go together with their parents.
        let mut deleted: Vec<i64> =
            sqlx::query_scalar("DELETE FROM posts WHERE id = ANY($1) RETURNING id")
                .bind(ids)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to delete posts {:?}: {:?}", ids, e);
                    AppError::from(e)
                })?;
        deleted.sort_unstable();

        let expected: BTreeSet<i64> = ids.iter().copied().collect();
        if deleted.iter().copied().collect::<BTreeSet<_>>() != expected {
            tx.rollback().await?;
            return Err(AppError::PersistenceFailure(format!(
                "expected to delete {} post(s), database removed {}",
                expected.len(),
                deleted.len()
            )));
        }

        tx.commit().await?;
        Ok(deleted)
    }
}
