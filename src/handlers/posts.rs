use axum::{
    Extension,
    extract::{Multipart, Query, State},
    response::IntoResponse,
};
use futures::future::join_all;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    db::post_views::{POST_COLUMNS, hydrate},
    error::AppError,
    models::{
        media::{Media, MediaKind},
        post::{CreatePostRequest, CreatedPost, DeletedPost, PendingUpload, Post, PostListParams},
    },
    services::{media_store::UploadedMedia, post_deletion::PostDeletion},
    state::AppState,
    utils::{extract::ApiPath, html::clean_html, jwt::Claims, response::ApiResponse},
};

/// Splits the multipart body into the text fields and the files.
async fn read_post_form(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<(CreatePostRequest, Vec<PendingUpload>), AppError> {
    let mut request = CreatePostRequest::default();
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "content" => {
                request.content = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
            }
            "visibility" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                request.visibility = raw.trim().parse().map_err(AppError::BadRequest)?;
            }
            "parent_post_id" | "parentPostId" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                if !raw.trim().is_empty() {
                    let id = raw.trim().parse::<i64>().map_err(|_| {
                        AppError::BadRequest("Invalid parent post id provided".to_string())
                    })?;
                    request.parent_post_id = Some(id);
                }
            }
            "files" | "media" | "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                if bytes.len() > max_upload_bytes {
                    return Err(AppError::BadRequest(format!(
                        "File '{}' is too large. Max size: {} MB",
                        file_name,
                        max_upload_bytes / 1_048_576
                    )));
                }
                if !bytes.is_empty() {
                    uploads.push(PendingUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok((request, uploads))
}

/// Best-effort removal of objects uploaded for a post that was never stored.
async fn discard_uploads(state: &AppState, uploaded: &[UploadedMedia]) {
    let removals = uploaded
        .iter()
        .map(|media| state.media.delete(&media.public_id, media.kind));
    for (media, result) in uploaded.iter().zip(join_all(removals).await) {
        if let Err(e) = result {
            tracing::warn!(public_id = %media.public_id, "Failed to discard upload: {}", e);
        }
    }
}

/// Create a new post or reply.
/// Requires: Login + verified email. Accepts `multipart/form-data` with
/// `content`, optional `visibility` and `parent_post_id`, and any number of
/// `files`.
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let author = claims.principal()?;
    let (mut payload, files) = read_post_form(multipart, state.config.max_upload_bytes).await?;

    payload.content = clean_html(payload.content.trim());
    payload.validate()?;

    // 1. Author must have verified their email
    let verified: bool = sqlx::query_scalar("SELECT email_verified FROM users WHERE id = $1")
        .bind(author.user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::AuthError("User not found".to_string()))?;
    if !verified {
        return Err(AppError::Forbidden(
            "User needs to verify their email to create a post".to_string(),
        ));
    }

    // 2. Replies need an existing parent
    if let Some(parent_id) = payload.parent_post_id {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(parent_id)
            .fetch_one(&state.pool)
            .await?;
        if !exists {
            return Err(AppError::BadRequest("Invalid parent post id provided".to_string()));
        }
    }

    // 3. Upload media before touching the database
    let uploads = files.into_iter().map(|file| {
        let kind = MediaKind::from_content_type(file.content_type.as_deref());
        tracing::debug!(file = %file.file_name, %kind, "uploading media");
        state.media.upload(file.bytes, kind)
    });
    let mut uploaded = Vec::new();
    let mut upload_error = None;
    for result in join_all(uploads).await {
        match result {
            Ok(media) => uploaded.push(media),
            Err(e) => upload_error = Some(e),
        }
    }
    if let Some(e) = upload_error {
        discard_uploads(&state, &uploaded).await;
        return Err(AppError::MediaStore(e));
    }

    // 4. Insert post and media rows together
    let stored = insert_post(&state.pool, author.user_id, &payload, &uploaded).await;
    match stored {
        Ok(created) => {
            tracing::info!(post_id = created.post_id, media = created.media.len(), "post created");
            Ok(ApiResponse::created("Post created successfully!", created))
        }
        Err(e) => {
            discard_uploads(&state, &uploaded).await;
            Err(e)
        }
    }
}

async fn insert_post(
    pool: &PgPool,
    user_id: i64,
    payload: &CreatePostRequest,
    uploaded: &[UploadedMedia],
) -> Result<CreatedPost, AppError> {
    let mut tx = pool.begin().await?;

    let post_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO posts (user_id, parent_post_id, content, visibility)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(payload.parent_post_id)
    .bind(&payload.content)
    .bind(payload.visibility.as_str())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create post: {:?}", e);
        AppError::from(e)
    })?;

    let mut media = Vec::with_capacity(uploaded.len());
    for item in uploaded {
        let row = sqlx::query_as::<_, Media>(
            r#"
            INSERT INTO media (post_id, url, thumbnail_url, public_id, type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, post_id, url, thumbnail_url, public_id, type, created_at
            "#,
        )
        .bind(post_id)
        .bind(&item.url)
        .bind(&item.thumbnail_url)
        .bind(&item.public_id)
        .bind(item.kind.as_str())
        .fetch_one(&mut *tx)
        .await?;
        media.push(row);
    }

    tx.commit().await?;
    Ok(CreatedPost { post_id, media })
}

/// Get a single post with its media, like count and direct replies.
pub async fn get_post(
    State(pool): State<PgPool>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let post = sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch post {}: {:?}", id, e);
            AppError::from(e)
        })?
        .ok_or_else(|| AppError::NotFound("No post found with provided ID".to_string()))?;

    let view = hydrate(&pool, vec![post])
        .await?
        .pop()
        .ok_or_else(|| AppError::InternalServerError(format!("post {id} vanished while loading")))?;

    Ok(ApiResponse::ok("Post fetched successfully", view))
}

/// List posts (and replies) written by a user, most recent first.
pub async fn list_user_posts(
    State(pool): State<PgPool>,
    ApiPath(user_id): ApiPath<i64>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let posts = sqlx::query_as::<_, Post>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        WHERE p.user_id = $1
          AND ($2::TIMESTAMPTZ IS NULL OR p.created_at < $2)
        ORDER BY p.created_at DESC
        LIMIT $3
        "#
    ))
    .bind(user_id)
    .bind(params.cursor)
    .bind(params.page_size())
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list posts of user {}: {:?}", user_id, e);
        AppError::from(e)
    })?;

    Ok(ApiResponse::ok("Posts fetched successfully", posts))
}

/// Delete a post together with every reply below it and all their media.
/// Requires: Login + authorship of the post.
pub async fn delete_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let requester = claims.principal()?;

    let deleted = PostDeletion::new(
        state.posts.as_ref(),
        state.media.as_ref(),
        state.config.media_timeout,
    )
    .delete_tree(&requester, id)
    .await?;

    let data: Vec<DeletedPost> = deleted
        .into_iter()
        .map(|deleted_id| DeletedPost { deleted_id })
        .collect();

    Ok(ApiResponse::ok("Post (and its replies) deleted successfully", data))
}
