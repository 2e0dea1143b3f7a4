//! Threaded comments on posts. The post's stored reply_count moves in
//! the same transaction as the comment row, mirroring the like counter.

use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{auth, db::{self, Comment, NotificationKind}, notifications, posts, users, AppError, AppResult, AppState};

const COMMENT_COLUMNS: &str =
    "id, post_id, author_id, parent_id, content, is_ai_response, is_deleted, created_at";

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: String,
    pub author: users::UserPublic,
    pub content: String,
    pub is_ai_response: bool,
    pub reply_to_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct CommentListResponse {
    pub items: Vec<CommentResponse>,
    pub total: i64,
}

pub struct NewComment<'a> {
    pub post_id: &'a str,
    pub author_id: &'a str,
    pub parent_id: Option<&'a str>,
    pub content: &'a str,
    pub is_ai_response: bool,
}

/// Insert a comment and bump the post's reply_count atomically.
pub async fn add_comment(pool: &SqlitePool, new: NewComment<'_>) -> AppResult<Comment> {
    let mut tx = pool.begin().await?;

    let post_exists = sqlx::query_as::<_, (i64,)>(
        "SELECT 1 FROM posts WHERE id = ? AND is_deleted = 0",
    )
    .bind(new.post_id)
    .fetch_optional(&mut *tx)
    .await?
    .is_some();

    if !post_exists {
        return Err(AppError::not_found("Post"));
    }

    if let Some(parent_id) = new.parent_id {
        let parent_exists = sqlx::query_as::<_, (i64,)>(
            "SELECT 1 FROM comments WHERE id = ? AND post_id = ? AND is_deleted = 0",
        )
        .bind(parent_id)
        .bind(new.post_id)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();

        if !parent_exists {
            return Err(AppError::not_found("Parent comment"));
        }
    }

    let id = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT INTO comments (id, post_id, author_id, parent_id, content, is_ai_response, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(new.post_id)
    .bind(new.author_id)
    .bind(new.parent_id)
    .bind(new.content)
    .bind(new.is_ai_response)
    .bind(db::now())
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE posts SET reply_count = reply_count + 1 WHERE id = ?")
        .bind(new.post_id)
        .execute(&mut *tx)
        .await?;

    let comment = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?"
    ))
    .bind(&id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(comment)
}

/// Soft-delete a comment and drop the post's reply_count atomically.
pub async fn remove_comment(pool: &SqlitePool, post_id: &str, comment_id: &str) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    let removed = sqlx::query(
        "UPDATE comments SET is_deleted = 1 WHERE id = ? AND post_id = ? AND is_deleted = 0",
    )
    .bind(comment_id)
    .bind(post_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if removed == 0 {
        return Err(AppError::not_found("Comment"));
    }

    sqlx::query("UPDATE posts SET reply_count = reply_count - 1 WHERE id = ? AND reply_count > 0")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(())
}

async fn comment_to_response(pool: &SqlitePool, comment: &Comment) -> AppResult<CommentResponse> {
    let author = users::account_by_id(pool, &comment.author_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(CommentResponse {
        id: comment.id.clone(),
        author: users::public_profile(pool, &author).await?,
        content: comment.content.clone(),
        is_ai_response: comment.is_ai_response,
        reply_to_id: comment.parent_id.clone(),
        timestamp: comment.created_at,
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list(
    Path(post_id): Path<String>,
    Query(query): Query<ListQuery>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<CommentListResponse>> {
    posts::fetch_post(&db_pool, &post_id).await?;

    let page = users::PageQuery {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(50),
    };

    let rows = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments \
         WHERE post_id = ? AND is_deleted = 0 ORDER BY created_at LIMIT ? OFFSET ?"
    ))
    .bind(&post_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&db_pool)
    .await?;

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM comments WHERE post_id = ? AND is_deleted = 0")
            .bind(&post_id)
            .fetch_one(&db_pool)
            .await?;

    let mut items = Vec::with_capacity(rows.len());
    for comment in &rows {
        items.push(comment_to_response(&db_pool, comment).await?);
    }

    Ok(Json(CommentListResponse { items, total }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateComment {
    content: String,
    reply_to_id: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn create(
    Path(post_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(data): Json<CreateComment>,
) -> AppResult<(StatusCode, Json<CommentResponse>)> {
    let author = auth::require_account(&db_pool, &session).await?;

    if data.content.trim().is_empty() {
        return Err(AppError::validation("Comment content cannot be empty"));
    }

    let comment = add_comment(
        &db_pool,
        NewComment {
            post_id: &post_id,
            author_id: &author.id,
            parent_id: data.reply_to_id.as_deref(),
            content: &data.content,
            is_ai_response: false,
        },
    )
    .await?;

    let post = posts::fetch_post(&db_pool, &post_id).await?;
    if post.author_id != author.id {
        notifications::notify(
            &db_pool,
            notifications::Notify {
                account_id: &post.author_id,
                kind: NotificationKind::Reply,
                actor_id: Some(&author.id),
                post_id: Some(&post_id),
                comment_id: Some(&comment.id),
                space_id: None,
                preview_text: Some(&data.content.chars().take(280).collect::<String>()),
            },
        )
        .await?;
    }

    Ok((
        StatusCode::CREATED,
        Json(comment_to_response(&db_pool, &comment).await?),
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete(
    Path((post_id, comment_id)): Path<(String, String)>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;

    let comment = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ? AND post_id = ? AND is_deleted = 0"
    ))
    .bind(&comment_id)
    .bind(&post_id)
    .fetch_optional(&db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Comment"))?;

    if comment.author_id != account.id {
        return Err(AppError::authorization("Not authorized to delete this comment"));
    }

    remove_comment(&db_pool, &post_id, &comment_id).await?;

    Ok(Json(json!({"message": "Comment deleted"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn account(pool: &SqlitePool, handle: &str) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        sqlx::query(
            "INSERT INTO accounts (id, email, password_hash, name, handle, created_at)
             VALUES (?, ?, 'x', 'x', ?, ?)",
        )
        .bind(&id)
        .bind(format!("{id}@example.com"))
        .bind(handle)
        .bind(db::now())
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn post(pool: &SqlitePool, author_id: &str) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        sqlx::query("INSERT INTO posts (id, author_id, content, created_at) VALUES (?, ?, 'hi', ?)")
            .bind(&id)
            .bind(author_id)
            .bind(db::now())
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn reply_count(pool: &SqlitePool, post_id: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT reply_count FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_one(pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn commenting_bumps_reply_count() {
        let pool = db::test_pool().await;
        let author = account(&pool, "@author").await;
        let post_id = post(&pool, &author).await;

        add_comment(&pool, NewComment {
            post_id: &post_id,
            author_id: &author,
            parent_id: None,
            content: "first",
            is_ai_response: false,
        })
        .await
        .unwrap();

        assert_eq!(reply_count(&pool, &post_id).await, 1);
    }

    #[tokio::test]
    async fn deleting_a_comment_restores_reply_count() {
        let pool = db::test_pool().await;
        let author = account(&pool, "@author").await;
        let post_id = post(&pool, &author).await;

        let comment = add_comment(&pool, NewComment {
            post_id: &post_id,
            author_id: &author,
            parent_id: None,
            content: "first",
            is_ai_response: false,
        })
        .await
        .unwrap();

        remove_comment(&pool, &post_id, &comment.id).await.unwrap();
        assert_eq!(reply_count(&pool, &post_id).await, 0);

        let err = remove_comment(&pool, &post_id, &comment.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn replying_to_a_missing_parent_fails() {
        let pool = db::test_pool().await;
        let author = account(&pool, "@author").await;
        let post_id = post(&pool, &author).await;

        let err = add_comment(&pool, NewComment {
            post_id: &post_id,
            author_id: &author,
            parent_id: Some("missing"),
            content: "reply",
            is_ai_response: false,
        })
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(reply_count(&pool, &post_id).await, 0);
    }
}
