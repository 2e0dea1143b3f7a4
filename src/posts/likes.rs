//! Post likes keep a stored likes_count on the post row; the edge insert
//! or delete and the counter update commit in one transaction so the
//! counter cannot drift from the edge set.

use axum::{debug_handler, extract::{Path, State}, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{auth, db::NotificationKind, notifications, AppError, AppResult, AppState};

/// Like a post. Idempotent: liking twice leaves the count unchanged.
/// Returns the resulting likes_count.
pub async fn like(pool: &SqlitePool, post_id: &str, account_id: &str) -> AppResult<(i64, bool)> {
    let mut tx = pool.begin().await?;

    let Some((likes_count,)) = sqlx::query_as::<_, (i64,)>(
        "SELECT likes_count FROM posts WHERE id = ? AND is_deleted = 0",
    )
    .bind(post_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Err(AppError::not_found("Post"));
    };

    let already = sqlx::query_as::<_, (i64,)>(
        "SELECT 1 FROM post_likes WHERE account_id = ? AND post_id = ?",
    )
    .bind(account_id)
    .bind(post_id)
    .fetch_optional(&mut *tx)
    .await?
    .is_some();

    if already {
        return Ok((likes_count, false));
    }

    sqlx::query("INSERT INTO post_likes (account_id, post_id) VALUES (?, ?)")
        .bind(account_id)
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE posts SET likes_count = likes_count + 1 WHERE id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((likes_count + 1, true))
}

/// Remove a like. Idempotent in the same way.
pub async fn unlike(pool: &SqlitePool, post_id: &str, account_id: &str) -> AppResult<(i64, bool)> {
    let mut tx = pool.begin().await?;

    let Some((likes_count,)) = sqlx::query_as::<_, (i64,)>(
        "SELECT likes_count FROM posts WHERE id = ? AND is_deleted = 0",
    )
    .bind(post_id)
    .fetch_optional(&mut *tx)
    .await?
    else {
        return Err(AppError::not_found("Post"));
    };

    let removed = sqlx::query("DELETE FROM post_likes WHERE account_id = ? AND post_id = ?")
        .bind(account_id)
        .bind(post_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    if removed == 0 {
        return Ok((likes_count, false));
    }

    sqlx::query("UPDATE posts SET likes_count = likes_count - 1 WHERE id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((likes_count - 1, true))
}

#[debug_handler(state = AppState)]
pub(crate) async fn like_post(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;
    let (likes, changed) = like(&db_pool, &id, &account.id).await?;

    if changed {
        let post = super::fetch_post(&db_pool, &id).await?;
        if post.author_id != account.id {
            notifications::notify(
                &db_pool,
                notifications::Notify {
                    account_id: &post.author_id,
                    kind: NotificationKind::Like,
                    actor_id: Some(&account.id),
                    post_id: Some(&id),
                    comment_id: None,
                    space_id: None,
                    preview_text: Some(&preview(&post.content)),
                },
            )
            .await?;
        }
    }

    let message = if changed { "Post liked" } else { "Already liked" };
    Ok(Json(json!({"message": message, "likes": likes})))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unlike_post(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;
    let (likes, changed) = unlike(&db_pool, &id, &account.id).await?;

    let message = if changed { "Post unliked" } else { "Not liked" };
    Ok(Json(json!({"message": message, "likes": likes})))
}

fn preview(content: &str) -> String {
    content.chars().take(280).collect()
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

    async fn edge_count(pool: &SqlitePool, post_id: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(pool)
            .await
            .unwrap();
        count
    }

    async fn stored_count(pool: &SqlitePool, post_id: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT likes_count FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_one(pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn like_updates_edge_and_counter_together() {
        let pool = db::test_pool().await;
        let author = account(&pool, "@author").await;
        let reader = account(&pool, "@reader").await;
        let post_id = post(&pool, &author).await;

        let (likes, changed) = like(&pool, &post_id, &reader).await.unwrap();
        assert!(changed);
        assert_eq!(likes, 1);
        assert_eq!(edge_count(&pool, &post_id).await, 1);
        assert_eq!(stored_count(&pool, &post_id).await, 1);
    }

    #[tokio::test]
    async fn double_like_is_idempotent() {
        let pool = db::test_pool().await;
        let author = account(&pool, "@author").await;
        let reader = account(&pool, "@reader").await;
        let post_id = post(&pool, &author).await;

        like(&pool, &post_id, &reader).await.unwrap();
        let (likes, changed) = like(&pool, &post_id, &reader).await.unwrap();
        assert!(!changed);
        assert_eq!(likes, 1);
        assert_eq!(stored_count(&pool, &post_id).await, 1);
    }

    #[tokio::test]
    async fn unlike_round_trip_restores_counts() {
        let pool = db::test_pool().await;
        let author = account(&pool, "@author").await;
        let reader = account(&pool, "@reader").await;
        let post_id = post(&pool, &author).await;

        like(&pool, &post_id, &reader).await.unwrap();
        let (likes, changed) = unlike(&pool, &post_id, &reader).await.unwrap();
        assert!(changed);
        assert_eq!(likes, 0);
        assert_eq!(edge_count(&pool, &post_id).await, 0);
        assert_eq!(stored_count(&pool, &post_id).await, 0);

        let (likes, changed) = unlike(&pool, &post_id, &reader).await.unwrap();
        assert!(!changed);
        assert_eq!(likes, 0);
    }

    #[tokio::test]
    async fn liking_a_missing_post_is_not_found() {
        let pool = db::test_pool().await;
        let reader = account(&pool, "@reader").await;

        let err = like(&pool, "nope", &reader).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
