use axum::{debug_handler, extract::{Path, Query, State}, Json};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{auth, db::{Account, NotificationKind}, graph, notifications, AppResult, AppState};

use super::{account_by_handle, public_profile, PageQuery, UserPublic};

#[debug_handler(state = AppState)]
pub(crate) async fn follow_user(
    Path(handle): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let actor = auth::require_account(&db_pool, &session).await?;
    let target = account_by_handle(&db_pool, &handle).await?;

    graph::follow(&db_pool, &actor.id, &target.id).await?;

    notifications::notify(
        &db_pool,
        notifications::Notify {
            account_id: &target.id,
            kind: NotificationKind::Follow,
            actor_id: Some(&actor.id),
            post_id: None,
            comment_id: None,
            space_id: None,
            preview_text: None,
        },
    )
    .await?;

    tracing::info!("{} now follows {}", actor.handle, target.handle);

    Ok(Json(json!({"message": format!("Now following {}", target.handle)})))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unfollow_user(
    Path(handle): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let actor = auth::require_account(&db_pool, &session).await?;
    let target = account_by_handle(&db_pool, &handle).await?;

    graph::unfollow(&db_pool, &actor.id, &target.id).await?;

    Ok(Json(json!({"message": format!("Unfollowed {}", target.handle)})))
}

const ACCOUNT_COLUMNS: &str = "a.id, a.email, a.password_hash, a.name, a.handle, a.avatar_url, \
     a.bio, a.location, a.website, a.language, a.is_active, a.is_verified, \
     a.verification_code, a.verification_code_expires, a.created_at";

#[debug_handler(state = AppState)]
pub(crate) async fn followers(
    Path(handle): Path<String>,
    Query(page): Query<PageQuery>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<UserPublic>>> {
    let target = account_by_handle(&db_pool, &handle).await?;

    let rows = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts a \
         JOIN follows f ON f.follower_id = a.id \
         WHERE f.followed_id = ? ORDER BY f.created_at DESC LIMIT ? OFFSET ?"
    ))
    .bind(&target.id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&db_pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for account in &rows {
        out.push(public_profile(&db_pool, account).await?);
    }
    Ok(Json(out))
}

#[debug_handler(state = AppState)]
pub(crate) async fn following(
    Path(handle): Path<String>,
    Query(page): Query<PageQuery>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<UserPublic>>> {
    let source = account_by_handle(&db_pool, &handle).await?;

    let rows = sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts a \
         JOIN follows f ON f.followed_id = a.id \
         WHERE f.follower_id = ? ORDER BY f.created_at DESC LIMIT ? OFFSET ?"
    ))
    .bind(&source.id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&db_pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for account in &rows {
        out.push(public_profile(&db_pool, account).await?);
    }
    Ok(Json(out))
}
