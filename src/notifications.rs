use axum::{debug_handler, extract::{Path, Query, State}, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{auth, db::{self, Notification, NotificationKind}, users, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/read-all", post(read_all))
        .route("/{id}/read", post(read_one))
}

pub struct Notify<'a> {
    pub account_id: &'a str,
    pub kind: NotificationKind,
    pub actor_id: Option<&'a str>,
    pub post_id: Option<&'a str>,
    pub comment_id: Option<&'a str>,
    pub space_id: Option<&'a str>,
    pub preview_text: Option<&'a str>,
}

/// Insert a notification. Takes any executor so callers can fold it into
/// an open transaction.
pub async fn notify<'e, E>(executor: E, n: Notify<'_>) -> AppResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO notifications \
         (id, account_id, kind, actor_id, post_id, comment_id, space_id, preview_text, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::now_v7().to_string())
    .bind(n.account_id)
    .bind(n.kind)
    .bind(n.actor_id)
    .bind(n.post_id)
    .bind(n.comment_id)
    .bind(n.space_id)
    .bind(n.preview_text)
    .bind(db::now())
    .execute(executor)
    .await?;

    Ok(())
}

#[derive(Debug, Serialize)]
struct NotificationResponse {
    id: String,
    kind: NotificationKind,
    actor: Option<users::UserPublic>,
    post_id: Option<String>,
    comment_id: Option<String>,
    space_id: Option<String>,
    preview_text: Option<String>,
    read: bool,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

#[derive(Debug, Serialize)]
struct NotificationListResponse {
    items: Vec<NotificationResponse>,
    total: i64,
    unread_count: i64,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    #[serde(default)]
    unread_only: bool,
}

#[debug_handler(state = AppState)]
async fn list(
    Query(query): Query<ListQuery>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<NotificationListResponse>> {
    let account = auth::require_account(&db_pool, &session).await?;
    let page = users::PageQuery {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(50),
    };

    let mut sql = String::from(
        "SELECT id, account_id, kind, actor_id, post_id, comment_id, space_id, preview_text, \
         is_read, created_at FROM notifications WHERE account_id = ?",
    );
    if query.unread_only {
        sql.push_str(" AND is_read = 0");
    }
    sql.push_str(" ORDER BY created_at DESC LIMIT ? OFFSET ?");

    let rows = sqlx::query_as::<_, Notification>(&sql)
        .bind(&account.id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&db_pool)
        .await?;

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE account_id = ?")
            .bind(&account.id)
            .fetch_one(&db_pool)
            .await?;

    let (unread_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE account_id = ? AND is_read = 0")
            .bind(&account.id)
            .fetch_one(&db_pool)
            .await?;

    let mut items = Vec::with_capacity(rows.len());
    for n in rows {
        let actor = match &n.actor_id {
            Some(actor_id) => match users::account_by_id(&db_pool, actor_id).await? {
                Some(actor) => Some(users::public_profile(&db_pool, &actor).await?),
                None => None,
            },
            None => None,
        };

        items.push(NotificationResponse {
            id: n.id,
            kind: n.kind,
            actor,
            post_id: n.post_id,
            comment_id: n.comment_id,
            space_id: n.space_id,
            preview_text: n.preview_text,
            read: n.is_read,
            timestamp: n.created_at,
        });
    }

    Ok(Json(NotificationListResponse { items, total, unread_count }))
}

#[debug_handler(state = AppState)]
async fn read_all(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;

    sqlx::query("UPDATE notifications SET is_read = 1 WHERE account_id = ? AND is_read = 0")
        .bind(&account.id)
        .execute(&db_pool)
        .await?;

    Ok(Json(json!({"message": "All notifications marked as read"})))
}

#[debug_handler(state = AppState)]
async fn read_one(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;

    sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND account_id = ?")
        .bind(&id)
        .bind(&account.id)
        .execute(&db_pool)
        .await?;

    Ok(Json(json!({"message": "Notification marked as read"})))
}
