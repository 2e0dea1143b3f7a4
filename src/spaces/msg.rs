use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{auth, db, users, AppError, AppResult, AppState};

use super::membership;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SpaceMessage {
    pub id: String,
    pub space_id: String,
    pub account_id: String,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub space_id: String,
    pub author_handle: String,
    pub author_name: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn message_to_response(
    pool: &SqlitePool,
    message: &SpaceMessage,
) -> AppResult<MessageResponse> {
    let author = users::account_by_id(pool, &message.account_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    Ok(MessageResponse {
        id: message.id.clone(),
        space_id: message.space_id.clone(),
        author_handle: author.handle,
        author_name: author.name,
        content: message.content.clone(),
        timestamp: message.created_at,
    })
}

pub(crate) async fn require_participant(
    pool: &SqlitePool,
    space_id: &str,
    account_id: &str,
) -> AppResult<()> {
    membership::active_space(pool, space_id).await?;

    if membership::active_membership(pool, space_id, account_id)
        .await?
        .is_none()
    {
        return Err(AppError::authorization("Join the space to use its chat"));
    }

    Ok(())
}

/// Store a chat message and fan it out to every websocket listener.
pub(crate) async fn send(
    pool: &SqlitePool,
    tx: &broadcast::Sender<String>,
    space_id: &str,
    account_id: &str,
    content: &str,
) -> AppResult<MessageResponse> {
    let id = Uuid::now_v7().to_string();
    sqlx::query(
        "INSERT INTO space_messages (id, space_id, account_id, content, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(space_id)
    .bind(account_id)
    .bind(content)
    .bind(db::now())
    .execute(pool)
    .await?;

    let message = sqlx::query_as::<_, SpaceMessage>(
        "SELECT id, space_id, account_id, content, created_at FROM space_messages WHERE id = ?",
    )
    .bind(&id)
    .fetch_one(pool)
    .await?;

    let response = message_to_response(pool, &message).await?;
    // Nobody listening is fine.
    let _ = tx.send(serde_json::to_string(&response)?);

    Ok(response)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct MessageListResponse {
    pub items: Vec<MessageResponse>,
    pub total: i64,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_messages(
    Path(space_id): Path<String>,
    Query(query): Query<ListQuery>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<MessageListResponse>> {
    let account = auth::require_account(&db_pool, &session).await?;
    require_participant(&db_pool, &space_id, &account.id).await?;

    let page = users::PageQuery {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(50),
    };

    let rows = sqlx::query_as::<_, SpaceMessage>(
        "SELECT id, space_id, account_id, content, created_at FROM space_messages \
         WHERE space_id = ? ORDER BY created_at LIMIT ? OFFSET ?",
    )
    .bind(&space_id)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&db_pool)
    .await?;

    let (total,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM space_messages WHERE space_id = ?")
            .bind(&space_id)
            .fetch_one(&db_pool)
            .await?;

    let mut items = Vec::with_capacity(rows.len());
    for message in &rows {
        items.push(message_to_response(&db_pool, message).await?);
    }

    Ok(Json(MessageListResponse { items, total }))
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessage {
    content: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn send_message(
    Path(space_id): Path<String>,
    State(db_pool): State<SqlitePool>,
    State(tx): State<broadcast::Sender<String>>,
    session: Session,
    Json(data): Json<SendMessage>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let account = auth::require_account(&db_pool, &session).await?;
    require_participant(&db_pool, &space_id, &account.id).await?;

    if data.content.trim().is_empty() {
        return Err(AppError::validation("Message content cannot be empty"));
    }

    let response = send(&db_pool, &tx, &space_id, &account.id, &data.content).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
