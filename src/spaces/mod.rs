pub mod membership;
mod msg;
mod ws;

use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{auth, db::{self, ParticipantRole, Space, SpaceParticipant}, users, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_spaces).post(create_space))
        .route("/{id}", get(get_space))
        .route("/{id}/join", post(join_space))
        .route("/{id}/leave", post(leave_space))
        .route("/{id}/raise-hand", post(raise_hand))
        .route("/{id}/end", post(end_space))
        .route("/{id}/messages", get(msg::list_messages).post(msg::send_message))
        .route("/{id}/ws", get(ws::space_ws))
}

pub(crate) const SPACE_COLUMNS: &str =
    "id, host_id, title, description, tags, is_active, started_at, ended_at, created_at";

#[derive(Debug, Serialize)]
pub struct ParticipantResponse {
    pub account: users::UserPublic,
    pub role: ParticipantRole,
    pub is_muted: bool,
    pub is_speaking: bool,
    pub hand_raised: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct SpaceResponse {
    pub id: String,
    pub host_handle: String,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub listener_count: i64,
    pub participants: Vec<ParticipantResponse>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct SpaceListResponse {
    pub items: Vec<SpaceResponse>,
    pub total: i64,
}

async fn participant_responses(
    pool: &SqlitePool,
    space_id: &str,
) -> AppResult<Vec<ParticipantResponse>> {
    let rows = sqlx::query_as::<_, SpaceParticipant>(&format!(
        "SELECT {} FROM space_participants \
         WHERE space_id = ? AND left_at IS NULL ORDER BY joined_at",
        membership::PARTICIPANT_COLUMNS
    ))
    .bind(space_id)
    .fetch_all(pool)
    .await?;

    let mut participants = Vec::with_capacity(rows.len());
    for row in rows {
        let account = users::account_by_id(pool, &row.account_id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        participants.push(ParticipantResponse {
            account: users::public_profile(pool, &account).await?,
            role: row.role,
            is_muted: row.is_muted,
            is_speaking: row.is_speaking,
            hand_raised: row.hand_raised,
            joined_at: row.joined_at,
        });
    }

    Ok(participants)
}

async fn space_to_response(pool: &SqlitePool, space: &Space) -> AppResult<SpaceResponse> {
    let host = users::account_by_id(pool, &space.host_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let tags: Vec<String> = serde_json::from_str(&space.tags).unwrap_or_default();

    Ok(SpaceResponse {
        id: space.id.clone(),
        host_handle: host.handle,
        title: space.title.clone(),
        description: space.description.clone(),
        tags,
        is_active: space.is_active,
        listener_count: membership::listener_count(pool, &space.id).await?,
        participants: participant_responses(pool, &space.id).await?,
        started_at: space.started_at,
        ended_at: space.ended_at,
    })
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<u32>,
    per_page: Option<u32>,
}

#[debug_handler(state = AppState)]
async fn list_spaces(
    Query(query): Query<ListQuery>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<SpaceListResponse>> {
    let page = users::PageQuery {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(20),
    };

    let spaces = sqlx::query_as::<_, Space>(&format!(
        "SELECT {SPACE_COLUMNS} FROM spaces WHERE is_active = 1 \
         ORDER BY created_at DESC LIMIT ? OFFSET ?"
    ))
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&db_pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM spaces WHERE is_active = 1")
        .fetch_one(&db_pool)
        .await?;

    let mut items = Vec::with_capacity(spaces.len());
    for space in &spaces {
        items.push(space_to_response(&db_pool, space).await?);
    }

    Ok(Json(SpaceListResponse { items, total }))
}

#[derive(Debug, Deserialize)]
struct CreateSpace {
    title: String,
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// The space row and its host participant row commit together, so a
/// space can never be observed without a host.
#[debug_handler(state = AppState)]
async fn create_space(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(data): Json<CreateSpace>,
) -> AppResult<(StatusCode, Json<SpaceResponse>)> {
    let host = auth::require_account(&db_pool, &session).await?;

    if data.title.trim().is_empty() {
        return Err(AppError::validation("Space title cannot be empty"));
    }

    let id = Uuid::now_v7().to_string();
    let tags = serde_json::to_string(&data.tags)?;

    let mut tx = db_pool.begin().await?;

    sqlx::query(
        "INSERT INTO spaces (id, host_id, title, description, tags, started_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&host.id)
    .bind(&data.title)
    .bind(&data.description)
    .bind(&tags)
    .bind(db::now())
    .bind(db::now())
    .execute(&mut *tx)
    .await?;

    membership::insert_participant(&mut *tx, &id, &host.id, ParticipantRole::Host).await?;

    tx.commit().await?;

    tracing::info!("{} opened space {id}", host.handle);

    let space = membership::active_space(&db_pool, &id).await?;
    Ok((
        StatusCode::CREATED,
        Json(space_to_response(&db_pool, &space).await?),
    ))
}

#[debug_handler(state = AppState)]
async fn get_space(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<SpaceResponse>> {
    let space = sqlx::query_as::<_, Space>(&format!(
        "SELECT {SPACE_COLUMNS} FROM spaces WHERE id = ?"
    ))
    .bind(&id)
    .fetch_optional(&db_pool)
    .await?
    .ok_or_else(|| AppError::not_found("Space"))?;

    Ok(Json(space_to_response(&db_pool, &space).await?))
}

#[debug_handler(state = AppState)]
async fn join_space(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;
    membership::join(&db_pool, &id, &account.id).await?;
    Ok(Json(json!({"message": "Joined space"})))
}

#[debug_handler(state = AppState)]
async fn leave_space(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;
    membership::leave(&db_pool, &id, &account.id).await?;
    Ok(Json(json!({"message": "Left space"})))
}

#[debug_handler(state = AppState)]
async fn raise_hand(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;
    let raised = membership::toggle_hand(&db_pool, &id, &account.id).await?;
    Ok(Json(json!({"hand_raised": raised})))
}

#[debug_handler(state = AppState)]
async fn end_space(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;
    membership::end(&db_pool, &id, &account.id).await?;
    tracing::info!("space {id} ended");
    Ok(Json(json!({"message": "Space ended"})))
}
