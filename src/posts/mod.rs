mod likes;

use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{ai::{ContextProfile, InterviewMessage}, auth, comments, db::{self, Post}, users, AppError, AppResult, AppState};

pub use likes::{like, unlike};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(feed).post(create_post))
        .route("/{id}", get(get_post).delete(delete_post))
        .route("/{id}/like", post(likes::like_post).delete(likes::unlike_post))
        .route("/{id}/comments", get(comments::list).post(comments::create))
        .route("/{id}/comments/{comment_id}", axum::routing::delete(comments::delete))
}

pub(crate) const POST_COLUMNS: &str = "id, author_id, content, image_url, context_profile, \
     interview_history, likes_count, reply_count, is_published, is_deleted, created_at";

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: String,
    pub content: String,
    pub image_url: Option<String>,
    pub author_name: String,
    pub author_handle: String,
    pub avatar_url: Option<String>,
    pub context_profile: ContextProfile,
    pub likes: i64,
    pub reply_count: i64,
    pub is_liked: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub items: Vec<PostResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub has_next: bool,
}

pub(crate) async fn fetch_post(pool: &SqlitePool, post_id: &str) -> AppResult<Post> {
    sqlx::query_as::<_, Post>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = ? AND is_deleted = 0"
    ))
    .bind(post_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Post"))
}

pub(crate) async fn post_to_response(
    pool: &SqlitePool,
    post: &Post,
    current_account_id: Option<&str>,
) -> AppResult<PostResponse> {
    let author = users::account_by_id(pool, &post.author_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    let is_liked = match current_account_id {
        Some(account_id) => {
            sqlx::query_as::<_, (i64,)>(
                "SELECT 1 FROM post_likes WHERE account_id = ? AND post_id = ?",
            )
            .bind(account_id)
            .bind(&post.id)
            .fetch_optional(pool)
            .await?
            .is_some()
        }
        None => false,
    };

    // Rows written before the profile schema settled may hold partial
    // objects; missing keys fall back to defaults.
    let context_profile: ContextProfile =
        serde_json::from_str(&post.context_profile).unwrap_or_default();

    Ok(PostResponse {
        id: post.id.clone(),
        content: post.content.clone(),
        image_url: post.image_url.clone(),
        author_name: author.name,
        author_handle: author.handle,
        avatar_url: author.avatar_url,
        context_profile,
        likes: post.likes_count,
        reply_count: post.reply_count,
        is_liked,
        timestamp: post.created_at,
    })
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    page: Option<u32>,
    per_page: Option<u32>,
    feed: Option<String>,
}

#[debug_handler(state = AppState)]
async fn feed(
    Query(query): Query<FeedQuery>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<PostListResponse>> {
    let current = auth::current_account(&db_pool, &session).await?;
    let page = users::PageQuery {
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(20),
    };

    let feed = query.feed.as_deref().unwrap_or("foryou");
    let following = match feed {
        "foryou" => false,
        "following" => true,
        other => return Err(AppError::validation(format!("Unknown feed '{other}'"))),
    };

    let (posts, total) = if following {
        let Some(current) = &current else {
            return Err(AppError::authentication("Sign in to see your following feed"));
        };

        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE is_deleted = 0 AND is_published = 1 \
               AND author_id IN (SELECT followed_id FROM follows WHERE follower_id = ?) \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(&current.id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&db_pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM posts \
             WHERE is_deleted = 0 AND is_published = 1 \
               AND author_id IN (SELECT followed_id FROM follows WHERE follower_id = ?)",
        )
        .bind(&current.id)
        .fetch_one(&db_pool)
        .await?;

        (posts, total)
    } else {
        let posts = sqlx::query_as::<_, Post>(&format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE is_deleted = 0 AND is_published = 1 \
             ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&db_pool)
        .await?;

        let (total,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM posts WHERE is_deleted = 0 AND is_published = 1")
                .fetch_one(&db_pool)
                .await?;

        (posts, total)
    };

    let current_id = current.as_ref().map(|a| a.id.as_str());
    let mut items = Vec::with_capacity(posts.len());
    for post in &posts {
        items.push(post_to_response(&db_pool, post, current_id).await?);
    }

    let has_next = page.offset() + page.limit() < total;

    Ok(Json(PostListResponse {
        items,
        total,
        page: page.page,
        per_page: page.per_page,
        has_next,
    }))
}

#[derive(Debug, Deserialize)]
struct CreatePost {
    content: String,
    image_url: Option<String>,
    context_profile: Option<ContextProfile>,
    interview_history: Option<Vec<InterviewMessage>>,
    #[serde(default = "default_published")]
    is_published: bool,
}

fn default_published() -> bool {
    true
}

#[debug_handler(state = AppState)]
async fn create_post(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(data): Json<CreatePost>,
) -> AppResult<(StatusCode, Json<PostResponse>)> {
    let author = auth::require_account(&db_pool, &session).await?;

    if data.content.trim().is_empty() {
        return Err(AppError::validation("Post content cannot be empty"));
    }

    let id = Uuid::now_v7().to_string();
    let context_profile = serde_json::to_string(&data.context_profile.unwrap_or_default())?;
    let interview_history = data
        .interview_history
        .map(|history| serde_json::to_string(&history))
        .transpose()?;

    sqlx::query(
        "INSERT INTO posts (id, author_id, content, image_url, context_profile, \
         interview_history, is_published, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&author.id)
    .bind(&data.content)
    .bind(&data.image_url)
    .bind(&context_profile)
    .bind(&interview_history)
    .bind(data.is_published)
    .bind(db::now())
    .execute(&db_pool)
    .await?;

    let post = fetch_post(&db_pool, &id).await?;
    Ok((
        StatusCode::CREATED,
        Json(post_to_response(&db_pool, &post, Some(&author.id)).await?),
    ))
}

#[debug_handler(state = AppState)]
async fn get_post(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<PostResponse>> {
    let current = auth::current_account(&db_pool, &session).await?;
    let post = fetch_post(&db_pool, &id).await?;
    let current_id = current.as_ref().map(|a| a.id.as_str());
    Ok(Json(post_to_response(&db_pool, &post, current_id).await?))
}

#[debug_handler(state = AppState)]
async fn delete_post(
    Path(id): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let account = auth::require_account(&db_pool, &session).await?;
    let post = fetch_post(&db_pool, &id).await?;

    if post.author_id != account.id {
        return Err(AppError::authorization("Not authorized to delete this post"));
    }

    sqlx::query("UPDATE posts SET is_deleted = 1 WHERE id = ?")
        .bind(&post.id)
        .execute(&db_pool)
        .await?;

    Ok(Json(json!({"message": "Post deleted"})))
}
