//! Case-insensitive substring search over users and posts.

use axum::{debug_handler, extract::{Query, State}, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{auth, db::{Account, Post}, posts, users, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(search_users))
        .route("/posts", get(search_posts))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    page: Option<u32>,
    per_page: Option<u32>,
}

impl SearchQuery {
    fn page(&self) -> users::PageQuery {
        users::PageQuery {
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(20),
        }
    }

    // LIKE wildcards in the query text are literal search characters.
    fn pattern(&self) -> AppResult<String> {
        let q = self.q.trim();
        if q.is_empty() {
            return Err(AppError::validation("Search query cannot be empty"));
        }
        let escaped = q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        Ok(format!("%{escaped}%"))
    }
}

#[derive(Debug, Serialize)]
struct UserSearchResponse {
    items: Vec<users::UserPublic>,
    total: i64,
}

#[debug_handler(state = AppState)]
async fn search_users(
    Query(query): Query<SearchQuery>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<UserSearchResponse>> {
    let pattern = query.pattern()?;
    let page = query.page();

    let rows = sqlx::query_as::<_, Account>(&format!(
        "SELECT {} FROM accounts \
         WHERE is_active = 1 AND (handle LIKE ? ESCAPE '\\' OR name LIKE ? ESCAPE '\\') \
         ORDER BY handle LIMIT ? OFFSET ?",
        users::ACCOUNT_COLUMNS
    ))
    .bind(&pattern)
    .bind(&pattern)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&db_pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM accounts \
         WHERE is_active = 1 AND (handle LIKE ? ESCAPE '\\' OR name LIKE ? ESCAPE '\\')",
    )
    .bind(&pattern)
    .bind(&pattern)
    .fetch_one(&db_pool)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for account in &rows {
        items.push(users::public_profile(&db_pool, account).await?);
    }

    Ok(Json(UserSearchResponse { items, total }))
}

#[derive(Debug, Serialize)]
struct PostSearchResponse {
    items: Vec<posts::PostResponse>,
    total: i64,
}

#[debug_handler(state = AppState)]
async fn search_posts(
    Query(query): Query<SearchQuery>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<PostSearchResponse>> {
    let current = auth::current_account(&db_pool, &session).await?;
    let pattern = query.pattern()?;
    let page = query.page();

    let rows = sqlx::query_as::<_, Post>(&format!(
        "SELECT {} FROM posts \
         WHERE is_deleted = 0 AND is_published = 1 AND content LIKE ? ESCAPE '\\' \
         ORDER BY created_at DESC LIMIT ? OFFSET ?",
        posts::POST_COLUMNS
    ))
    .bind(&pattern)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&db_pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM posts \
         WHERE is_deleted = 0 AND is_published = 1 AND content LIKE ? ESCAPE '\\'",
    )
    .bind(&pattern)
    .fetch_one(&db_pool)
    .await?;

    let current_id = current.as_ref().map(|a| a.id.as_str());
    let mut items = Vec::with_capacity(rows.len());
    for post in &rows {
        items.push(posts::post_to_response(&db_pool, post, current_id).await?);
    }

    Ok(Json(PostSearchResponse { items, total }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(q: &str) -> SearchQuery {
        SearchQuery { q: q.to_owned(), page: None, per_page: None }
    }

    #[test]
    fn pattern_escapes_like_wildcards() {
        assert_eq!(query("50%_off").pattern().unwrap(), "%50\\%\\_off%");
    }

    #[test]
    fn blank_query_is_rejected() {
        assert!(matches!(query("   ").pattern().unwrap_err(), AppError::Validation(_)));
    }
}
