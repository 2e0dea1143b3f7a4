mod follow;
mod page;

use axum::{routing::{get, patch, post}, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{db::Account, graph, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me", patch(page::update_me))
        .route("/{handle}", get(page::profile))
        .route("/{handle}/follow", post(follow::follow_user).delete(follow::unfollow_user))
        .route("/{handle}/followers", get(follow::followers))
        .route("/{handle}/following", get(follow::following))
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub followers: i64,
    pub following: i64,
}

#[derive(Debug, Serialize)]
pub struct UserPublic {
    pub id: String,
    pub name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub stats: UserStats,
    pub is_verified: bool,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub handle: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub language: String,
    pub stats: UserStats,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Follower/following stats are always computed from the follows table,
/// never read from a stored counter.
pub async fn stats(pool: &SqlitePool, account_id: &str) -> AppResult<UserStats> {
    Ok(UserStats {
        followers: graph::follower_count(pool, account_id).await?,
        following: graph::following_count(pool, account_id).await?,
    })
}

pub async fn public_profile(pool: &SqlitePool, account: &Account) -> AppResult<UserPublic> {
    Ok(UserPublic {
        id: account.id.clone(),
        name: account.name.clone(),
        handle: account.handle.clone(),
        avatar_url: account.avatar_url.clone(),
        bio: account.bio.clone(),
        location: account.location.clone(),
        website: account.website.clone(),
        stats: stats(pool, &account.id).await?,
        is_verified: account.is_verified,
    })
}

pub async fn full_profile(pool: &SqlitePool, account: &Account) -> AppResult<UserResponse> {
    Ok(UserResponse {
        id: account.id.clone(),
        email: account.email.clone(),
        name: account.name.clone(),
        handle: account.handle.clone(),
        avatar_url: account.avatar_url.clone(),
        bio: account.bio.clone(),
        location: account.location.clone(),
        website: account.website.clone(),
        language: account.language.clone(),
        stats: stats(pool, &account.id).await?,
        is_verified: account.is_verified,
        created_at: account.created_at,
    })
}

pub(crate) const ACCOUNT_COLUMNS: &str = "id, email, password_hash, name, handle, avatar_url, bio, \
     location, website, language, is_active, is_verified, verification_code, \
     verification_code_expires, created_at";

/// Look an account up by its public handle; a missing `@` is tolerated.
pub async fn account_by_handle(pool: &SqlitePool, handle: &str) -> AppResult<Account> {
    let handle = if handle.starts_with('@') {
        handle.to_owned()
    } else {
        format!("@{handle}")
    };

    sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE handle = ? AND is_active = 1"
    ))
    .bind(&handle)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("User"))
}

pub async fn account_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<Account>> {
    Ok(sqlx::query_as::<_, Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?)
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl PageQuery {
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.clamp(1, 100))
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}
