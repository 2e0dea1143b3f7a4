use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{auth, AppResult, AppState};

use super::{account_by_handle, full_profile, public_profile, UserPublic, UserResponse};

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    Path(handle): Path<String>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<UserPublic>> {
    let account = account_by_handle(&db_pool, &handle).await?;
    Ok(Json(public_profile(&db_pool, &account).await?))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateProfile {
    name: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
    location: Option<String>,
    website: Option<String>,
    language: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_me(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(update): Json<UpdateProfile>,
) -> AppResult<Json<UserResponse>> {
    let mut account = auth::require_account(&db_pool, &session).await?;

    if let Some(name) = update.name {
        account.name = name;
    }
    if let Some(bio) = update.bio {
        account.bio = Some(bio);
    }
    if let Some(avatar_url) = update.avatar_url {
        account.avatar_url = Some(avatar_url);
    }
    if let Some(location) = update.location {
        account.location = Some(location);
    }
    if let Some(website) = update.website {
        account.website = Some(website);
    }
    if let Some(language) = update.language {
        account.language = language;
    }

    sqlx::query(
        "UPDATE accounts SET name = ?, bio = ?, avatar_url = ?, location = ?, website = ?, \
         language = ? WHERE id = ?",
    )
    .bind(&account.name)
    .bind(&account.bio)
    .bind(&account.avatar_url)
    .bind(&account.location)
    .bind(&account.website)
    .bind(&account.language)
    .bind(&account.id)
    .execute(&db_pool)
    .await?;

    Ok(Json(full_profile(&db_pool, &account).await?))
}
