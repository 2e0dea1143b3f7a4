mod clients;
mod lockin;
mod login;
mod logout;
mod password;
mod register;

use axum::{debug_handler, extract::State, routing::{get, post}, Json, Router};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

pub use clients::{fetch_identity, ClientProvider, Clients, OauthIdentity};
pub use password::{hash_password, validate_password_strength, verify_password};

use crate::{db::{self, Account}, error::is_unique_violation, handle, session::ACCOUNT_ID, users, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register::register))
        .route("/login", post(login::login))
        .route("/login/{provider}", get(login::oauth_login))
        .route("/callback/{provider}", get(lockin::lockin))
        .route("/verify", post(register::verify_email))
        .route("/resend-verification", post(register::resend_verification))
        .route("/me", get(me))
        .route("/logout", post(logout::logout))
}

pub(crate) struct NewAccount<'a> {
    pub email: &'a str,
    pub password_hash: String,
    pub name: &'a str,
    pub handle_seed: &'a str,
    pub allow_suffix: bool,
    pub avatar_url: Option<&'a str>,
    pub verified: bool,
    pub verification_code: Option<String>,
    pub verification_code_expires: Option<OffsetDateTime>,
}

// Allocation and insert race against concurrent registrations; the unique
// handle index arbitrates and the loser re-allocates.
const CREATE_ATTEMPTS: usize = 3;

pub(crate) async fn create_account(pool: &SqlitePool, new: NewAccount<'_>) -> AppResult<Account> {
    for _ in 0..CREATE_ATTEMPTS {
        let allocated = handle::allocate(pool, new.handle_seed, new.allow_suffix).await?;
        let id = Uuid::now_v7().to_string();

        let inserted = sqlx::query(
            "INSERT INTO accounts \
             (id, email, password_hash, name, handle, avatar_url, is_verified, \
              verification_code, verification_code_expires, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(new.email)
        .bind(&new.password_hash)
        .bind(new.name)
        .bind(&allocated)
        .bind(new.avatar_url)
        .bind(new.verified)
        .bind(&new.verification_code)
        .bind(new.verification_code_expires)
        .bind(db::now())
        .execute(pool)
        .await;

        match inserted {
            Ok(_) => {
                tracing::info!("created account {allocated}");
                let account = users::account_by_id(pool, &id)
                    .await?
                    .ok_or_else(|| AppError::internal("account vanished after insert"))?;
                return Ok(account);
            }
            Err(err) if is_unique_violation(&err) => {
                let msg = err.to_string();
                if msg.contains("accounts.email") {
                    return Err(AppError::conflict("Email already registered"));
                }
                // Lost the handle race; try a fresh candidate.
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(AppError::internal("account creation kept losing handle races"))
}

/// The signed-in account, or an authentication failure.
pub async fn require_account(pool: &SqlitePool, session: &Session) -> AppResult<Account> {
    let Some(account_id) = session.get::<String>(ACCOUNT_ID).await? else {
        return Err(AppError::authentication("Not signed in"));
    };

    let account = users::account_by_id(pool, &account_id)
        .await?
        .ok_or_else(|| AppError::authentication("Account not found"))?;

    if !account.is_active {
        return Err(AppError::authentication("Account is disabled"));
    }

    Ok(account)
}

/// Like require_account, but anonymous access is fine.
pub async fn current_account(pool: &SqlitePool, session: &Session) -> AppResult<Option<Account>> {
    match require_account(pool, session).await {
        Ok(account) => Ok(Some(account)),
        Err(AppError::Authentication(_)) => Ok(None),
        Err(err) => Err(err),
    }
}

#[debug_handler(state = AppState)]
async fn me(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<users::UserResponse>> {
    let account = require_account(&db_pool, &session).await?;
    Ok(Json(users::full_profile(&db_pool, &account).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn new_account<'a>(email: &'a str, seed: &'a str, allow_suffix: bool) -> NewAccount<'a> {
        NewAccount {
            email,
            password_hash: "x".to_owned(),
            name: "Test",
            handle_seed: seed,
            allow_suffix,
            avatar_url: None,
            verified: false,
            verification_code: None,
            verification_code_expires: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let pool = db::test_pool().await;
        create_account(&pool, new_account("a@example.com", "alpha", true)).await.unwrap();

        let err = create_account(&pool, new_account("a@example.com", "beta", true))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn same_seed_gets_suffixed_handles() {
        let pool = db::test_pool().await;
        let first = create_account(&pool, new_account("a@example.com", "crab", true)).await.unwrap();
        let second = create_account(&pool, new_account("b@example.com", "crab", true)).await.unwrap();

        assert_eq!(first.handle, "@crab");
        assert_eq!(second.handle, "@crab1");
    }

    #[tokio::test]
    async fn explicit_handle_conflicts_instead_of_suffixing() {
        let pool = db::test_pool().await;
        create_account(&pool, new_account("a@example.com", "crab", false)).await.unwrap();

        let err = create_account(&pool, new_account("b@example.com", "crab", false))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
