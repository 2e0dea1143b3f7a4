use axum::{debug_handler, extract::State, http::StatusCode, Json};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{config::Config, db, session::ACCOUNT_ID, users, AppError, AppResult, AppState};

use super::{create_account, password, NewAccount};

const VERIFICATION_CODE_TTL: time::Duration = time::Duration::hours(24);

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..6).map(|_| rng.random_range(0..10u8).to_string()).collect()
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterRequest {
    email: String,
    password: String,
    name: Option<String>,
    handle: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn register(
    State(db_pool): State<SqlitePool>,
    State(config): State<Config>,
    session: Session,
    Json(data): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<users::UserResponse>)> {
    password::validate_password_strength(&data.password, config.password_min_length)?;

    let email = data.email.to_lowercase();
    let fallback_seed = email.split('@').next().unwrap_or_default().to_owned();
    let name = data.name.clone().unwrap_or_else(|| fallback_seed.clone());
    let handle_seed = data.handle.clone().or(data.name).unwrap_or(fallback_seed);

    let account = create_account(
        &db_pool,
        NewAccount {
            email: &email,
            password_hash: password::hash_password(&data.password)?,
            name: &name,
            handle_seed: &handle_seed,
            // An explicitly requested handle must match exactly or fail.
            allow_suffix: data.handle.is_none(),
            avatar_url: None,
            verified: false,
            verification_code: Some(generate_code()),
            verification_code_expires: Some(db::now() + VERIFICATION_CODE_TTL),
        },
    )
    .await?;

    session.insert(ACCOUNT_ID, &account.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(users::full_profile(&db_pool, &account).await?),
    ))
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerificationRequest {
    email: String,
    code: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn verify_email(
    State(db_pool): State<SqlitePool>,
    Json(data): Json<VerificationRequest>,
) -> AppResult<Json<Value>> {
    let account = account_by_email(&db_pool, &data.email)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;

    if account.is_verified {
        return Ok(Json(json!({"message": "Email already verified"})));
    }

    if account.verification_code.as_deref() != Some(data.code.as_str()) {
        return Err(AppError::validation("Invalid verification code"));
    }

    if let Some(expires) = account.verification_code_expires {
        if expires < db::now() {
            return Err(AppError::validation("Verification code expired"));
        }
    }

    sqlx::query(
        "UPDATE accounts SET is_verified = 1, verification_code = NULL, \
         verification_code_expires = NULL WHERE id = ?",
    )
    .bind(&account.id)
    .execute(&db_pool)
    .await?;

    Ok(Json(json!({"message": "Email verified successfully"})))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResendVerificationRequest {
    email: String,
}

// Always the same reply, whether or not the address exists; this path
// must not allow account enumeration.
#[debug_handler(state = AppState)]
pub(crate) async fn resend_verification(
    State(db_pool): State<SqlitePool>,
    Json(data): Json<ResendVerificationRequest>,
) -> AppResult<Json<Value>> {
    let generic = json!({"message": "If the email exists, a verification code has been sent"});

    let Some(account) = account_by_email(&db_pool, &data.email).await? else {
        return Ok(Json(generic));
    };

    if account.is_verified {
        return Ok(Json(json!({"message": "Email already verified"})));
    }

    sqlx::query(
        "UPDATE accounts SET verification_code = ?, verification_code_expires = ? WHERE id = ?",
    )
    .bind(generate_code())
    .bind(db::now() + VERIFICATION_CODE_TTL)
    .bind(&account.id)
    .execute(&db_pool)
    .await?;

    Ok(Json(generic))
}

pub(crate) async fn account_by_email(
    pool: &SqlitePool,
    email: &str,
) -> AppResult<Option<db::Account>> {
    Ok(sqlx::query_as::<_, db::Account>(
        "SELECT id, email, password_hash, name, handle, avatar_url, bio, location, website, \
         language, is_active, is_verified, verification_code, verification_code_expires, \
         created_at FROM accounts WHERE email = ?",
    )
    .bind(email.to_lowercase())
    .fetch_optional(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_codes_are_six_digits() {
        for _ in 0..32 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
