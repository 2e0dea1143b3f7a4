use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect, Response}, Json};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{session::{ACCOUNT_ID, CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, users, AppError, AppResult, AppState};

use super::{clients::ClientProvider, password, register::account_by_email, Clients};

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    email: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(data): Json<LoginRequest>,
) -> AppResult<Json<users::UserResponse>> {
    let account = account_by_email(&db_pool, &data.email)
        .await?
        .filter(|account| password::verify_password(&data.password, &account.password_hash))
        .ok_or_else(|| AppError::authentication("Invalid email or password"))?;

    if !account.is_active {
        return Err(AppError::authentication("Account is disabled"));
    }

    session.insert(ACCOUNT_ID, &account.id).await?;
    tracing::info!("{} signed in", account.handle);

    Ok(Json(users::full_profile(&db_pool, &account).await?))
}

#[derive(Deserialize)]
pub(crate) struct OauthLoginQuery {
    pub(crate) return_url: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn oauth_login(
    Path(provider): Path<ClientProvider>,
    Query(OauthLoginQuery { return_url }): Query<OauthLoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let client = clients.get_client(provider)?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let mut request = client.authorize_url(CsrfToken::new_random);
    for scope in Clients::scopes(provider) {
        request = request.add_scope(Scope::new((*scope).to_owned()));
    }
    let (authorize_url, csrf_state) = request.set_pkce_challenge(pkce_code_challenge).url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    if let Some(return_url) = return_url {
        session.insert(RETURN_URL, return_url).await?;
    }

    Ok(Redirect::to(authorize_url.as_str()).into_response())
}
