use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{session::{ACCOUNT_ID, CSRF_STATE, PKCE_VERIFIER, RETURN_URL}, AppError, AppResult, AppState};

use super::{clients::{self, ClientProvider}, create_account, password, register::account_by_email, Clients, NewAccount};

#[derive(Deserialize)]
pub(crate) struct LockinQuery {
    pub(crate) state: Option<String>,
    pub(crate) code: Option<String>,
}

/// OAuth callback: finish the code exchange, then find or create the
/// matching account by provider email.
#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let state = CsrfToken::new(state.ok_or_else(|| AppError::authentication("OAuth: missing state"))?);
    let code = AuthorizationCode::new(code.ok_or_else(|| AppError::authentication("OAuth: missing code"))?);

    let Some(stored_state) = session.get::<String>(CSRF_STATE).await? else {
        return Err(AppError::authentication("OAuth: no stored csrf state"));
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err(AppError::authentication("OAuth: csrf state mismatch"));
    }

    let Some(pkce_verifier) = session.get::<String>(PKCE_VERIFIER).await? else {
        return Err(AppError::authentication("OAuth: no pkce verifier"));
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await
        .map_err(|err| AppError::authentication(format!("OAuth: code exchange failed: {err}")))?;

    let identity =
        clients::fetch_identity(&http_client, provider, token_result.access_token().secret()).await?;

    let email = identity.email.to_lowercase();
    let name = identity
        .name
        .clone()
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_owned());

    let account = match account_by_email(&db_pool, &email).await? {
        Some(account) => {
            // Provider-verified email; refresh what the provider knows better.
            sqlx::query("UPDATE accounts SET is_verified = 1, avatar_url = COALESCE(?, avatar_url) WHERE id = ?")
                .bind(&identity.picture)
                .bind(&account.id)
                .execute(&db_pool)
                .await?;
            account
        }
        None => {
            create_account(
                &db_pool,
                NewAccount {
                    email: &email,
                    // Placeholder credential; social accounts sign in via the provider.
                    password_hash: password::hash_password(&random_password())?,
                    name: &name,
                    handle_seed: &name,
                    allow_suffix: true,
                    avatar_url: identity.picture.as_deref(),
                    verified: true,
                    verification_code: None,
                    verification_code_expires: None,
                },
            )
            .await?
        }
    };

    if !account.is_active {
        return Err(AppError::authentication("Account is disabled"));
    }

    session.insert(ACCOUNT_ID, &account.id).await?;
    tracing::info!("{} signed in via {provider}", account.handle);

    let return_url: String = session
        .get(RETURN_URL)
        .await?
        .unwrap_or_else(|| "/".to_owned());

    Ok(Redirect::to(return_url.as_str()))
}

fn random_password() -> String {
    use rand::distr::{Alphanumeric, SampleString};
    Alphanumeric.sample_string(&mut rand::rng(), 32)
}
