use axum::{debug_handler, http::HeaderValue, routing::get, Json, Router};
use discuzz::{ai, auth, config::Config, db, notifications, posts, search, spaces, users, AppState};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url).await?;
    tracing::info!("database ready at {}", config.database_url);

    let clients = match &config.oauth_secrets_path {
        Some(path) => auth::Clients::from_path(path)?,
        None => {
            tracing::info!("no OAuth client secrets configured, social login disabled");
            auth::Clients::disabled()
        }
    };

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            config.session_ttl_minutes,
        )));

    let origins = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    let app_state = AppState {
        db_pool,
        config: config.clone(),
        clients,
        ai: ai::AiClient::new(&config),
        tx: broadcast::channel(128).0,
    };

    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/posts", posts::router())
        .nest("/spaces", spaces::router())
        .nest("/notifications", notifications::router())
        .nest("/search", search::router())
        .nest("/ai", ai::router());

    let app = Router::new()
        .route("/", get(hello))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(app_state)
        .layer(session_layer)
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

#[debug_handler]
async fn hello() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[debug_handler]
async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
