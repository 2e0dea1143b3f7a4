pub mod ai;
pub mod auth;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod handle;
pub mod notifications;
pub mod posts;
pub mod search;
pub mod session;
pub mod spaces;
pub mod users;

use axum::extract::FromRef;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

pub use error::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: config::Config,
    pub clients: auth::Clients,
    pub ai: ai::AiClient,
    pub tx: broadcast::Sender<String>,
}
