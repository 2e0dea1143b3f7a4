use std::time::Duration;

/// Immutable application configuration, built once in `main` from the
/// environment (a `.env` file is honored via dotenv) and passed around
/// through `AppState`.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Comma-separated list of allowed CORS origins.
    pub allowed_origins: Vec<String>,
    pub session_ttl_minutes: i64,
    pub password_min_length: usize,

    /// Absent keys are a valid configuration state: AI features degrade
    /// to static fallback content.
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Path to the OAuth client secrets JSON; absent disables social login.
    pub oauth_secrets_path: Option<String>,
}

/// Bound on outbound AI calls. Single attempt, then fallback.
pub const AI_TIMEOUT: Duration = Duration::from_secs(30);

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let database_url = dotenv::var("DATABASE_URL")?;

        let allowed_origins = dotenv::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_owned())
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Config {
            database_url,
            bind_addr: dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
            allowed_origins,
            session_ttl_minutes: dotenv::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60 * 24 * 7),
            password_min_length: dotenv::var("PASSWORD_MIN_LENGTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            openai_api_key: dotenv::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            gemini_api_key: dotenv::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
            oauth_secrets_path: dotenv::var("OAUTH_CLIENT_SECRETS").ok(),
        })
    }
}
