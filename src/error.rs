use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

/// Typed failures surfaced by core operations and handlers.
///
/// Everything that is not one of the named kinds falls into `Internal`,
/// which keeps the anyhow backtrace around for the 500 log line.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Conflict(String),
    SelfReference,
    Authorization(String),
    Authentication(String),
    Validation(String),
    Internal(anyhow::Error),
}

impl AppError {
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{resource} not found"))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::Error::msg(msg.into()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::SelfReference => StatusCode::CONFLICT,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Authorization(msg)
            | Self::Authentication(msg)
            | Self::Validation(msg) => msg.clone(),
            Self::SelfReference => "Cannot target yourself".to_owned(),
            Self::Internal(_) => "Internal server error".to_owned(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal(err) => err.fmt(f),
            other => f.write_str(&other.message()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let Self::Internal(err) = &self {
            tracing::error!("internal error: {err}\n{}", err.backtrace());
        }

        (
            status,
            Json(json!({
                "error": {
                    "message": self.message(),
                    "status_code": status.as_u16(),
                }
            })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}

/// True when a database error is a unique-constraint violation. Handle
/// allocation relies on this to detect losing a concurrent-insert race.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(AppError::not_found("Post").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::conflict("dup").status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::SelfReference.status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::authorization("no").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::authentication("no").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::validation("bad").status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn internal_hides_details_from_clients() {
        let err = AppError::internal("db exploded");
        assert_eq!(err.message(), "Internal server error");
    }
}
