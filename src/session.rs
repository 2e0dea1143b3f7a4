//! Session key constants shared across handlers.

pub const ACCOUNT_ID: &str = "account_id";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";
