use sqlx::SqlitePool;

use crate::{AppError, AppResult};

pub const HANDLE_PREFIX: char = '@';
/// Matches the accounts.handle column size.
pub const HANDLE_MAX_LENGTH: usize = 50;

const DEFAULT_SEED: &str = "user";
const MIN_BODY_LENGTH: usize = 3;

fn max_body_length() -> usize {
    HANDLE_MAX_LENGTH - HANDLE_PREFIX.len_utf8()
}

/// Normalize a handle seed: replace anything outside `[A-Za-z0-9_]` with
/// `_`, trim underscores, lowercase, fall back to "user" when nothing
/// survives, pad with `0` up to three characters, truncate to the max
/// body length (without the `@` prefix).
pub fn clean_seed(seed: &str) -> String {
    let mut cleaned: String = seed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_lowercase() } else { '_' })
        .collect();

    cleaned = cleaned.trim_matches('_').to_owned();

    if cleaned.is_empty() {
        cleaned = DEFAULT_SEED.to_owned();
    }

    while cleaned.len() < MIN_BODY_LENGTH {
        cleaned.push('0');
    }

    cleaned.truncate(max_body_length());
    cleaned
}

/// Allocate a handle unique against the account set at this moment.
///
/// Candidates are tried with suffixes "", "1", "2", ... with the base
/// truncated to make room. With `allow_suffix` false the bare candidate
/// either wins or the allocation fails with a conflict.
///
/// The existence check and the caller's insert are not atomic; the
/// unique index on accounts.handle is the arbiter, and account creation
/// re-runs allocation when its insert loses that race. Iteration is
/// capped at the account population plus one so a pathological race
/// cannot loop forever.
pub async fn allocate(pool: &SqlitePool, seed: &str, allow_suffix: bool) -> AppResult<String> {
    let base = clean_seed(seed);

    let (population,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts")
        .fetch_one(pool)
        .await?;

    for attempt in 0..=population as u64 {
        let suffix = if attempt == 0 { String::new() } else { attempt.to_string() };
        let body_len = max_body_length() - suffix.len();
        let body: String = base.chars().take(body_len).collect();
        let candidate = format!("{HANDLE_PREFIX}{body}{suffix}");

        let taken = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM accounts WHERE handle = ?")
            .bind(&candidate)
            .fetch_optional(pool)
            .await?
            .is_some();

        if !taken {
            return Ok(candidate);
        }

        if !allow_suffix {
            return Err(AppError::conflict("Handle already taken"));
        }
    }

    Err(AppError::internal("Handle allocation exhausted its candidate budget"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn insert_account(pool: &SqlitePool, handle: &str) {
        let id = uuid::Uuid::now_v7().to_string();
        sqlx::query(
            "INSERT INTO accounts (id, email, password_hash, name, handle, created_at)
             VALUES (?, ?, 'x', 'x', ?, ?)",
        )
        .bind(&id)
        .bind(format!("{id}@example.com"))
        .bind(handle)
        .bind(db::now())
        .execute(pool)
        .await
        .unwrap();
    }

    #[test]
    fn clean_seed_strips_and_lowercases() {
        assert_eq!(clean_seed("John Doe!!"), "john_doe");
        assert_eq!(clean_seed("___Crab___"), "crab");
        assert_eq!(clean_seed("MiXeD123"), "mixed123");
    }

    #[test]
    fn clean_seed_falls_back_and_pads() {
        assert_eq!(clean_seed(""), "user");
        assert_eq!(clean_seed("!!!"), "user");
        assert_eq!(clean_seed("ab"), "ab0");
        assert_eq!(clean_seed("a"), "a00");
    }

    #[test]
    fn clean_seed_truncates_long_seeds() {
        let long = "x".repeat(200);
        assert_eq!(clean_seed(&long).len(), HANDLE_MAX_LENGTH - 1);
    }

    #[tokio::test]
    async fn allocates_normalized_handle() {
        let pool = db::test_pool().await;
        let handle = allocate(&pool, "John Doe!!", true).await.unwrap();
        assert_eq!(handle, "@john_doe");
    }

    #[tokio::test]
    async fn allocates_padded_handle_for_short_seed() {
        let pool = db::test_pool().await;
        assert_eq!(allocate(&pool, "ab", true).await.unwrap(), "@ab0");
    }

    #[tokio::test]
    async fn empty_seed_becomes_default() {
        let pool = db::test_pool().await;
        assert_eq!(allocate(&pool, "", true).await.unwrap(), "@user");
    }

    #[tokio::test]
    async fn collision_appends_numeric_suffix() {
        let pool = db::test_pool().await;
        insert_account(&pool, "@john_doe").await;
        assert_eq!(allocate(&pool, "John Doe", true).await.unwrap(), "@john_doe1");

        insert_account(&pool, "@john_doe1").await;
        assert_eq!(allocate(&pool, "John Doe", true).await.unwrap(), "@john_doe2");
    }

    #[tokio::test]
    async fn collision_check_is_case_insensitive() {
        let pool = db::test_pool().await;
        insert_account(&pool, "@John_Doe").await;
        assert_eq!(allocate(&pool, "john doe", true).await.unwrap(), "@john_doe1");
    }

    #[tokio::test]
    async fn without_suffix_a_taken_handle_conflicts() {
        let pool = db::test_pool().await;
        insert_account(&pool, "@crab").await;

        let err = allocate(&pool, "crab", false).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn suffix_eats_into_long_bases() {
        let pool = db::test_pool().await;
        let seed = "z".repeat(60);

        let first = allocate(&pool, &seed, true).await.unwrap();
        assert_eq!(first.len(), HANDLE_MAX_LENGTH);
        insert_account(&pool, &first).await;

        let second = allocate(&pool, &seed, true).await.unwrap();
        assert_eq!(second.len(), HANDLE_MAX_LENGTH);
        assert!(second.ends_with('1'));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn allocated_handles_match_the_public_pattern() {
        let pool = db::test_pool().await;
        for seed in ["John Doe!!", "", "ab", "  spaced out  ", "Ünïcödé"] {
            let handle = allocate(&pool, seed, true).await.unwrap();
            let body = handle.strip_prefix('@').unwrap();
            assert!(body.len() >= 2 && body.len() <= HANDLE_MAX_LENGTH - 1);
            assert!(body.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }
}
