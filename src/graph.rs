//! Follow-edge mutations and the computed side of profile stats.
//!
//! Follower and following counts are never stored; they are always the
//! live cardinality of the follows table. Like counts on posts use the
//! opposite strategy (stored counters, see posts::likes) and the two are
//! deliberately not unified.

use sqlx::SqlitePool;

use crate::{db, AppError, AppResult};

/// Insert the directed follow edge actor -> target.
pub async fn follow(pool: &SqlitePool, actor_id: &str, target_id: &str) -> AppResult<()> {
    if actor_id == target_id {
        return Err(AppError::SelfReference);
    }

    let exists = sqlx::query_as::<_, (i64,)>(
        "SELECT 1 FROM follows WHERE follower_id = ? AND followed_id = ?",
    )
    .bind(actor_id)
    .bind(target_id)
    .fetch_optional(pool)
    .await?
    .is_some();

    if exists {
        return Err(AppError::conflict("Already following this user"));
    }

    sqlx::query("INSERT INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, ?)")
        .bind(actor_id)
        .bind(target_id)
        .bind(db::now())
        .execute(pool)
        .await?;

    Ok(())
}

/// Remove the directed follow edge actor -> target.
pub async fn unfollow(pool: &SqlitePool, actor_id: &str, target_id: &str) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followed_id = ?")
        .bind(actor_id)
        .bind(target_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict("Not following this user"));
    }

    Ok(())
}

pub async fn follower_count(pool: &SqlitePool, account_id: &str) -> AppResult<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE followed_id = ?")
        .bind(account_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn following_count(pool: &SqlitePool, account_id: &str) -> AppResult<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE follower_id = ?")
        .bind(account_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn account(pool: &SqlitePool, handle: &str) -> String {
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
        id
    }

    #[tokio::test]
    async fn follow_self_is_rejected() {
        let pool = db::test_pool().await;
        let a = account(&pool, "@a").await;

        let err = follow(&pool, &a, &a).await.unwrap_err();
        assert!(matches!(err, AppError::SelfReference));
    }

    #[tokio::test]
    async fn duplicate_follow_conflicts() {
        let pool = db::test_pool().await;
        let a = account(&pool, "@a").await;
        let b = account(&pool, "@b").await;

        follow(&pool, &a, &b).await.unwrap();
        let err = follow(&pool, &a, &b).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn follow_unfollow_round_trip_restores_counts() {
        let pool = db::test_pool().await;
        let a = account(&pool, "@a").await;
        let b = account(&pool, "@b").await;

        let before = follower_count(&pool, &b).await.unwrap();

        follow(&pool, &a, &b).await.unwrap();
        assert_eq!(follower_count(&pool, &b).await.unwrap(), before + 1);
        assert_eq!(following_count(&pool, &a).await.unwrap(), 1);
        assert_eq!(following_count(&pool, &b).await.unwrap(), 0);

        unfollow(&pool, &a, &b).await.unwrap();
        assert_eq!(follower_count(&pool, &b).await.unwrap(), before);
        assert_eq!(following_count(&pool, &a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn second_unfollow_conflicts() {
        let pool = db::test_pool().await;
        let a = account(&pool, "@a").await;
        let b = account(&pool, "@b").await;

        follow(&pool, &a, &b).await.unwrap();
        unfollow(&pool, &a, &b).await.unwrap();

        let err = unfollow(&pool, &a, &b).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn edges_are_directed() {
        let pool = db::test_pool().await;
        let a = account(&pool, "@a").await;
        let b = account(&pool, "@b").await;

        follow(&pool, &a, &b).await.unwrap();
        // The reverse direction is a distinct edge.
        follow(&pool, &b, &a).await.unwrap();

        assert_eq!(follower_count(&pool, &a).await.unwrap(), 1);
        assert_eq!(follower_count(&pool, &b).await.unwrap(), 1);
    }
}
