//! Participant lifecycle inside a live space. Leaving is a logical
//! delete (left_at timestamp); the partial unique index on
//! (space_id, account_id) WHERE left_at IS NULL keeps at most one
//! active membership per pair while preserving history.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::{self, ParticipantRole, Space, SpaceParticipant}, AppError, AppResult};

pub(crate) const PARTICIPANT_COLUMNS: &str =
    "id, space_id, account_id, role, is_muted, is_speaking, hand_raised, joined_at, left_at";

pub(crate) async fn active_space(pool: &SqlitePool, space_id: &str) -> AppResult<Space> {
    sqlx::query_as::<_, Space>(&format!(
        "SELECT {} FROM spaces WHERE id = ? AND is_active = 1",
        super::SPACE_COLUMNS
    ))
    .bind(space_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Space"))
}

pub(crate) async fn active_membership(
    pool: &SqlitePool,
    space_id: &str,
    account_id: &str,
) -> AppResult<Option<SpaceParticipant>> {
    let participant = sqlx::query_as::<_, SpaceParticipant>(&format!(
        "SELECT {PARTICIPANT_COLUMNS} FROM space_participants \
         WHERE space_id = ? AND account_id = ? AND left_at IS NULL"
    ))
    .bind(space_id)
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    Ok(participant)
}

/// Insert a participant row with the given role. Used directly when the
/// host row is created inside the space-creation transaction.
pub(crate) async fn insert_participant<'e, E>(
    executor: E,
    space_id: &str,
    account_id: &str,
    role: ParticipantRole,
) -> AppResult<SpaceParticipant>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let id = Uuid::now_v7().to_string();
    // Hosts and co-hosts come in live; everyone else starts muted.
    let speaking = matches!(role, ParticipantRole::Host | ParticipantRole::CoHost);

    let participant = sqlx::query_as::<_, SpaceParticipant>(&format!(
        "INSERT INTO space_participants (id, space_id, account_id, role, is_muted, is_speaking, joined_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {PARTICIPANT_COLUMNS}"
    ))
    .bind(&id)
    .bind(space_id)
    .bind(account_id)
    .bind(role)
    .bind(!speaking)
    .bind(speaking)
    .bind(db::now())
    .fetch_one(executor)
    .await?;

    Ok(participant)
}

/// Join as a listener. Rejoining after a leave creates a fresh row.
pub async fn join(
    pool: &SqlitePool,
    space_id: &str,
    account_id: &str,
) -> AppResult<SpaceParticipant> {
    active_space(pool, space_id).await?;

    if active_membership(pool, space_id, account_id).await?.is_some() {
        return Err(AppError::conflict("Already in this space"));
    }

    insert_participant(pool, space_id, account_id, ParticipantRole::Listener).await
}

pub async fn leave(pool: &SqlitePool, space_id: &str, account_id: &str) -> AppResult<()> {
    let updated = sqlx::query(
        "UPDATE space_participants SET left_at = ? \
         WHERE space_id = ? AND account_id = ? AND left_at IS NULL",
    )
    .bind(db::now())
    .bind(space_id)
    .bind(account_id)
    .execute(pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(AppError::not_found("Participant"));
    }

    Ok(())
}

/// Flip the hand_raised flag. Returns the new value.
pub async fn toggle_hand(pool: &SqlitePool, space_id: &str, account_id: &str) -> AppResult<bool> {
    let participant = active_membership(pool, space_id, account_id)
        .await?
        .ok_or_else(|| AppError::not_found("Participant"))?;

    let raised = !participant.hand_raised;
    sqlx::query("UPDATE space_participants SET hand_raised = ? WHERE id = ?")
        .bind(raised)
        .bind(&participant.id)
        .execute(pool)
        .await?;

    Ok(raised)
}

/// End the space. Only the host may do this.
pub async fn end(pool: &SqlitePool, space_id: &str, account_id: &str) -> AppResult<()> {
    let space = active_space(pool, space_id).await?;

    if space.host_id != account_id {
        return Err(AppError::authorization("Only the host can end a space"));
    }

    sqlx::query("UPDATE spaces SET is_active = 0, ended_at = ? WHERE id = ?")
        .bind(db::now())
        .bind(space_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn listener_count(pool: &SqlitePool, space_id: &str) -> AppResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM space_participants \
         WHERE space_id = ? AND left_at IS NULL AND role = 'listener'",
    )
    .bind(space_id)
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

    async fn space(pool: &SqlitePool, host_id: &str) -> String {
        let id = uuid::Uuid::now_v7().to_string();
        sqlx::query(
            "INSERT INTO spaces (id, host_id, title, started_at, created_at) \
             VALUES (?, ?, 'talk', ?, ?)",
        )
        .bind(&id)
        .bind(host_id)
        .bind(db::now())
        .bind(db::now())
        .execute(pool)
        .await
        .unwrap();
        insert_participant(pool, &id, host_id, ParticipantRole::Host)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn join_leave_join_cycle_keeps_history() {
        let pool = db::test_pool().await;
        let host = account(&pool, "@host").await;
        let guest = account(&pool, "@guest").await;
        let space_id = space(&pool, &host).await;

        let first = join(&pool, &space_id, &guest).await.unwrap();
        assert_eq!(first.role, ParticipantRole::Listener);
        assert!(first.is_muted);
        assert!(!first.is_speaking);

        leave(&pool, &space_id, &guest).await.unwrap();
        let second = join(&pool, &space_id, &guest).await.unwrap();
        assert_ne!(first.id, second.id);

        let (rows,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM space_participants WHERE space_id = ? AND account_id = ?",
        )
        .bind(&space_id)
        .bind(&guest)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(rows, 2);
    }

    #[tokio::test]
    async fn double_join_is_a_conflict() {
        let pool = db::test_pool().await;
        let host = account(&pool, "@host").await;
        let guest = account(&pool, "@guest").await;
        let space_id = space(&pool, &host).await;

        join(&pool, &space_id, &guest).await.unwrap();
        let err = join(&pool, &space_id, &guest).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn leaving_without_joining_is_not_found() {
        let pool = db::test_pool().await;
        let host = account(&pool, "@host").await;
        let guest = account(&pool, "@guest").await;
        let space_id = space(&pool, &host).await;

        let err = leave(&pool, &space_id, &guest).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn hand_toggle_flips_both_ways() {
        let pool = db::test_pool().await;
        let host = account(&pool, "@host").await;
        let guest = account(&pool, "@guest").await;
        let space_id = space(&pool, &host).await;

        join(&pool, &space_id, &guest).await.unwrap();
        assert!(toggle_hand(&pool, &space_id, &guest).await.unwrap());
        assert!(!toggle_hand(&pool, &space_id, &guest).await.unwrap());
    }

    #[tokio::test]
    async fn only_the_host_can_end_a_space() {
        let pool = db::test_pool().await;
        let host = account(&pool, "@host").await;
        let guest = account(&pool, "@guest").await;
        let space_id = space(&pool, &host).await;

        join(&pool, &space_id, &guest).await.unwrap();
        let err = end(&pool, &space_id, &guest).await.unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        end(&pool, &space_id, &host).await.unwrap();
        let err = join(&pool, &space_id, &guest).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn listener_count_ignores_hosts_and_leavers() {
        let pool = db::test_pool().await;
        let host = account(&pool, "@host").await;
        let a = account(&pool, "@a00").await;
        let b = account(&pool, "@b00").await;
        let space_id = space(&pool, &host).await;

        join(&pool, &space_id, &a).await.unwrap();
        join(&pool, &space_id, &b).await.unwrap();
        assert_eq!(listener_count(&pool, &space_id).await.unwrap(), 2);

        leave(&pool, &space_id, &b).await.unwrap();
        assert_eq!(listener_count(&pool, &space_id).await.unwrap(), 1);
    }
}
