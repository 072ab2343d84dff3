use chrono::Utc;
use prep_core::model::{AccountId, SavedState, SessionId, TestResult};
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;

use super::SqliteRepository;
use super::mapping::{conn, i64_to_u64, map_checkpoint_row, map_result_row, ser, u64_to_i64};
use crate::repository::{
    ProgressRepository, StorageError, StoredCheckpoint, check_checkpoint_write,
    check_expected_session,
};

async fn stored_checkpoint(
    tx: &mut SqliteConnection,
    account: AccountId,
) -> Result<Option<(SessionId, u64)>, StorageError> {
    let row = sqlx::query("SELECT session_id, revision FROM saved_states WHERE account_id = ?1")
        .bind(account.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?;

    row.map(|row| {
        let session: String = row.try_get("session_id").map_err(ser)?;
        let revision: i64 = row.try_get("revision").map_err(ser)?;
        Ok((
            session.parse::<SessionId>().map_err(ser)?,
            i64_to_u64("revision", revision)?,
        ))
    })
    .transpose()
}

async fn write_checkpoint(
    tx: &mut SqliteConnection,
    account: AccountId,
    state: &SavedState,
) -> Result<(), StorageError> {
    let payload = serde_json::to_string(state).map_err(ser)?;
    sqlx::query(
        r"
        INSERT INTO saved_states (account_id, session_id, revision, payload, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(account_id) DO UPDATE SET
            session_id = excluded.session_id,
            revision = excluded.revision,
            payload = excluded.payload,
            updated_at = excluded.updated_at
        ",
    )
    .bind(account.to_string())
    .bind(state.session_id.to_string())
    .bind(u64_to_i64("revision", state.revision)?)
    .bind(payload)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await
    .map_err(conn)?;
    Ok(())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_history(&self, account: AccountId) -> Result<Vec<TestResult>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, completed_at, score, total_questions, answers
            FROM test_results
            WHERE account_id = ?1
            ORDER BY seq ASC
            ",
        )
        .bind(account.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_result_row).collect()
    }

    async fn load_checkpoint(
        &self,
        account: AccountId,
    ) -> Result<Option<StoredCheckpoint>, StorageError> {
        let row = sqlx::query("SELECT session_id, payload FROM saved_states WHERE account_id = ?1")
            .bind(account.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_checkpoint_row).transpose()
    }

    async fn save_checkpoint(
        &self,
        account: AccountId,
        state: &SavedState,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let stored = stored_checkpoint(&mut tx, account).await?;
        check_checkpoint_write(stored, state)?;
        write_checkpoint(&mut tx, account, state).await?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn replace_saved_state(
        &self,
        account: AccountId,
        expected: Option<SessionId>,
        state: Option<&SavedState>,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let stored = stored_checkpoint(&mut tx, account)
            .await?
            .map(|(session, _)| session);
        check_expected_session(stored, expected)?;

        match state {
            Some(state) => write_checkpoint(&mut tx, account, state).await?,
            None => {
                sqlx::query("DELETE FROM saved_states WHERE account_id = ?1")
                    .bind(account.to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(conn)?;
            }
        }
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn commit_result(
        &self,
        account: AccountId,
        session: SessionId,
        result: &TestResult,
    ) -> Result<(), StorageError> {
        let answers = serde_json::to_string(result.answers()).map_err(ser)?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
            INSERT INTO test_results (id, account_id, completed_at, score, total_questions, answers)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(result.id().to_string())
        .bind(account.to_string())
        .bind(result.completed_at())
        .bind(i64::from(result.score()))
        .bind(i64::from(result.total_questions()))
        .bind(answers)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM saved_states WHERE account_id = ?1 AND session_id = ?2")
            .bind(account.to_string())
            .bind(session.to_string())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
