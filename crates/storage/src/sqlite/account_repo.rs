use chrono::Utc;
use prep_core::model::{AccountId, AccountSummary, Registration, User};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, is_unique_violation, map_account_row, ser};
use crate::password::{hash_password, verify_password};
use crate::repository::{AccountRepository, ProgressRepository, StorageError, StoredCheckpoint};

#[async_trait::async_trait]
impl AccountRepository for SqliteRepository {
    async fn create_account(
        &self,
        registration: &Registration,
        is_admin: bool,
    ) -> Result<AccountSummary, StorageError> {
        let summary = AccountSummary {
            id: AccountId::generate(),
            email: Some(registration.email().to_owned()),
            username: registration.username().to_owned(),
            is_admin,
        };
        let password_hash = hash_password(registration.password())?;

        sqlx::query(
            r"
            INSERT INTO accounts (id, email, username, password_hash, is_admin, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(summary.id.to_string())
        .bind(registration.email())
        .bind(registration.username())
        .bind(password_hash)
        .bind(i64::from(is_admin))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::DuplicateEmail
            } else {
                conn(e)
            }
        })?;

        Ok(summary)
    }

    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AccountSummary, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, email, username, is_admin, password_hash
            FROM accounts WHERE email = ?1
            ",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Err(StorageError::InvalidCredentials);
        };
        let password_hash: String = row.try_get("password_hash").map_err(ser)?;
        if !verify_password(password, &password_hash)? {
            return Err(StorageError::InvalidCredentials);
        }
        map_account_row(&row)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, email, username, is_admin
            FROM accounts WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let summary = map_account_row(&row)?;
        let history = self.load_history(id).await?;
        let saved = match self.load_checkpoint(id).await? {
            Some(StoredCheckpoint::Saved(state)) => Some(state),
            Some(StoredCheckpoint::Unreadable { session_id, reason }) => {
                tracing::warn!(
                    account = %id,
                    session = %session_id,
                    %reason,
                    "checkpoint unreadable"
                );
                None
            }
            None => None,
        };
        Ok(Some(User::from_summary(summary, history, saved)))
    }

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, email, username, is_admin
            FROM accounts
            ORDER BY created_at ASC, email ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_account_row).collect()
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM accounts WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
