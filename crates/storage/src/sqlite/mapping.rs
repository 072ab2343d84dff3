use prep_core::model::{
    AccountId, AccountSummary, AnswerRecord, ResultId, SavedState, SessionId, TestResult,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{StorageError, StoredCheckpoint};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn map_account_row(row: &SqliteRow) -> Result<AccountSummary, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    Ok(AccountSummary {
        id: id.parse::<AccountId>().map_err(ser)?,
        email: Some(row.try_get::<String, _>("email").map_err(ser)?),
        username: row.try_get("username").map_err(ser)?,
        is_admin: row.try_get::<i64, _>("is_admin").map_err(ser)? != 0,
    })
}

pub(crate) fn map_result_row(row: &SqliteRow) -> Result<TestResult, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let answers: String = row.try_get("answers").map_err(ser)?;
    let answers: Vec<AnswerRecord> = serde_json::from_str(&answers).map_err(ser)?;

    TestResult::from_persisted(
        id.parse::<ResultId>().map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
        i64_to_u32("score", row.try_get("score").map_err(ser)?)?,
        i64_to_u32("total_questions", row.try_get("total_questions").map_err(ser)?)?,
        answers,
    )
    .map_err(ser)
}

/// A payload that no longer decodes is reported, not raised; the
/// `session_id` column still names the owner of the slot.
pub(crate) fn map_checkpoint_row(row: &SqliteRow) -> Result<StoredCheckpoint, StorageError> {
    let session: String = row.try_get("session_id").map_err(ser)?;
    let payload: String = row.try_get("payload").map_err(ser)?;
    match serde_json::from_str::<SavedState>(&payload) {
        Ok(state) => Ok(StoredCheckpoint::Saved(state)),
        Err(e) => Ok(StoredCheckpoint::Unreadable {
            session_id: session.parse::<SessionId>().map_err(ser)?,
            reason: e.to_string(),
        }),
    }
}
