use async_trait::async_trait;
use prep_core::model::{
    AccountId, AccountSummary, Registration, SavedState, SessionId, TestResult, User,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::password::{hash_password, verify_password};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// The stored checkpoint belongs to a different session than the caller expected.
    #[error("conflict")]
    Conflict,

    /// A checkpoint arrived after a newer one for the same session.
    #[error("stale checkpoint write: revision {attempted} is older than stored revision {stored}")]
    Stale { stored: u64, attempted: u64 },

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("an account with this email already exists")]
    DuplicateEmail,

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Content of an account's checkpoint slot as the store holds it.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredCheckpoint {
    Saved(SavedState),
    /// The slot is owned by `session_id` but its payload no longer decodes.
    Unreadable { session_id: SessionId, reason: String },
}

impl StoredCheckpoint {
    /// The session that owns the slot, readable or not.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Saved(state) => state.session_id,
            Self::Unreadable { session_id, .. } => *session_id,
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for an unreadable payload.
    pub fn into_saved(self) -> Result<SavedState, StorageError> {
        match self {
            Self::Saved(state) => Ok(state),
            Self::Unreadable { reason, .. } => Err(StorageError::Serialization(reason)),
        }
    }
}

/// Decide whether `incoming` may replace the stored checkpoint `(session, revision)`.
///
/// Writes for another session are conflicts; older revisions of the same session
/// are stale. An equal revision overwrites, so re-saving is idempotent.
///
/// # Errors
///
/// Returns `StorageError::Conflict` or `StorageError::Stale`.
pub fn check_checkpoint_write(
    stored: Option<(SessionId, u64)>,
    incoming: &SavedState,
) -> Result<(), StorageError> {
    match stored {
        Some((session, _)) if session != incoming.session_id => Err(StorageError::Conflict),
        Some((_, revision)) if revision > incoming.revision => Err(StorageError::Stale {
            stored: revision,
            attempted: incoming.revision,
        }),
        _ => Ok(()),
    }
}

/// Compare-and-set guard: the stored session must be exactly the one the caller observed.
///
/// # Errors
///
/// Returns `StorageError::Conflict` when they differ.
pub fn check_expected_session(
    stored: Option<SessionId>,
    expected: Option<SessionId>,
) -> Result<(), StorageError> {
    if stored == expected {
        Ok(())
    } else {
        Err(StorageError::Conflict)
    }
}

/// Identity side of the account store.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Create an account with a hashed password.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateEmail` if the email is taken.
    async fn create_account(
        &self,
        registration: &Registration,
        is_admin: bool,
    ) -> Result<AccountSummary, StorageError>;

    /// Resolve an account from credentials.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidCredentials` for unknown emails or wrong passwords.
    async fn authenticate(&self, email: &str, password: &str)
    -> Result<AccountSummary, StorageError>;

    /// Load an account with its history and checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_account(&self, id: AccountId) -> Result<Option<User>, StorageError>;

    /// List every account, without history or checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, StorageError>;

    /// Remove an account and all of its progress.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account does not exist.
    async fn delete_account(&self, id: AccountId) -> Result<(), StorageError>;
}

/// Progress side of the account store: result history and the checkpoint slot.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Completed results, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn load_history(&self, account: AccountId) -> Result<Vec<TestResult>, StorageError>;

    /// The checkpoint slot, including a payload that no longer decodes.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn load_checkpoint(
        &self,
        account: AccountId,
    ) -> Result<Option<StoredCheckpoint>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored payload cannot be decoded.
    async fn load_saved_state(
        &self,
        account: AccountId,
    ) -> Result<Option<SavedState>, StorageError> {
        self.load_checkpoint(account)
            .await?
            .map(StoredCheckpoint::into_saved)
            .transpose()
    }

    /// Write a checkpoint for the session it carries.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Stale` for out-of-order revisions and
    /// `StorageError::Conflict` when another session owns the slot.
    async fn save_checkpoint(&self, account: AccountId, state: &SavedState)
    -> Result<(), StorageError>;

    /// Atomically replace (or clear, with `None`) the checkpoint slot, provided it
    /// still holds `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the slot changed since the caller looked.
    async fn replace_saved_state(
        &self,
        account: AccountId,
        expected: Option<SessionId>,
        state: Option<&SavedState>,
    ) -> Result<(), StorageError>;

    /// Append a result and clear `session`'s checkpoint in one step.
    ///
    /// Committing a result id that is already on record is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn commit_result(
        &self,
        account: AccountId,
        session: SessionId,
        result: &TestResult,
    ) -> Result<(), StorageError>;
}

#[derive(Clone)]
struct AccountRow {
    summary: AccountSummary,
    password_hash: String,
}

#[derive(Default)]
struct ProgressTables {
    history: HashMap<AccountId, Vec<TestResult>>,
    saved: HashMap<AccountId, SavedState>,
}

/// Simple in-memory repository for tests and guest sessions.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    accounts: Arc<Mutex<Vec<AccountRow>>>,
    progress: Arc<Mutex<ProgressTables>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl AccountRepository for InMemoryRepository {
    async fn create_account(
        &self,
        registration: &Registration,
        is_admin: bool,
    ) -> Result<AccountSummary, StorageError> {
        let password_hash = hash_password(registration.password())?;
        let mut guard = self.accounts.lock().map_err(poisoned)?;
        let taken = guard.iter().any(|row| {
            row.summary
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(registration.email()))
        });
        if taken {
            return Err(StorageError::DuplicateEmail);
        }
        let summary = AccountSummary {
            id: AccountId::generate(),
            email: Some(registration.email().to_owned()),
            username: registration.username().to_owned(),
            is_admin,
        };
        guard.push(AccountRow {
            summary: summary.clone(),
            password_hash,
        });
        Ok(summary)
    }

    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AccountSummary, StorageError> {
        let row = {
            let guard = self.accounts.lock().map_err(poisoned)?;
            guard
                .iter()
                .find(|row| {
                    row.summary
                        .email
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(email.trim()))
                })
                .cloned()
        };
        let Some(row) = row else {
            return Err(StorageError::InvalidCredentials);
        };
        if verify_password(password, &row.password_hash)? {
            Ok(row.summary)
        } else {
            Err(StorageError::InvalidCredentials)
        }
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<User>, StorageError> {
        let summary = {
            let guard = self.accounts.lock().map_err(poisoned)?;
            guard
                .iter()
                .find(|row| row.summary.id == id)
                .map(|row| row.summary.clone())
        };
        let Some(summary) = summary else {
            return Ok(None);
        };
        let progress = self.progress.lock().map_err(poisoned)?;
        let history = progress.history.get(&id).cloned().unwrap_or_default();
        let saved = progress.saved.get(&id).cloned();
        Ok(Some(User::from_summary(summary, history, saved)))
    }

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, StorageError> {
        let guard = self.accounts.lock().map_err(poisoned)?;
        Ok(guard.iter().map(|row| row.summary.clone()).collect())
    }

    async fn delete_account(&self, id: AccountId) -> Result<(), StorageError> {
        {
            let mut guard = self.accounts.lock().map_err(poisoned)?;
            let before = guard.len();
            guard.retain(|row| row.summary.id != id);
            if guard.len() == before {
                return Err(StorageError::NotFound);
            }
        }
        let mut progress = self.progress.lock().map_err(poisoned)?;
        progress.history.remove(&id);
        progress.saved.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_history(&self, account: AccountId) -> Result<Vec<TestResult>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.history.get(&account).cloned().unwrap_or_default())
    }

    async fn load_checkpoint(
        &self,
        account: AccountId,
    ) -> Result<Option<StoredCheckpoint>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.saved.get(&account).cloned().map(StoredCheckpoint::Saved))
    }

    async fn save_checkpoint(
        &self,
        account: AccountId,
        state: &SavedState,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let stored = guard
            .saved
            .get(&account)
            .map(|s| (s.session_id, s.revision));
        check_checkpoint_write(stored, state)?;
        guard.saved.insert(account, state.clone());
        Ok(())
    }

    async fn replace_saved_state(
        &self,
        account: AccountId,
        expected: Option<SessionId>,
        state: Option<&SavedState>,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let stored = guard.saved.get(&account).map(|s| s.session_id);
        check_expected_session(stored, expected)?;
        match state {
            Some(state) => {
                guard.saved.insert(account, state.clone());
            }
            None => {
                guard.saved.remove(&account);
            }
        }
        Ok(())
    }

    async fn commit_result(
        &self,
        account: AccountId,
        session: SessionId,
        result: &TestResult,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let history = guard.history.entry(account).or_default();
        if !history.iter().any(|r| r.id() == result.id()) {
            history.push(result.clone());
        }
        if guard
            .saved
            .get(&account)
            .is_some_and(|s| s.session_id == session)
        {
            guard.saved.remove(&account);
        }
        Ok(())
    }
}

/// Aggregates account and progress repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub accounts: Arc<dyn AccountRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let accounts: Arc<dyn AccountRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self { accounts, progress }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{
        Difficulty, DifficultyFilter, OptionKey, Question, QuestionDraft, QuestionId, ResultId,
        TestConfig,
    };
    use prep_core::scoring::finalize;
    use prep_core::time::fixed_now;
    use std::collections::BTreeMap;

    fn question(id: &str) -> Question {
        QuestionDraft {
            id: QuestionId::new(id),
            question_text: "Q".into(),
            options: [(OptionKey::new("A"), "a".into()), (OptionKey::new("B"), "b".into())]
                .into_iter()
                .collect(),
            correct_answer: OptionKey::new("A"),
            module_topic: "M".into(),
            difficulty: Difficulty::Easy,
            explanation: String::new(),
        }
        .validate()
        .unwrap()
    }

    fn checkpoint(session: SessionId, revision: u64) -> SavedState {
        SavedState {
            session_id: session,
            revision,
            questions: vec![question("q1"), question("q2")],
            current_question_index: 0,
            answers: BTreeMap::new(),
            score: 0,
            config: TestConfig::new(2, ["M"], DifficultyFilter::Mixed, false).unwrap(),
        }
    }

    #[tokio::test]
    async fn stale_revisions_are_rejected() {
        let repo = InMemoryRepository::new();
        let account = AccountId::generate();
        let session = SessionId::generate();

        repo.save_checkpoint(account, &checkpoint(session, 2))
            .await
            .unwrap();
        let err = repo
            .save_checkpoint(account, &checkpoint(session, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Stale {
                stored: 2,
                attempted: 1
            }
        ));

        // Same revision overwrites.
        repo.save_checkpoint(account, &checkpoint(session, 2))
            .await
            .unwrap();
        let stored = repo.load_saved_state(account).await.unwrap().unwrap();
        assert_eq!(stored.revision, 2);
    }

    #[tokio::test]
    async fn foreign_session_writes_conflict() {
        let repo = InMemoryRepository::new();
        let account = AccountId::generate();
        repo.save_checkpoint(account, &checkpoint(SessionId::generate(), 0))
            .await
            .unwrap();
        let err = repo
            .save_checkpoint(account, &checkpoint(SessionId::generate(), 5))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn replace_requires_expected_session() {
        let repo = InMemoryRepository::new();
        let account = AccountId::generate();
        let old = SessionId::generate();
        let new = SessionId::generate();
        repo.save_checkpoint(account, &checkpoint(old, 3))
            .await
            .unwrap();

        let err = repo
            .replace_saved_state(account, None, Some(&checkpoint(new, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        repo.replace_saved_state(account, Some(old), Some(&checkpoint(new, 0)))
            .await
            .unwrap();
        let stored = repo.load_saved_state(account).await.unwrap().unwrap();
        assert_eq!(stored.session_id, new);

        repo.replace_saved_state(account, Some(new), None)
            .await
            .unwrap();
        assert!(repo.load_saved_state(account).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_appends_once_and_clears_checkpoint() {
        let repo = InMemoryRepository::new();
        let account = AccountId::generate();
        let session = SessionId::generate();
        let state = checkpoint(session, 4);
        repo.save_checkpoint(account, &state).await.unwrap();

        let result = finalize(
            ResultId::generate(),
            fixed_now(),
            &state.questions,
            &state.answers,
        );
        repo.commit_result(account, session, &result).await.unwrap();
        repo.commit_result(account, session, &result).await.unwrap();

        assert!(repo.load_saved_state(account).await.unwrap().is_none());
        let history = repo.load_history(account).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id(), result.id());
    }

    #[tokio::test]
    async fn accounts_register_authenticate_and_delete() {
        let repo = InMemoryRepository::new();
        let reg = Registration::new("ada@example.com", "ada", "secret-pass").unwrap();
        let created = repo.create_account(&reg, false).await.unwrap();

        let dup = Registration::new("ADA@example.com", "other", "secret-pass").unwrap();
        assert!(matches!(
            repo.create_account(&dup, false).await,
            Err(StorageError::DuplicateEmail)
        ));

        let signed_in = repo
            .authenticate("ada@example.com", "secret-pass")
            .await
            .unwrap();
        assert_eq!(signed_in.id, created.id);
        assert!(matches!(
            repo.authenticate("ada@example.com", "wrong-pass").await,
            Err(StorageError::InvalidCredentials)
        ));

        let user = repo.get_account(created.id).await.unwrap().unwrap();
        assert!(user.history.is_empty());
        assert!(user.saved_state.is_none());

        repo.delete_account(created.id).await.unwrap();
        assert!(repo.get_account(created.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete_account(created.id).await,
            Err(StorageError::NotFound)
        ));
    }
}
