//! Shared error types for the services crate.

use thiserror::Error;

use prep_core::model::{AccountError, OptionKey, QuestionId, SavedStateError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::sessions::SessionState;

/// Why a session could not be built from the bank.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BuildError {
    #[error("no questions match the selected modules and difficulty")]
    NoMatchingQuestions,
    #[error("no previously missed questions match the selection")]
    NoStruggleQuestions,
}

impl BuildError {
    /// True when the failure is good news for the learner: nothing left to practice.
    #[must_use]
    pub fn is_positive(self) -> bool {
        matches!(self, Self::NoStruggleQuestions)
    }
}

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions available for session")]
    Empty,
    #[error("session already completed")]
    Completed,
    #[error("session was abandoned")]
    Abandoned,
    #[error("cannot {action} while {state}")]
    IllegalTransition {
        action: &'static str,
        state: SessionState,
    },
    #[error("question {question} has no option {key}")]
    UnknownOption { question: QuestionId, key: OptionKey },
    #[error("no saved session to resume")]
    NothingToResume,
    #[error("saved session is corrupt: {0}")]
    InvalidSavedState(#[from] SavedStateError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AccountService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccountServiceError {
    #[error("not signed in")]
    NotAuthenticated,
    #[error("administrator rights required")]
    NotAdmin,
    #[error("administrators cannot delete their own account")]
    CannotDeleteSelf,
    #[error("administrator accounts cannot be deleted")]
    CannotDeleteAdmin,
    #[error(transparent)]
    Account(#[from] AccountError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
