use thiserror::Error;

use crate::model::{
    AccountError, ConfigError, QuestionBankError, QuestionError, ResultError, SavedStateError,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    QuestionBank(#[from] QuestionBankError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    SavedState(#[from] SavedStateError),
    #[error(transparent)]
    Result(#[from] ResultError),
    #[error(transparent)]
    Account(#[from] AccountError),
}
