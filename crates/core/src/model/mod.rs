mod account;
mod config;
mod ids;
mod question;
mod question_bank;
mod result;
mod saved_state;

pub use ids::{AccountId, OptionKey, ParseIdError, QuestionId, ResultId, SessionId};

pub use account::{AccountError, AccountSummary, GUEST_USERNAME, Registration, User};
pub use config::{
    ConfigError, DEFAULT_QUESTION_COUNT, DifficultyFilter, QUESTION_COUNT_PRESETS, TestConfig,
    TestConfigDraft,
};
pub use question::{Difficulty, Question, QuestionDraft, QuestionError};
pub use question_bank::{QuestionBank, QuestionBankError};
pub use result::{AnswerRecord, PASS_THRESHOLD_PERCENT, ResultError, TestResult};
pub use saved_state::{SavedState, SavedStateError};
