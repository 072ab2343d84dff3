#![forbid(unsafe_code)]

pub mod account_service;
pub mod app_services;
pub mod error;
pub mod history_service;
pub mod sessions;

pub use prep_core::Clock;
pub use sessions as session;

pub use account_service::AccountService;
pub use app_services::AppServices;
pub use error::{AccountServiceError, AppServicesError, BuildError, SessionError};
pub use history_service::{Dashboard, HistoryService, ResultListItem};

pub use sessions::{
    AdvanceStep, AnswerStep, CheckpointStatus, CommitStatus, PracticeSession, ResumeController,
    SessionEntry, SessionLoopService, SessionState, SubmitOutcome,
};
