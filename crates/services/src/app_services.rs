use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::account_service::AccountService;
use crate::error::AppServicesError;
use crate::history_service::HistoryService;
use crate::sessions::{ResumeController, SessionLoopService};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    accounts: Arc<AccountService>,
    history: Arc<HistoryService>,
    resume: Arc<ResumeController>,
    session_loop: Arc<SessionLoopService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    /// Build services over process-local storage, as used for guest sessions.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        Self {
            accounts: Arc::new(AccountService::new(Arc::clone(&storage.accounts))),
            history: Arc::new(HistoryService::new(Arc::clone(&storage.progress))),
            resume: Arc::new(ResumeController::new(Arc::clone(&storage.progress))),
            session_loop: Arc::new(SessionLoopService::new(
                clock,
                Arc::clone(&storage.progress),
            )),
        }
    }

    #[must_use]
    pub fn accounts(&self) -> Arc<AccountService> {
        Arc::clone(&self.accounts)
    }

    #[must_use]
    pub fn history(&self) -> Arc<HistoryService> {
        Arc::clone(&self.history)
    }

    #[must_use]
    pub fn resume(&self) -> Arc<ResumeController> {
        Arc::clone(&self.resume)
    }

    #[must_use]
    pub fn session_loop(&self) -> Arc<SessionLoopService> {
        Arc::clone(&self.session_loop)
    }
}
