use rand::Rng;
use std::sync::Arc;

use prep_core::model::{
    AccountId, QuestionBank, SavedState, SavedStateError, SessionId, TestConfig,
};
use storage::repository::{ProgressRepository, StoredCheckpoint};

use super::plan::SessionBuilder;
use super::service::PracticeSession;
use crate::error::SessionError;

/// Summary of a checkpoint that can be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeOffer {
    pub session_id: SessionId,
    /// 1-based position of the question to continue from.
    pub position: usize,
    pub total: usize,
    pub answered: usize,
    pub score: u32,
}

impl ResumeOffer {
    fn from_saved(saved: &SavedState) -> Self {
        Self {
            session_id: saved.session_id,
            position: saved.current_question_index + 1,
            total: saved.total_questions(),
            answered: saved.answers.len(),
            score: saved.score,
        }
    }
}

/// What a start request finds in the checkpoint slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEntry {
    Fresh,
    Resumable(ResumeOffer),
    /// A checkpoint exists but cannot be resumed; starting new must discard it.
    Unrecoverable {
        session_id: SessionId,
        reason: SavedStateError,
    },
}

impl SessionEntry {
    /// The session id a new start must name to replace the stored checkpoint.
    #[must_use]
    pub fn stored_session(&self) -> Option<SessionId> {
        match self {
            Self::Fresh => None,
            Self::Resumable(offer) => Some(offer.session_id),
            Self::Unrecoverable { session_id, .. } => Some(*session_id),
        }
    }
}

/// Chooses between resuming the stored checkpoint and building a new session.
#[derive(Clone)]
pub struct ResumeController {
    progress: Arc<dyn ProgressRepository>,
}

impl ResumeController {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressRepository>) -> Self {
        Self { progress }
    }

    /// Inspect the account's checkpoint slot.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the slot cannot be read.
    pub async fn entry(&self, account: AccountId) -> Result<SessionEntry, SessionError> {
        let saved = match self.progress.load_checkpoint(account).await? {
            None => return Ok(SessionEntry::Fresh),
            Some(StoredCheckpoint::Saved(saved)) => saved,
            Some(StoredCheckpoint::Unreadable { session_id, reason }) => {
                tracing::warn!(session = %session_id, %reason, "saved session cannot be decoded");
                return Ok(SessionEntry::Unrecoverable {
                    session_id,
                    reason: SavedStateError::Unreadable(reason),
                });
            }
        };
        match saved.validate() {
            Ok(()) => Ok(SessionEntry::Resumable(ResumeOffer::from_saved(&saved))),
            Err(reason) => {
                tracing::warn!(
                    session = %saved.session_id,
                    %reason,
                    "saved session cannot be resumed"
                );
                Ok(SessionEntry::Unrecoverable {
                    session_id: saved.session_id,
                    reason,
                })
            }
        }
    }

    /// Re-enter the stored session exactly where it was left.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NothingToResume` when the slot is empty and
    /// `SessionError::InvalidSavedState` when the checkpoint is corrupt.
    pub async fn resume(&self, account: AccountId) -> Result<PracticeSession, SessionError> {
        let saved = match self.progress.load_checkpoint(account).await? {
            None => return Err(SessionError::NothingToResume),
            Some(StoredCheckpoint::Saved(saved)) => saved,
            Some(StoredCheckpoint::Unreadable { reason, .. }) => {
                return Err(SavedStateError::Unreadable(reason).into());
            }
        };
        let session = PracticeSession::from_saved(saved)?;
        tracing::info!(
            session = %session.session_id(),
            position = session.progress().position,
            total = session.total_questions(),
            "resumed session"
        );
        Ok(session)
    }

    /// Build a new session and store its first checkpoint.
    ///
    /// `discard` names the checkpoint the caller saw in `entry`; it is replaced
    /// only if it is still the one stored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Build` if the bank has nothing to offer and
    /// `SessionError::Storage(StorageError::Conflict)` if the slot changed, in
    /// which case nothing is discarded.
    pub async fn start_new<R>(
        &self,
        account: AccountId,
        bank: &QuestionBank,
        config: TestConfig,
        discard: Option<SessionId>,
        rng: &mut R,
    ) -> Result<PracticeSession, SessionError>
    where
        R: Rng + ?Sized,
    {
        let history = if config.struggle_focus() {
            self.progress.load_history(account).await?
        } else {
            Vec::new()
        };

        let plan = SessionBuilder::new(&config)
            .with_history(&history)
            .build(bank.questions(), rng)?;
        let mut session = PracticeSession::new(plan.questions, config)?;

        let initial = session.snapshot();
        self.progress
            .replace_saved_state(account, discard, initial.as_ref())
            .await?;
        session.checkpoint_pending = false;

        tracing::info!(
            session = %session.session_id(),
            questions = session.total_questions(),
            eligible = plan.eligible,
            discarded = ?discard,
            "started session"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{
        Difficulty, DifficultyFilter, OptionKey, Question, QuestionDraft, QuestionId,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use storage::repository::{InMemoryRepository, StorageError};

    fn bank() -> QuestionBank {
        let questions: Vec<Question> = (0..5)
            .map(|i| {
                QuestionDraft {
                    id: QuestionId::new(format!("q{i}")),
                    question_text: "Q".into(),
                    options: [(OptionKey::new("A"), "a".into()), (OptionKey::new("B"), "b".into())]
                        .into_iter()
                        .collect(),
                    correct_answer: OptionKey::new("A"),
                    module_topic: "ML".into(),
                    difficulty: Difficulty::Easy,
                    explanation: String::new(),
                }
                .validate()
                .unwrap()
            })
            .collect();
        QuestionBank::from_questions(questions).unwrap()
    }

    fn config(count: u32) -> TestConfig {
        TestConfig::new(count, ["ML"], DifficultyFilter::Mixed, false).unwrap()
    }

    #[tokio::test]
    async fn fresh_account_starts_and_becomes_resumable() {
        let repo = Arc::new(InMemoryRepository::new());
        let controller = ResumeController::new(repo.clone());
        let account = AccountId::generate();
        let mut rng = StdRng::seed_from_u64(11);

        assert_eq!(controller.entry(account).await.unwrap(), SessionEntry::Fresh);

        let mut session = controller
            .start_new(account, &bank(), config(3), None, &mut rng)
            .await
            .unwrap();
        let first = session.current_question().unwrap().id().clone();
        session.submit_answer(&OptionKey::new("A")).unwrap();

        let SessionEntry::Resumable(offer) = controller.entry(account).await.unwrap() else {
            panic!("initial checkpoint should be stored");
        };
        assert_eq!(offer.session_id, session.session_id());
        assert_eq!(offer.position, 1);
        assert_eq!(offer.total, 3);

        let resumed = controller.resume(account).await.unwrap();
        assert_eq!(resumed.current_question().unwrap().id(), &first);
        assert_eq!(resumed.answers().len(), 0);
    }

    #[tokio::test]
    async fn start_new_discards_only_the_observed_checkpoint() {
        let repo = Arc::new(InMemoryRepository::new());
        let controller = ResumeController::new(repo.clone());
        let account = AccountId::generate();
        let mut rng = StdRng::seed_from_u64(3);

        let old = controller
            .start_new(account, &bank(), config(2), None, &mut rng)
            .await
            .unwrap();

        let err = controller
            .start_new(account, &bank(), config(2), None, &mut rng)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Storage(StorageError::Conflict)));
        let stored = repo.load_saved_state(account).await.unwrap().unwrap();
        assert_eq!(stored.session_id, old.session_id());

        let entry = controller.entry(account).await.unwrap();
        let new = controller
            .start_new(account, &bank(), config(2), entry.stored_session(), &mut rng)
            .await
            .unwrap();
        let stored = repo.load_saved_state(account).await.unwrap().unwrap();
        assert_eq!(stored.session_id, new.session_id());
        assert_ne!(new.session_id(), old.session_id());
    }

    #[tokio::test]
    async fn resume_without_checkpoint_fails() {
        let controller = ResumeController::new(Arc::new(InMemoryRepository::new()));
        assert!(matches!(
            controller.resume(AccountId::generate()).await,
            Err(SessionError::NothingToResume)
        ));
    }

    #[tokio::test]
    async fn corrupt_checkpoint_is_reported_and_replaceable() {
        let repo = Arc::new(InMemoryRepository::new());
        let controller = ResumeController::new(repo.clone());
        let account = AccountId::generate();
        let mut rng = StdRng::seed_from_u64(8);

        let session = controller
            .start_new(account, &bank(), config(2), None, &mut rng)
            .await
            .unwrap();
        let mut broken = session.snapshot().unwrap();
        broken.current_question_index = 9;
        repo.replace_saved_state(account, Some(session.session_id()), Some(&broken))
            .await
            .unwrap();

        let entry = controller.entry(account).await.unwrap();
        assert!(matches!(entry, SessionEntry::Unrecoverable { .. }));
        assert!(matches!(
            controller.resume(account).await,
            Err(SessionError::InvalidSavedState(_))
        ));

        controller
            .start_new(account, &bank(), config(2), entry.stored_session(), &mut rng)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn struggle_focus_with_clean_history_is_good_news() {
        let controller = ResumeController::new(Arc::new(InMemoryRepository::new()));
        let struggle = TestConfig::new(5, ["ML"], DifficultyFilter::Mixed, true).unwrap();
        let err = controller
            .start_new(
                AccountId::generate(),
                &bank(),
                struggle,
                None,
                &mut StdRng::seed_from_u64(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Build(e) if e.is_positive()
        ));
    }
}
