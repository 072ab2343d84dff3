use std::sync::Arc;

use prep_core::model::{AccountId, OptionKey, TestResult};
use storage::repository::{ProgressRepository, StorageError};

use super::service::{Advance, PracticeSession, SessionState, SubmitOutcome};
use crate::Clock;
use crate::error::SessionError;

/// What happened to a checkpoint write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    Saved,
    /// The store failed; the session keeps the checkpoint pending and the next
    /// write carries the latest snapshot.
    Deferred,
    /// The store already holds a newer revision of this session.
    Stale,
    /// Another session now owns the checkpoint slot.
    Superseded,
    /// Nothing needed writing.
    Unchanged,
}

/// Whether a finalized result reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// Retry with `SessionLoopService::finalize_result`.
    Pending,
}

/// Result of answering the current question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerStep {
    pub outcome: SubmitOutcome,
    pub checkpoint: CheckpointStatus,
}

/// Result of moving past the current question.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceStep {
    Next {
        index: usize,
        checkpoint: CheckpointStatus,
    },
    Finished {
        result: TestResult,
        commit: CommitStatus,
    },
}

/// Drives a `PracticeSession` and persists checkpoints and results, in order.
///
/// Each write is awaited before the call returns, so checkpoints reach the store
/// in revision order. Storage failures never roll back the in-memory session.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(clock: Clock, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { clock, progress }
    }

    /// Answer the current question and checkpoint the new state.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the state machine rejects the answer.
    pub async fn submit_answer(
        &self,
        account: AccountId,
        session: &mut PracticeSession,
        key: &OptionKey,
    ) -> Result<AnswerStep, SessionError> {
        let outcome = session.submit_answer(key)?;
        let checkpoint = match outcome {
            SubmitOutcome::Recorded(_) => self.write_checkpoint(account, session).await,
            SubmitOutcome::Ignored => CheckpointStatus::Unchanged,
        };
        Ok(AnswerStep {
            outcome,
            checkpoint,
        })
    }

    /// Advance past the current question; on the last one, finalize and commit the result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the state machine rejects the transition.
    pub async fn advance(
        &self,
        account: AccountId,
        session: &mut PracticeSession,
    ) -> Result<AdvanceStep, SessionError> {
        match session.advance(self.clock.now())? {
            Advance::Next(index) => Ok(AdvanceStep::Next {
                index,
                checkpoint: self.write_checkpoint(account, session).await,
            }),
            Advance::Finished(result) => {
                let commit = self.commit(account, session, &result).await;
                Ok(AdvanceStep::Finished { result, commit })
            }
        }
    }

    /// Write the current checkpoint without changing state.
    ///
    /// Repeated calls write identical payloads.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed`/`Abandoned` once the session has ended.
    pub async fn exit_with_save(
        &self,
        account: AccountId,
        session: &mut PracticeSession,
    ) -> Result<CheckpointStatus, SessionError> {
        session.ensure_active()?;
        Ok(self.write_checkpoint(account, session).await)
    }

    /// Abandon the session and clear its checkpoint. No result is recorded.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed`/`Abandoned` if already finished, or
    /// `SessionError::Storage` if the checkpoint could not be cleared.
    pub async fn abandon(
        &self,
        account: AccountId,
        session: &mut PracticeSession,
    ) -> Result<(), SessionError> {
        session.abandon()?;
        match self
            .progress
            .replace_saved_state(account, Some(session.session_id()), None)
            .await
        {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict) => {
                tracing::debug!(
                    session = %session.session_id(),
                    "abandoned session owned no checkpoint"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    session = %session.session_id(),
                    error = %e,
                    "failed to clear checkpoint"
                );
                Err(e.into())
            }
        }
    }

    /// Commit the finalized result of a completed session if an earlier attempt failed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::IllegalTransition` if the session is not completed,
    /// or `SessionError::Storage` if the commit fails again.
    pub async fn finalize_result(
        &self,
        account: AccountId,
        session: &mut PracticeSession,
    ) -> Result<TestResult, SessionError> {
        let Some(result) = session.result().cloned() else {
            return Err(SessionError::IllegalTransition {
                action: "finalize",
                state: session.state(),
            });
        };
        if !session.result_committed {
            self.progress
                .commit_result(account, session.session_id(), &result)
                .await?;
            session.result_committed = true;
        }
        Ok(result)
    }

    async fn write_checkpoint(
        &self,
        account: AccountId,
        session: &mut PracticeSession,
    ) -> CheckpointStatus {
        let Some(state) = session.snapshot() else {
            return CheckpointStatus::Unchanged;
        };

        match self.progress.save_checkpoint(account, &state).await {
            Ok(()) => {
                session.checkpoint_pending = false;
                tracing::debug!(
                    session = %state.session_id,
                    revision = state.revision,
                    "checkpoint saved"
                );
                CheckpointStatus::Saved
            }
            Err(StorageError::Stale { stored, attempted }) => {
                session.checkpoint_pending = false;
                tracing::warn!(
                    session = %state.session_id,
                    stored,
                    attempted,
                    "dropping stale checkpoint"
                );
                CheckpointStatus::Stale
            }
            Err(StorageError::Conflict) => {
                session.checkpoint_pending = false;
                tracing::warn!(
                    session = %state.session_id,
                    "checkpoint slot belongs to another session"
                );
                CheckpointStatus::Superseded
            }
            Err(e) => {
                session.checkpoint_pending = true;
                tracing::warn!(
                    session = %state.session_id,
                    revision = state.revision,
                    error = %e,
                    "checkpoint write failed; will retry on next write"
                );
                CheckpointStatus::Deferred
            }
        }
    }

    async fn commit(
        &self,
        account: AccountId,
        session: &mut PracticeSession,
        result: &TestResult,
    ) -> CommitStatus {
        debug_assert_eq!(session.state(), SessionState::Completed);
        match self
            .progress
            .commit_result(account, session.session_id(), result)
            .await
        {
            Ok(()) => {
                session.result_committed = true;
                tracing::info!(
                    session = %session.session_id(),
                    score = result.score(),
                    total = result.total_questions(),
                    "result committed"
                );
                CommitStatus::Committed
            }
            Err(e) => {
                tracing::warn!(session = %session.session_id(), error = %e, "result commit failed");
                CommitStatus::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{
        Difficulty, DifficultyFilter, Question, QuestionDraft, QuestionId, SavedState, SessionId,
        TestConfig,
    };
    use prep_core::time::fixed_clock;
    use std::sync::atomic::{AtomicBool, Ordering};
    use storage::repository::{InMemoryRepository, StoredCheckpoint};

    /// Fails every write while `down` is set.
    struct FlakyRepo {
        inner: InMemoryRepository,
        down: AtomicBool,
    }

    impl FlakyRepo {
        fn check(&self) -> Result<(), StorageError> {
            if self.down.load(Ordering::SeqCst) {
                Err(StorageError::Connection("offline".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl ProgressRepository for FlakyRepo {
        async fn load_history(&self, account: AccountId) -> Result<Vec<TestResult>, StorageError> {
            self.inner.load_history(account).await
        }

        async fn load_checkpoint(
            &self,
            account: AccountId,
        ) -> Result<Option<StoredCheckpoint>, StorageError> {
            self.inner.load_checkpoint(account).await
        }

        async fn save_checkpoint(
            &self,
            account: AccountId,
            state: &SavedState,
        ) -> Result<(), StorageError> {
            self.check()?;
            self.inner.save_checkpoint(account, state).await
        }

        async fn replace_saved_state(
            &self,
            account: AccountId,
            expected: Option<SessionId>,
            state: Option<&SavedState>,
        ) -> Result<(), StorageError> {
            self.check()?;
            self.inner.replace_saved_state(account, expected, state).await
        }

        async fn commit_result(
            &self,
            account: AccountId,
            session: SessionId,
            result: &TestResult,
        ) -> Result<(), StorageError> {
            self.check()?;
            self.inner.commit_result(account, session, result).await
        }
    }

    fn question(id: &str) -> Question {
        QuestionDraft {
            id: QuestionId::new(id),
            question_text: "Q".into(),
            options: [("A", "a"), ("B", "b")]
                .into_iter()
                .map(|(k, v)| (OptionKey::new(k), v.to_owned()))
                .collect(),
            correct_answer: OptionKey::new("A"),
            module_topic: "ML".into(),
            difficulty: Difficulty::Easy,
            explanation: String::new(),
        }
        .validate()
        .unwrap()
    }

    fn session() -> PracticeSession {
        PracticeSession::new(
            vec![question("q1"), question("q2")],
            TestConfig::new(2, ["ML"], DifficultyFilter::Mixed, false).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn failed_writes_degrade_and_recover() {
        let repo = Arc::new(FlakyRepo {
            inner: InMemoryRepository::new(),
            down: AtomicBool::new(true),
        });
        let svc = SessionLoopService::new(fixed_clock(), repo.clone());
        let account = AccountId::generate();
        let mut s = session();
        let a = OptionKey::new("A");

        let step = svc.submit_answer(account, &mut s, &a).await.unwrap();
        assert_eq!(step.checkpoint, CheckpointStatus::Deferred);
        assert!(s.checkpoint_pending());

        // The session keeps moving while the store is down.
        let step = svc.advance(account, &mut s).await.unwrap();
        assert!(matches!(
            step,
            AdvanceStep::Next {
                index: 1,
                checkpoint: CheckpointStatus::Deferred
            }
        ));

        repo.down.store(false, Ordering::SeqCst);
        let status = svc.exit_with_save(account, &mut s).await.unwrap();
        assert_eq!(status, CheckpointStatus::Saved);
        assert!(!s.checkpoint_pending());
        let stored = repo.inner.load_saved_state(account).await.unwrap().unwrap();
        assert_eq!(stored, s.snapshot().unwrap());
    }

    #[tokio::test]
    async fn failed_commit_keeps_result_for_retry() {
        let repo = Arc::new(FlakyRepo {
            inner: InMemoryRepository::new(),
            down: AtomicBool::new(false),
        });
        let svc = SessionLoopService::new(fixed_clock(), repo.clone());
        let account = AccountId::generate();
        let mut s = session();
        let a = OptionKey::new("A");

        svc.submit_answer(account, &mut s, &a).await.unwrap();
        svc.advance(account, &mut s).await.unwrap();
        svc.submit_answer(account, &mut s, &a).await.unwrap();

        repo.down.store(true, Ordering::SeqCst);
        let step = svc.advance(account, &mut s).await.unwrap();
        let AdvanceStep::Finished { result, commit } = step else {
            panic!("expected the session to finish");
        };
        assert_eq!(commit, CommitStatus::Pending);
        assert_eq!(result.score(), 2);
        assert!(repo.inner.load_history(account).await.unwrap().is_empty());

        repo.down.store(false, Ordering::SeqCst);
        let committed = svc.finalize_result(account, &mut s).await.unwrap();
        assert_eq!(committed, result);
        assert!(s.result_committed());
        assert_eq!(repo.inner.load_history(account).await.unwrap(), vec![result]);
        assert!(repo.inner.load_saved_state(account).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_and_superseded_writes_are_dropped() {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = SessionLoopService::new(fixed_clock(), repo.clone());
        let account = AccountId::generate();
        let mut s = session();

        // A newer revision of the same session is already stored.
        let mut newer = s.snapshot().unwrap();
        newer.revision = 10;
        repo.save_checkpoint(account, &newer).await.unwrap();
        assert_eq!(
            svc.exit_with_save(account, &mut s).await.unwrap(),
            CheckpointStatus::Stale
        );

        // Another session took over the slot.
        let other = session().snapshot().unwrap();
        repo.replace_saved_state(account, Some(s.session_id()), Some(&other))
            .await
            .unwrap();
        assert_eq!(
            svc.exit_with_save(account, &mut s).await.unwrap(),
            CheckpointStatus::Superseded
        );
        assert!(!s.checkpoint_pending());
    }

    #[tokio::test]
    async fn abandon_clears_only_own_checkpoint() {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = SessionLoopService::new(fixed_clock(), repo.clone());
        let account = AccountId::generate();
        let mut s = session();
        svc.exit_with_save(account, &mut s).await.unwrap();

        svc.abandon(account, &mut s).await.unwrap();
        assert!(repo.load_saved_state(account).await.unwrap().is_none());
        assert!(repo.load_history(account).await.unwrap().is_empty());
        assert!(matches!(
            svc.exit_with_save(account, &mut s).await,
            Err(SessionError::Abandoned)
        ));
    }

    #[tokio::test]
    async fn finalize_before_completion_is_illegal() {
        let repo = Arc::new(InMemoryRepository::new());
        let svc = SessionLoopService::new(fixed_clock(), repo);
        let mut s = session();
        assert!(matches!(
            svc.finalize_result(AccountId::generate(), &mut s).await,
            Err(SessionError::IllegalTransition {
                action: "finalize",
                ..
            })
        ));
    }
}
