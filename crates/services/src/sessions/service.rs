use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use prep_core::model::{
    OptionKey, Question, QuestionId, ResultId, SavedState, SessionId, TestConfig, TestResult,
};
use prep_core::scoring::finalize;

use super::progress::SessionProgress;
use crate::error::SessionError;

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Where a practice session stands. Indices are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingAnswer(usize),
    Answered(usize),
    Completed,
    Abandoned,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }

    fn terminal_error(self) -> Option<SessionError> {
        match self {
            Self::Completed => Some(SessionError::Completed),
            Self::Abandoned => Some(SessionError::Abandoned),
            Self::AwaitingAnswer(_) | Self::Answered(_) => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingAnswer(i) => write!(f, "awaiting an answer to question {}", i + 1),
            Self::Answered(i) => write!(f, "question {} is answered", i + 1),
            Self::Completed => f.write_str("completed"),
            Self::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// What the learner sees right after answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub question_id: QuestionId,
    pub selected: OptionKey,
    pub correct_answer: OptionKey,
    pub is_correct: bool,
    pub explanation: String,
    /// Running score after this answer.
    pub score: u32,
}

/// Outcome of `submit_answer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Recorded(AnswerFeedback),
    /// The current question was already answered; nothing changed.
    Ignored,
}

/// Outcome of `advance`.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next(usize),
    Finished(TestResult),
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One in-progress practice test.
///
/// Steps through a frozen question list, accumulating answers and a running
/// score. Every state change bumps `revision`; `snapshot` captures a checkpoint
/// that `from_saved` turns back into an identical session.
pub struct PracticeSession {
    session_id: SessionId,
    revision: u64,
    questions: Vec<Question>,
    config: TestConfig,
    state: SessionState,
    answers: BTreeMap<QuestionId, OptionKey>,
    score: u32,
    result: Option<TestResult>,
    pub(crate) checkpoint_pending: bool,
    pub(crate) result_committed: bool,
}

impl PracticeSession {
    /// Start a fresh session over `questions` in the given order.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if no questions are provided.
    pub fn new(questions: Vec<Question>, config: TestConfig) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::Empty);
        }

        Ok(Self {
            session_id: SessionId::generate(),
            revision: 0,
            questions,
            config,
            state: SessionState::AwaitingAnswer(0),
            answers: BTreeMap::new(),
            score: 0,
            result: None,
            checkpoint_pending: true,
            result_committed: false,
        })
    }

    /// Rehydrate a session from its checkpoint without re-filtering or re-shuffling.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidSavedState` if the checkpoint breaks an invariant.
    pub fn from_saved(saved: SavedState) -> Result<Self, SessionError> {
        saved.validate()?;

        let index = saved.current_question_index;
        let state = if saved.current_is_answered() {
            SessionState::Answered(index)
        } else {
            SessionState::AwaitingAnswer(index)
        };

        Ok(Self {
            session_id: saved.session_id,
            revision: saved.revision,
            questions: saved.questions,
            config: saved.config,
            state,
            answers: saved.answers,
            score: saved.score,
            result: None,
            checkpoint_pending: false,
            result_committed: false,
        })
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, OptionKey> {
        &self.answers
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// Index of the question on screen; `None` once the session has ended.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        match self.state {
            SessionState::AwaitingAnswer(i) | SessionState::Answered(i) => Some(i),
            SessionState::Completed | SessionState::Abandoned => None,
        }
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.current_index().and_then(|i| self.questions.get(i))
    }

    /// The answer already recorded for the current question, if any.
    #[must_use]
    pub fn current_answer(&self) -> Option<&OptionKey> {
        self.current_question().and_then(|q| self.answers.get(q.id()))
    }

    /// The finalized result, once completed.
    #[must_use]
    pub fn result(&self) -> Option<&TestResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// True when the latest checkpoint has not reached the store yet.
    #[must_use]
    pub fn checkpoint_pending(&self) -> bool {
        self.checkpoint_pending
    }

    /// True once the finalized result has been committed to the store.
    #[must_use]
    pub fn result_committed(&self) -> bool {
        self.result_committed
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.total_questions();
        SessionProgress {
            total,
            position: self.current_index().map_or(total, |i| i + 1),
            answered: self.answers.len(),
            score: self.score,
            is_complete: self.state == SessionState::Completed,
        }
    }

    /// Record `key` as the answer to the current question.
    ///
    /// Answering a question twice is ignored: the first answer stands and the
    /// score is never incremented again.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownOption` if `key` is not an option of the
    /// current question, and `SessionError::Completed`/`Abandoned` once finished.
    pub fn submit_answer(&mut self, key: &OptionKey) -> Result<SubmitOutcome, SessionError> {
        let index = match self.state {
            SessionState::AwaitingAnswer(i) => i,
            SessionState::Answered(_) => return Ok(SubmitOutcome::Ignored),
            SessionState::Completed => return Err(SessionError::Completed),
            SessionState::Abandoned => return Err(SessionError::Abandoned),
        };
        let Some(question) = self.questions.get(index) else {
            return Err(SessionError::Empty);
        };
        if !question.has_option(key) {
            return Err(SessionError::UnknownOption {
                question: question.id().clone(),
                key: key.clone(),
            });
        }

        let is_correct = question.is_correct(key);
        let feedback_question = question.id().clone();
        let correct_answer = question.correct_answer().clone();
        let explanation = question.explanation().to_owned();

        self.answers.insert(feedback_question.clone(), key.clone());
        if is_correct {
            self.score += 1;
        }
        self.state = SessionState::Answered(index);
        self.revision += 1;

        Ok(SubmitOutcome::Recorded(AnswerFeedback {
            question_id: feedback_question,
            selected: key.clone(),
            correct_answer,
            is_correct,
            explanation,
            score: self.score,
        }))
    }

    /// Move past an answered question, finishing the session after the last one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::IllegalTransition` if the current question has not
    /// been answered, and `SessionError::Completed`/`Abandoned` once finished.
    pub fn advance(&mut self, completed_at: DateTime<Utc>) -> Result<Advance, SessionError> {
        let index = match self.state {
            SessionState::Answered(i) => i,
            SessionState::AwaitingAnswer(_) => {
                tracing::warn!(
                    session = %self.session_id,
                    state = %self.state,
                    "advance requested before answering"
                );
                return Err(SessionError::IllegalTransition {
                    action: "advance",
                    state: self.state,
                });
            }
            SessionState::Completed => return Err(SessionError::Completed),
            SessionState::Abandoned => return Err(SessionError::Abandoned),
        };

        let next = index + 1;
        if next < self.questions.len() {
            self.state = SessionState::AwaitingAnswer(next);
            self.revision += 1;
            return Ok(Advance::Next(next));
        }

        let result = finalize(
            ResultId::generate(),
            completed_at,
            &self.questions,
            &self.answers,
        );
        if result.score() != self.score {
            tracing::warn!(
                session = %self.session_id,
                running = self.score,
                derived = result.score(),
                "running score disagrees with recorded answers"
            );
        }
        self.state = SessionState::Completed;
        self.revision += 1;
        self.checkpoint_pending = false;
        self.result = Some(result.clone());
        Ok(Advance::Finished(result))
    }

    /// Stop the session without producing a result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Completed`/`Abandoned` if already finished.
    pub fn abandon(&mut self) -> Result<(), SessionError> {
        if let Some(err) = self.state.terminal_error() {
            return Err(err);
        }
        self.state = SessionState::Abandoned;
        self.checkpoint_pending = false;
        Ok(())
    }

    /// Checkpoint of the current state; `None` once the session has ended.
    #[must_use]
    pub fn snapshot(&self) -> Option<SavedState> {
        let index = self.current_index()?;
        Some(SavedState {
            session_id: self.session_id,
            revision: self.revision,
            questions: self.questions.clone(),
            current_question_index: index,
            answers: self.answers.clone(),
            score: self.score,
            config: self.config.clone(),
        })
    }

    /// Fails with the terminal error when the session has ended.
    pub(crate) fn ensure_active(&self) -> Result<(), SessionError> {
        match self.state.terminal_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PracticeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PracticeSession")
            .field("session_id", &self.session_id)
            .field("revision", &self.revision)
            .field("questions_len", &self.questions.len())
            .field("state", &self.state)
            .field("answers_len", &self.answers.len())
            .field("score", &self.score)
            .field("checkpoint_pending", &self.checkpoint_pending)
            .field("result_committed", &self.result_committed)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{Difficulty, DifficultyFilter, QuestionDraft};
    use prep_core::time::fixed_now;

    fn question(id: &str, correct: &str) -> Question {
        QuestionDraft {
            id: QuestionId::new(id),
            question_text: format!("Question {id}"),
            options: ["A", "B", "C", "D"]
                .into_iter()
                .map(|k| (OptionKey::new(k), k.to_lowercase()))
                .collect(),
            correct_answer: OptionKey::new(correct),
            module_topic: "ML".into(),
            difficulty: Difficulty::Easy,
            explanation: format!("{correct} is right"),
        }
        .validate()
        .unwrap()
    }

    fn config() -> TestConfig {
        TestConfig::new(3, ["ML"], DifficultyFilter::Mixed, false).unwrap()
    }

    fn session() -> PracticeSession {
        PracticeSession::new(
            vec![question("q1", "A"), question("q2", "B"), question("q3", "C")],
            config(),
        )
        .unwrap()
    }

    fn key(k: &str) -> OptionKey {
        OptionKey::new(k)
    }

    #[test]
    fn empty_session_returns_error() {
        let err = PracticeSession::new(Vec::new(), config()).unwrap_err();
        assert!(matches!(err, SessionError::Empty));
    }

    #[test]
    fn answering_scores_once_and_ignores_repeats() {
        let mut s = session();
        assert_eq!(s.state(), SessionState::AwaitingAnswer(0));

        let SubmitOutcome::Recorded(feedback) = s.submit_answer(&key("A")).unwrap() else {
            panic!("first answer should be recorded");
        };
        assert!(feedback.is_correct);
        assert_eq!(feedback.explanation, "A is right");
        assert_eq!(s.score(), 1);
        assert_eq!(s.state(), SessionState::Answered(0));

        assert_eq!(s.submit_answer(&key("B")).unwrap(), SubmitOutcome::Ignored);
        assert_eq!(s.submit_answer(&key("A")).unwrap(), SubmitOutcome::Ignored);
        assert_eq!(s.score(), 1);
        assert_eq!(s.answers().get(&QuestionId::new("q1")), Some(&key("A")));
    }

    #[test]
    fn unknown_option_is_rejected_without_state_change() {
        let mut s = session();
        let err = s.submit_answer(&key("Z")).unwrap_err();
        assert!(matches!(err, SessionError::UnknownOption { .. }));
        assert_eq!(s.state(), SessionState::AwaitingAnswer(0));
        assert_eq!(s.revision(), 0);
    }

    #[test]
    fn advance_before_answer_is_illegal() {
        let mut s = session();
        let err = s.advance(fixed_now()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::IllegalTransition {
                action: "advance",
                state: SessionState::AwaitingAnswer(0)
            }
        ));
        assert_eq!(s.state(), SessionState::AwaitingAnswer(0));
    }

    #[test]
    fn session_advances_and_completes() {
        let mut s = session();
        for (i, answer) in ["A", "C", "C"].into_iter().enumerate() {
            s.submit_answer(&key(answer)).unwrap();
            let step = s.advance(fixed_now()).unwrap();
            if i < 2 {
                assert_eq!(step, Advance::Next(i + 1));
            } else {
                let Advance::Finished(result) = step else {
                    panic!("last advance should finish");
                };
                assert_eq!(result.score(), 2);
                assert_eq!(result.total_questions(), 3);
                assert_eq!(result.completed_at(), fixed_now());
            }
        }
        assert_eq!(s.state(), SessionState::Completed);
        assert!(s.snapshot().is_none());
        assert!(matches!(
            s.submit_answer(&key("A")),
            Err(SessionError::Completed)
        ));
        assert!(matches!(s.abandon(), Err(SessionError::Completed)));
        assert!(s.progress().is_complete);
    }

    #[test]
    fn revision_bumps_on_every_transition() {
        let mut s = session();
        s.submit_answer(&key("A")).unwrap();
        assert_eq!(s.revision(), 1);
        s.advance(fixed_now()).unwrap();
        assert_eq!(s.revision(), 2);
        s.submit_answer(&key("A")).unwrap();
        assert_eq!(s.revision(), 3);
    }

    #[test]
    fn snapshot_round_trips_through_from_saved() {
        let mut s = session();
        s.submit_answer(&key("A")).unwrap();
        s.advance(fixed_now()).unwrap();
        s.submit_answer(&key("D")).unwrap();

        let saved = s.snapshot().unwrap();
        assert_eq!(saved.current_question_index, 1);
        assert_eq!(saved.score, 1);

        let resumed = PracticeSession::from_saved(saved.clone()).unwrap();
        assert_eq!(resumed.state(), SessionState::Answered(1));
        assert_eq!(resumed.session_id(), s.session_id());
        assert_eq!(resumed.snapshot().unwrap(), saved);

        let mut fresh_saved = saved;
        fresh_saved.answers.remove(&QuestionId::new("q2"));
        let resumed = PracticeSession::from_saved(fresh_saved).unwrap();
        assert_eq!(resumed.state(), SessionState::AwaitingAnswer(1));
    }

    #[test]
    fn corrupt_checkpoint_is_rejected() {
        let mut saved = session().snapshot().unwrap();
        saved.score = 3;
        assert!(matches!(
            PracticeSession::from_saved(saved),
            Err(SessionError::InvalidSavedState(_))
        ));
    }

    #[test]
    fn abandon_ends_without_result() {
        let mut s = session();
        s.submit_answer(&key("B")).unwrap();
        s.abandon().unwrap();
        assert_eq!(s.state(), SessionState::Abandoned);
        assert!(s.result().is_none());
        assert!(s.snapshot().is_none());
        assert!(matches!(s.advance(fixed_now()), Err(SessionError::Abandoned)));
    }
}
