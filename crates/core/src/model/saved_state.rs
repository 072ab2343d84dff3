use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::model::config::TestConfig;
use crate::model::ids::{OptionKey, QuestionId, SessionId};
use crate::model::question::Question;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SavedStateError {
    #[error("saved state has no questions")]
    NoQuestions,

    #[error("saved index {index} is outside the session of {len} questions")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("question {0} appears more than once in the saved session")]
    DuplicateQuestion(QuestionId),

    #[error("saved answer references unknown question {0}")]
    UnknownQuestion(QuestionId),

    #[error("saved answer for {0} lies beyond the current question")]
    AnswerAheadOfIndex(QuestionId),

    #[error("saved answer {key} is not an option of question {question}")]
    UnknownOption { question: QuestionId, key: OptionKey },

    #[error("saved score {stored} does not match the {derived} correct answers on record")]
    ScoreMismatch { stored: u32, derived: u32 },

    #[error("saved state could not be decoded: {0}")]
    Unreadable(String),
}

/// Checkpoint of an in-progress session, sufficient to resume it exactly.
///
/// The question list is frozen when the session is built; resuming never
/// re-filters or re-shuffles. `session_id` and `revision` let stores drop
/// checkpoints that arrive out of order or belong to a superseded session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
    pub session_id: SessionId,
    pub revision: u64,
    pub questions: Vec<Question>,
    pub current_question_index: usize,
    pub answers: BTreeMap<QuestionId, OptionKey>,
    pub score: u32,
    pub config: TestConfig,
}

impl SavedState {
    /// Check every structural invariant of the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns the first `SavedStateError` found.
    pub fn validate(&self) -> Result<(), SavedStateError> {
        let len = self.questions.len();
        if len == 0 {
            return Err(SavedStateError::NoQuestions);
        }
        if self.current_question_index >= len {
            return Err(SavedStateError::IndexOutOfRange {
                index: self.current_question_index,
                len,
            });
        }

        let mut positions = HashMap::with_capacity(len);
        for (pos, question) in self.questions.iter().enumerate() {
            if positions.insert(question.id(), pos).is_some() {
                return Err(SavedStateError::DuplicateQuestion(question.id().clone()));
            }
        }

        for (question_id, key) in &self.answers {
            let Some(&pos) = positions.get(question_id) else {
                return Err(SavedStateError::UnknownQuestion(question_id.clone()));
            };
            if pos > self.current_question_index {
                return Err(SavedStateError::AnswerAheadOfIndex(question_id.clone()));
            }
            if !self.questions[pos].has_option(key) {
                return Err(SavedStateError::UnknownOption {
                    question: question_id.clone(),
                    key: key.clone(),
                });
            }
        }

        let derived = self.derived_score();
        if derived != self.score {
            return Err(SavedStateError::ScoreMismatch {
                stored: self.score,
                derived,
            });
        }

        Ok(())
    }

    /// Number of recorded answers matching their question's correct option.
    #[must_use]
    pub fn derived_score(&self) -> u32 {
        let correct = self
            .questions
            .iter()
            .filter(|q| self.answers.get(q.id()) == Some(q.correct_answer()))
            .count();
        u32::try_from(correct).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_index)
    }

    /// Whether the question at the saved index already has an answer.
    #[must_use]
    pub fn current_is_answered(&self) -> bool {
        self.current_question()
            .is_some_and(|q| self.answers.contains_key(q.id()))
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::DifficultyFilter;
    use crate::model::question::{Difficulty, QuestionDraft};

    fn question(id: &str, correct: &str) -> Question {
        QuestionDraft {
            id: QuestionId::new(id),
            question_text: format!("Question {id}"),
            options: ["A", "B", "C"]
                .into_iter()
                .map(|k| (OptionKey::new(k), format!("option {k}")))
                .collect(),
            correct_answer: OptionKey::new(correct),
            module_topic: "M1".into(),
            difficulty: Difficulty::Medium,
            explanation: String::new(),
        }
        .validate()
        .unwrap()
    }

    fn state() -> SavedState {
        SavedState {
            session_id: SessionId::generate(),
            revision: 3,
            questions: vec![question("q1", "A"), question("q2", "B"), question("q3", "C")],
            current_question_index: 1,
            answers: [
                (QuestionId::new("q1"), OptionKey::new("A")),
                (QuestionId::new("q2"), OptionKey::new("C")),
            ]
            .into_iter()
            .collect(),
            score: 1,
            config: TestConfig::new(3, ["M1"], DifficultyFilter::Mixed, false).unwrap(),
        }
    }

    #[test]
    fn valid_state_passes() {
        let s = state();
        s.validate().unwrap();
        assert!(s.current_is_answered());
        assert_eq!(s.derived_score(), 1);
    }

    #[test]
    fn detects_score_drift() {
        let mut s = state();
        s.score = 2;
        assert_eq!(
            s.validate().unwrap_err(),
            SavedStateError::ScoreMismatch {
                stored: 2,
                derived: 1
            }
        );
    }

    #[test]
    fn detects_answers_beyond_index() {
        let mut s = state();
        s.answers
            .insert(QuestionId::new("q3"), OptionKey::new("A"));
        assert!(matches!(
            s.validate(),
            Err(SavedStateError::AnswerAheadOfIndex(id)) if id.as_str() == "q3"
        ));
    }

    #[test]
    fn detects_out_of_range_index() {
        let mut s = state();
        s.current_question_index = 3;
        assert!(matches!(
            s.validate(),
            Err(SavedStateError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn json_uses_camel_case_and_round_trips() {
        let s = state();
        let value = serde_json::to_value(&s).unwrap();
        assert_eq!(value["currentQuestionIndex"], 1);
        assert_eq!(value["answers"]["q1"], "A");
        let back: SavedState = serde_json::from_value(value).unwrap();
        assert_eq!(back, s);
    }
}
