use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{OptionKey, QuestionId, ResultId};

/// Minimum percentage counted as a pass on the dashboard.
pub const PASS_THRESHOLD_PERCENT: u32 = 70;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("score ({score}) exceeds total questions ({total})")]
    ScoreExceedsTotal { score: u32, total: u32 },

    #[error("total questions ({total}) does not match answer records ({records})")]
    CountMismatch { total: u32, records: usize },

    #[error("score ({score}) does not match correct answer records ({correct})")]
    ScoreMismatch { score: u32, correct: u32 },
}

/// Frozen outcome for one question of a completed test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_answer: Option<OptionKey>,
}

/// Permanent record of a completed practice test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    id: ResultId,
    completed_at: DateTime<Utc>,
    score: u32,
    total_questions: u32,
    answers: Vec<AnswerRecord>,
}

impl TestResult {
    /// Rehydrate a result from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ResultError` if the score, total and answer records disagree.
    pub fn from_persisted(
        id: ResultId,
        completed_at: DateTime<Utc>,
        score: u32,
        total_questions: u32,
        answers: Vec<AnswerRecord>,
    ) -> Result<Self, ResultError> {
        if score > total_questions {
            return Err(ResultError::ScoreExceedsTotal {
                score,
                total: total_questions,
            });
        }
        if usize::try_from(total_questions).ok() != Some(answers.len()) {
            return Err(ResultError::CountMismatch {
                total: total_questions,
                records: answers.len(),
            });
        }
        let correct = u32::try_from(answers.iter().filter(|a| a.is_correct).count())
            .unwrap_or(u32::MAX);
        if correct != score {
            return Err(ResultError::ScoreMismatch { score, correct });
        }

        Ok(Self {
            id,
            completed_at,
            score,
            total_questions,
            answers,
        })
    }

    /// Build a result whose score and total are derived from `answers`.
    pub(crate) fn from_records(
        id: ResultId,
        completed_at: DateTime<Utc>,
        answers: Vec<AnswerRecord>,
    ) -> Self {
        let score = u32::try_from(answers.iter().filter(|a| a.is_correct).count())
            .unwrap_or(u32::MAX);
        let total_questions = u32::try_from(answers.len()).unwrap_or(u32::MAX);
        Self {
            id,
            completed_at,
            score,
            total_questions,
            answers,
        }
    }

    #[must_use]
    pub fn id(&self) -> ResultId {
        self.id
    }

    #[must_use]
    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    /// Score as an unrounded percentage; `0.0` when there were no questions.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        f64::from(self.score) / f64::from(self.total_questions) * 100.0
    }

    /// Score as a whole percentage, rounded half away from zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rounded_percent(&self) -> u32 {
        self.percent().round() as u32
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.total_questions > 0
            && u64::from(self.score) * 100
                >= u64::from(PASS_THRESHOLD_PERCENT) * u64::from(self.total_questions)
    }

    /// Ids of questions answered incorrectly in this result.
    pub fn missed_question_ids(&self) -> impl Iterator<Item = &QuestionId> {
        self.answers
            .iter()
            .filter(|a| !a.is_correct)
            .map(|a| &a.question_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn record(id: &str, correct: bool) -> AnswerRecord {
        AnswerRecord {
            question_id: QuestionId::new(id),
            is_correct: correct,
            selected_answer: Some(OptionKey::new("A")),
        }
    }

    #[test]
    fn rejects_inconsistent_counts() {
        let err = TestResult::from_persisted(
            ResultId::generate(),
            fixed_now(),
            1,
            2,
            vec![record("q1", true)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ResultError::CountMismatch {
                total: 2,
                records: 1
            }
        );

        let err = TestResult::from_persisted(
            ResultId::generate(),
            fixed_now(),
            2,
            2,
            vec![record("q1", true), record("q2", false)],
        )
        .unwrap_err();
        assert_eq!(err, ResultError::ScoreMismatch { score: 2, correct: 1 });
    }

    #[test]
    fn pass_threshold_uses_exact_ratio() {
        let answers: Vec<_> = (0..10).map(|i| record(&format!("q{i}"), i < 7)).collect();
        let result =
            TestResult::from_persisted(ResultId::generate(), fixed_now(), 7, 10, answers).unwrap();
        assert!(result.passed());
        assert_eq!(result.rounded_percent(), 70);

        let answers: Vec<_> = (0..3).map(|i| record(&format!("q{i}"), i < 2)).collect();
        let result =
            TestResult::from_persisted(ResultId::generate(), fixed_now(), 2, 3, answers).unwrap();
        assert!(!result.passed());
        assert_eq!(result.rounded_percent(), 67);
    }

    #[test]
    fn lists_missed_questions() {
        let result = TestResult::from_persisted(
            ResultId::generate(),
            fixed_now(),
            1,
            2,
            vec![record("q1", true), record("q2", false)],
        )
        .unwrap();
        let missed: Vec<_> = result.missed_question_ids().map(QuestionId::as_str).collect();
        assert_eq!(missed, vec!["q2"]);
    }

    #[test]
    fn answer_record_json_shape() {
        let json = serde_json::to_value(record("q1", true)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"questionId": "q1", "isCorrect": true, "selectedAnswer": "A"})
        );
    }
}
