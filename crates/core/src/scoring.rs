//! Result finalization and history statistics.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::model::{AnswerRecord, OptionKey, Question, QuestionId, ResultId, TestResult};

/// Aggregate over a user's completed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryStats {
    pub count: usize,
    pub average_percent: u32,
}

/// Freeze a finished session into a `TestResult`.
///
/// Correctness is re-derived from `answers` against each question's correct
/// option; the result's score is the number of such matches. Unanswered
/// questions are recorded as incorrect with no selection.
#[must_use]
pub fn finalize(
    id: ResultId,
    completed_at: DateTime<Utc>,
    questions: &[Question],
    answers: &BTreeMap<QuestionId, OptionKey>,
) -> TestResult {
    let records: Vec<AnswerRecord> = questions
        .iter()
        .map(|q| {
            let selected = answers.get(q.id()).cloned();
            AnswerRecord {
                question_id: q.id().clone(),
                is_correct: selected.as_ref().is_some_and(|key| q.is_correct(key)),
                selected_answer: selected,
            }
        })
        .collect();

    TestResult::from_records(id, completed_at, records)
}

/// Count and rounded mean percentage of `history`; zero for an empty history.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn summary_stats(history: &[TestResult]) -> SummaryStats {
    if history.is_empty() {
        return SummaryStats::default();
    }
    let total: f64 = history.iter().map(TestResult::percent).sum();
    let mean = total / history.len() as f64;
    SummaryStats {
        count: history.len(),
        average_percent: mean.round() as u32,
    }
}

/// The last `limit` results, newest first.
#[must_use]
pub fn recent(history: &[TestResult], limit: usize) -> Vec<&TestResult> {
    history.iter().rev().take(limit).collect()
}
