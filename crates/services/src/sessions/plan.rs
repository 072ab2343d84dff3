use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

use prep_core::model::{Question, QuestionId, TestConfig, TestResult};

use crate::error::BuildError;

/// Selection result for a session build.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub questions: Vec<Question>,
    /// Questions that survived every filter, before sampling.
    pub eligible: usize,
}

impl SessionPlan {
    #[must_use]
    pub fn total(&self) -> usize {
        self.questions.len()
    }
}

/// Ids of every question answered incorrectly in any past attempt.
#[must_use]
pub fn missed_question_ids(history: &[TestResult]) -> HashSet<&QuestionId> {
    history
        .iter()
        .flat_map(TestResult::missed_question_ids)
        .collect()
}

/// Builds a practice session by filtering the bank and sampling in random order.
pub struct SessionBuilder<'a> {
    config: &'a TestConfig,
    history: &'a [TestResult],
}

impl<'a> SessionBuilder<'a> {
    #[must_use]
    pub fn new(config: &'a TestConfig) -> Self {
        Self {
            config,
            history: &[],
        }
    }

    /// Past results consulted when struggle focus is on.
    #[must_use]
    pub fn with_history(mut self, history: &'a [TestResult]) -> Self {
        self.history = history;
        self
    }

    /// Filter `pool` by module, difficulty and (optionally) past misses, then take
    /// up to `question_count` questions in a uniformly random order.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::NoStruggleQuestions` when struggle focus leaves nothing,
    /// and `BuildError::NoMatchingQuestions` when the other filters do.
    pub fn build<R>(self, pool: &[Question], rng: &mut R) -> Result<SessionPlan, BuildError>
    where
        R: Rng + ?Sized,
    {
        let config = self.config;
        let mut candidates: Vec<Question> = pool
            .iter()
            .filter(|q| config.includes_module(q.module()))
            .filter(|q| config.difficulty().matches(q.difficulty()))
            .cloned()
            .collect();

        if config.struggle_focus() {
            let missed = missed_question_ids(self.history);
            candidates.retain(|q| missed.contains(q.id()));
            if candidates.is_empty() {
                return Err(BuildError::NoStruggleQuestions);
            }
        }

        if candidates.is_empty() {
            return Err(BuildError::NoMatchingQuestions);
        }

        let eligible = candidates.len();
        candidates.shuffle(rng);
        let take = usize::try_from(config.question_count()).unwrap_or(usize::MAX);
        candidates.truncate(take);

        Ok(SessionPlan {
            questions: candidates,
            eligible,
        })
    }
}

/// Convenience wrapper around `SessionBuilder`.
///
/// # Errors
///
/// See [`SessionBuilder::build`].
pub fn build_session<R>(
    pool: &[Question],
    config: &TestConfig,
    history: &[TestResult],
    rng: &mut R,
) -> Result<Vec<Question>, BuildError>
where
    R: Rng + ?Sized,
{
    SessionBuilder::new(config)
        .with_history(history)
        .build(pool, rng)
        .map(|plan| plan.questions)
}
