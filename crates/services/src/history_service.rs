use chrono::{DateTime, Utc};
use std::sync::Arc;

use prep_core::model::{AccountId, ResultId, TestResult};
use prep_core::scoring::{SummaryStats, recent, summary_stats};
use storage::repository::{ProgressRepository, StorageError};

/// Number of results shown on the dashboard.
pub const RECENT_RESULTS: usize = 5;

/// Presentation-agnostic list item for a completed test.
///
/// Carries no pre-formatted strings; callers format timestamps and percentages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultListItem {
    pub id: ResultId,
    pub completed_at: DateTime<Utc>,
    pub score: u32,
    pub total: u32,
    pub percent: u32,
    pub passed: bool,
}

impl ResultListItem {
    #[must_use]
    pub fn from_result(result: &TestResult) -> Self {
        Self {
            id: result.id(),
            completed_at: result.completed_at(),
            score: result.score(),
            total: result.total_questions(),
            percent: result.rounded_percent(),
            passed: result.passed(),
        }
    }
}

/// Dashboard aggregate: headline stats plus the latest results, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dashboard {
    pub stats: SummaryStats,
    pub recent: Vec<ResultListItem>,
}

impl Dashboard {
    #[must_use]
    pub fn from_history(history: &[TestResult]) -> Self {
        Self {
            stats: summary_stats(history),
            recent: recent(history, RECENT_RESULTS)
                .into_iter()
                .map(ResultListItem::from_result)
                .collect(),
        }
    }
}

/// Read-side facade over an account's completed results.
#[derive(Clone)]
pub struct HistoryService {
    progress: Arc<dyn ProgressRepository>,
}

impl HistoryService {
    #[must_use]
    pub fn new(progress: Arc<dyn ProgressRepository>) -> Self {
        Self { progress }
    }

    /// Load the dashboard for an account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    pub async fn dashboard(&self, account: AccountId) -> Result<Dashboard, StorageError> {
        let history = self.progress.load_history(account).await?;
        Ok(Dashboard::from_history(&history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prep_core::model::{AnswerRecord, OptionKey, QuestionId, SessionId};
    use prep_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn result(score: u32, total: u32) -> TestResult {
        let answers = (0..total)
            .map(|i| AnswerRecord {
                question_id: QuestionId::new(format!("q{i}")),
                is_correct: i < score,
                selected_answer: Some(OptionKey::new("A")),
            })
            .collect();
        TestResult::from_persisted(ResultId::generate(), fixed_now(), score, total, answers)
            .unwrap()
    }

    #[tokio::test]
    async fn empty_history_dashboard() {
        let svc = HistoryService::new(Arc::new(InMemoryRepository::new()));
        let dashboard = svc.dashboard(AccountId::generate()).await.unwrap();
        assert_eq!(dashboard, Dashboard::default());
    }

    #[tokio::test]
    async fn dashboard_lists_latest_five_newest_first() {
        let repo = Arc::new(InMemoryRepository::new());
        let account = AccountId::generate();
        for score in 0..7 {
            repo.commit_result(account, SessionId::generate(), &result(score, 10))
                .await
                .unwrap();
        }

        let dashboard = HistoryService::new(repo).dashboard(account).await.unwrap();

        assert_eq!(dashboard.stats.count, 7);
        assert_eq!(dashboard.stats.average_percent, 30);
        let scores: Vec<_> = dashboard.recent.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![6, 5, 4, 3, 2]);
        assert!(dashboard.recent.iter().all(|r| !r.passed));
    }

    #[test]
    fn list_item_marks_passing_results() {
        let item = ResultListItem::from_result(&result(7, 10));
        assert_eq!(item.percent, 70);
        assert!(item.passed);
    }
}
