use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::question::Difficulty;
use crate::model::question_bank::QuestionBank;

/// Question count used when the caller does not pick one.
pub const DEFAULT_QUESTION_COUNT: u32 = 10;

/// Counts offered by the test generator.
pub const QUESTION_COUNT_PRESETS: [u32; 3] = [10, 20, 50];

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("question count must be > 0")]
    ZeroQuestionCount,

    #[error("at least one module must be selected")]
    NoModules,

    #[error("unknown difficulty filter: {0}")]
    InvalidDifficulty(String),
}

//
// ─── DIFFICULTY FILTER ─────────────────────────────────────────────────────────
//

/// Difficulty restriction for a new session; `Mixed` accepts every tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyFilter {
    Easy,
    Medium,
    Hard,
    #[default]
    Mixed,
}

impl DifficultyFilter {
    #[must_use]
    pub fn matches(self, difficulty: Difficulty) -> bool {
        match self {
            DifficultyFilter::Mixed => true,
            DifficultyFilter::Easy => difficulty == Difficulty::Easy,
            DifficultyFilter::Medium => difficulty == Difficulty::Medium,
            DifficultyFilter::Hard => difficulty == Difficulty::Hard,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DifficultyFilter::Easy => "easy",
            DifficultyFilter::Medium => "medium",
            DifficultyFilter::Hard => "hard",
            DifficultyFilter::Mixed => "mixed",
        }
    }
}

impl From<Difficulty> for DifficultyFilter {
    fn from(value: Difficulty) -> Self {
        match value {
            Difficulty::Easy => DifficultyFilter::Easy,
            Difficulty::Medium => DifficultyFilter::Medium,
            Difficulty::Hard => DifficultyFilter::Hard,
        }
    }
}

impl fmt::Display for DifficultyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            "mixed" => Ok(Self::Mixed),
            other => Err(ConfigError::InvalidDifficulty(other.to_owned())),
        }
    }
}

//
// ─── TEST CONFIG ───────────────────────────────────────────────────────────────
//

/// Unvalidated selection request, also the persisted shape inside a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfigDraft {
    pub question_count: u32,
    pub modules: BTreeSet<String>,
    #[serde(default)]
    pub difficulty: DifficultyFilter,
    #[serde(default)]
    pub struggle_focus: bool,
}

impl TestConfigDraft {
    /// # Errors
    ///
    /// Returns `ConfigError` if the count is zero or no module is selected.
    pub fn validate(self) -> Result<TestConfig, ConfigError> {
        if self.question_count == 0 {
            return Err(ConfigError::ZeroQuestionCount);
        }
        let modules: BTreeSet<String> = self
            .modules
            .into_iter()
            .map(|m| m.trim().to_owned())
            .filter(|m| !m.is_empty())
            .collect();
        if modules.is_empty() {
            return Err(ConfigError::NoModules);
        }
        Ok(TestConfig {
            question_count: self.question_count,
            modules,
            difficulty: self.difficulty,
            struggle_focus: self.struggle_focus,
        })
    }
}

/// A validated request for a new practice session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TestConfigDraft")]
pub struct TestConfig {
    question_count: u32,
    modules: BTreeSet<String>,
    difficulty: DifficultyFilter,
    struggle_focus: bool,
}

impl TryFrom<TestConfigDraft> for TestConfig {
    type Error = ConfigError;

    fn try_from(draft: TestConfigDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl TestConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` if the count is zero or no module is selected.
    pub fn new<I, S>(
        question_count: u32,
        modules: I,
        difficulty: DifficultyFilter,
        struggle_focus: bool,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TestConfigDraft {
            question_count,
            modules: modules.into_iter().map(Into::into).collect(),
            difficulty,
            struggle_focus,
        }
        .validate()
    }

    /// Every module of the bank, mixed difficulty, no struggle focus.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NoModules` for an empty bank.
    pub fn all_modules(bank: &QuestionBank, question_count: u32) -> Result<Self, ConfigError> {
        Self::new(
            question_count,
            bank.modules(),
            DifficultyFilter::Mixed,
            false,
        )
    }

    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    #[must_use]
    pub fn modules(&self) -> &BTreeSet<String> {
        &self.modules
    }

    #[must_use]
    pub fn includes_module(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    #[must_use]
    pub fn difficulty(&self) -> DifficultyFilter {
        self.difficulty
    }

    #[must_use]
    pub fn struggle_focus(&self) -> bool {
        self.struggle_focus
    }
}
