use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{OptionKey, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question id cannot be empty")]
    EmptyId,

    #[error("question {0} has no text")]
    EmptyText(QuestionId),

    #[error("question {0} has no options")]
    NoOptions(QuestionId),

    #[error("question {id} names correct answer {key} which is not one of its options")]
    UnknownCorrectAnswer { id: QuestionId, key: OptionKey },

    #[error("question {0} has no module/topic label")]
    EmptyModule(QuestionId),

    #[error("unknown difficulty: {0}")]
    InvalidDifficulty(String),
}

//
// ─── DIFFICULTY ────────────────────────────────────────────────────────────────
//

/// Difficulty tier attached to every question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(QuestionError::InvalidDifficulty(other.to_owned())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated question as it appears in a bank file or a checkpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub question_text: String,
    pub options: BTreeMap<OptionKey, String>,
    pub correct_answer: OptionKey,
    pub module_topic: String,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub explanation: String,
}

impl QuestionDraft {
    /// Validate the draft into an immutable `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when the id, text or module is blank, when there are
    /// no options, or when `correct_answer` is not one of the option keys.
    pub fn validate(self) -> Result<Question, QuestionError> {
        if self.id.as_str().trim().is_empty() {
            return Err(QuestionError::EmptyId);
        }
        if self.question_text.trim().is_empty() {
            return Err(QuestionError::EmptyText(self.id));
        }
        if self.options.is_empty() {
            return Err(QuestionError::NoOptions(self.id));
        }
        if !self.options.contains_key(&self.correct_answer) {
            return Err(QuestionError::UnknownCorrectAnswer {
                id: self.id,
                key: self.correct_answer,
            });
        }
        if self.module_topic.trim().is_empty() {
            return Err(QuestionError::EmptyModule(self.id));
        }

        Ok(Question {
            id: self.id,
            question_text: self.question_text,
            options: self.options,
            correct_answer: self.correct_answer,
            module_topic: self.module_topic,
            difficulty: self.difficulty,
            explanation: self.explanation,
        })
    }
}

/// An immutable multiple-choice question.
///
/// `correct_answer` is always one of the keys of `options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    question_text: String,
    options: BTreeMap<OptionKey, String>,
    correct_answer: OptionKey,
    module_topic: String,
    difficulty: Difficulty,
    explanation: String,
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl Question {
    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.question_text
    }

    /// Options in key order.
    #[must_use]
    pub fn options(&self) -> &BTreeMap<OptionKey, String> {
        &self.options
    }

    #[must_use]
    pub fn option(&self, key: &OptionKey) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn has_option(&self, key: &OptionKey) -> bool {
        self.options.contains_key(key)
    }

    #[must_use]
    pub fn correct_answer(&self) -> &OptionKey {
        &self.correct_answer
    }

    #[must_use]
    pub fn is_correct(&self, key: &OptionKey) -> bool {
        &self.correct_answer == key
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module_topic
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
