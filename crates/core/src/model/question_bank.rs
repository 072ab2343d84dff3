use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

use crate::model::ids::QuestionId;
use crate::model::question::Question;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionBankError {
    #[error("duplicate question id in bank: {0}")]
    DuplicateId(QuestionId),

    #[error("question bank is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// `{"database": [...]}`; a bare array is accepted as well.
#[derive(Deserialize)]
struct BankFile {
    database: Vec<Question>,
}

/// Read-only, ordered collection of questions loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: Vec<Question>,
    index: HashMap<QuestionId, usize>,
}

impl QuestionBank {
    /// Build a bank from already validated questions, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns `QuestionBankError::DuplicateId` if two questions share an id.
    pub fn from_questions(questions: Vec<Question>) -> Result<Self, QuestionBankError> {
        let mut index = HashMap::with_capacity(questions.len());
        for (pos, question) in questions.iter().enumerate() {
            if index.insert(question.id().clone(), pos).is_some() {
                return Err(QuestionBankError::DuplicateId(question.id().clone()));
            }
        }
        Ok(Self { questions, index })
    }

    /// Parse a bank document. Every record is validated on the way in.
    ///
    /// # Errors
    ///
    /// Returns `QuestionBankError::Json` for malformed documents or invalid records,
    /// and `QuestionBankError::DuplicateId` for repeated ids.
    pub fn from_json(json: &str) -> Result<Self, QuestionBankError> {
        let questions = if json.trim_start().starts_with('[') {
            serde_json::from_str::<Vec<Question>>(json)?
        } else {
            serde_json::from_str::<BankFile>(json)?.database
        };
        Self::from_questions(questions)
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn get(&self, id: &QuestionId) -> Option<&Question> {
        self.index.get(id).map(|&pos| &self.questions[pos])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Distinct module labels, sorted.
    #[must_use]
    pub fn modules(&self) -> BTreeSet<String> {
        self.questions
            .iter()
            .map(|q| q.module().to_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANK: &str = r#"{
        "database": [
            {"id": "q1", "question_text": "One", "options": {"A": "a", "B": "b"},
             "correct_answer": "A", "module_topic": "Module 2", "difficulty": "easy",
             "explanation": "because"},
            {"id": "q2", "question_text": "Two", "options": {"A": "a", "B": "b"},
             "correct_answer": "B", "module_topic": "Module 1", "difficulty": "hard",
             "explanation": "because"}
        ]
    }"#;

    #[test]
    fn loads_wrapped_document_in_order() {
        let bank = QuestionBank::from_json(BANK).unwrap();
        assert_eq!(bank.len(), 2);
        assert_eq!(bank.questions()[0].id().as_str(), "q1");
        assert_eq!(
            bank.get(&QuestionId::new("q2")).map(Question::text),
            Some("Two")
        );
    }

    #[test]
    fn modules_are_sorted_and_unique() {
        let bank = QuestionBank::from_json(BANK).unwrap();
        let modules: Vec<_> = bank.modules().into_iter().collect();
        assert_eq!(modules, vec!["Module 1".to_string(), "Module 2".to_string()]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let doc = r#"[
            {"id": "q1", "question_text": "One", "options": {"A": "a"},
             "correct_answer": "A", "module_topic": "M", "difficulty": "easy", "explanation": ""},
            {"id": "q1", "question_text": "Again", "options": {"A": "a"},
             "correct_answer": "A", "module_topic": "M", "difficulty": "easy", "explanation": ""}
        ]"#;
        let err = QuestionBank::from_json(doc).unwrap_err();
        assert!(matches!(err, QuestionBankError::DuplicateId(id) if id.as_str() == "q1"));
    }

    #[test]
    fn rejects_invalid_records() {
        let doc = r#"[{"id": "q1", "question_text": "One", "options": {"A": "a"},
            "correct_answer": "B", "module_topic": "M", "difficulty": "easy", "explanation": ""}]"#;
        let err = QuestionBank::from_json(doc).unwrap_err();
        assert!(matches!(err, QuestionBankError::Json(_)));
        assert!(
            err.to_string()
                .contains("question q1 names correct answer B which is not one of its options"),
            "{err}"
        );
    }

    #[test]
    fn invalid_record_in_wrapped_document_names_the_record() {
        let doc = r#"{"database": [{"id": "q7", "question_text": "", "options": {"A": "a"},
            "correct_answer": "A", "module_topic": "M", "difficulty": "easy",
            "explanation": ""}]}"#;
        let err = QuestionBank::from_json(doc).unwrap_err();
        assert!(err.to_string().contains("question q7 has no text"), "{err}");
    }
}
