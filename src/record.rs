//! Typed records extracted from quiz pages.
//!
//! [`KeyRecord`] is the canonical answer set read from an answer-key page;
//! [`SubmissionRecord`] is a student's completed quiz. Both are keyed by
//! question number, which is authoritative — array position carries no
//! meaning.
//!
//! Field names match the JSON produced by the extraction backend exactly, so
//! the structs double as the wire format (see [`crate::schema`]).

use crate::error::{ReconcileError, Side};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use time::macros::format_description;
use time::Date;

/// One question on an answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyQuestion {
    /// Printed question number (≥ 1, unique within a key).
    pub number: u32,
    /// Question text as printed on the key.
    pub question: String,
    /// Worked detail shown on the key, e.g. calculations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_description: Option<String>,
    /// Accepted answers. Alternatives, not a checklist.
    pub answer: Vec<String>,
    /// Explanation of the accepted answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_description: Option<String>,
    /// Point weight.
    pub value: f64,
}

impl KeyQuestion {
    /// True when every accepted answer is a single literal token and the key
    /// gives no explanation to weigh partial answers against.
    ///
    /// Partial credit does not apply to objective questions.
    pub fn is_objective(&self) -> bool {
        self.answer_description
            .as_deref()
            .map_or(true, |d| d.trim().is_empty())
            && self
                .answer
                .iter()
                .all(|a| a.split_whitespace().count() <= 1)
    }
}

fn default_assessment_page() -> u32 {
    1
}

/// A complete answer key page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub name: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Printed page index of the assessment; 1 when the page shows none.
    #[serde(default = "default_assessment_page")]
    pub assessment_page: u32,
    /// Page number in the source book.
    pub book_page: u32,
    pub questions: Vec<KeyQuestion>,
}

impl KeyRecord {
    /// Look up a question by its printed number.
    pub fn question(&self, number: u32) -> Option<&KeyQuestion> {
        self.questions.iter().find(|q| q.number == number)
    }

    /// First violation of the key schema's value constraints, if any.
    pub fn schema_violation(&self) -> Option<String> {
        if self.assessment_page == 0 {
            return Some("assessment_page must be >= 1".to_string());
        }
        for q in &self.questions {
            if q.number == 0 {
                return Some(format!("question number must be >= 1 (question '{}')", q.question));
            }
            if q.answer.is_empty() {
                return Some(format!("question {} has no accepted answer", q.number));
            }
            if !q.value.is_finite() || q.value < 0.0 {
                return Some(format!(
                    "question {} has invalid value {} (must be a non-negative number)",
                    q.number, q.value
                ));
            }
        }
        None
    }

    /// Check every record invariant: schema constraints plus unique numbers.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if let Some(reason) = self.schema_violation() {
            return Err(ReconcileError::InvalidInput {
                side: Side::Key,
                reason,
            });
        }
        if let Some(n) = first_duplicate(self.questions.iter().map(|q| q.number)) {
            return Err(ReconcileError::InvalidInput {
                side: Side::Key,
                reason: format!("duplicate question number {n}"),
            });
        }
        Ok(())
    }
}

/// Correctness classification of one answer.
///
/// A closed set: anything else in a backend response is rejected at
/// deserialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectValue {
    FullyCorrect,
    PartiallyCorrect,
    Incorrect,
    Undetermined,
}

impl CorrectValue {
    pub const ALL: [CorrectValue; 4] = [
        CorrectValue::FullyCorrect,
        CorrectValue::PartiallyCorrect,
        CorrectValue::Incorrect,
        CorrectValue::Undetermined,
    ];

    /// The literal used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectValue::FullyCorrect => "fully_correct",
            CorrectValue::PartiallyCorrect => "partially_correct",
            CorrectValue::Incorrect => "incorrect",
            CorrectValue::Undetermined => "undetermined",
        }
    }
}

impl fmt::Display for CorrectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answered question as read from a student's page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionQuestion {
    pub number: u32,
    /// Question text as read from the scan; may differ from the key's.
    pub text: String,
    /// Verbatim answer; empty when unanswered.
    pub student_answer: String,
    /// Answer computed independently of the key, used as a cross-check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_answer: Option<String>,
    /// The backend's own verdict.
    pub correct_value: CorrectValue,
    /// One-sentence rationale for `correct_value`.
    pub assessment: String,
}

/// A student's completed quiz page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub student_name: String,
    /// ISO calendar date (`YYYY-MM-DD`).
    pub date: String,
    pub name: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub questions: Vec<SubmissionQuestion>,
}

impl SubmissionRecord {
    /// Parsed `date`, when it is a valid ISO calendar date.
    pub fn parsed_date(&self) -> Option<Date> {
        Date::parse(self.date.trim(), format_description!("[year]-[month]-[day]")).ok()
    }

    /// First violation of the submission schema's value constraints, if any.
    pub fn schema_violation(&self) -> Option<String> {
        if self.parsed_date().is_none() {
            return Some(format!("date '{}' is not an ISO date (YYYY-MM-DD)", self.date));
        }
        if self.page == Some(0) {
            return Some("page must be >= 1".to_string());
        }
        self.questions
            .iter()
            .find(|q| q.number == 0)
            .map(|q| format!("question number must be >= 1 (question '{}')", q.text))
    }

    /// Check every record invariant: schema constraints plus unique numbers.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if let Some(reason) = self.schema_violation() {
            return Err(ReconcileError::InvalidInput {
                side: Side::Submission,
                reason,
            });
        }
        if let Some(n) = first_duplicate(self.questions.iter().map(|q| q.number)) {
            return Err(ReconcileError::InvalidInput {
                side: Side::Submission,
                reason: format!("duplicate question number {n}"),
            });
        }
        Ok(())
    }
}

/// Either kind of extracted record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Key(KeyRecord),
    Submission(SubmissionRecord),
}

impl Record {
    pub fn question_count(&self) -> usize {
        match self {
            Record::Key(k) => k.questions.len(),
            Record::Submission(s) => s.questions.len(),
        }
    }
}

fn first_duplicate(numbers: impl Iterator<Item = u32>) -> Option<u32> {
    let mut seen = HashSet::new();
    numbers.into_iter().find(|n| !seen.insert(*n))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn key_question(number: u32, answers: &[&str], value: f64) -> KeyQuestion {
        KeyQuestion {
            number,
            question: format!("Question {number}"),
            question_description: None,
            answer: answers.iter().map(|a| a.to_string()).collect(),
            answer_description: None,
            value,
        }
    }

    pub fn key(questions: Vec<KeyQuestion>) -> KeyRecord {
        KeyRecord {
            name: "Quiz 1".into(),
            subject: "Intermediate Mathematics".into(),
            section: Some("1.1-1.2".into()),
            assessment_page: 1,
            book_page: 12,
            questions,
        }
    }

    pub fn answer(number: u32, student_answer: &str, verdict: CorrectValue) -> SubmissionQuestion {
        SubmissionQuestion {
            number,
            text: format!("Question {number}"),
            student_answer: student_answer.into(),
            generated_answer: None,
            correct_value: verdict,
            assessment: format!("Backend assessment for question {number}."),
        }
    }

    pub fn submission(questions: Vec<SubmissionQuestion>) -> SubmissionRecord {
        SubmissionRecord {
            student_name: "Jon Luther White".into(),
            date: "2024-10-06".into(),
            name: "Quiz 1".into(),
            subject: "Intermediate Mathematics".into(),
            section: Some("1.1-1.2".into()),
            page: Some(1),
            questions,
        }
    }
}
