//! Answer judgement: deciding the correctness of one submitted answer.
//!
//! ## Why pluggable?
//!
//! Deciding whether a free-text answer is "the same" as an accepted one has
//! no single right algorithm. Literal equality is too strict for handwriting
//! (`6785` vs `6,785`), and anything looser is a policy choice. The
//! reconciler therefore asks an [`AnswerJudge`] for each question, and the
//! default [`KeyMatchJudge`] combines a string match against the key with
//! the verdict the extraction backend already produced for the answer.
//!
//! The reconciler settles unmatched numbers and blank answers itself, so a
//! judge only ever sees an answered question that has a key entry.
//!
//! ## Decision order (`KeyMatchJudge`)
//!
//! 1. answer matches any accepted alternative → `fully_correct`
//! 2. otherwise the backend verdict, sanity-checked against the key

use crate::record::{CorrectValue, KeyQuestion, SubmissionQuestion};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How a student answer is compared with the accepted answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Equal after trimming surrounding whitespace.
    Exact,
    /// Equal after [`normalize_answer`].
    #[default]
    Normalized,
}

impl MatchStrategy {
    /// Whether `student` matches `accepted` under this strategy.
    pub fn matches(&self, student: &str, accepted: &str) -> bool {
        match self {
            MatchStrategy::Exact => student.trim() == accepted.trim(),
            MatchStrategy::Normalized => normalize_answer(student) == normalize_answer(accepted),
        }
    }

    /// Whether `student` matches any of the accepted alternatives.
    pub fn matches_any(&self, student: &str, accepted: &[String]) -> bool {
        accepted.iter().any(|a| self.matches(student, a))
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::Exact => f.write_str("exact"),
            MatchStrategy::Normalized => f.write_str("normalized"),
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(MatchStrategy::Exact),
            "normalized" | "normalised" => Ok(MatchStrategy::Normalized),
            other => Err(format!("unknown match strategy '{other}' (expected exact|normalized)")),
        }
    }
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_THOUSANDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d),(\d{3})\b").unwrap());

/// Canonical form of an answer for [`MatchStrategy::Normalized`].
///
/// Lowercases, collapses whitespace, maps Unicode minus and dashes to `-`,
/// drops thousands separators (`6,785` → `6785`) and a single trailing
/// period.
pub fn normalize_answer(answer: &str) -> String {
    let lowered: String = answer
        .trim()
        .chars()
        .map(|c| match c {
            '\u{2212}' | '\u{2012}' | '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .flat_map(char::to_lowercase)
        .collect();

    let mut s = RE_WHITESPACE.replace_all(&lowered, " ").into_owned();
    // Non-overlapping matches: "1,000,000" needs two passes.
    loop {
        let next = RE_THOUSANDS.replace_all(&s, "$1$2").into_owned();
        if next == s {
            break;
        }
        s = next;
    }

    match s.strip_suffix('.') {
        Some(stripped) => stripped.trim_end().to_string(),
        None => s,
    }
}

/// The outcome for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgement {
    pub correct_value: CorrectValue,
    /// One sentence explaining `correct_value`.
    pub assessment: String,
}

impl Judgement {
    pub fn new(correct_value: CorrectValue, assessment: impl Into<String>) -> Self {
        Self {
            correct_value,
            assessment: assessment.into(),
        }
    }
}

/// Decides the correctness of one non-blank answer against its key entry.
///
/// Implementations must be deterministic: the reconciler promises identical
/// reports for identical inputs. An empty `assessment` is replaced by the
/// reconciler.
pub trait AnswerJudge: Send + Sync {
    fn judge(&self, key: &KeyQuestion, answer: &SubmissionQuestion) -> Judgement;
}

/// Default judge: string match against the key, then the backend verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyMatchJudge {
    pub strategy: MatchStrategy,
}

impl KeyMatchJudge {
    pub fn new(strategy: MatchStrategy) -> Self {
        Self { strategy }
    }
}

impl AnswerJudge for KeyMatchJudge {
    fn judge(&self, key: &KeyQuestion, answer: &SubmissionQuestion) -> Judgement {
        let student = answer.student_answer.trim();
        if self.strategy.matches_any(student, &key.answer) {
            return Judgement::new(
                CorrectValue::FullyCorrect,
                format!("The answer '{student}' matches the answer key."),
            );
        }

        let verdict = self.reconcile_verdict(key, answer);
        if verdict == answer.correct_value && !answer.assessment.trim().is_empty() {
            return Judgement::new(verdict, answer.assessment.trim());
        }

        if verdict != answer.correct_value {
            debug!(
                "Question {}: backend verdict {} changed to {}",
                answer.number, answer.correct_value, verdict
            );
        }
        Judgement::new(verdict, generated_assessment(verdict, key, answer))
    }
}

impl KeyMatchJudge {
    /// The backend's verdict for a non-matching answer, corrected where it
    /// contradicts the key.
    fn reconcile_verdict(&self, key: &KeyQuestion, answer: &SubmissionQuestion) -> CorrectValue {
        match answer.correct_value {
            CorrectValue::FullyCorrect => {
                // The backend compared the student against its own solution;
                // that only counts when the solution agrees with the key.
                let cross_check_contradicts_key = answer
                    .generated_answer
                    .as_deref()
                    .filter(|g| !g.trim().is_empty())
                    .is_some_and(|g| !self.strategy.matches_any(g, &key.answer));
                if cross_check_contradicts_key {
                    CorrectValue::Undetermined
                } else {
                    CorrectValue::FullyCorrect
                }
            }
            CorrectValue::PartiallyCorrect if key.value <= 0.0 || key.is_objective() => {
                CorrectValue::Incorrect
            }
            other => other,
        }
    }
}

/// Fallback sentence for `verdict` on an answered question.
pub(crate) fn generated_assessment(verdict: CorrectValue, key: &KeyQuestion, answer: &SubmissionQuestion) -> String {
    let accepted = key.answer.join("' or '");
    let student = answer.student_answer.trim();
    match verdict {
        CorrectValue::FullyCorrect => {
            format!("The answer '{student}' is equivalent to the accepted answer '{accepted}'.")
        }
        CorrectValue::PartiallyCorrect => {
            format!("The answer '{student}' is only partly consistent with '{accepted}'.")
        }
        CorrectValue::Incorrect => {
            format!("The answer '{student}' does not match the accepted answer '{accepted}'.")
        }
        CorrectValue::Undetermined => format!(
            "The answer '{student}' differs from the accepted answer '{accepted}' and could not be judged with confidence."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::{answer, key_question};

    #[test]
    fn normalization_rules() {
        assert_eq!(normalize_answer("  6,785 "), "6785");
        assert_eq!(normalize_answer("1,000,000"), "1000000");
        assert_eq!(normalize_answer("\u{2212}9"), "-9");
        assert_eq!(normalize_answer("Less   Than"), "less than");
        assert_eq!(normalize_answer("Difference."), "difference");
        assert_eq!(normalize_answer("0.233"), "0.233");
        // A comma list is not a thousands separator.
        assert_eq!(normalize_answer("1,2"), "1,2");
    }

    #[test]
    fn exact_strategy_only_trims() {
        assert!(MatchStrategy::Exact.matches(" 42 ", "42"));
        assert!(!MatchStrategy::Exact.matches("6785", "6,785"));
        assert!(MatchStrategy::Normalized.matches("6785", "6,785"));
    }

    #[test]
    fn strategy_parses_from_str() {
        assert_eq!("Exact".parse::<MatchStrategy>(), Ok(MatchStrategy::Exact));
        assert_eq!("normalized".parse::<MatchStrategy>(), Ok(MatchStrategy::Normalized));
        assert!("fuzzy".parse::<MatchStrategy>().is_err());
    }

    #[test]
    fn matching_answer_is_fully_correct() {
        let judge = KeyMatchJudge::default();
        let q = key_question(3, &["42"], 5.0);
        let j = judge.judge(&q, &answer(3, "42", CorrectValue::Incorrect));
        assert_eq!(j.correct_value, CorrectValue::FullyCorrect);
        assert!(!j.assessment.is_empty());
    }

    #[test]
    fn any_alternative_is_enough() {
        let judge = KeyMatchJudge::default();
        let q = key_question(5, &["<", "less than"], 1.0);
        let j = judge.judge(&q, &answer(5, "Less than", CorrectValue::Incorrect));
        assert_eq!(j.correct_value, CorrectValue::FullyCorrect);
    }

    #[test]
    fn backend_verdict_and_sentence_are_kept() {
        let q = key_question(3, &["42"], 5.0);
        let j = KeyMatchJudge::default().judge(&q, &answer(3, "forty-two", CorrectValue::FullyCorrect));
        assert_eq!(j.correct_value, CorrectValue::FullyCorrect);
        assert_eq!(j.assessment, "Backend assessment for question 3.");

        let j = KeyMatchJudge::default().judge(&q, &answer(3, "41", CorrectValue::Incorrect));
        assert_eq!(j.correct_value, CorrectValue::Incorrect);
    }

    #[test]
    fn cross_check_agreeing_with_key_supports_equivalence() {
        let q = key_question(3, &["42"], 5.0);
        let mut a = answer(3, "forty-two", CorrectValue::FullyCorrect);
        a.generated_answer = Some("42".into());
        let j = KeyMatchJudge::default().judge(&q, &a);
        assert_eq!(j.correct_value, CorrectValue::FullyCorrect);
        assert_eq!(j.assessment, a.assessment);
    }

    #[test]
    fn cross_check_contradicting_key_is_undetermined() {
        let q = key_question(3, &["42"], 5.0);
        let mut a = answer(3, "48", CorrectValue::FullyCorrect);
        a.generated_answer = Some("48".into());
        let j = KeyMatchJudge::default().judge(&q, &a);
        assert_eq!(j.correct_value, CorrectValue::Undetermined);
        assert_ne!(j.assessment, a.assessment);
        assert!(j.assessment.contains("'42'"));
    }

    #[test]
    fn blank_cross_check_is_ignored() {
        let q = key_question(3, &["42"], 5.0);
        let mut a = answer(3, "forty-two", CorrectValue::FullyCorrect);
        a.generated_answer = Some("  ".into());
        let j = KeyMatchJudge::default().judge(&q, &a);
        assert_eq!(j.correct_value, CorrectValue::FullyCorrect);
    }

    #[test]
    fn no_partial_credit_for_objective_or_zero_value() {
        let judge = KeyMatchJudge::default();
        let objective = key_question(3, &["42"], 5.0);
        let j = judge.judge(&objective, &answer(3, "40", CorrectValue::PartiallyCorrect));
        assert_eq!(j.correct_value, CorrectValue::Incorrect);

        let mut free_text = key_question(8, &["the set of whole numbers and their opposites"], 0.0);
        free_text.answer_description = Some("Integers include negatives.".into());
        let j = judge.judge(&free_text, &answer(8, "whole numbers", CorrectValue::PartiallyCorrect));
        assert_eq!(j.correct_value, CorrectValue::Incorrect);

        free_text.value = 2.0;
        let j = judge.judge(&free_text, &answer(8, "whole numbers", CorrectValue::PartiallyCorrect));
        assert_eq!(j.correct_value, CorrectValue::PartiallyCorrect);
    }

    #[test]
    fn empty_backend_assessment_is_replaced() {
        let q = key_question(3, &["42"], 5.0);
        let mut a = answer(3, "41", CorrectValue::Incorrect);
        a.assessment = "  ".into();
        let j = KeyMatchJudge::default().judge(&q, &a);
        assert!(j.assessment.contains("does not match"));
    }
}
