//! Grading report types.
//!
//! [`GradingReport`] is the value handed to external collaborators: one
//! [`GradedQuestion`] per submission question in submission order, metadata
//! copied from the submission, and a [`ScoreSummary`].

use crate::record::{CorrectValue, KeyQuestion};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One graded question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedQuestion {
    pub number: u32,
    /// Question text as read from the submission.
    pub question_text: String,
    /// The matching key entry, if the key has one.
    pub key_question: Option<KeyQuestion>,
    pub student_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_answer: Option<String>,
    pub correct_value: CorrectValue,
    /// One sentence explaining `correct_value`.
    pub assessment: String,
    pub points_possible: f64,
    pub points_awarded: f64,
}

/// Points for a verdict on a question worth `value`.
///
/// Partial credit is half the value rounded up.
pub fn points_for(verdict: CorrectValue, value: f64) -> f64 {
    match verdict {
        CorrectValue::FullyCorrect => value,
        CorrectValue::PartiallyCorrect => (value / 2.0).ceil(),
        CorrectValue::Incorrect | CorrectValue::Undetermined => 0.0,
    }
}

/// Aggregate counts and points for a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    /// Question numbers per verdict, in submission order.
    pub correct: Vec<u32>,
    pub partially_correct: Vec<u32>,
    pub incorrect: Vec<u32>,
    pub undetermined: Vec<u32>,
    pub points_awarded: f64,
    pub points_possible: f64,
    /// `points_awarded / points_possible * 100`; None when nothing is worth points.
    pub grade_percent: Option<f64>,
}

impl ScoreSummary {
    pub fn from_entries(entries: &[GradedQuestion]) -> Self {
        let mut summary = ScoreSummary::default();
        for e in entries {
            match e.correct_value {
                CorrectValue::FullyCorrect => summary.correct.push(e.number),
                CorrectValue::PartiallyCorrect => summary.partially_correct.push(e.number),
                CorrectValue::Incorrect => summary.incorrect.push(e.number),
                CorrectValue::Undetermined => summary.undetermined.push(e.number),
            }
            summary.points_awarded += e.points_awarded;
            summary.points_possible += e.points_possible;
        }
        if summary.points_possible > 0.0 {
            summary.grade_percent = Some(summary.points_awarded / summary.points_possible * 100.0);
        }
        summary
    }
}

/// The graded result of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingReport {
    pub student_name: String,
    pub date: String,
    /// Assessment name, e.g. "Quiz 1".
    pub name: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub entries: Vec<GradedQuestion>,
    pub summary: ScoreSummary,
}

impl GradingReport {
    /// Entries with the given verdict, in submission order.
    pub fn entries_with(&self, verdict: CorrectValue) -> impl Iterator<Item = &GradedQuestion> {
        self.entries.iter().filter(move |e| e.correct_value == verdict)
    }

    /// Plain-text summary for teachers.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Student Name: {}", self.student_name);
        let _ = writeln!(out, "Date: {}", self.date);
        let _ = writeln!(out, "Assessment Subject: {}", self.subject);
        let _ = writeln!(out, "Assessment Name: {}", self.name);
        if let Some(ref section) = self.section {
            let _ = writeln!(out, "Section: {}", section);
        }

        for (label, verdict) in [
            ("Correct answers", CorrectValue::FullyCorrect),
            ("Partially correct answers", CorrectValue::PartiallyCorrect),
            ("Incorrect answers", CorrectValue::Incorrect),
            ("Undetermined answers", CorrectValue::Undetermined),
        ] {
            let listed: Vec<String> = self
                .entries_with(verdict)
                .map(|e| format!("{} ({} pts)", e.number, fmt_points(e.points_awarded)))
                .collect();
            let listed = if listed.is_empty() {
                "none".to_string()
            } else {
                listed.join(", ")
            };
            let _ = writeln!(out, "{}: {}", label, listed);
        }

        let _ = write!(
            out,
            "Total Points: {} / {}",
            fmt_points(self.summary.points_awarded),
            fmt_points(self.summary.points_possible)
        );
        if let Some(pct) = self.summary.grade_percent {
            let _ = write!(out, " ({:.1}%)", pct);
        }
        out.push('\n');
        out
    }
}

/// `5` rather than `5.0`; fractional values keep their decimals.
fn fmt_points(p: f64) -> String {
    if p.fract() == 0.0 {
        format!("{}", p as i64)
    } else {
        format!("{}", p)
    }
}
