//! Consistency analysis across repeated gradings of the same submission.
//!
//! Backend verdicts are not guaranteed to be stable even at temperature 0.
//! Grading one page N times and comparing the reports shows how far a
//! single grade can be trusted and which questions flip between runs.

use crate::report::GradingReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Statistics over the total points of each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeStatistics {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; 0 for a single run.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub all_grades: Vec<f64>,
}

/// How often one score was awarded for a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreCount {
    pub points: f64,
    pub count: usize,
    /// Share of runs, 0–100.
    pub percentage: f64,
}

/// A question whose awarded points differ across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InconsistentQuestion {
    pub number: u32,
    pub max_points: f64,
    /// Ascending by points.
    pub distribution: Vec<ScoreCount>,
}

/// Result of [`analyze_consistency`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyAnalysis {
    pub total_runs: usize,
    pub statistics: GradeStatistics,
    pub unique_grades: usize,
    pub grade_range: f64,
    pub is_consistent: bool,
    /// Ascending by question number.
    pub inconsistent_questions: Vec<InconsistentQuestion>,
}

/// Compare reports from repeated gradings of one submission.
///
/// Returns `None` for an empty slice.
pub fn analyze_consistency(reports: &[GradingReport]) -> Option<ConsistencyAnalysis> {
    if reports.is_empty() {
        return None;
    }
    let total_runs = reports.len();

    let grades: Vec<f64> = reports.iter().map(|r| r.summary.points_awarded).collect();
    let statistics = grade_statistics(&grades);

    let mut unique: Vec<f64> = grades.clone();
    unique.sort_by(f64::total_cmp);
    unique.dedup();

    // number → (max points, points → count)
    let mut per_question: BTreeMap<u32, (f64, Vec<(f64, usize)>)> = BTreeMap::new();
    for report in reports {
        for e in &report.entries {
            let (max, scores) = per_question.entry(e.number).or_insert((e.points_possible, Vec::new()));
            *max = max.max(e.points_possible);
            match scores.iter_mut().find(|(p, _)| *p == e.points_awarded) {
                Some((_, count)) => *count += 1,
                None => scores.push((e.points_awarded, 1)),
            }
        }
    }

    let inconsistent_questions = per_question
        .into_iter()
        .filter(|(_, (_, scores))| scores.len() > 1)
        .map(|(number, (max_points, mut scores))| {
            scores.sort_by(|a, b| a.0.total_cmp(&b.0));
            InconsistentQuestion {
                number,
                max_points,
                distribution: scores
                    .into_iter()
                    .map(|(points, count)| ScoreCount {
                        points,
                        count,
                        percentage: count as f64 / total_runs as f64 * 100.0,
                    })
                    .collect(),
            }
        })
        .collect();

    Some(ConsistencyAnalysis {
        total_runs,
        grade_range: statistics.max - statistics.min,
        unique_grades: unique.len(),
        is_consistent: unique.len() == 1,
        statistics,
        inconsistent_questions,
    })
}

fn grade_statistics(grades: &[f64]) -> GradeStatistics {
    let n = grades.len() as f64;
    let mean = grades.iter().sum::<f64>() / n;

    let mut sorted = grades.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    let std_dev = if grades.len() > 1 {
        let var = grades.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    } else {
        0.0
    };

    GradeStatistics {
        mean,
        median,
        std_dev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        all_grades: grades.to_vec(),
    }
}

impl ConsistencyAnalysis {
    /// Human-readable summary.
    pub fn to_text(&self) -> String {
        let s = &self.statistics;
        let mut out = String::new();
        let _ = writeln!(out, "Number of runs: {}", self.total_runs);
        let _ = writeln!(out, "Grade Statistics:");
        let _ = writeln!(out, "  Mean: {:.2}", s.mean);
        let _ = writeln!(out, "  Median: {:.2}", s.median);
        let _ = writeln!(out, "  Standard Deviation: {:.2}", s.std_dev);
        let _ = writeln!(out, "  Range: {:.2} - {:.2}", s.min, s.max);

        if self.inconsistent_questions.is_empty() {
            let _ = writeln!(out, "\nAll questions were graded consistently across runs.");
            return out;
        }
        let _ = writeln!(out, "\nInconsistent Questions:");
        for q in &self.inconsistent_questions {
            let _ = writeln!(out, "  Question {} (max points: {}):", q.number, q.max_points);
            for c in &q.distribution {
                let _ = writeln!(
                    out,
                    "    {}/{} points: {} times ({:.1}% of runs)",
                    c.points, q.max_points, c.count, c.percentage
                );
            }
        }
        out
    }
}
