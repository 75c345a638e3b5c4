//! Reconciliation: match a submission against a key and grade it.
//!
//! Pure and deterministic: no I/O, no clock, no hidden state. Missing key
//! entries and blank answers grade as `undetermined` rather than failing;
//! only structurally broken records are rejected.

use crate::error::ReconcileError;
use crate::judge::{generated_assessment, AnswerJudge, Judgement, KeyMatchJudge};
use crate::record::{CorrectValue, KeyQuestion, KeyRecord, SubmissionQuestion, SubmissionRecord};
use crate::report::{points_for, GradedQuestion, GradingReport, ScoreSummary};
use std::collections::HashMap;
use tracing::debug;

/// Grade `submission` against `key` with the default [`KeyMatchJudge`].
pub fn reconcile(key: &KeyRecord, submission: &SubmissionRecord) -> Result<GradingReport, ReconcileError> {
    reconcile_with(&KeyMatchJudge::default(), key, submission)
}

/// Grade `submission` against `key` using `judge` for each question.
///
/// Produces exactly one entry per submission question, in submission order.
/// Numbers missing from the key and blank answers are `undetermined`
/// whatever the judge; every entry carries a non-empty assessment.
///
/// # Errors
/// `ReconcileError::InvalidInput` when either record fails validation
/// (e.g. duplicate question numbers).
pub fn reconcile_with(
    judge: &dyn AnswerJudge,
    key: &KeyRecord,
    submission: &SubmissionRecord,
) -> Result<GradingReport, ReconcileError> {
    key.validate()?;
    submission.validate()?;

    let by_number: HashMap<u32, &KeyQuestion> = key.questions.iter().map(|q| (q.number, q)).collect();

    let entries: Vec<GradedQuestion> = submission
        .questions
        .iter()
        .map(|answer| {
            let key_question = by_number.get(&answer.number).copied();
            let judgement = judge_one(judge, key_question, answer);
            let points_possible = key_question.map_or(0.0, |k| k.value);
            GradedQuestion {
                number: answer.number,
                question_text: answer.text.clone(),
                key_question: key_question.cloned(),
                student_answer: answer.student_answer.clone(),
                generated_answer: answer.generated_answer.clone(),
                correct_value: judgement.correct_value,
                assessment: judgement.assessment,
                points_possible,
                points_awarded: points_for(judgement.correct_value, points_possible),
            }
        })
        .collect();

    let summary = ScoreSummary::from_entries(&entries);
    debug!(
        "Reconciled {} questions for '{}': {}/{} points",
        entries.len(),
        submission.student_name,
        summary.points_awarded,
        summary.points_possible
    );

    Ok(GradingReport {
        student_name: submission.student_name.clone(),
        date: submission.date.clone(),
        name: submission.name.clone(),
        subject: submission.subject.clone(),
        section: submission.section.clone().or_else(|| key.section.clone()),
        entries,
        summary,
    })
}

fn judge_one(judge: &dyn AnswerJudge, key: Option<&KeyQuestion>, answer: &SubmissionQuestion) -> Judgement {
    let n = answer.number;
    let Some(key) = key else {
        return Judgement::new(
            CorrectValue::Undetermined,
            format!("No answer key entry exists for question {n}."),
        );
    };
    if answer.student_answer.trim().is_empty() {
        return Judgement::new(
            CorrectValue::Undetermined,
            format!("Question {n} was left unanswered or could not be read."),
        );
    }

    let mut judgement = judge.judge(key, answer);
    if judgement.assessment.trim().is_empty() {
        judgement.assessment = generated_assessment(judgement.correct_value, key, answer);
    }
    judgement
}
