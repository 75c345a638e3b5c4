//! Prompts for schema-constrained page extraction.
//!
//! Every prompt lives here so extraction behaviour can be tuned in one place
//! and inspected by unit tests without a live VLM.
//!
//! Callers can replace either instruction via
//! [`crate::config::GradingConfig::key_prompt`] /
//! [`crate::config::GradingConfig::submission_prompt`]; the JSON Schema
//! block is always appended, so an override cannot loosen the contract.
//!
//! When the answer key is already known (a saved key, or batch grading
//! against one key), the submission prompt also carries every accepted
//! answer and answer description, so the backend's verdict on answers that
//! do not match literally is judged against the key rather than against its
//! own solution alone.

use crate::record::KeyRecord;
use crate::schema::Schema;
use std::fmt::Write as _;

/// System message sent with every extraction request.
pub const SYSTEM_PROMPT: &str =
    "You are a careful teacher's assistant that reads scanned quiz pages and always responds using JSON.";

/// Default instruction for reading an answer-key page.
pub const KEY_EXTRACTION_PROMPT: &str = r#"The attached image is a page from a quiz ANSWER KEY.

Extract every question on the page:

1. QUESTIONS
   - "number": the printed question number (integer, 1 or greater)
   - "question": the question text exactly as printed
   - "question_description": any worked detail shown for the question (calculations, diagrams described in words); omit if none

2. ANSWERS
   - "answer": a list with every accepted answer exactly as printed; at least one entry
   - list alternatives separately (e.g. "<" and "less than") rather than joining them
   - "answer_description": any explanation printed with the answer; omit if none
   - "value": the point weight of the question; use 1 when the page shows none

3. PAGE DETAILS
   - "name": the quiz or test name (e.g. "Quiz 1")
   - "subject": the course or subject
   - "section": the section reference if printed; omit if none
   - "assessment_page": the printed page index of the quiz; use 1 when none is printed
   - "book_page": the page number of the source book

4. OUTPUT FORMAT
   - Output ONLY a single JSON object matching the schema below
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary"#;

/// Default instruction for reading a student's completed quiz.
pub const SUBMISSION_EXTRACTION_PROMPT: &str = r#"The attached image is a student's COMPLETED QUIZ.

Extract every question on the page:

1. QUESTIONS
   - "number": the printed question number (integer, 1 or greater)
   - "text": the question text exactly as you read it
   - "student_answer": the student's handwritten answer VERBATIM; use "" when the question is unanswered
   - Do NOT correct the student's answer

2. INDEPENDENT CHECK
   - "generated_answer": solve the question yourself, without looking at the student's answer
   - "correct_value": exactly one of "fully_correct", "partially_correct", "incorrect", "undetermined"
     * fully_correct: the answer is equivalent to the right answer
     * partially_correct: a correct part is present (right magnitude but wrong unit, right idea but incomplete)
     * incorrect: the answer is wrong
     * undetermined: the answer is empty, illegible, or ambiguous
   - "assessment": ONE sentence explaining the verdict

3. PAGE DETAILS
   - "student_name": the name written on the page
   - "date": the date written on the page as YYYY-MM-DD
   - "name": the quiz or test name (e.g. "Quiz 1")
   - "subject": the course or subject
   - "section": the section reference if printed; omit if none
   - "page": the printed page number if any; omit if none

4. OUTPUT FORMAT
   - Output ONLY a single JSON object matching the schema below
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary"#;

/// Default instruction for a schema.
pub fn default_instruction(schema: Schema) -> &'static str {
    match schema {
        Schema::Key => KEY_EXTRACTION_PROMPT,
        Schema::Submission => SUBMISSION_EXTRACTION_PROMPT,
    }
}

/// Build the full user prompt: instruction, answer key (submission pages
/// only, when known), then the schema document.
pub fn extraction_prompt(schema: Schema, instruction: Option<&str>, key: Option<&KeyRecord>) -> String {
    let instruction = instruction.unwrap_or_else(|| default_instruction(schema));
    let schema_doc = serde_json::to_string_pretty(&schema.json_schema()).unwrap_or_default();
    let key_block = match (schema, key) {
        (Schema::Submission, Some(key)) => format!("\n\n{}", answer_key_context(key)),
        _ => String::new(),
    };
    format!(
        "{}{}\n\nJSON Schema ({}):\n{}",
        instruction.trim_end(),
        key_block,
        schema.name(),
        schema_doc
    )
}

/// Render the key as reference material for judging a submission.
pub fn answer_key_context(key: &KeyRecord) -> String {
    let mut out = String::from(
        "ANSWER KEY\n\
         Use it to decide \"correct_value\" for answers that are worded differently from an accepted answer.\n\
         Do NOT copy key answers into \"student_answer\".\n",
    );
    for q in &key.questions {
        let accepted = q
            .answer
            .iter()
            .map(|a| format!("\"{a}\""))
            .collect::<Vec<_>>()
            .join(" or ");
        let _ = write!(out, "- Question {}: accepted {}; worth {} point(s)", q.number, accepted, q.value);
        if let Some(desc) = q.answer_description.as_deref().filter(|d| !d.trim().is_empty()) {
            let _ = write!(out, "; explanation: {}", desc.trim());
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}
