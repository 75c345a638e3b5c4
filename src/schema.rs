//! Schema descriptors for the two extraction contracts.
//!
//! The JSON Schema documents here are embedded into the extraction prompts so
//! the backend is asked for an exact-shape response. The same constraints are
//! enforced on the way back in: serde rejects missing fields, wrong types and
//! unknown enum members; [`crate::record::KeyRecord::schema_violation`] and
//! [`crate::record::SubmissionRecord::schema_violation`] check the numeric
//! and array bounds serde cannot express.

use crate::record::CorrectValue;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Which record a page should be extracted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Schema {
    /// Answer-key page → [`crate::record::KeyRecord`].
    Key,
    /// Completed student quiz → [`crate::record::SubmissionRecord`].
    Submission,
}

impl Schema {
    /// Contract name shared with the extraction backend.
    pub fn name(&self) -> &'static str {
        match self {
            Schema::Key => "get_questions_answers_from_key",
            Schema::Submission => "get_answers_from_student_quiz",
        }
    }

    /// Top-level fields every response must carry.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Schema::Key => &["name", "subject", "assessment_page", "book_page", "questions"],
            Schema::Submission => &["student_name", "date", "name", "subject", "questions"],
        }
    }

    /// The JSON Schema document for this contract.
    pub fn json_schema(&self) -> Value {
        match self {
            Schema::Key => key_schema(),
            Schema::Submission => submission_schema(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn key_schema() -> Value {
    json!({
        "title": Schema::Key.name(),
        "type": "object",
        "required": Schema::Key.required_fields(),
        "properties": {
            "name": { "type": "string" },
            "subject": { "type": "string" },
            "section": { "type": "string" },
            "assessment_page": { "type": "integer", "minimum": 1, "default": 1 },
            "book_page": { "type": "integer", "minimum": 0 },
            "questions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["answer", "question", "number", "value"],
                    "properties": {
                        "number": { "type": "integer", "minimum": 1 },
                        "question": { "type": "string" },
                        "question_description": { "type": "string" },
                        "answer": {
                            "type": "array",
                            "items": { "type": "string" },
                            "minItems": 1
                        },
                        "answer_description": { "type": "string" },
                        "value": { "type": "number", "minimum": 0 }
                    }
                }
            }
        }
    })
}

fn submission_schema() -> Value {
    let verdicts: Vec<&str> = CorrectValue::ALL.iter().map(|v| v.as_str()).collect();
    json!({
        "title": Schema::Submission.name(),
        "type": "object",
        "required": Schema::Submission.required_fields(),
        "properties": {
            "student_name": { "type": "string" },
            "date": { "type": "string", "format": "date" },
            "name": { "type": "string" },
            "subject": { "type": "string" },
            "section": { "type": "string" },
            "page": { "type": "integer", "minimum": 1 },
            "questions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["text", "student_answer", "number", "correct_value", "assessment"],
                    "properties": {
                        "number": { "type": "integer", "minimum": 1 },
                        "text": { "type": "string" },
                        "student_answer": { "type": "string" },
                        "generated_answer": { "type": "string" },
                        "correct_value": { "type": "string", "enum": verdicts },
                        "assessment": { "type": "string" }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_names() {
        assert_eq!(Schema::Key.name(), "get_questions_answers_from_key");
        assert_eq!(Schema::Submission.to_string(), "get_answers_from_student_quiz");
    }

    #[test]
    fn submission_schema_lists_every_verdict() {
        let schema = Schema::Submission.json_schema();
        let members = &schema["properties"]["questions"]["items"]["properties"]["correct_value"]["enum"];
        let members: Vec<&str> = members
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(
            members,
            vec!["fully_correct", "partially_correct", "incorrect", "undetermined"]
        );
    }

    #[test]
    fn required_fields_match_document() {
        for schema in [Schema::Key, Schema::Submission] {
            let doc = schema.json_schema();
            let required: Vec<&str> = doc["required"]
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_str().unwrap())
                .collect();
            assert_eq!(required, schema.required_fields());
        }
    }

    #[test]
    fn key_answers_need_at_least_one_item() {
        let doc = Schema::Key.json_schema();
        assert_eq!(doc["properties"]["questions"]["items"]["properties"]["answer"]["minItems"], 1);
    }
}
