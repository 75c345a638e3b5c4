//! Pipeline stages for turning a page image into a record.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the backend can be swapped without touching
//! the others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ postprocess
//! (URL/path) (base64)  (VLM)   (JSON cleanup)
//! ```
//!
//! 1. [`input`]  — load the user-supplied path or URL into memory
//! 2. [`encode`] — validate, downscale if needed, base64-wrap for the
//!    multimodal request body
//! 3. [`llm`]    — drive the VLM call; the only stage with network I/O
//! 4. [`postprocess`] — strip fences and invisible characters so the reply
//!    can be parsed
//!
//! Orchestration (timeouts, retries, schema validation) lives in
//! [`crate::extract`].

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
