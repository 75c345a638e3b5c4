//! Post-processing: deterministic cleanup of a VLM's JSON reply.
//!
//! Even when told to answer with a bare JSON object, models sometimes wrap
//! it in ```` ```json ```` fences, prefix a BOM, or pad it with whitespace.
//! These rules strip such wrapping without touching the payload itself.
//! Anything left that still fails to parse is a genuine schema violation.
//!
//! ## Rule Order
//!
//! Invisible characters go first so the fence pattern sees clean input.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw VLM output.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 2. Trim surrounding whitespace
/// 3. Strip an outer code fence (` ```json ` or bare ` ``` `)
pub fn clean_json_payload(input: &str) -> String {
    let s = remove_invisible_chars(input);
    let s = s.trim();
    strip_code_fences(s).trim().to_string()
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```$").unwrap());

fn strip_code_fences(input: &str) -> &str {
    match RE_OUTER_FENCES.captures(input).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str(),
        None => input,
    }
}
