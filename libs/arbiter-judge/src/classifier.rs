//! Error quality classifier.
//!
//! Heuristic string matching over stderr / compiler output. The tier says how
//! useful a message is to the person who submitted the code; it is reported
//! next to each outcome and asserted in tests, but pass/fail never looks at it.

use arbiter_common::types::ErrorTier;
use lazy_static::lazy_static;
use regex::Regex;

/// Markers emitted by compilers and type checkers.
const COMPILER_MARKERS: &[&str] = &["SyntaxError", "Compilation Error", "TypeError", "error:"];

lazy_static! {
    /// A line reference: the word `line`/`Line`, or `file:12:5` style positions.
    static ref LOCATOR: Regex = Regex::new(r"\b[Ll]ine\b|:\d+:\d+").unwrap();
}

/// Tier for an outcome's error text. Checked in order, first match wins:
///
/// 1. compiler marker with a locator: EXCELLENT
/// 2. compiler marker without one: GOOD
/// 3. mentions runtime: GOOD
/// 4. any other error text: POOR
/// 5. no error text, failed: OK (a plain wrong answer)
/// 6. no error text, passed: N/A
pub fn classify(error_text: Option<&str>, passed: bool) -> ErrorTier {
    let text = match error_text.map(str::trim) {
        Some(text) if !text.is_empty() => text,
        _ if passed => return ErrorTier::NotApplicable,
        _ => return ErrorTier::Ok,
    };

    let has_marker = COMPILER_MARKERS.iter().any(|marker| text.contains(marker));
    if has_marker {
        return if LOCATOR.is_match(text) {
            ErrorTier::Excellent
        } else {
            ErrorTier::Good
        };
    }

    if text.contains("runtime") || text.contains("Runtime") {
        return ErrorTier::Good;
    }

    ErrorTier::Poor
}
