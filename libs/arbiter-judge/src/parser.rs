//! Result Parser
//!
//! Separates the program's answer from anything else it printed. Harness
//! templates print a sentinel line right before the serialized answer; every
//! byte before the last sentinel is incidental console output and is dropped.

/// Marker printed by every harness template before the answer.
pub const SENTINEL: &str = "---CODECOMBAT_RESULT---";

/// Answer extracted from a program's stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedOutput<'a> {
    /// Answer text, trimmed at both ends. Internal whitespace and newlines are kept.
    pub answer: &'a str,
    /// False when stdout had no sentinel and the whole of it was taken as the answer.
    pub sentinel_found: bool,
}

/// Extract the answer from raw stdout.
///
/// A missing sentinel is not an error: the entire trimmed stdout becomes the
/// answer. If the sentinel occurs more than once, the last occurrence wins,
/// since the template prints its own marker after the user code has run.
pub fn parse(stdout: &str) -> ParsedOutput<'_> {
    match stdout.rsplit_once(SENTINEL) {
        Some((_console, answer)) => ParsedOutput {
            answer: answer.trim(),
            sentinel_found: true,
        },
        None => ParsedOutput {
            answer: stdout.trim(),
            sentinel_found: false,
        },
    }
}
