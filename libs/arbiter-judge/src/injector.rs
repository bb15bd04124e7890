//! Code Injector
//!
//! Splices user source into a harness template. Pure string substitution: the
//! single placeholder is replaced verbatim, nothing is escaped, analysed or
//! sandboxed here. Isolation is entirely the execution engine's job.

/// Token a harness template must contain exactly once.
pub const PLACEHOLDER: &str = "{{USER_CODE}}";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InjectionError {
    #[error("template has no user code placeholder")]
    MissingPlaceholder,
    #[error("template has {count} user code placeholders, expected exactly one")]
    DuplicatePlaceholder { count: usize },
}

/// Check that `template` contains the placeholder exactly once.
pub fn validate(template: &str) -> Result<(), InjectionError> {
    match template.matches(PLACEHOLDER).count() {
        0 => Err(InjectionError::MissingPlaceholder),
        1 => Ok(()),
        count => Err(InjectionError::DuplicatePlaceholder { count }),
    }
}

/// Produce the executable unit for `user_code`.
///
/// User code that itself contains the placeholder text is inserted as-is; only
/// the template's own occurrence is substituted.
pub fn inject(template: &str, user_code: &str) -> Result<String, InjectionError> {
    validate(template)?;
    let (head, tail) = template
        .split_once(PLACEHOLDER)
        .ok_or(InjectionError::MissingPlaceholder)?;

    let mut unit = String::with_capacity(head.len() + user_code.len() + tail.len());
    unit.push_str(head);
    unit.push_str(user_code);
    unit.push_str(tail);
    Ok(unit)
}
