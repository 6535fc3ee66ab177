//! Intake validation for generation requests.
//!
//! Rejected requests never create a job row and never touch the ledger.

use crate::error::CoreError;

/// Maximum prompt length in characters.
pub const MAX_PROMPT_CHARS: usize = 500;

/// Maximum negative prompt length in characters.
pub const MAX_NEGATIVE_PROMPT_CHARS: usize = 500;

/// Validate a user prompt: non-empty after trimming, at most
/// [`MAX_PROMPT_CHARS`] characters.
pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::Validation("Prompt must not be empty".into()));
    }
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(CoreError::Validation(format!(
            "Prompt must not exceed {MAX_PROMPT_CHARS} characters"
        )));
    }
    Ok(())
}

/// Validate an optional negative prompt. Empty strings are fine here;
/// only the length is bounded.
pub fn validate_negative_prompt(negative: Option<&str>) -> Result<(), CoreError> {
    if let Some(n) = negative {
        if n.chars().count() > MAX_NEGATIVE_PROMPT_CHARS {
            return Err(CoreError::Validation(format!(
                "Negative prompt must not exceed {MAX_NEGATIVE_PROMPT_CHARS} characters"
            )));
        }
    }
    Ok(())
}
