//! The shared rituals of a pair: the daily prompt, the daily quiz and
//! agreement check-in, and the weekly meeting notes. Each keeps answers
//! private until both partners have submitted.

pub mod agreement;
pub mod daily;
pub mod games;
pub mod handlers;
pub mod meetings;
pub mod quiz;
pub mod streak;

pub use daily::{DailyService, TodayView};
pub use games::{GameResult, GameService, GameView};
pub use meetings::{MeetingService, WeekView};

use crate::error::AppError;
use crate::Result;

/// Trims free text and enforces a maximum length in characters.
pub(crate) fn clean_text(raw: &str, max_chars: usize, field: &str) -> Result<String> {
    let text = raw.trim();
    if text.chars().count() > max_chars {
        return Err(AppError::ValidationError(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(text.to_string())
}

/// As `clean_text`, but empty text is rejected.
pub(crate) fn require_text(raw: &str, max_chars: usize, field: &str) -> Result<String> {
    let text = clean_text(raw, max_chars, field)?;
    if text.is_empty() {
        return Err(AppError::ValidationError(format!("{field} cannot be empty")));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_trimmed_and_bounded() {
        assert_eq!(clean_text("  hi  ", 5, "Answer").unwrap(), "hi");
        assert_eq!(clean_text("   ", 5, "Answer").unwrap(), "");
        assert!(clean_text("toolong", 5, "Answer").is_err());
        // Counted in characters, not bytes
        assert!(clean_text("ééééé", 5, "Answer").is_ok());
    }

    #[test]
    fn required_text_must_not_be_blank() {
        let err = require_text(" \n ", 10, "Answer").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Answer cannot be empty");
    }
}
