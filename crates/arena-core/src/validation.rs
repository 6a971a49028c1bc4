//! Validation utilities shared between server and client

use time::OffsetDateTime;

use crate::CoreError;

pub const MAX_CONTEST_NAME_LEN: usize = 200;
pub const MAX_SUBMISSION_TEXT_LEN: usize = 10_000;

/// Validate the editable fields of a contest. `now` is passed in so callers
/// agree on a single clock reading.
pub fn validate_contest_fields(
    name: &str,
    price: i64,
    prize_money: i64,
    participation_limit: i64,
    deadline: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<(), CoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("contest name cannot be empty".into()));
    }
    if name.chars().count() > MAX_CONTEST_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "contest name cannot exceed {} characters",
            MAX_CONTEST_NAME_LEN
        )));
    }
    if price < 0 {
        return Err(CoreError::InvalidAmount("price must not be negative".into()));
    }
    if prize_money < 0 {
        return Err(CoreError::InvalidAmount(
            "prize money must not be negative".into(),
        ));
    }
    if participation_limit < 0 {
        return Err(CoreError::Validation(
            "participation limit must not be negative".into(),
        ));
    }
    if deadline <= now {
        return Err(CoreError::Validation("deadline must be in the future".into()));
    }
    Ok(())
}

/// Submission links must be absolute http(s) urls when present
pub fn validate_submission(
    link: Option<&str>,
    text: Option<&str>,
) -> Result<(), CoreError> {
    if let Some(link) = link {
        let link = link.trim();
        if !(link.starts_with("https://") || link.starts_with("http://")) {
            return Err(CoreError::Validation(
                "submission link must be an http(s) url".into(),
            ));
        }
        if link.contains(char::is_whitespace) {
            return Err(CoreError::Validation(
                "submission link cannot contain whitespace".into(),
            ));
        }
    }
    if let Some(text) = text {
        if text.chars().count() > MAX_SUBMISSION_TEXT_LEN {
            return Err(CoreError::Validation(format!(
                "submission text cannot exceed {} characters",
                MAX_SUBMISSION_TEXT_LEN
            )));
        }
    }
    Ok(())
}

/// A zero limit means unlimited.
pub fn has_capacity(participation_limit: i64, participants_count: i64) -> bool {
    participation_limit == 0 || participants_count < participation_limit
}
