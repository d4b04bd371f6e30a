//! Bounds on post and profile content.

use crate::error::ValidationError;

pub const MAX_TEXT_CHARS: usize = 280;
pub const MAX_IMAGES: usize = 8;

/// Text must be non-blank and at most [`MAX_TEXT_CHARS`] code points once
/// surrounding whitespace is trimmed.
pub fn validate_text(text: &str) -> Result<(), ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    let len = text.chars().count();
    if len > MAX_TEXT_CHARS {
        return Err(ValidationError::TextTooLong {
            len,
            max: MAX_TEXT_CHARS,
        });
    }
    Ok(())
}

pub fn validate_images(images: &[String]) -> Result<(), ValidationError> {
    if images.len() > MAX_IMAGES {
        return Err(ValidationError::TooManyImages {
            count: images.len(),
            max: MAX_IMAGES,
        });
    }
    Ok(())
}

/// Rejects a blank value for a required profile field.
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    Ok(())
}

pub fn validate_post(text: &str, images: &[String]) -> Result<(), ValidationError> {
    validate_text(text)?;
    validate_images(images)
}
