use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

use crate::constants::{
    INVALID_CONTACT_ERROR, INVALID_FILENAME_ERROR, MISSING_CONTACT_ERROR, MISSING_NAME_ERROR,
};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static INDIAN_MOBILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").unwrap());

fn error_with_message(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Decides whether a contact string can be used to reach the buyer.
///
/// Phone formats are region specific, so the checkout flow takes this as a
/// parameter instead of hard-coding one rule.
pub trait ContactValidator: Send + Sync {
    fn validate_contact(&self, contact: &str) -> Result<(), ValidationError>;
}

/// Accepts an email address or a 10-digit Indian mobile number.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmailOrIndianMobile;

impl ContactValidator for EmailOrIndianMobile {
    fn validate_contact(&self, contact: &str) -> Result<(), ValidationError> {
        if contact.is_empty() {
            return Err(error_with_message("missing_contact", MISSING_CONTACT_ERROR));
        }
        if validate_email(contact).is_ok() || validate_indian_mobile(contact).is_ok() {
            return Ok(());
        }
        Err(error_with_message("invalid_contact", INVALID_CONTACT_ERROR))
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email) {
        return Err(ValidationError::new("invalid_email_format"));
    }
    Ok(())
}

pub fn validate_indian_mobile(phone: &str) -> Result<(), ValidationError> {
    if !INDIAN_MOBILE_RE.is_match(phone) {
        return Err(ValidationError::new("invalid_phone_format"));
    }
    Ok(())
}

pub fn validate_full_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(error_with_message("missing_name", MISSING_NAME_ERROR));
    }
    Ok(())
}

/// Object names end up in storage paths; keep them relative and inside the bucket.
pub fn validate_object_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.split('/').any(|part| part == "..")
    {
        return Err(error_with_message("invalid_filename", INVALID_FILENAME_ERROR));
    }
    Ok(())
}
