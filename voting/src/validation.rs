//! Input validation for personal info submissions.
//!
//! Runs before any store or cache I/O. Lengths are counted in Unicode code
//! points, not bytes, so Thai names validate the same as Latin ones.

use crate::error::{Result, VotingError};
use crate::model::PersonalInfoFields;
use crate::utils::{NATIONAL_PHONE_DIGITS, char_len, normalize_phone};

/// Minimum code points per name part.
pub const MIN_NAME_CHARS: usize = 2;

/// Maximum code points of `first_name + " " + last_name`.
pub const MAX_FULL_NAME_CHARS: usize = 255;

/// Maximum code points of the free-text answer.
pub const MAX_FREE_TEXT_CHARS: usize = 1000;

/// Personal info after trimming and normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPersonalInfo {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Canonical phone.
    pub phone: String,
    /// Free-text answer, `None` when blank.
    pub free_text_answer: Option<String>,
    /// Marketing consent.
    pub marketing_consent: bool,
}

/// Validate and normalize raw personal info.
///
/// # Errors
///
/// Returns [`VotingError::Validation`] naming the first offending field.
pub fn validate_personal_info(fields: &PersonalInfoFields) -> Result<ValidatedPersonalInfo> {
    let first_name = fields.first_name.trim();
    let last_name = fields.last_name.trim();

    if char_len(first_name) < MIN_NAME_CHARS {
        return Err(VotingError::validation(
            "first_name",
            format!("must be at least {MIN_NAME_CHARS} characters"),
        ));
    }
    if char_len(last_name) < MIN_NAME_CHARS {
        return Err(VotingError::validation(
            "last_name",
            format!("must be at least {MIN_NAME_CHARS} characters"),
        ));
    }
    if char_len(first_name) + 1 + char_len(last_name) > MAX_FULL_NAME_CHARS {
        return Err(VotingError::validation(
            "name",
            format!("full name must be at most {MAX_FULL_NAME_CHARS} characters"),
        ));
    }

    let email = fields.email.trim();
    if !email.contains('@') {
        return Err(VotingError::validation("email", "must contain '@'"));
    }

    let phone = normalize_phone(&fields.phone).ok_or_else(|| {
        VotingError::validation(
            "phone",
            format!("must be a {NATIONAL_PHONE_DIGITS}-digit mobile number"),
        )
    })?;

    let free_text_answer = fields
        .free_text_answer
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(answer) = free_text_answer {
        if char_len(answer) > MAX_FREE_TEXT_CHARS {
            return Err(VotingError::validation(
                "free_text_answer",
                format!("must be at most {MAX_FREE_TEXT_CHARS} characters"),
            ));
        }
    }

    if !fields.pdpa_consent {
        return Err(VotingError::validation("pdpa_consent", "consent is required"));
    }

    Ok(ValidatedPersonalInfo {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        phone,
        free_text_answer: free_text_answer.map(str::to_string),
        marketing_consent: fields.marketing_consent,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn valid() -> PersonalInfoFields {
        PersonalInfoFields {
            first_name: "สม".into(),
            last_name: "ชาย".into(),
            email: "a@b.com".into(),
            phone: "0812345678".into(),
            free_text_answer: None,
            pdpa_consent: true,
            marketing_consent: false,
        }
    }

    fn field_of(result: Result<ValidatedPersonalInfo>) -> &'static str {
        match result {
            Err(VotingError::Validation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_accepts_thai_names() {
        let info = validate_personal_info(&valid()).unwrap();
        assert_eq!(info.first_name, "สม");
        assert_eq!(info.phone, "0812345678");
    }

    #[test]
    fn test_trims_and_normalizes() {
        let mut fields = valid();
        fields.first_name = "  Anna ".into();
        fields.phone = "+66 81-234-5678".into();
        fields.free_text_answer = Some("   ".into());
        let info = validate_personal_info(&fields).unwrap();
        assert_eq!(info.first_name, "Anna");
        assert_eq!(info.phone, "0812345678");
        assert_eq!(info.free_text_answer, None);
    }

    #[test]
    fn test_short_names_rejected() {
        let mut fields = valid();
        fields.first_name = "ส".into();
        assert_eq!(field_of(validate_personal_info(&fields)), "first_name");

        let mut fields = valid();
        fields.last_name = " x ".into();
        assert_eq!(field_of(validate_personal_info(&fields)), "last_name");
    }

    #[test]
    fn test_full_name_limit() {
        let mut fields = valid();
        fields.first_name = "a".repeat(127);
        fields.last_name = "b".repeat(127);
        assert!(validate_personal_info(&fields).is_ok()); // 255 with the space

        fields.last_name = "b".repeat(128);
        assert_eq!(field_of(validate_personal_info(&fields)), "name");
    }

    #[test]
    fn test_email_requires_at() {
        let mut fields = valid();
        fields.email = "ab.com".into();
        assert_eq!(field_of(validate_personal_info(&fields)), "email");
    }

    #[test]
    fn test_phone_rejected() {
        let mut fields = valid();
        fields.phone = "12345".into();
        assert_eq!(field_of(validate_personal_info(&fields)), "phone");
    }

    #[test]
    fn test_free_text_limit_counts_code_points() {
        let mut fields = valid();
        fields.free_text_answer = Some("ก".repeat(1000));
        assert!(validate_personal_info(&fields).is_ok());

        fields.free_text_answer = Some("ก".repeat(1001));
        assert_eq!(field_of(validate_personal_info(&fields)), "free_text_answer");
    }

    #[test]
    fn test_consent_required() {
        let mut fields = valid();
        fields.pdpa_consent = false;
        assert_eq!(field_of(validate_personal_info(&fields)), "pdpa_consent");
    }
}
