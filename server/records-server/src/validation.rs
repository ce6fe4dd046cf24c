//! Request validation utilities for consistent validation across handlers
//!
//! Shape checks are declared with `validator` derives on the request types;
//! rules that need more than a length or format check live here. All of them
//! collect into a [`FieldErrors`] map so a request reports every bad field at
//! once.

use std::collections::BTreeMap;
use validator::{Validate, ValidationErrors};

use crate::error::{ApiError, ApiResult, FieldErrorMap};

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";

/// Accumulates field-level messages for one request
#[derive(Debug, Default)]
pub struct FieldErrors(FieldErrorMap);

impl FieldErrors {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Run the derived `validator` rules and collect their messages
    pub fn check<T: Validate>(&mut self, payload: &T) {
        if let Err(errors) = payload.validate() {
            self.absorb(&errors);
        }
    }

    fn absorb(&mut self, errors: &ValidationErrors) {
        for (field, problems) in errors.field_errors() {
            for problem in problems {
                let message = problem
                    .message
                    .as_ref()
                    .map_or_else(|| format!("Invalid value ({}).", problem.code), ToString::to_string);
                self.add(&field, message);
            }
        }
    }

    /// Take a value the request must supply
    pub fn required<T>(&mut self, field: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.add(field, REQUIRED);
        }
        value
    }

    /// Take a required string that must not be blank
    pub fn required_text(&mut self, field: &str, value: Option<String>) -> Option<String> {
        match value {
            Some(text) if text.trim().is_empty() => {
                self.add(field, BLANK);
                None
            }
            Some(text) => Some(text),
            None => {
                self.add(field, REQUIRED);
                None
            }
        }
    }

    /// Take an optional string that, when present, must not be blank
    pub fn optional_text(&mut self, field: &str, value: Option<String>) -> Option<String> {
        match value {
            Some(text) if text.trim().is_empty() => {
                self.add(field, BLANK);
                None
            }
            other => other,
        }
    }

    pub fn into_result(self) -> ApiResult<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        Err(ApiError::validation_with_fields("Invalid input.", self.0))
    }
}

/// Blank, or `^\+?1?\d{9,15}$`
pub fn is_valid_phone_number(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }

    let digits = value.strip_prefix('+').unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    // The optional leading 1 lets the body run to 16 digits
    (9..=15).contains(&digits.len()) || (digits.len() == 16 && digits.starts_with('1'))
}

pub const PHONE_NUMBER_MESSAGE: &str =
    "Phone number must be entered in the format: '+999999999'. Up to 15 digits allowed.";

pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Strength problems with a new password, empty when acceptable
pub fn password_problems(password: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {PASSWORD_MIN_LENGTH} characters."
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }
    problems
}

/// Deserialize helper telling an absent field apart from an explicit null
pub mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(max = 3, message = "Too long."))]
        code: Option<String>,
    }

    #[test]
    fn test_phone_numbers() {
        assert!(is_valid_phone_number(""));
        assert!(is_valid_phone_number("+14155552671"));
        assert!(is_valid_phone_number("123456789"));
        assert!(is_valid_phone_number("1234567890123456"));
        assert!(!is_valid_phone_number("2234567890123456"));
        assert!(!is_valid_phone_number("12345678"));
        assert!(!is_valid_phone_number("+"));
        assert!(!is_valid_phone_number("555-123-4567"));
    }

    #[test]
    fn test_password_rules() {
        assert!(password_problems("correct horse").is_empty());
        assert_eq!(password_problems("short").len(), 1);
        assert_eq!(password_problems("1234").len(), 2);
        assert_eq!(password_problems("12345678901"), vec!["This password is entirely numeric."]);
    }

    #[test]
    fn test_validator_messages_are_collected() {
        let mut errors = FieldErrors::new();
        errors.check(&Sample {
            code: Some("ABCD".to_string()),
        });
        errors.required::<i64>("course_id", None);
        let err = errors.into_result().unwrap_err();
        let fields = err.field_errors().unwrap();
        assert_eq!(fields["code"], vec!["Too long."]);
        assert_eq!(fields["course_id"], vec![REQUIRED]);
    }

    #[test]
    fn test_double_option_distinguishes_null_from_absent() {
        #[derive(serde::Deserialize)]
        struct Patch {
            #[serde(default, with = "double_option")]
            teacher_id: Option<Option<i64>>,
        }

        let absent: Patch = serde_json::from_str("{}").unwrap();
        let null: Patch = serde_json::from_str(r#"{"teacher_id": null}"#).unwrap();
        let set: Patch = serde_json::from_str(r#"{"teacher_id": 4}"#).unwrap();
        assert_eq!(absent.teacher_id, None);
        assert_eq!(null.teacher_id, Some(None));
        assert_eq!(set.teacher_id, Some(Some(4)));
    }

    proptest! {
        #[test]
        fn prop_digit_strings_of_valid_length_are_phone_numbers(body in "[0-9]{9,15}") {
            prop_assert!(is_valid_phone_number(&body));
            let international = format!("+{body}");
            prop_assert!(is_valid_phone_number(&international));
        }

        #[test]
        fn prop_anything_with_a_letter_is_rejected(prefix in "[0-9]{0,8}", letter in "[a-zA-Z]", suffix in "[0-9]{0,8}") {
            let candidate = format!("{prefix}{letter}{suffix}");
            prop_assert!(!is_valid_phone_number(&candidate));
        }
    }
}
