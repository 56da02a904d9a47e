use lazy_static::lazy_static;
use regex::Regex;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::field::{Field, FieldType, FieldValue, SubmissionValues};
use crate::form::FormDefinition;
use crate::visibility::visible_fields;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

/// A per-field failure, surfaced next to the offending input.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ValidationError {
    #[error("This field is required")]
    Required,

    #[error("Minimum {min} characters required")]
    TooShort { min: usize },

    #[error("Maximum {max} characters allowed")]
    TooLong { max: usize },

    #[error("Minimum value is {min}")]
    BelowMin { min: f64 },

    #[error("Maximum value is {max}")]
    AboveMax { max: f64 },

    #[error("Please enter a valid email address")]
    InvalidEmail,
}

impl ValidationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Required => "required",
            ValidationError::TooShort { .. } => "too_short",
            ValidationError::TooLong { .. } => "too_long",
            ValidationError::BelowMin { .. } => "below_min",
            ValidationError::AboveMax { .. } => "above_max",
            ValidationError::InvalidEmail => "invalid_email",
        }
    }
}

impl Serialize for ValidationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ValidationError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Validation failures in form order, keyed by field id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldErrors(Vec<(String, ValidationError)>);

impl FieldErrors {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field_id: &str) -> Option<&ValidationError> {
        self.0
            .iter()
            .find(|(id, _)| id == field_id)
            .map(|(_, err)| err)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValidationError)> {
        self.0.iter().map(|(id, err)| (id.as_str(), err))
    }
}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, err) in &self.0 {
            map.serialize_entry(id, err)?;
        }
        map.end()
    }
}

/// Checks one value against its field's rules. The first failing rule wins,
/// in this order: required, length, range, email format.
///
/// Only the required rule looks at empty values; an optional field left
/// blank always passes.
pub fn validate(field: &Field, value: Option<&FieldValue>) -> Result<(), ValidationError> {
    let empty = value.is_none_or(FieldValue::is_empty);
    if field.required && empty {
        return Err(ValidationError::Required);
    }

    let Some(text) = value.and_then(FieldValue::as_text) else {
        return Ok(());
    };
    if text.is_empty() {
        return Ok(());
    }
    let rules = &field.validation;

    if field.field_type == FieldType::Text {
        let len = text.chars().count();
        if let Some(min) = rules.min_length.filter(|min| len < *min) {
            return Err(ValidationError::TooShort { min });
        }
        if let Some(max) = rules.max_length.filter(|max| len > *max) {
            return Err(ValidationError::TooLong { max });
        }
    }

    if field.field_type == FieldType::Number {
        // An unparseable number fails whichever bound is configured.
        let number = text.trim().parse::<f64>().ok().filter(|n| !n.is_nan());
        if let Some(min) = rules.min {
            if number.is_none_or(|n| n < min) {
                return Err(ValidationError::BelowMin { min });
            }
        }
        if let Some(max) = rules.max {
            if number.is_none_or(|n| n > max) {
                return Err(ValidationError::AboveMax { max });
            }
        }
    }

    if (field.field_type == FieldType::Email || rules.email_format) && !EMAIL_REGEX.is_match(&text) {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(())
}

/// Validates every visible field. Hidden fields are skipped entirely, so a
/// required field behind an unmet condition never blocks a submission.
pub fn validate_submission(form: &FormDefinition, values: &SubmissionValues) -> Result<(), FieldErrors> {
    let errors: Vec<(String, ValidationError)> = visible_fields(form, values)
        .filter_map(|field| {
            validate(field, values.get(&field.id))
                .err()
                .map(|err| (field.id.clone(), err))
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(FieldErrors(errors))
    }
}
