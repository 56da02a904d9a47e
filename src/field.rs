use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;

use crate::error::FormError;

/// Submitted values keyed by field id.
pub type SubmissionValues = HashMap<String, FieldValue>;

const DEFAULT_OPTIONS: [&str; 3] = ["Option 1", "Option 2", "Option 3"];

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Email,
    Phone,
    Number,
    Textarea,
    Radio,
    Checkbox,
    Select,
    Multiselect,
}

impl FieldType {
    pub const ALL: [FieldType; 9] = [
        FieldType::Text,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Number,
        FieldType::Textarea,
        FieldType::Radio,
        FieldType::Checkbox,
        FieldType::Select,
        FieldType::Multiselect,
    ];

    /// Choice types pick from `Field::options`.
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            FieldType::Radio | FieldType::Checkbox | FieldType::Select | FieldType::Multiselect
        )
    }

    /// Types whose submitted value is a list of strings.
    pub fn is_multi_value(&self) -> bool {
        matches!(self, FieldType::Checkbox | FieldType::Multiselect)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Number => "number",
            FieldType::Textarea => "textarea",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::Select => "select",
            FieldType::Multiselect => "multiselect",
        }
    }

    /// Human readable name used in the palette and in builder summaries.
    pub fn display_name(&self) -> &'static str {
        match self {
            FieldType::Text => "Text Input",
            FieldType::Email => "Email",
            FieldType::Phone => "Phone",
            FieldType::Number => "Number",
            FieldType::Textarea => "Text Area",
            FieldType::Radio => "Radio Buttons",
            FieldType::Checkbox => "Checkboxes",
            FieldType::Select => "Dropdown",
            FieldType::Multiselect => "Multi-Select",
        }
    }

    fn default_label(&self) -> String {
        match self {
            FieldType::Text => "New Text Field".to_string(),
            FieldType::Email => "Email Address".to_string(),
            FieldType::Phone => "Phone Number".to_string(),
            FieldType::Number => "Number".to_string(),
            FieldType::Textarea => "Long Text".to_string(),
            FieldType::Radio => "Radio Options".to_string(),
            FieldType::Checkbox => "Checkbox Options".to_string(),
            FieldType::Select => "Dropdown".to_string(),
            FieldType::Multiselect => "Multi-Select".to_string(),
        }
    }

    fn default_placeholder(&self) -> &'static str {
        match self {
            FieldType::Text => "Enter text...",
            FieldType::Email => "Enter your email...",
            FieldType::Phone => "Enter your phone number...",
            FieldType::Number => "Enter a number...",
            FieldType::Textarea => "Enter your message...",
            _ => "",
        }
    }
}

/// Per-field validation rules.
///
/// Each key only matters for the matching field type: the length bounds for
/// `text`, the numeric bounds for `number`. `email` forces the address
/// format check on any single-value field.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldValidation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(
        default,
        rename = "email",
        alias = "emailFormat",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub email_format: bool,
}

impl FieldValidation {
    pub fn is_empty(&self) -> bool {
        *self == FieldValidation::default()
    }
}

/// Show a field only while another field holds an exact value.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct Conditional {
    #[serde(default, rename = "field", alias = "dependsOnFieldId")]
    pub depends_on: String,

    #[serde(default, rename = "value", alias = "requiredValue")]
    pub required_value: String,
}

impl Conditional {
    pub fn new(depends_on: impl Into<String>, required_value: impl Into<String>) -> Self {
        Conditional {
            depends_on: depends_on.into(),
            required_value: required_value.into(),
        }
    }
}

/// A single input definition within a form.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Field {
    pub id: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    pub label: String,

    #[serde(default)]
    pub placeholder: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,

    #[serde(default)]
    pub validation: FieldValidation,

    #[serde(default)]
    pub conditional: Option<Conditional>,
}

impl Field {
    /// Creates a field the way the palette drops one: fresh id, the type's
    /// default label and placeholder, and three placeholder options for
    /// choice types.
    pub fn new(field_type: FieldType) -> Self {
        let options = if field_type.is_choice() {
            DEFAULT_OPTIONS.iter().map(|o| o.to_string()).collect()
        } else {
            Vec::new()
        };

        Field {
            id: generate_field_id(),
            field_type,
            label: field_type.default_label(),
            placeholder: field_type.default_placeholder().to_string(),
            description: String::new(),
            required: false,
            options,
            validation: FieldValidation::default(),
            conditional: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_validation(mut self, validation: FieldValidation) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_conditional(mut self, conditional: Conditional) -> Self {
        self.conditional = Some(conditional);
        self
    }

    /// Options are present and non-empty iff the field is a choice type.
    pub fn check(&self) -> Result<(), FormError> {
        match (self.field_type.is_choice(), self.options.is_empty()) {
            (true, true) => Err(FormError::MissingOptions(self.id.clone())),
            (false, false) => Err(FormError::UnexpectedOptions(self.id.clone())),
            _ => Ok(()),
        }
    }

    /// One-line builder summary, e.g. "Checkboxes: 3 options".
    pub fn summary(&self) -> String {
        if self.field_type.is_choice() {
            format!("{}: {} options", self.field_type.display_name(), self.options.len())
        } else if self.placeholder.is_empty() {
            self.field_type.display_name().to_string()
        } else {
            format!("{}: {}", self.field_type.display_name(), self.placeholder)
        }
    }
}

/// Generates an id of the form `field_<epoch millis>_<9 base-36 chars>`.
pub fn generate_field_id() -> String {
    const CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();

    let suffix: String = (0..9)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect();

    format!("field_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// A submitted value.
///
/// Browsers post strings for single inputs, string lists for checkbox groups
/// and multi-selects, `false` for an unticked lone checkbox and `null` for a
/// radio group left blank. `Null` counts as no answer.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Many(Vec<String>),
    Flag(bool),
    Number(serde_json::Number),
    Null,
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Many(items) => items.is_empty(),
            FieldValue::Flag(checked) => !checked,
            FieldValue::Number(_) => false,
            FieldValue::Null => true,
        }
    }

    /// The value as a plain string, only for string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Single-value view used by the validation rules; `None` for lists.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            FieldValue::Text(s) => Some(Cow::Borrowed(s)),
            FieldValue::Number(n) => Some(Cow::Owned(n.to_string())),
            FieldValue::Flag(true) => Some(Cow::Borrowed("true")),
            FieldValue::Flag(false) | FieldValue::Many(_) | FieldValue::Null => None,
        }
    }

    /// Formats the value for a spreadsheet cell.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Many(items) => items.join(", "),
            FieldValue::Flag(true) => "true".to_string(),
            FieldValue::Flag(false) | FieldValue::Null => String::new(),
            FieldValue::Number(n) => n.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::Many(value)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::Many(value.into_iter().map(str::to_string).collect())
    }
}
