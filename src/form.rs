use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::error::FormError;
use crate::field::{Conditional, Field, FieldValidation};
use crate::mailer::NotifyConfig;
use crate::sink::SinkConfig;

pub const DEFAULT_TITLE: &str = "Registration Form";
pub const DEFAULT_DESCRIPTION: &str = "Please fill out the form below";
pub const DEFAULT_SUCCESS_MESSAGE: &str = "Thank you! Your form has been submitted successfully.";
pub const DEFAULT_SUBMIT_TEXT: &str = "Submit";

/// An in-memory form document.
///
/// Every editing operation borrows the current snapshot and returns a new
/// one, leaving the original untouched so callers can diff old against new.
/// The JSON shape is flat: submission and appearance settings sit next to
/// `title` and `fields`, the same layout the builder exports.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FormDefinition {
    pub title: String,
    pub description: String,
    pub fields: Vec<Field>,
    #[serde(flatten)]
    pub options: SubmissionOptions,
    #[serde(flatten)]
    pub appearance: Appearance,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmissionOptions {
    pub success_message: String,
    pub submit_button_text: String,
    #[serde(flatten)]
    pub sink: SinkConfig,
    #[serde(flatten)]
    pub notify: NotifyConfig,
}

impl Default for SubmissionOptions {
    fn default() -> Self {
        SubmissionOptions {
            success_message: DEFAULT_SUCCESS_MESSAGE.to_string(),
            submit_button_text: DEFAULT_SUBMIT_TEXT.to_string(),
            sink: SinkConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

/// Presentation settings carried along for the renderer.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Appearance {
    pub show_progress: bool,
    pub primary_color: String,
    pub form_width: String,
}

impl Default for Appearance {
    fn default() -> Self {
        Appearance {
            show_progress: false,
            primary_color: "#3b82f6".to_string(),
            form_width: "max-w-2xl".to_string(),
        }
    }
}

impl Default for FormDefinition {
    fn default() -> Self {
        FormDefinition {
            title: DEFAULT_TITLE.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            fields: Vec::new(),
            options: SubmissionOptions::default(),
            appearance: Appearance::default(),
        }
    }
}

/// Partial edit of a field; `None` leaves the member as it is.
#[derive(Clone, Debug, Default)]
pub struct FieldUpdate {
    pub label: Option<String>,
    pub placeholder: Option<String>,
    pub description: Option<String>,
    pub required: Option<bool>,
    pub options: Option<Vec<String>>,
    pub validation: Option<FieldValidation>,
    /// `Some(None)` removes the condition.
    pub conditional: Option<Option<Conditional>>,
}

/// Partial edit of the form-level settings.
#[derive(Clone, Debug, Default)]
pub struct SettingsUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub success_message: Option<String>,
    pub submit_button_text: Option<String>,
    pub sheet_url: Option<String>,
    pub sheet_name: Option<String>,
    pub sheets_enabled: Option<bool>,
    pub notification_email: Option<String>,
    pub notifications_enabled: Option<bool>,
    pub show_progress: Option<bool>,
    pub primary_color: Option<String>,
    pub form_width: Option<String>,
}

fn merge<T>(slot: &mut T, update: Option<T>) {
    if let Some(value) = update {
        *slot = value;
    }
}

impl FormDefinition {
    pub fn new(title: impl Into<String>) -> Self {
        FormDefinition {
            title: title.into(),
            ..FormDefinition::default()
        }
    }

    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.id == id)
    }

    fn require_position(&self, id: &str) -> Result<usize, FormError> {
        self.position(id)
            .ok_or_else(|| FormError::FieldNotFound(id.to_string()))
    }

    /// Inserts `field` at `index`, shifting later fields down.
    pub fn with_field_inserted(&self, field: Field, index: usize) -> Result<Self, FormError> {
        if index > self.fields.len() {
            return Err(FormError::IndexOutOfRange {
                index,
                len: self.fields.len(),
            });
        }
        if self.position(&field.id).is_some() {
            return Err(FormError::DuplicateFieldId(field.id));
        }
        field.check()?;

        let mut next = self.clone();
        next.fields.insert(index, field);
        Ok(next)
    }

    pub fn with_field_added(&self, field: Field) -> Result<Self, FormError> {
        self.with_field_inserted(field, self.fields.len())
    }

    pub fn with_field_updated(&self, id: &str, update: FieldUpdate) -> Result<Self, FormError> {
        let index = self.require_position(id)?;

        let mut next = self.clone();
        let field = &mut next.fields[index];
        merge(&mut field.label, update.label);
        merge(&mut field.placeholder, update.placeholder);
        merge(&mut field.description, update.description);
        merge(&mut field.required, update.required);
        merge(&mut field.options, update.options);
        merge(&mut field.validation, update.validation);
        merge(&mut field.conditional, update.conditional);
        field.check()?;

        Ok(next)
    }

    /// Removes a field. Conditions that pointed at it are left in place and
    /// simply never match again.
    pub fn without_field(&self, id: &str) -> Result<Self, FormError> {
        let index = self.require_position(id)?;

        let mut next = self.clone();
        next.fields.remove(index);
        Ok(next)
    }

    /// Appends a copy of the field with a fresh id and a " (Copy)" label.
    pub fn with_field_duplicated(&self, id: &str) -> Result<Self, FormError> {
        let index = self.require_position(id)?;

        let mut copy = self.fields[index].clone();
        copy.id = crate::field::generate_field_id();
        copy.label = format!("{} (Copy)", copy.label);

        let mut next = self.clone();
        next.fields.push(copy);
        Ok(next)
    }

    /// Moves the field at `from` so that it ends up at `to`.
    pub fn with_field_moved(&self, from: usize, to: usize) -> Result<Self, FormError> {
        let len = self.fields.len();
        for index in [from, to] {
            if index >= len {
                return Err(FormError::IndexOutOfRange { index, len });
            }
        }

        let mut next = self.clone();
        let field = next.fields.remove(from);
        next.fields.insert(to, field);
        Ok(next)
    }

    pub fn with_settings(&self, update: SettingsUpdate) -> Self {
        let mut next = self.clone();
        merge(&mut next.title, update.title);
        merge(&mut next.description, update.description);
        merge(&mut next.options.success_message, update.success_message);
        merge(&mut next.options.submit_button_text, update.submit_button_text);
        merge(&mut next.options.sink.sheet_url, update.sheet_url);
        merge(&mut next.options.sink.sheet_name, update.sheet_name);
        merge(&mut next.options.sink.enabled, update.sheets_enabled);
        merge(&mut next.options.notify.email, update.notification_email);
        merge(&mut next.options.notify.enabled, update.notifications_enabled);
        merge(&mut next.appearance.show_progress, update.show_progress);
        merge(&mut next.appearance.primary_color, update.primary_color);
        merge(&mut next.appearance.form_width, update.form_width);
        next
    }

    /// Checks the document invariants: unique ids and per-field options.
    pub fn check(&self) -> Result<(), FormError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.id.as_str()) {
                return Err(FormError::DuplicateFieldId(field.id.clone()));
            }
            field.check()?;
        }
        Ok(())
    }

    /// Ids of fields whose chain of conditions leads back to themselves,
    /// self-references included.
    pub fn conditional_cycles(&self) -> BTreeSet<String> {
        self.fields
            .iter()
            .filter(|f| self.reaches_itself(f))
            .map(|f| f.id.clone())
            .collect()
    }

    fn reaches_itself(&self, start: &Field) -> bool {
        let mut visited = BTreeSet::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if !visited.insert(node.id.as_str()) {
                continue;
            }
            let Some(conditional) = &node.conditional else {
                continue;
            };
            if conditional.depends_on == start.id {
                return true;
            }
            if let Some(next) = self.field(&conditional.depends_on) {
                stack.push(next);
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use serde_json::json;

    fn text(id: &str) -> Field {
        Field::new(FieldType::Text).with_id(id)
    }

    fn sample() -> FormDefinition {
        FormDefinition::default()
            .with_field_added(text("a"))
            .and_then(|f| f.with_field_added(text("b")))
            .and_then(|f| f.with_field_added(text("c")))
            .unwrap()
    }

    fn ids(form: &FormDefinition) -> Vec<&str> {
        form.fields.iter().map(|f| f.id.as_str()).collect()
    }

    #[test]
    fn new_form_is_empty_with_defaults() {
        let form = FormDefinition::default();
        assert!(form.fields.is_empty());
        assert_eq!(form.title, DEFAULT_TITLE);
        assert_eq!(form.options.submit_button_text, "Submit");
        assert_eq!(form.options.sink.sheet_name, "Form Responses");
        assert!(!form.options.sink.enabled);
    }

    #[test]
    fn edits_leave_previous_snapshot_untouched() {
        let before = sample();
        let after = before.without_field("b").unwrap();
        assert_eq!(ids(&before), vec!["a", "b", "c"]);
        assert_eq!(ids(&after), vec!["a", "c"]);
    }

    #[test]
    fn insert_at_drop_position() {
        let form = sample().with_field_inserted(text("x"), 1).unwrap();
        assert_eq!(ids(&form), vec!["a", "x", "b", "c"]);

        let err = sample().with_field_inserted(text("y"), 9).unwrap_err();
        assert_eq!(err, FormError::IndexOutOfRange { index: 9, len: 3 });
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = sample().with_field_added(text("a")).unwrap_err();
        assert_eq!(err, FormError::DuplicateFieldId("a".into()));
    }

    #[test]
    fn reorder_moves_field() {
        let form = sample().with_field_moved(0, 2).unwrap();
        assert_eq!(ids(&form), vec!["b", "c", "a"]);
        let form = form.with_field_moved(2, 0).unwrap();
        assert_eq!(ids(&form), vec!["a", "b", "c"]);
        assert!(sample().with_field_moved(0, 3).is_err());
    }

    #[test]
    fn duplicate_appends_copy() {
        let form = sample()
            .with_field_updated(
                "a",
                FieldUpdate {
                    label: Some("Name".into()),
                    ..FieldUpdate::default()
                },
            )
            .unwrap()
            .with_field_duplicated("a")
            .unwrap();

        let copy = form.fields.last().unwrap();
        assert_eq!(copy.label, "Name (Copy)");
        assert_ne!(copy.id, "a");
        assert_eq!(form.fields.len(), 4);
        assert!(form.check().is_ok());
    }

    #[test]
    fn update_merges_and_keeps_invariants() {
        let form = FormDefinition::default()
            .with_field_added(Field::new(FieldType::Radio).with_id("r"))
            .unwrap();

        let updated = form
            .with_field_updated(
                "r",
                FieldUpdate {
                    required: Some(true),
                    options: Some(vec!["Yes".into(), "No".into()]),
                    ..FieldUpdate::default()
                },
            )
            .unwrap();
        let field = updated.field("r").unwrap();
        assert!(field.required);
        assert_eq!(field.options, vec!["Yes", "No"]);
        assert_eq!(field.label, "Radio Options");

        let err = form
            .with_field_updated(
                "r",
                FieldUpdate {
                    options: Some(Vec::new()),
                    ..FieldUpdate::default()
                },
            )
            .unwrap_err();
        assert_eq!(err, FormError::MissingOptions("r".into()));

        assert_eq!(
            form.with_field_updated("zzz", FieldUpdate::default()).unwrap_err(),
            FormError::FieldNotFound("zzz".into())
        );
    }

    #[test]
    fn settings_merge() {
        let form = FormDefinition::default().with_settings(SettingsUpdate {
            sheet_url: Some("https://docs.google.com/spreadsheets/d/abc/edit".into()),
            sheets_enabled: Some(true),
            ..SettingsUpdate::default()
        });
        assert!(form.options.sink.enabled);
        assert_eq!(form.options.sink.sheet_name, "Form Responses");
        assert_eq!(form.title, DEFAULT_TITLE);
    }

    #[test]
    fn serializes_flat_like_the_builder() {
        let value = serde_json::to_value(FormDefinition::default()).unwrap();
        assert_eq!(value["title"], json!("Registration Form"));
        assert_eq!(value["successMessage"], json!(DEFAULT_SUCCESS_MESSAGE));
        assert_eq!(value["sheetName"], json!("Form Responses"));
        assert_eq!(value["enableSheets"], json!(false));
        assert_eq!(value["emailNotifications"], json!(false));
        assert_eq!(value["primaryColor"], json!("#3b82f6"));
        assert!(value.get("options").is_none());
    }

    #[test]
    fn missing_settings_fall_back_to_defaults() {
        let form: FormDefinition = serde_json::from_value(json!({
            "title": "Survey",
            "fields": [],
            "googleSheetsUrl": "https://docs.google.com/spreadsheets/d/xyz",
            "enableSheets": true
        }))
        .unwrap();
        assert_eq!(form.title, "Survey");
        assert!(form.options.sink.enabled);
        assert_eq!(form.options.sink.sheet_name, "Form Responses");
        assert_eq!(form.options.submit_button_text, "Submit");
    }

    #[test]
    fn finds_conditional_cycles() {
        let form = FormDefinition::default()
            .with_field_added(text("self").with_conditional(Conditional::new("self", "x")))
            .and_then(|f| f.with_field_added(text("p").with_conditional(Conditional::new("q", "1"))))
            .and_then(|f| f.with_field_added(text("q").with_conditional(Conditional::new("p", "1"))))
            .and_then(|f| f.with_field_added(text("r").with_conditional(Conditional::new("p", "1"))))
            .and_then(|f| f.with_field_added(text("s").with_conditional(Conditional::new("gone", "1"))))
            .unwrap();

        let cycles: Vec<String> = form.conditional_cycles().into_iter().collect();
        assert_eq!(cycles, vec!["p", "q", "self"]);
    }
}
