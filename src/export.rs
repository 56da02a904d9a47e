use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::ImportError;
use crate::form::FormDefinition;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

/// The downloadable form document: the definition plus the export time.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedForm {
    #[serde(flatten)]
    pub form: FormDefinition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<DateTime<Utc>>,
}

/// Serializes `form` as pretty JSON stamped with the current time.
pub fn export_json(form: &FormDefinition) -> serde_json::Result<String> {
    export_json_at(form, Utc::now())
}

pub fn export_json_at(form: &FormDefinition, at: DateTime<Utc>) -> serde_json::Result<String> {
    let exported = ExportedForm {
        form: form.clone(),
        export_date: Some(at),
    };
    serde_json::to_string_pretty(&exported)
}

/// Download name for an export, e.g. "Contact Us" -> "contact-us-config.json".
pub fn export_file_name(form: &FormDefinition) -> String {
    let title = form.title.trim();
    let stem = if title.is_empty() {
        "form".to_string()
    } else {
        WHITESPACE_REGEX.replace_all(title, "-").to_lowercase()
    };
    format!("{}-config.json", stem)
}

/// Writes the export into `dir` and returns the final path.
///
/// The document is written to a temporary file in the same directory and
/// then renamed over the target, so readers never see a partial export.
pub fn export_to_file(form: &FormDefinition, dir: impl AsRef<Path>) -> std::io::Result<PathBuf> {
    let dir = dir.as_ref();
    let json = export_json(form)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;

    let target = dir.join(export_file_name(form));
    tmp.persist(&target).map_err(|e| e.error)?;

    log::info!("Exported form '{}' to {}", form.title, target.display());
    Ok(target)
}

/// Reads an export (or a bare definition) back and checks its invariants.
pub fn import_json(text: &str) -> Result<FormDefinition, ImportError> {
    let exported: ExportedForm = serde_json::from_str(text)?;
    exported.form.check()?;
    Ok(exported.form)
}
