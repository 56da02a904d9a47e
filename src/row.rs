use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::field::SubmissionValues;
use crate::form::FormDefinition;

pub const TIMESTAMP_HEADER: &str = "Timestamp";

/// A submission flattened into one spreadsheet row plus its header.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapedRow {
    pub header_row: Vec<String>,
    pub data_row: Vec<String>,
}

/// Shapes a submission stamped with the current time.
pub fn shape_row(form: &FormDefinition, values: &SubmissionValues) -> ShapedRow {
    shape_row_at(form, values, Utc::now())
}

/// Converts a submission into a header row and a data row.
///
/// Column order follows the form schema, not runtime visibility: every
/// field gets a column, hidden ones included, so rows from submissions with
/// different visible subsets still line up. The first column is the
/// submission time; list values are joined with `", "` and missing values
/// become empty cells.
pub fn shape_row_at(form: &FormDefinition, values: &SubmissionValues, at: DateTime<Utc>) -> ShapedRow {
    let mut header_row = Vec::with_capacity(form.fields.len() + 1);
    let mut data_row = Vec::with_capacity(form.fields.len() + 1);

    header_row.push(TIMESTAMP_HEADER.to_string());
    data_row.push(format_timestamp(at));

    for field in &form.fields {
        header_row.push(field.label.clone());
        data_row.push(
            values
                .get(&field.id)
                .map(|value| value.to_cell())
                .unwrap_or_default(),
        );
    }

    ShapedRow { header_row, data_row }
}

/// ISO-8601 in UTC with millisecond precision, e.g. `2024-05-01T09:30:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
