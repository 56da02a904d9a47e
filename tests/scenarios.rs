use std::sync::Arc;

use formsheet::sink::{STEP_APPEND, STEP_WRITE_HEADER};
use formsheet::{
    Conditional, Field, FieldType, FieldValidation, FormDefinition, LogNotifier, MemorySheets,
    Pipeline, SettingsUpdate, SheetsApi, SubmissionValues, SubmitError, shape_row, validate,
    validate_submission, visible_fields,
};

const SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/1AbC-d_9/edit#gid=0";

fn form_with(fields: Vec<Field>) -> FormDefinition {
    fields
        .into_iter()
        .try_fold(FormDefinition::default(), |form, field| form.with_field_added(field))
        .unwrap()
        .with_settings(SettingsUpdate {
            sheet_url: Some(SHEET_URL.to_string()),
            sheets_enabled: Some(true),
            ..SettingsUpdate::default()
        })
}

fn pipeline(sheets: Arc<MemorySheets>) -> Pipeline {
    let sheets: Arc<dyn SheetsApi> = sheets;
    Pipeline::new(Some(sheets), Arc::new(LogNotifier))
}

#[tokio::test]
async fn empty_required_field_stops_before_the_sink() {
    let form = form_with(vec![Field::new(FieldType::Text).with_id("name").required()]);
    let sheets = Arc::new(MemorySheets::new().with_spreadsheet("1AbC-d_9"));

    let errors = validate_submission(&form, &SubmissionValues::new()).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.get("name").unwrap().code(), "required");

    let err = pipeline(sheets.clone())
        .submit(&form, &SubmissionValues::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Validation(_)));
    assert!(sheets.calls().is_empty());
}

#[test]
fn checkbox_answers_share_one_cell() {
    let form = form_with(vec![
        Field::new(FieldType::Checkbox)
            .with_id("pick")
            .with_label("Pick")
            .with_options(["A", "B"]),
    ]);

    let mut values = SubmissionValues::new();
    values.insert("pick".into(), vec!["A", "B"].into());

    let row = shape_row(&form, &values);
    assert_eq!(row.header_row, vec!["Timestamp", "Pick"]);
    assert_eq!(row.data_row[1], "A, B");
}

#[test]
fn minimum_is_inclusive() {
    let age = Field::new(FieldType::Number)
        .with_id("age")
        .with_validation(FieldValidation {
            min: Some(18.0),
            ..FieldValidation::default()
        });

    assert_eq!(validate(&age, Some(&"17".into())).unwrap_err().code(), "below_min");
    assert!(validate(&age, Some(&"18".into())).is_ok());
}

#[test]
fn hidden_field_skips_validation() {
    let form = form_with(vec![
        Field::new(FieldType::Text).with_id("country"),
        Field::new(FieldType::Text)
            .with_id("state")
            .required()
            .with_conditional(Conditional::new("country", "US")),
    ]);

    let mut values = SubmissionValues::new();
    values.insert("country".into(), "CA".into());

    let visible: Vec<&str> = visible_fields(&form, &values).map(|f| f.id.as_str()).collect();
    assert_eq!(visible, vec!["country"]);
    assert!(validate_submission(&form, &values).is_ok());

    values.insert("country".into(), "US".into());
    let errors = validate_submission(&form, &values).unwrap_err();
    assert_eq!(errors.get("state").unwrap().code(), "required");
}

#[tokio::test]
async fn existing_header_is_left_alone() {
    let form = form_with(vec![Field::new(FieldType::Text).with_id("name").with_label("Name")]);
    let sheets = Arc::new(MemorySheets::new().with_sheet(
        "1AbC-d_9",
        "Form Responses",
        vec![vec!["Timestamp".to_string(), "Old Name".to_string()]],
    ));

    let mut values = SubmissionValues::new();
    values.insert("name".into(), "Ada".into());

    let submitted = pipeline(sheets.clone()).submit(&form, &values).await.unwrap();
    let report = submitted.dispatch.unwrap();
    assert!(!report.wrote_header);
    assert!(!report.created_sheet);

    let calls = sheets.calls();
    assert!(!calls.contains(&STEP_WRITE_HEADER));
    assert_eq!(calls.last(), Some(&STEP_APPEND));

    let rows = sheets.rows("1AbC-d_9", "Form Responses").unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][1], "Old Name");
    assert_eq!(rows[1][1], "Ada");
}
