use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SinkError;

lazy_static! {
    static ref SPREADSHEET_ID_REGEX: Regex = Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").unwrap();
}

pub const DEFAULT_SHEET_NAME: &str = "Form Responses";

pub const STEP_METADATA: &str = "get spreadsheet";
pub const STEP_CREATE_SHEET: &str = "create sheet";
pub const STEP_READ_HEADER: &str = "read header row";
pub const STEP_WRITE_HEADER: &str = "write header row";
pub const STEP_APPEND: &str = "append row";

/// Where submissions are written.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct SinkConfig {
    #[serde(rename = "googleSheetsUrl")]
    pub sheet_url: String,

    #[serde(rename = "sheetName")]
    pub sheet_name: String,

    #[serde(rename = "enableSheets")]
    pub enabled: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            sheet_url: String::new(),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            enabled: false,
        }
    }
}

impl SinkConfig {
    /// Pulls the document id out of a `.../spreadsheets/d/<id>/...` URL.
    pub fn spreadsheet_id(&self) -> Result<&str, SinkError> {
        SPREADSHEET_ID_REGEX
            .captures(&self.sheet_url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| {
                SinkError::InvalidSinkConfig(format!(
                    "no spreadsheet id in URL `{}`",
                    self.sheet_url
                ))
            })
    }

    /// Checks the URL and sheet name, returning the document id.
    pub fn check(&self) -> Result<&str, SinkError> {
        let spreadsheet_id = self.spreadsheet_id()?;
        if self.sheet_name.trim().is_empty() {
            return Err(SinkError::InvalidSinkConfig("sheet name is empty".to_string()));
        }
        Ok(spreadsheet_id)
    }
}

/// The spreadsheet operations a dispatch needs. Each call is one
/// request/response round trip.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Titles of the sheets (tabs) in the document.
    async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, SinkError>;

    async fn create_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<(), SinkError>;

    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, SinkError>;

    /// Overwrites the cells starting at `range`.
    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SinkError>;

    /// Inserts `rows` after the last populated row of `range`.
    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SinkError>;
}

/// What a successful dispatch had to do besides appending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub created_sheet: bool,
    pub wrote_header: bool,
}

/// Builds an A1 range on a named sheet, quoting the name.
pub fn a1_range(sheet_name: &str, cells: &str) -> String {
    format!("'{}'!{}", sheet_name.replace('\'', "''"), cells)
}

/// Writes one submission row to the configured sheet.
///
/// Creates the sheet when the document lacks it, writes `header_row` as row
/// 1 only when that row is empty, then appends `data_row`. The header check
/// and write are two separate calls with nothing guarding the gap: two first
/// submissions racing on a fresh sheet can both write the header.
///
/// The first failing call aborts the dispatch. Nothing is retried.
pub async fn dispatch(
    api: &dyn SheetsApi,
    config: &SinkConfig,
    header_row: &[String],
    data_row: &[String],
) -> Result<DispatchReport, SinkError> {
    let spreadsheet_id = config.check()?;
    let sheet_name = config.sheet_name.as_str();

    let mut report = DispatchReport::default();

    let titles = api.sheet_titles(spreadsheet_id).await?;
    if !titles.iter().any(|t| t == sheet_name) {
        log::info!("Creating sheet '{}' in spreadsheet {}", sheet_name, spreadsheet_id);
        api.create_sheet(spreadsheet_id, sheet_name).await?;
        report.created_sheet = true;
    }

    let first_row = api
        .get_values(spreadsheet_id, &a1_range(sheet_name, "1:1"))
        .await?;
    let has_header = first_row
        .iter()
        .any(|row| row.iter().any(|cell| !cell.is_empty()));

    if !has_header {
        log::debug!("Sheet '{}' has no header row, writing {} columns", sheet_name, header_row.len());
        api.update_values(
            spreadsheet_id,
            &a1_range(sheet_name, "A1"),
            vec![header_row.to_vec()],
        )
        .await?;
        report.wrote_header = true;
    }

    api.append_values(
        spreadsheet_id,
        &a1_range(sheet_name, "A:A"),
        vec![data_row.to_vec()],
    )
    .await?;

    log::info!(
        "Appended row to '{}' in spreadsheet {} (header written: {})",
        sheet_name,
        spreadsheet_id,
        report.wrote_header
    );
    Ok(report)
}

#[cfg(any(test, feature = "testing"))]
pub use memory::MemorySheets;

#[cfg(any(test, feature = "testing"))]
mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{Mutex, MutexGuard};

    pub(super) fn split_a1_range(range: &str) -> Option<(String, &str)> {
        let (quoted, cells) = range.rsplit_once('!')?;
        let name = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
        Some((name.replace("''", "'"), cells))
    }

    /// Spreadsheets held in memory. Records every call it receives and can be
    /// told to fail at a given step.
    #[derive(Default)]
    pub struct MemorySheets {
        state: Mutex<MemoryState>,
    }

    #[derive(Default)]
    struct MemoryState {
        documents: HashMap<String, BTreeMap<String, Vec<Vec<String>>>>,
        calls: Vec<&'static str>,
        fail_step: Option<&'static str>,
    }

    impl MemorySheets {
        pub fn new() -> Self {
            MemorySheets::default()
        }

        /// Registers an empty document.
        pub fn with_spreadsheet(self, spreadsheet_id: &str) -> Self {
            self.lock()
                .documents
                .entry(spreadsheet_id.to_string())
                .or_default();
            self
        }

        /// Registers a sheet with existing rows, creating the document if needed.
        pub fn with_sheet(self, spreadsheet_id: &str, sheet_name: &str, rows: Vec<Vec<String>>) -> Self {
            self.lock()
                .documents
                .entry(spreadsheet_id.to_string())
                .or_default()
                .insert(sheet_name.to_string(), rows);
            self
        }

        pub fn failing_at(self, step: &'static str) -> Self {
            self.lock().fail_step = Some(step);
            self
        }

        pub fn rows(&self, spreadsheet_id: &str, sheet_name: &str) -> Option<Vec<Vec<String>>> {
            self.lock()
                .documents
                .get(spreadsheet_id)
                .and_then(|doc| doc.get(sheet_name))
                .cloned()
        }

        /// Steps called so far, in order.
        pub fn calls(&self) -> Vec<&'static str> {
            self.lock().calls.clone()
        }

        fn lock(&self) -> MutexGuard<'_, MemoryState> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        fn begin(&self, step: &'static str) -> Result<MutexGuard<'_, MemoryState>, SinkError> {
            let mut state = self.lock();
            state.calls.push(step);
            if state.fail_step == Some(step) {
                return Err(SinkError::Api {
                    step,
                    status: 503,
                    message: "injected failure".to_string(),
                });
            }
            Ok(state)
        }
    }

    fn not_found(step: &'static str, what: &str) -> SinkError {
        SinkError::Api {
            step,
            status: 404,
            message: format!("{} not found", what),
        }
    }

    fn sheet_mut<'a>(
        state: &'a mut MemoryState,
        step: &'static str,
        spreadsheet_id: &str,
        range: &str,
    ) -> Result<&'a mut Vec<Vec<String>>, SinkError> {
        let (sheet_name, _) = split_a1_range(range).ok_or_else(|| SinkError::Api {
            step,
            status: 400,
            message: format!("unable to parse range {}", range),
        })?;
        state
            .documents
            .get_mut(spreadsheet_id)
            .ok_or_else(|| not_found(step, spreadsheet_id))?
            .get_mut(&sheet_name)
            .ok_or_else(|| not_found(step, &sheet_name))
    }

    #[async_trait]
    impl SheetsApi for MemorySheets {
        async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, SinkError> {
            let state = self.begin(STEP_METADATA)?;
            state
                .documents
                .get(spreadsheet_id)
                .map(|doc| doc.keys().cloned().collect())
                .ok_or_else(|| not_found(STEP_METADATA, spreadsheet_id))
        }

        async fn create_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<(), SinkError> {
            let mut state = self.begin(STEP_CREATE_SHEET)?;
            let doc = state
                .documents
                .get_mut(spreadsheet_id)
                .ok_or_else(|| not_found(STEP_CREATE_SHEET, spreadsheet_id))?;
            doc.entry(title.to_string()).or_default();
            Ok(())
        }

        async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, SinkError> {
            let mut state = self.begin(STEP_READ_HEADER)?;
            let rows = sheet_mut(&mut state, STEP_READ_HEADER, spreadsheet_id, range)?;
            Ok(rows.first().cloned().into_iter().collect())
        }

        async fn update_values(
            &self,
            spreadsheet_id: &str,
            range: &str,
            rows: Vec<Vec<String>>,
        ) -> Result<(), SinkError> {
            let mut state = self.begin(STEP_WRITE_HEADER)?;
            let sheet = sheet_mut(&mut state, STEP_WRITE_HEADER, spreadsheet_id, range)?;
            for (i, row) in rows.into_iter().enumerate() {
                if i < sheet.len() {
                    sheet[i] = row;
                } else {
                    sheet.push(row);
                }
            }
            Ok(())
        }

        async fn append_values(
            &self,
            spreadsheet_id: &str,
            range: &str,
            rows: Vec<Vec<String>>,
        ) -> Result<(), SinkError> {
            let mut state = self.begin(STEP_APPEND)?;
            let sheet = sheet_mut(&mut state, STEP_APPEND, spreadsheet_id, range)?;
            sheet.extend(rows);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::split_a1_range;
    use super::*;

    const URL: &str = "https://docs.google.com/spreadsheets/d/sheet-ID_42/edit#gid=0";

    fn config() -> SinkConfig {
        SinkConfig {
            sheet_url: URL.to_string(),
            sheet_name: "Responses".to_string(),
            enabled: true,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_spreadsheet_id() {
        assert_eq!(config().spreadsheet_id().unwrap(), "sheet-ID_42");

        let bad = SinkConfig {
            sheet_url: "https://example.com/sheet".into(),
            ..config()
        };
        assert!(matches!(bad.spreadsheet_id(), Err(SinkError::InvalidSinkConfig(_))));
    }

    #[test]
    fn ranges_quote_sheet_names() {
        assert_eq!(a1_range("Form Responses", "A1"), "'Form Responses'!A1");
        assert_eq!(a1_range("Bob's", "1:1"), "'Bob''s'!1:1");
        assert_eq!(split_a1_range("'Bob''s'!1:1"), Some(("Bob's".to_string(), "1:1")));
    }

    #[tokio::test]
    async fn creates_sheet_and_header_on_first_dispatch() {
        let api = MemorySheets::new().with_spreadsheet("sheet-ID_42");
        let header = strings(&["Timestamp", "Name"]);

        let report = dispatch(&api, &config(), &header, &strings(&["t1", "Ada"]))
            .await
            .unwrap();
        assert_eq!(report, DispatchReport { created_sheet: true, wrote_header: true });

        let report = dispatch(&api, &config(), &header, &strings(&["t2", "Bob"]))
            .await
            .unwrap();
        assert_eq!(report, DispatchReport::default());

        assert_eq!(
            api.rows("sheet-ID_42", "Responses").unwrap(),
            vec![header, strings(&["t1", "Ada"]), strings(&["t2", "Bob"])]
        );
    }

    #[tokio::test]
    async fn existing_header_is_left_alone() {
        let existing = strings(&["When", "Who"]);
        let api = MemorySheets::new().with_sheet("sheet-ID_42", "Responses", vec![existing.clone()]);

        dispatch(&api, &config(), &strings(&["Timestamp", "Name"]), &strings(&["t", "Ada"]))
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![STEP_METADATA, STEP_READ_HEADER, STEP_APPEND]
        );
        assert_eq!(api.rows("sheet-ID_42", "Responses").unwrap()[0], existing);
    }

    #[tokio::test]
    async fn sheet_name_is_used_as_configured() {
        let api = MemorySheets::new().with_sheet("sheet-ID_42", " Responses ", vec![strings(&["Timestamp"])]);
        let padded = SinkConfig {
            sheet_name: " Responses ".to_string(),
            ..config()
        };

        for row in ["t1", "t2"] {
            let report = dispatch(&api, &padded, &strings(&["Timestamp"]), &strings(&[row]))
                .await
                .unwrap();
            assert!(!report.created_sheet);
        }

        assert!(!api.calls().contains(&STEP_CREATE_SHEET));
        assert_eq!(api.rows("sheet-ID_42", " Responses ").unwrap().len(), 3);
        assert!(api.rows("sheet-ID_42", "Responses").is_none());
    }

    #[tokio::test]
    async fn blank_first_row_counts_as_missing() {
        let api = MemorySheets::new().with_sheet("sheet-ID_42", "Responses", vec![strings(&["", ""])]);
        let report = dispatch(&api, &config(), &strings(&["Timestamp"]), &strings(&["t"]))
            .await
            .unwrap();
        assert!(report.wrote_header);
    }

    #[tokio::test]
    async fn failure_aborts_remaining_steps() {
        let api = MemorySheets::new()
            .with_spreadsheet("sheet-ID_42")
            .failing_at(STEP_WRITE_HEADER);

        let err = dispatch(&api, &config(), &strings(&["Timestamp"]), &strings(&["t"]))
            .await
            .unwrap_err();

        assert!(matches!(err, SinkError::Api { step: STEP_WRITE_HEADER, .. }));
        assert!(!api.calls().contains(&STEP_APPEND));
    }

    #[tokio::test]
    async fn invalid_config_makes_no_calls() {
        let api = MemorySheets::new();
        let blank_name = SinkConfig {
            sheet_name: "  ".into(),
            ..config()
        };
        let err = dispatch(&api, &blank_name, &[], &[]).await.unwrap_err();
        assert!(matches!(err, SinkError::InvalidSinkConfig(_)));
        assert!(api.calls().is_empty());
    }
}
