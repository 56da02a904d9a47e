use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{SinkError, SubmitError};
use crate::field::SubmissionValues;
use crate::form::FormDefinition;
use crate::mailer::{Notification, Notifier};
use crate::row::{ShapedRow, shape_row_at};
use crate::sink::{DispatchReport, SheetsApi, dispatch};
use crate::validator::validate_submission;

/// Body of a submission request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub form_config: FormDefinition,
    #[serde(default)]
    pub submission_data: SubmissionValues,
}

/// Body of a submission response.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    /// Field errors keyed by field id, present when validation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl SubmitResponse {
    pub fn accepted(message: impl Into<String>) -> Self {
        SubmitResponse {
            success: true,
            message: message.into(),
            errors: None,
        }
    }

    pub fn rejected(err: &SubmitError) -> Self {
        let errors = match err {
            SubmitError::Validation(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };
        SubmitResponse {
            success: false,
            message: err.public_message().to_string(),
            errors,
        }
    }
}

/// A submission that passed validation and reached its sinks.
#[derive(Debug)]
pub struct Submitted {
    pub submission_id: Uuid,
    pub row: ShapedRow,
    /// `None` when the spreadsheet sink is switched off for the form.
    pub dispatch: Option<DispatchReport>,
    /// Background notification task, if one was started. Dropping the
    /// handle does not cancel it.
    pub notification: Option<JoinHandle<()>>,
}

/// Validates a submission and hands it to the configured sinks.
pub struct Pipeline {
    sheets: Option<Arc<dyn SheetsApi>>,
    notifier: Arc<dyn Notifier>,
}

impl Pipeline {
    pub fn new(sheets: Option<Arc<dyn SheetsApi>>, notifier: Arc<dyn Notifier>) -> Self {
        Pipeline { sheets, notifier }
    }

    /// Runs one submission end to end.
    ///
    /// Validation fails closed: nothing leaves the process unless every
    /// visible field passes. A sink failure aborts the submission. The email
    /// notification runs in the background after a successful dispatch and
    /// its failure is only logged.
    pub async fn submit(
        &self,
        form: &FormDefinition,
        values: &SubmissionValues,
    ) -> Result<Submitted, SubmitError> {
        let submission_id = Uuid::new_v4();

        form.check()?;
        if let Err(errors) = validate_submission(form, values) {
            log::info!(
                "Submission {} to '{}' rejected: {} invalid field(s)",
                submission_id,
                form.title,
                errors.len()
            );
            return Err(SubmitError::Validation(errors));
        }

        let at = Utc::now();
        let row = shape_row_at(form, values, at);

        let dispatched = if form.options.sink.enabled {
            form.options.sink.check()?;
            let sheets = self.sheets.as_deref().ok_or(SinkError::NotConfigured)?;
            let report = dispatch(sheets, &form.options.sink, &row.header_row, &row.data_row)
                .await
                .inspect_err(|e| log::error!("Submission {} failed to dispatch: {}", submission_id, e))?;
            Some(report)
        } else {
            log::debug!("Spreadsheet sink disabled for '{}'", form.title);
            None
        };

        let notification = form.options.notify.recipient().map(|to| {
            let notification = Notification::for_submission(to, form, values, at);
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&notification).await {
                    log::warn!("Notification for submission {} failed: {}", submission_id, e);
                }
            })
        });

        log::info!("Submission {} to '{}' accepted", submission_id, form.title);
        Ok(Submitted {
            submission_id,
            row,
            dispatch: dispatched,
            notification,
        })
    }
}

/// Ignores repeated submit triggers while one submission is outstanding.
///
/// This is a latch, not a queue: a trigger that arrives while busy is
/// dropped, not deferred.
#[derive(Clone, Default)]
pub struct InflightGuard {
    busy: Arc<AtomicBool>,
}

/// Held for the duration of one submission; dropping it frees the guard.
pub struct InflightTicket {
    busy: Arc<AtomicBool>,
}

impl InflightGuard {
    pub fn new() -> Self {
        InflightGuard::default()
    }

    pub fn try_begin(&self) -> Option<InflightTicket> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InflightTicket {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for InflightTicket {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
