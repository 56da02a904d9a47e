use reqwest::Client;

use crate::error::ClientError;
use crate::field::SubmissionValues;
use crate::form::FormDefinition;
use crate::submission::{InflightGuard, SubmitRequest, SubmitResponse};
use crate::validator::validate_submission;

/// Submits filled-in forms to a submission endpoint.
///
/// The same checks run here as on the server, so a form that fails
/// validation is never sent. Submits that overlap an outstanding one are
/// refused with [`ClientError::Busy`].
pub struct FormClient {
    http: Client,
    endpoint: String,
    guard: InflightGuard,
}

impl FormClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        FormClient {
            http: Client::new(),
            endpoint: endpoint.into(),
            guard: InflightGuard::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True while a submission is outstanding.
    pub fn is_submitting(&self) -> bool {
        self.guard.is_busy()
    }

    pub async fn submit(
        &self,
        form: &FormDefinition,
        values: &SubmissionValues,
    ) -> Result<SubmitResponse, ClientError> {
        let _ticket = self.guard.try_begin().ok_or(ClientError::Busy)?;

        validate_submission(form, values).map_err(ClientError::Validation)?;

        let request = SubmitRequest {
            form_config: form.clone(),
            submission_data: values.clone(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let body: SubmitResponse = response.json().await.map_err(|e| {
            ClientError::Transport(format!("unreadable response ({}): {}", status, e))
        })?;

        if body.success {
            log::debug!("Submitted '{}' to {}", form.title, self.endpoint);
            Ok(body)
        } else {
            Err(ClientError::Rejected(body.message))
        }
    }
}
