use thiserror::Error;

use crate::validator::FieldErrors;

/// Errors raised while editing or checking a form definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("duplicate field id `{0}`")]
    DuplicateFieldId(String),

    #[error("field `{0}` not found")]
    FieldNotFound(String),

    #[error("choice field `{0}` needs at least one option")]
    MissingOptions(String),

    #[error("field `{0}` is not a choice field and cannot carry options")]
    UnexpectedOptions(String),

    #[error("position {index} is out of range for {len} fields")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Errors raised while reading an exported form back in.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("malformed form export: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("exported form is inconsistent: {0}")]
    Invalid(#[from] FormError),
}

/// Errors raised by the spreadsheet sink.
///
/// Every failing step of a dispatch collapses into one of these; there is no
/// partial-success variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("invalid sink configuration: {0}")]
    InvalidSinkConfig(String),

    #[error("spreadsheet sink is enabled but no spreadsheet client is configured")]
    NotConfigured,

    #[error("authentication with the spreadsheet API failed: {0}")]
    Auth(String),

    #[error("{step} failed with status {status}: {message}")]
    Api {
        step: &'static str,
        status: u16,
        message: String,
    },

    #[error("{step} failed: {message}")]
    Transport { step: &'static str, message: String },
}

/// Errors raised by a notification sink. Logged, never surfaced.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("failed to deliver message: {0}")]
    Delivery(String),
}

/// Outcome of a rejected submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid form configuration: {0}")]
    InvalidForm(#[from] FormError),

    #[error("{} field(s) failed validation", .0.len())]
    Validation(FieldErrors),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("unreadable submission request: {0}")]
    Malformed(String),
}

impl SubmitError {
    /// Message shown to the person filling in the form.
    pub fn public_message(&self) -> &'static str {
        match self {
            SubmitError::InvalidForm(_) => "This form is misconfigured and cannot accept submissions.",
            SubmitError::Validation(_) => "Please correct the highlighted fields.",
            SubmitError::Sink(_) | SubmitError::Malformed(_) => {
                "Failed to submit form. Please try again."
            }
        }
    }
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not valid: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Errors raised when submitting through the HTTP client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a submission is already in progress")]
    Busy,

    #[error("{} field(s) failed validation", .0.len())]
    Validation(FieldErrors),

    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("could not reach the submission endpoint: {0}")]
    Transport(String),
}
