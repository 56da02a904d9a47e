/*!
# Formsheet

The evaluation and submission pipeline behind a drag-and-drop form builder,
built in Rust.

## Overview

A form is an ordered list of typed fields. Fields can be shown or hidden
based on another field's answer, carry validation rules, and be exported to
and imported from a JSON configuration file. A filled-in form is validated,
flattened into one spreadsheet row, appended to a Google Sheet and,
optionally, announced by email.

## Architecture

### Model
- **field**: field types, definitions, defaults and submitted values
- **form**: the form definition and its copy-on-write editing operations

### Evaluation
- **visibility**: which fields are shown for a given set of answers
- **validator**: per-field rules and whole-submission validation
- **row**: header and data row shaping

### Sinks
- **sink**: the spreadsheet API seam and the append-with-header dispatch
- **sheets**: Google Sheets v4 client (feature `web`)
- **mailer**: submission notifications, over SMTP with feature `web`

### Surfaces
- **submission**: the server-side pipeline and the in-flight guard
- **client**: posts submissions to a server (feature `web`)
- **app**: axum routes for submission and export (feature `web`)
- **export**: JSON export, import and file writing
- **config**: server settings from the environment

## REST API Endpoints

- `POST /api/submit-form` - Validates a submission and writes it out
- `POST /.netlify/functions/submit-form` - Same, at the builder's legacy path
- `POST /api/export` - Returns a form configuration as a JSON download
*/

pub mod config;
pub mod error;
pub mod export;
pub mod field;
pub mod form;
pub mod mailer;
pub mod row;
pub mod sink;
pub mod submission;
pub mod validator;
pub mod visibility;

#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod client;
#[cfg(feature = "web")]
pub mod sheets;

pub use error::*;
pub use field::{Conditional, Field, FieldType, FieldValidation, FieldValue, SubmissionValues};
pub use form::{Appearance, FieldUpdate, FormDefinition, SettingsUpdate, SubmissionOptions};
pub use mailer::{LogNotifier, Notification, Notifier, NotifyConfig};
pub use row::{ShapedRow, shape_row, shape_row_at};
pub use sink::{DispatchReport, SheetsApi, SinkConfig, dispatch};
#[cfg(any(test, feature = "testing"))]
pub use sink::MemorySheets;
pub use submission::{InflightGuard, Pipeline, SubmitRequest, SubmitResponse, Submitted};
pub use validator::{FieldErrors, ValidationError, validate, validate_submission};
pub use visibility::{is_visible, visible_fields};
