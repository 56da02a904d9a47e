use axum::{
    Json, Router,
    extract::{Request, State, rejection::JsonRejection},
    http::{Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::error::SubmitError;
use crate::export::{export_file_name, export_json};
use crate::form::FormDefinition;
use crate::mailer::{LogNotifier, Mailer, Notifier};
use crate::sheets::{Credentials, GoogleSheetsClient};
use crate::sink::SheetsApi;
use crate::submission::{Pipeline, SubmitRequest, SubmitResponse};

pub struct AppState {
    pub pipeline: Pipeline,
}

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let sheets: Option<Arc<dyn SheetsApi>> = match &config.service_account_key {
        Some(key) => {
            let credentials = Credentials::from_service_account_json(key)?;
            let client: Arc<dyn SheetsApi> = Arc::new(GoogleSheetsClient::with_base_url(
                credentials,
                config.sheets_api_base.clone(),
            ));
            Some(client)
        }
        None => {
            log::warn!("GOOGLE_SERVICE_ACCOUNT_KEY is not set, forms that write to a spreadsheet will fail");
            None
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => Arc::new(Mailer::new(smtp)?),
        None => {
            log::info!("SMTP_HOST is not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let app_state = Arc::new(AppState {
        pipeline: Pipeline::new(sheets, notifier),
    });

    let app = build_router(app_state, &config.static_dir);

    let listener = TcpListener::bind(config.addr).await?;
    log::info!("Listening on http://{}", config.addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Routes for the builder: submission, export and the static builder UI.
pub fn build_router(state: Arc<AppState>, static_dir: impl AsRef<Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/submit-form", post(submit_form))
        .route("/.netlify/functions/submit-form", post(submit_form))
        .route("/api/export", post(export_form))
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(cors)
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    log::info!(
        "{} {} {} {:?}",
        method,
        path,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

async fn submit_form(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            log::warn!("Unreadable submission body: {}", rejection.body_text());
            let err = SubmitError::Malformed(rejection.body_text());
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(SubmitResponse::rejected(&err)))
                .into_response();
        }
    };
    let form = &request.form_config;

    match state.pipeline.submit(form, &request.submission_data).await {
        Ok(_) => Json(SubmitResponse::accepted(form.options.success_message.clone())).into_response(),
        Err(err) => {
            let status = match err {
                SubmitError::Sink(_) | SubmitError::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SubmitError::InvalidForm(_) | SubmitError::Validation(_) => StatusCode::OK,
            };
            (status, Json(SubmitResponse::rejected(&err))).into_response()
        }
    }
}

async fn export_form(Json(form): Json<FormDefinition>) -> Response {
    match export_json(&form) {
        Ok(json) => {
            let file_name: String = export_file_name(&form)
                .chars()
                .map(|c| match c {
                    '"' | '\\' => '_',
                    c if c.is_ascii_graphic() => c,
                    _ => '_',
                })
                .collect();

            (
                [
                    (header::CONTENT_TYPE, "application/json".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file_name),
                    ),
                ],
                json,
            )
                .into_response()
        }
        Err(e) => {
            log::error!("Failed to export '{}': {}", form.title, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "message": e.to_string() })),
            )
                .into_response()
        }
    }
}
