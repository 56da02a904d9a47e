//! Google Sheets v4 client.
//!
//! Implements the [`SheetsApi`] operations over plain REST calls with
//! `reqwest`, authenticating either with a fixed bearer token or with a
//! service account key through the OAuth 2.0 JWT-bearer flow.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tokio::sync::RwLock;

use crate::config::DEFAULT_SHEETS_API_BASE;
use crate::error::SinkError;
use crate::sink::{
    STEP_APPEND, STEP_CREATE_SHEET, STEP_METADATA, STEP_READ_HEADER, STEP_WRITE_HEADER, SheetsApi,
};

const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens are refreshed this long before Google says they expire.
const TOKEN_SLACK_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The parts of a Google service account key file we use.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum Credentials {
    ServiceAccount(ServiceAccountKey),
    Bearer(String),
}

impl Credentials {
    /// Parses the JSON key file downloaded from the Google Cloud console.
    pub fn from_service_account_json(json: &str) -> Result<Self, SinkError> {
        serde_json::from_str(json)
            .map(Credentials::ServiceAccount)
            .map_err(|e| SinkError::Auth(format!("unreadable service account key: {}", e)))
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Google Sheets client
pub struct GoogleSheetsClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
    access_token: RwLock<Option<CachedToken>>,
}

impl GoogleSheetsClient {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_base_url(credentials, DEFAULT_SHEETS_API_BASE)
    }

    pub fn with_base_url(credentials: Credentials, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            access_token: RwLock::new(None),
        }
    }

    async fn token(&self) -> Result<String, SinkError> {
        let key = match &self.credentials {
            Credentials::Bearer(token) => return Ok(token.clone()),
            Credentials::ServiceAccount(key) => key,
        };

        {
            let cached = self.access_token.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.expires_at - Duration::seconds(TOKEN_SLACK_SECS) > Utc::now() {
                    return Ok(cached.token.clone());
                }
            }
        }

        let fresh = self.fetch_token(key).await?;
        let token = fresh.token.clone();
        *self.access_token.write().await = Some(fresh);
        Ok(token)
    }

    /// Exchanges a signed assertion for an access token.
    async fn fetch_token(&self, key: &ServiceAccountKey) -> Result<CachedToken, SinkError> {
        let now = Utc::now();
        let claims = Claims {
            iss: &key.client_email,
            scope: SHEETS_SCOPE,
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SinkError::Auth(format!("invalid private key: {}", e)))?;
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| SinkError::Auth(format!("failed to sign assertion: {}", e)))?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| SinkError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Auth(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SinkError::Auth(format!("unreadable token response: {}", e)))?;

        log::debug!("Obtained access token for {}", key.client_email);
        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }

    fn spreadsheet_url(&self, spreadsheet_id: &str) -> String {
        format!(
            "{}/spreadsheets/{}",
            self.base_url,
            urlencoding::encode(spreadsheet_id)
        )
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(spreadsheet_id),
            urlencoding::encode(range)
        )
    }

    /// Sends an authenticated request, turning non-2xx answers into errors.
    async fn send(&self, step: &'static str, request: RequestBuilder) -> Result<Response, SinkError> {
        let token = self.token().await?;

        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| SinkError::Transport {
                step,
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        log::warn!("Sheets API {} returned {}: {}", step, status, message);

        Err(SinkError::Api {
            step,
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        step: &'static str,
        request: RequestBuilder,
    ) -> Result<T, SinkError> {
        self.send(step, request)
            .await?
            .json()
            .await
            .map_err(|e| SinkError::Transport {
                step,
                message: format!("unreadable response: {}", e),
            })
    }
}

#[async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn sheet_titles(&self, spreadsheet_id: &str) -> Result<Vec<String>, SinkError> {
        let request = self
            .client
            .get(self.spreadsheet_url(spreadsheet_id))
            .query(&[("fields", "sheets.properties.title")]);

        let metadata: SpreadsheetMetadata = self.send_json(STEP_METADATA, request).await?;
        Ok(metadata
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    async fn create_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<(), SinkError> {
        let request = self
            .client
            .post(format!("{}:batchUpdate", self.spreadsheet_url(spreadsheet_id)))
            .json(&json!({
                "requests": [{ "addSheet": { "properties": { "title": title } } }]
            }));

        self.send(STEP_CREATE_SHEET, request).await?;
        Ok(())
    }

    async fn get_values(&self, spreadsheet_id: &str, range: &str) -> Result<Vec<Vec<String>>, SinkError> {
        let request = self.client.get(self.values_url(spreadsheet_id, range));

        let values: ValueRange = self.send_json(STEP_READ_HEADER, request).await?;
        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect())
    }

    async fn update_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SinkError> {
        let request = self
            .client
            .put(self.values_url(spreadsheet_id, range))
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({ "values": rows }));

        self.send(STEP_WRITE_HEADER, request).await?;
        Ok(())
    }

    async fn append_values(
        &self,
        spreadsheet_id: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), SinkError> {
        let request = self
            .client
            .post(format!("{}:append", self.values_url(spreadsheet_id, range)))
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": rows }));

        self.send(STEP_APPEND, request).await?;
        Ok(())
    }
}
