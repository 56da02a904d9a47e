use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
pub const DEFAULT_SMTP_PORT: u16 = 465;

/// Server settings, read from the environment.
///
/// | Variable | Default |
/// |---|---|
/// | `FORMSHEET_ADDR` | `127.0.0.1:3000` |
/// | `FORMSHEET_STATIC_DIR` | `static` |
/// | `GOOGLE_SERVICE_ACCOUNT_KEY` | unset: spreadsheet sink unavailable |
/// | `SHEETS_API_BASE` | `https://sheets.googleapis.com/v4` |
/// | `SMTP_HOST` | unset: notifications are only logged |
/// | `SMTP_PORT` | `465` |
/// | `SMTP_USERNAME`, `SMTP_PASSWORD` | empty |
/// | `SMTP_FROM` | `SMTP_USERNAME` |
#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    pub sheets_api_base: String,
    /// Raw service account key JSON.
    pub service_account_key: Option<String>,
    pub smtp: Option<SmtpSettings>,
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .finish()
    }
}

fn parse_addr(name: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
        name,
        message: format!("`{}`: {}", value, e),
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source. Empty
    /// values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let addr = parse_addr(
            "FORMSHEET_ADDR",
            &get("FORMSHEET_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string()),
        )?;

        let smtp = match get("SMTP_HOST") {
            Some(host) => {
                let port = match get("SMTP_PORT") {
                    Some(port) => port.trim().parse().map_err(|_| ConfigError::Invalid {
                        name: "SMTP_PORT",
                        message: format!("`{}` is not a port number", port),
                    })?,
                    None => DEFAULT_SMTP_PORT,
                };
                let username = get("SMTP_USERNAME").unwrap_or_default();
                Some(SmtpSettings {
                    host,
                    port,
                    password: get("SMTP_PASSWORD").unwrap_or_default(),
                    from: get("SMTP_FROM").unwrap_or_else(|| username.clone()),
                    username,
                })
            }
            None => None,
        };

        Ok(Config {
            addr,
            static_dir: get("FORMSHEET_STATIC_DIR")
                .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string())
                .into(),
            sheets_api_base: get("SHEETS_API_BASE")
                .unwrap_or_else(|| DEFAULT_SHEETS_API_BASE.to_string()),
            service_account_key: get("GOOGLE_SERVICE_ACCOUNT_KEY"),
            smtp,
        })
    }

    /// Overrides the bind address, e.g. from the command line.
    pub fn with_addr(mut self, addr: &str) -> Result<Self, ConfigError> {
        self.addr = parse_addr("address argument", addr)?;
        Ok(self)
    }
}
