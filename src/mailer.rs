use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;
use crate::field::SubmissionValues;
use crate::form::FormDefinition;

#[cfg(feature = "web")]
use crate::config::SmtpSettings;
#[cfg(feature = "web")]
use lettre::message::Mailbox;
#[cfg(feature = "web")]
use lettre::transport::smtp::authentication::Credentials;
#[cfg(feature = "web")]
use lettre::transport::smtp::client::{Tls, TlsParameters};
#[cfg(feature = "web")]
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Who to tell about new submissions.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    #[serde(rename = "notificationEmail")]
    pub email: String,

    #[serde(rename = "emailNotifications")]
    pub enabled: bool,
}

impl NotifyConfig {
    /// The address to notify, if notifications are switched on and set.
    pub fn recipient(&self) -> Option<&str> {
        let email = self.email.trim();
        (self.enabled && !email.is_empty()).then_some(email)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Summarises a submission as `label: value` lines in form order.
    pub fn for_submission(
        to: &str,
        form: &FormDefinition,
        values: &SubmissionValues,
        at: DateTime<Utc>,
    ) -> Self {
        let lines: Vec<String> = form
            .fields
            .iter()
            .filter_map(|field| {
                values
                    .get(&field.id)
                    .map(|value| format!("{}: {}", field.label, value.to_cell()))
            })
            .collect();

        let body = format!(
            "New form submission received:\n\nForm: {}\nTime: {}\n\nSubmission data:\n{}\n",
            form.title,
            at.format("%Y-%m-%d %H:%M:%S UTC"),
            lines.join("\n")
        );

        Notification {
            to: to.to_string(),
            subject: format!("New form submission: {}", form.title),
            body,
        }
    }
}

/// A destination for submission notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Writes notifications to the log instead of sending them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        log::info!(
            "Email notification to {} ({}):\n{}",
            notification.to,
            notification.subject,
            notification.body
        );
        Ok(())
    }
}

/// Sends notifications over SMTP with implicit TLS.
#[cfg(feature = "web")]
pub struct Mailer {
    smtp: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

#[cfg(feature = "web")]
impl Mailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotificationError> {
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());

        let tls_parameters = TlsParameters::new(settings.host.clone())
            .map_err(|e| NotificationError::Build(e.to_string()))?;

        let smtp = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
            .map_err(|e| NotificationError::Build(e.to_string()))?
            .credentials(creds)
            .port(settings.port)
            .tls(Tls::Wrapper(tls_parameters))
            .build();

        let from = settings
            .from
            .parse()
            .map_err(|_| NotificationError::InvalidAddress(settings.from.clone()))?;

        Ok(Mailer { smtp, from })
    }
}

#[cfg(feature = "web")]
#[async_trait]
impl Notifier for Mailer {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        let to: Mailbox = notification
            .to
            .parse()
            .map_err(|_| NotificationError::InvalidAddress(notification.to.clone()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject.clone())
            .body(notification.body.clone())
            .map_err(|e| NotificationError::Build(e.to_string()))?;

        self.smtp
            .send(email)
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        log::debug!("Sent notification to {}", notification.to);
        Ok(())
    }
}
