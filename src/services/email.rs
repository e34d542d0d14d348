//! Email notifications for borrowers

use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, Message},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::{
    config::EmailConfig,
    models::{
        asset::{AssetClass, AssetKey, DueDate},
        borrower::Borrower,
    },
};

const SUBJECT: &str = "Knowledge Centre Notification";

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Transport(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

/// A message to one or more recipients
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub to: Vec<String>,
    /// Hidden recipients, used when writing to several borrowers at once
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Copy the staff mailbox, when one is configured
    pub copy_staff: bool,
}

impl Notification {
    fn to_borrower(borrower: &Borrower, body: String) -> Self {
        Self {
            to: vec![borrower.email.clone()],
            bcc: Vec::new(),
            subject: SUBJECT.to_string(),
            body,
            copy_staff: false,
        }
    }

    pub fn checkout(borrower: &Borrower, key: &AssetKey, title: &str, due_date: Option<DueDate>) -> Self {
        let return_by = match due_date {
            Some(due) => format!("Remember to return it by {}.", due),
            None => "Remember to return it by the end of the day.".to_string(),
        };
        let mut notification = Self::to_borrower(
            borrower,
            format!(
                "Dear {},\nYou have borrowed the {} ({}) from the Knowledge Centre. {}\nThank you very much for using our service.\nRegards,",
                borrower.full_name(),
                key,
                title,
                return_by
            ),
        );
        notification.copy_staff = key.class == AssetClass::Textbook;
        notification
    }

    pub fn checkin(borrower: &Borrower, key: &AssetKey) -> Self {
        let mut notification = Self::to_borrower(
            borrower,
            format!(
                "Dear {},\nYou returned the {} to the Knowledge Centre successfully. Thank you for using our service.",
                borrower.full_name(),
                key
            ),
        );
        notification.copy_staff = key.class == AssetClass::Textbook;
        notification
    }

    pub fn reminder(borrower: &Borrower, key: &AssetKey, due_date: Option<DueDate>) -> Self {
        let return_by = match due_date {
            Some(due) => format!("It was due on {}.", due),
            None => "Please return it to the Knowledge Centre by the end of the day.".to_string(),
        };
        Self::to_borrower(
            borrower,
            format!(
                "Dear {},\nYou currently have the {} from the Knowledge Centre. {}\nThank you very much!",
                borrower.full_name(),
                key,
                return_by
            ),
        )
    }

    /// One message for every holder of a class, recipients hidden from each other
    pub fn reminder_all(emails: Vec<String>, label: &str) -> Self {
        Self {
            to: Vec::new(),
            bcc: emails,
            subject: SUBJECT.to_string(),
            body: format!(
                "Dear user,\nYou have a {} from the Knowledge Centre currently on loan. Please return it to the Knowledge Centre by the end of the day.\nThank you very much!",
                label
            ),
            copy_staff: false,
        }
    }
}

/// Outbound notification channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Send a notification, giving up after `timeout`
pub async fn deliver(
    notifier: &dyn Notifier,
    notification: Notification,
    timeout: Duration,
) -> Result<(), NotificationError> {
    match tokio::time::timeout(timeout, notifier.send(notification)).await {
        Ok(result) => result,
        Err(_) => Err(NotificationError::Timeout(timeout)),
    }
}

/// Send a notification in the background; failures are only logged
pub fn dispatch(
    notifier: Arc<dyn Notifier>,
    notification: Notification,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let recipients = notification.to.join(", ");
        match deliver(notifier.as_ref(), notification, timeout).await {
            Ok(()) => tracing::debug!(%recipients, "Notification sent"),
            Err(e) => tracing::warn!(%recipients, error = %e, "Notification failed"),
        }
    })
}

/// SMTP notifier
#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
    timeout: Duration,
}

impl EmailService {
    pub fn new(config: EmailConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    fn build_message(&self, notification: &Notification) -> Result<Message, NotificationError> {
        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Knowledge Centre");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| NotificationError::Address(e.to_string()))?;

        let mut builder = Message::builder()
            .from(from_mailbox.clone())
            .subject(notification.subject.clone());

        // Bcc-only messages are addressed to ourselves
        if notification.to.is_empty() {
            builder = builder.to(from_mailbox);
        }
        for to in &notification.to {
            builder = builder.to(parse_mailbox(to)?);
        }
        for bcc in &notification.bcc {
            builder = builder.bcc(parse_mailbox(bcc)?);
        }
        if notification.copy_staff {
            if let Some(staff) = &self.config.staff_copy {
                builder = builder.cc(parse_mailbox(staff)?);
            }
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(format!("{}\n\n{}", notification.body, self.config.signature))
            .map_err(|e| NotificationError::Build(e.to_string()))
    }

    fn build_transport(&self) -> Result<SmtpTransport, NotificationError> {
        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| NotificationError::Transport(e.to_string()))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port)
        .timeout(Some(self.timeout));

        let mailer_builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        Ok(mailer_builder.build())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    Mailbox::from_str(address).map_err(|e| NotificationError::Address(format!("{}: {}", address, e)))
}

#[async_trait]
impl Notifier for EmailService {
    async fn send(&self, notification: Notification) -> Result<(), NotificationError> {
        if !self.config.enabled {
            tracing::info!(
                to = ?notification.to,
                bcc = notification.bcc.len(),
                "Email disabled, notification not sent"
            );
            return Ok(());
        }

        let email = self.build_message(&notification)?;
        let mailer = self.build_transport()?;

        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(())
    }
}
