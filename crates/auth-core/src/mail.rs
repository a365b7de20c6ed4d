//! Outbound notification mail
//!
//! Requests only enqueue; a background worker drains the queue and hands each
//! message to a [`MailTransport`] under a deadline. Delivery failures are
//! logged and never reported back to the request that queued the message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::error::MailDispatchError;

/// Default sender address
pub const DEFAULT_FROM_ADDRESS: &str = "Reddit Clone <noreply@redditclone.local>";

/// Resend API endpoint
const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// A message for the mail collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEmail {
    pub subject: String,
    pub recipient: String,
    pub body: String,
}

impl NotificationEmail {
    /// Account activation message pointing at `activation_url`.
    pub fn activation(recipient: &str, activation_url: &str) -> Self {
        Self {
            subject: "Please Activate your Account".to_string(),
            recipient: recipient.to_string(),
            body: format!(
                "Thank you for signing up, please click on the below url to activate your account : {}",
                activation_url
            ),
        }
    }
}

/// Something that can deliver a [`NotificationEmail`].
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &NotificationEmail) -> Result<(), MailDispatchError>;
}

/// Writes messages to the log instead of delivering them. Used in development.
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &NotificationEmail) -> Result<(), MailDispatchError> {
        tracing::info!(
            recipient = %email.recipient,
            subject = %email.subject,
            "Mail (log transport): {}",
            email.body
        );
        Ok(())
    }
}

/// Resend API request payload
#[derive(Debug, Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Delivers mail through the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendTransport {
    client: reqwest::Client,
    api_key: String,
    from_address: String,
}

impl ResendTransport {
    pub fn new(api_key: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            from_address: from_address.into(),
        }
    }
}

#[async_trait]
impl MailTransport for ResendTransport {
    async fn send(&self, email: &NotificationEmail) -> Result<(), MailDispatchError> {
        let payload = ResendPayload {
            from: &self.from_address,
            to: [&email.recipient],
            subject: &email.subject,
            text: &email.body,
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailDispatchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MailDispatchError::Transport(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }
}

/// Handle for enqueueing mail. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MailQueue {
    sender: mpsc::Sender<NotificationEmail>,
}

impl MailQueue {
    /// Spawn the delivery worker and return the queue handle.
    ///
    /// The worker exits once every handle has been dropped and the queue is drained.
    pub fn start(
        transport: Arc<dyn MailTransport>,
        capacity: usize,
        send_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(deliver(receiver, transport, send_timeout));
        (Self { sender }, worker)
    }

    /// Hand `email` to the worker without waiting for delivery.
    pub fn enqueue(&self, email: NotificationEmail) -> Result<(), MailDispatchError> {
        self.sender.try_send(email).map_err(|e| match e {
            TrySendError::Full(email) => {
                tracing::warn!("Mail queue full, dropping mail to {}", email.recipient);
                MailDispatchError::QueueFull
            }
            TrySendError::Closed(email) => {
                tracing::error!("Mail queue closed, dropping mail to {}", email.recipient);
                MailDispatchError::QueueClosed
            }
        })
    }
}

async fn deliver(
    mut receiver: mpsc::Receiver<NotificationEmail>,
    transport: Arc<dyn MailTransport>,
    send_timeout: Duration,
) {
    while let Some(email) = receiver.recv().await {
        match tokio::time::timeout(send_timeout, transport.send(&email)).await {
            Ok(Ok(())) => tracing::info!("Activation email sent to {}", email.recipient),
            Ok(Err(e)) => {
                tracing::error!("Exception occurred when sending mail to {}: {}", email.recipient, e)
            }
            Err(_) => {
                let err = MailDispatchError::Timeout(send_timeout.as_millis() as u64);
                tracing::error!("Mail to {} not delivered: {}", email.recipient, err)
            }
        }
    }
    tracing::debug!("Mail worker stopped");
}
