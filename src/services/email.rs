// Outbound message transport
//
// The engine only sees the `MessageTransport` trait; `SmtpMailer` is the
// production implementation over a pooled async SMTP connection.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::{PoolConfig, authentication::Credentials},
};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::config::SmtpConfig;
use crate::models::MessageRecipient;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid address '{0}'")]
    Address(String),
    #[error("Send failed: {0}")]
    Send(String),
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(
        &self,
        recipient: &MessageRecipient,
        subject: &str,
        body: &str,
        is_rich: bool,
    ) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpMailer {
    pub fn new(smtp_config: &SmtpConfig) -> Result<Self, TransportError> {
        let creds = Credentials::new(smtp_config.username.clone(), smtp_config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(SmtpMailer {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        })
    }
}

#[async_trait]
impl MessageTransport for SmtpMailer {
    async fn send(
        &self,
        recipient: &MessageRecipient,
        subject: &str,
        body: &str,
        is_rich: bool,
    ) -> Result<(), TransportError> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|_| TransportError::Address(self.from_email.clone()))?;

        let to = match &recipient.name {
            Some(name) => format!("{} <{}>", name, recipient.email),
            None => recipient.email.clone(),
        }
        .parse::<Mailbox>()
        .map_err(|_| TransportError::Address(recipient.email.clone()))?;

        let content_type = if is_rich {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(content_type)
            .body(body.to_string())
            .map_err(|e| TransportError::Send(e.to_string()))?;

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", recipient.email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", recipient.email, e);
                Err(TransportError::Send(e.to_string()))
            }
        }
    }
}
