//! Notification delivery over an SMTP relay

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Deserialize;

use super::{EmailSender, OutboundEmail};
use crate::config::get_env;

/// Port on which the relay speaks TLS from the first byte
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    /// 465 connects with implicit TLS; any other port upgrades with STARTTLS
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Sender mailbox, either `addr@host` or `Name <addr@host>`
    pub sender: String,
}

impl SmtpConfig {
    /// `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD` and `SMTP_FROM_EMAIL` are
    /// required; `SMTP_PORT` defaults to 465 and `SMTP_FROM_NAME` is optional.
    pub fn from_env() -> Option<Self> {
        let from_email = get_env("SMTP_FROM_EMAIL")?;
        let sender = match get_env("SMTP_FROM_NAME") {
            Some(name) => format!("{} <{}>", name, from_email),
            None => from_email,
        };

        Some(Self {
            host: get_env("SMTP_HOST")?,
            port: get_env("SMTP_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(IMPLICIT_TLS_PORT),
            username: get_env("SMTP_USERNAME")?,
            password: get_env("SMTP_PASSWORD")?,
            sender,
        })
    }
}

pub struct SmtpEmailSender {
    transport: SmtpTransport,
    sender: Mailbox,
}

impl SmtpEmailSender {
    /// Connect to the relay once up front so a bad configuration fails at startup
    pub fn new(config: SmtpConfig) -> Result<Self, String> {
        let sender: Mailbox = config
            .sender
            .parse()
            .map_err(|e| format!("invalid sender {:?}: {}", config.sender, e))?;

        let builder = if config.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
        }
        .map_err(|e| format!("SMTP relay {}: {}", config.host, e))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();

        match transport.test_connection() {
            Ok(true) => {}
            Ok(false) => return Err(format!("SMTP relay {} refused the connection", config.host)),
            Err(e) => return Err(format!("SMTP relay {}: {}", config.host, e)),
        }
        tracing::info!(host = %config.host, port = config.port, "SMTP relay reachable");

        Ok(Self { transport, sender })
    }

    fn compose(&self, email: &OutboundEmail) -> Result<Message, String> {
        let address = email
            .recipient_email
            .parse()
            .map_err(|e| format!("invalid recipient {}: {}", email.recipient_email, e))?;
        let name = Some(email.recipient_name.trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        Message::builder()
            .from(self.sender.clone())
            .to(Mailbox::new(name, address))
            .subject(email.subject.as_str())
            .multipart(MultiPart::alternative_plain_html(
                email.text_body.clone(),
                email.html_body.clone(),
            ))
            .map_err(|e| format!("composing message: {}", e))
    }
}

impl EmailSender for SmtpEmailSender {
    fn send(&self, email: &OutboundEmail) -> Result<(), String> {
        let message = self.compose(email)?;
        self.transport
            .send(&message)
            .map_err(|e| format!("SMTP delivery: {}", e))?;

        tracing::info!(email = %email.recipient_email, subject = %email.subject, "Notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_sender_rejected_before_connecting() {
        let config = SmtpConfig {
            host: "smtp.invalid".to_string(),
            port: 587,
            username: "u".to_string(),
            password: "p".to_string(),
            sender: "not a mailbox".to_string(),
        };
        let err = SmtpEmailSender::new(config).err().unwrap();
        assert!(err.contains("invalid sender"));
    }
}
