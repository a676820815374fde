//! Development sender: notifications are written to stderr

use super::{EmailSender, OutboundEmail};

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleEmailSender;

impl ConsoleEmailSender {
    pub fn new() -> Self {
        Self
    }
}

impl EmailSender for ConsoleEmailSender {
    fn send(&self, email: &OutboundEmail) -> Result<(), String> {
        let rule = "-".repeat(60);
        eprintln!(
            "{rule}\nTo:      {} <{}>\nSubject: {}\n\n{}\n{rule}",
            email.recipient_name, email.recipient_email, email.subject, email.text_body
        );

        tracing::debug!(email = %email.recipient_email, subject = %email.subject, "Notification printed");
        Ok(())
    }
}
