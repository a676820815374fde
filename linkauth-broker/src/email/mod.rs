//! Outbound notification delivery

pub mod console;
pub mod smtp;

pub use console::ConsoleEmailSender;
pub use smtp::{SmtpConfig, SmtpEmailSender};

/// One message to one recipient, with plain-text and HTML bodies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub subject: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub text_body: String,
    pub html_body: String,
}

impl OutboundEmail {
    /// Email verification link (`/verifyemail/<id>`)
    pub fn verification(site_url: &str, name: &str, email: &str, verification_id: &str) -> Self {
        let link = format!("{}/verifyemail/{}", site_url.trim_end_matches('/'), verification_id);
        Self {
            subject: "Verify your email".to_string(),
            recipient_name: name.to_string(),
            recipient_email: email.to_string(),
            text_body: format!("Go to {} to verify your email", link),
            html_body: format!("Click <a href=\"{}\">here</a> to verify your email", link),
        }
    }

    /// Password reset link carrying the reset code and user ID
    pub fn password_reset(site_url: &str, name: &str, email: &str, code: &str, user_id: &str) -> Self {
        let link = format!(
            "{}/reset-password?code={}&uid={}",
            site_url.trim_end_matches('/'),
            code,
            user_id
        );
        Self {
            subject: "Reset your password".to_string(),
            recipient_name: name.to_string(),
            recipient_email: email.to_string(),
            text_body: format!(
                "Go to {} to reset your password. If you didn't request this, you can safely ignore this email.",
                link
            ),
            html_body: format!(
                "Click <a href=\"{}\">here</a> to reset your password. If you didn't request this, you can safely ignore this email.",
                link
            ),
        }
    }

    /// Notice that an account was deactivated
    pub fn deactivated(name: &str, email: &str) -> Self {
        let text = "Your account has been deactivated and all login methods were removed.";
        Self {
            subject: "Your account has been deactivated".to_string(),
            recipient_name: name.to_string(),
            recipient_email: email.to_string(),
            text_body: text.to_string(),
            html_body: format!("<p>{}</p>", text),
        }
    }
}

/// Trait for delivering notifications
pub trait EmailSender: Send + Sync {
    fn send(&self, email: &OutboundEmail) -> Result<(), String>;
}

/// Allow using Box<dyn EmailSender> as an EmailSender
impl EmailSender for Box<dyn EmailSender> {
    fn send(&self, email: &OutboundEmail) -> Result<(), String> {
        (**self).send(email)
    }
}
