//! SMTP mail channel: async lettre transport over STARTTLS.

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use segurospy_core::config::EmailConfig;
use segurospy_core::error::{Result, SegurosError};

/// Sends transactional HTML mail through one SMTP relay.
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn sender(&self) -> Result<Mailbox> {
        let address: Address = self.config.from.parse().map_err(|e| {
            SegurosError::Delivery(format!("Invalid from address '{}': {e}", self.config.from))
        })?;
        Ok(Mailbox::new(self.config.from_name.clone(), address))
    }

    /// Build the MIME message without sending it.
    pub fn build_message(&self, to: &str, subject: &str, html_body: &str) -> Result<Message> {
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| SegurosError::Delivery(format!("Invalid recipient '{to}': {e}")))?;

        Message::builder()
            .from(self.sender()?)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| SegurosError::Delivery(format!("Build email: {e}")))
    }

    pub async fn send_html(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        if self.config.smtp_user.is_empty() {
            tracing::warn!("⚠️ SMTP not configured, mail to {to} dropped");
            return Err(SegurosError::Delivery("SMTP not configured".into()));
        }

        let email = self.build_message(to, subject, html_body)?;
        let creds = Credentials::new(
            self.config.smtp_user.clone(),
            self.config.smtp_password.clone(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| SegurosError::Delivery(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| SegurosError::Delivery(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to {to}: {subject}");
        Ok(())
    }
}
