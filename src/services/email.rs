use lettre::{
    Message, SmtpTransport, Transport,
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
};
use log::{info, error, warn};

/// Outbound customer notices. Delivery is best-effort: implementations log
/// failures and never report them to the workflow that asked.
#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    async fn send_approval_notice(&self, email: &str, name: &str);
}

/// SMTP delivery through lettre.
pub struct EmailService {
    host: String,
    port: u16,
    user: String,
    password: String,
    from: String,
}

impl EmailService {
    pub fn from_config() -> Self {
        EmailService {
            host: crate::config::Config::mail_host(),
            port: crate::config::Config::mail_port(),
            user: crate::config::Config::mail_user(),
            password: crate::config::Config::mail_password(),
            from: crate::config::Config::mail_from(),
        }
    }

    fn is_configured(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }

    fn build_approval_message(&self, email: &str, name: &str) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        let display_name = if name.is_empty() { "there" } else { name };

        let from_mailbox: Mailbox = self.from.parse()?;
        let to_mailbox: Mailbox = email.parse()?;

        let email_body = format!(
            r#"
            <!DOCTYPE html>
            <html>
            <body>
                <h1>Your request has been approved</h1>
                <p>Hello {},</p>
                <p>Your request with Modern Bank has been approved. The new account is now visible when you sign in.</p>
                <p>Best regards,<br><strong>Modern Bank</strong></p>
            </body>
            </html>
            "#,
            display_name
        );

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject("Account Request Approved!")
            .header(ContentType::TEXT_HTML)
            .body(email_body)?;
        Ok(message)
    }
}

#[rocket::async_trait]
impl Notifier for EmailService {
    async fn send_approval_notice(&self, email: &str, name: &str) {
        if !self.is_configured() {
            warn!("Email credentials not configured. Skipping approval notice to {}", email);
            return;
        }

        let message = match self.build_approval_message(email, name) {
            Ok(m) => m,
            Err(e) => {
                error!("Failed to build approval email for {}: {}", email, e);
                return;
            }
        };

        let mailer = match SmtpTransport::relay(&self.host) {
            Ok(builder) => builder
                .port(self.port)
                .credentials(Credentials::new(self.user.clone(), self.password.clone()))
                .build(),
            Err(e) => {
                error!("Failed to configure SMTP relay {}: {}", self.host, e);
                return;
            }
        };

        // The SMTP exchange blocks; let it finish on its own.
        let recipient = email.to_string();
        tokio::task::spawn_blocking(move || match mailer.send(&message) {
            Ok(_) => info!("Approval email sent to {}", recipient),
            Err(e) => error!("Failed to send approval email to {}: {}", recipient, e),
        });
    }
}
