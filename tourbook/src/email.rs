//! Email service for welcome and password reset emails.
//!
//! Every message is sent as multipart/alternative with a plain text and an HTML body, both
//! rendered from the embedded templates.

use lettre::{
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use minijinja::context;
use std::path::Path;
use tracing::instrument;

use crate::{
    config::{Config, EmailTransportConfig},
    errors::Error,
    templates,
};

pub struct EmailService {
    transport: EmailTransport,
    from_email: String,
    from_name: String,
    reset_valid_minutes: u64,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

/// Who a message goes to
#[derive(Debug, Clone, Copy)]
pub struct Recipient<'a> {
    pub name: &'a str,
    pub email: &'a str,
}

impl Recipient<'_> {
    fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(self.name)
    }
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            EmailTransportConfig::File { path } => {
                // Use file transport for development/testing
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        Ok(Self {
            transport,
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            reset_valid_minutes: config.auth.password_reset_token_duration.as_secs() / 60,
        })
    }

    /// Greet a new account and point them at their account page.
    #[instrument(skip(self, to), fields(to = %to.email), err)]
    pub async fn send_welcome(&self, to: Recipient<'_>, url: &str) -> Result<(), Error> {
        let subject = format!("Welcome to the {} family!", self.from_name);
        let ctx = context! {
            subject => &subject,
            first_name => to.first_name(),
            from_name => &self.from_name,
            url => url,
        };
        let html = templates::render("email/welcome.html", &ctx)?;
        let text = templates::render("email/welcome.txt", &ctx)?;

        self.send_email(to, &subject, text, html).await
    }

    /// Send the reset link carrying the plaintext token.
    #[instrument(skip(self, to, url), fields(to = %to.email), err)]
    pub async fn send_password_reset(&self, to: Recipient<'_>, url: &str) -> Result<(), Error> {
        let subject = format!("Your password reset token (valid for only {} minutes)", self.reset_valid_minutes);
        let ctx = context! {
            subject => &subject,
            first_name => to.first_name(),
            from_name => &self.from_name,
            url => url,
            valid_minutes => self.reset_valid_minutes,
        };
        let html = templates::render("email/password_reset.html", &ctx)?;
        let text = templates::render("email/password_reset.txt", &ctx)?;

        self.send_email(to, &subject, text, html).await
    }

    async fn send_email(&self, to: Recipient<'_>, subject: &str, text: String, html: String) -> Result<(), Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let to = format!("{} <{}>", to.name, to.email).parse::<Mailbox>().map_err(|e| Error::Internal {
            operation: format!("parse to email: {e}"),
        })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(text, html))
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })?;

        // Send based on transport type
        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Delivery {
                    message: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Delivery {
                    message: format!("send file email: {e}"),
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;

    fn recipient() -> Recipient<'static> {
        Recipient {
            name: "Leo J. Gillespie",
            email: "leo@example.com",
        }
    }

    fn read_single_email(dir: &Path) -> String {
        let entries: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "eml"))
            .collect();
        assert_eq!(entries.len(), 1);
        // Undo quoted-printable soft line breaks
        std::fs::read_to_string(&entries[0]).unwrap().replace("=\r\n", "").replace("=\n", "")
    }

    #[tokio::test]
    async fn test_password_reset_email_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::File {
            path: dir.path().to_string_lossy().to_string(),
        };

        let service = EmailService::new(&config).unwrap();
        service
            .send_password_reset(recipient(), "http://localhost:3000/api/v1/users/resetPassword/abc123")
            .await
            .unwrap();

        let email = read_single_email(dir.path());
        assert!(email.contains("Your password reset token (valid for only 10 minutes)"));
        assert!(email.contains("multipart/alternative"));
        assert!(email.contains("text/plain"));
        assert!(email.contains("text/html"));
        assert!(email.contains("Hi Leo,"));
        assert!(email.contains("resetPassword/abc123"));
    }

    #[tokio::test]
    async fn test_welcome_email_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::File {
            path: dir.path().to_string_lossy().to_string(),
        };

        let service = EmailService::new(&config).unwrap();
        service.send_welcome(recipient(), "http://localhost:3000/me").await.unwrap();

        let email = read_single_email(dir.path());
        assert!(email.contains("Welcome to the Tourbook family!"));
        assert!(email.contains("http://localhost:3000/me"));
    }

    #[tokio::test]
    async fn test_delivery_failure_is_reported() {
        // A regular file where the mail directory should be
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = create_test_config();
        config.email.transport = EmailTransportConfig::File {
            path: file.path().to_string_lossy().to_string(),
        };

        let service = EmailService::new(&config).unwrap();
        let err = service.send_welcome(recipient(), "http://localhost:3000/me").await.unwrap_err();
        assert!(matches!(err, Error::Delivery { .. }));
    }
}
