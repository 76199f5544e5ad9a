use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Where verification and reset codes go.
pub enum Mailer {
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
    /// No SMTP configured: the mail (code included) is written to the log.
    Log,
    /// Keeps every mail in memory; tests read codes back from here.
    Outbox(Arc<Mutex<Vec<OutgoingMail>>>),
}

impl Mailer {
    pub fn smtp(settings: &SmtpSettings) -> Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .with_context(|| format!("invalid sender address '{}'", settings.from))?;

        // 465 is implicit TLS, local relays are plain, anything else negotiates STARTTLS
        let mut builder = if settings.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
        } else if settings.host == "localhost" || settings.host == "127.0.0.1" {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
        };
        builder = builder.port(settings.port);

        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        info!("Mail goes through SMTP {}:{}", settings.host, settings.port);
        Ok(Mailer::Smtp {
            transport: builder.build(),
            from,
        })
    }

    pub fn outbox() -> Self {
        Mailer::Outbox(Arc::new(Mutex::new(Vec::new())))
    }

    /// Mails captured so far. Always empty unless this is an outbox.
    pub fn sent(&self) -> Vec<OutgoingMail> {
        match self {
            Mailer::Outbox(outbox) => outbox.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            _ => Vec::new(),
        }
    }

    pub async fn send(&self, mail: OutgoingMail) -> Result<()> {
        match self {
            Mailer::Smtp { transport, from } => {
                let to: Mailbox = mail
                    .to
                    .parse()
                    .with_context(|| format!("invalid recipient '{}'", mail.to))?;
                let message = Message::builder()
                    .from(from.clone())
                    .to(to)
                    .subject(mail.subject)
                    .header(ContentType::TEXT_PLAIN)
                    .body(mail.body)?;
                transport.send(message).await.context("SMTP send failed")?;
            }
            Mailer::Log => {
                info!("Mail to {} -- {}\n{}", mail.to, mail.subject, mail.body);
            }
            Mailer::Outbox(outbox) => {
                outbox.lock().unwrap_or_else(PoisonError::into_inner).push(mail);
            }
        }
        Ok(())
    }
}

pub fn verification_mail(to: &str, code: &str, ttl_minutes: i64) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Your WapiBei verification code".into(),
        body: format!(
            "Karibu WapiBei!\n\nYour verification code is {code}.\nIt expires in {ttl_minutes} minutes."
        ),
    }
}

pub fn reset_mail(to: &str, code: &str, ttl_minutes: i64) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Reset your WapiBei password".into(),
        body: format!(
            "Use the code {code} to choose a new password.\nIt expires in {ttl_minutes} minutes.\n\
             If you did not ask for this, ignore this mail."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outbox_keeps_mail_in_order() {
        let mailer = Mailer::outbox();
        mailer.send(verification_mail("a@example.com", "123456", 10)).await.unwrap();
        mailer.send(reset_mail("b@example.com", "654321", 10)).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "a@example.com");
        assert!(sent[0].body.contains("123456"));
        assert!(sent[1].subject.contains("Reset"));
    }

    #[test]
    fn smtp_rejects_bad_sender() {
        let settings = SmtpSettings {
            host: "localhost".into(),
            port: 1025,
            username: None,
            password: None,
            from: "not an address".into(),
        };
        assert!(Mailer::smtp(&settings).is_err());
    }
}
