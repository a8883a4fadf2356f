//! The SMTP sender collaborator (out of scope per spec §1, modeled at a
//! trait boundary). Consumes a rendered mail, returns a three-way outcome:
//! success, transient failure, or permanent failure (spec §4.E step 4).

use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message as LettreMessage, Tokio1Executor,
};

use crate::{error::SendError, render::RenderedMail};

/// How the SMTP gateway is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    None,
    StartTls,
    Ssl,
}

/// The SMTP sender. `client_message_id` is the `hex` correlation id,
/// propagated so downstream systems can deduplicate (spec §5).
#[async_trait]
pub trait SmtpSender: Send + Sync {
    async fn send(&self, mail: &RenderedMail, client_message_id: &str) -> Result<(), SendError>;
}

/// `lettre`-backed SMTP sender.
pub struct LettreSmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl LettreSmtpSender {
    /// # Errors
    ///
    /// Returns an error if the transport cannot be constructed (invalid
    /// hostname, TLS setup failure, etc).
    pub fn new(
        hostname: &str,
        port: u16,
        security: Security,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Self> {
        let credentials = Credentials::new(username.to_string(), password.to_string());

        let builder = match security {
            Security::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(hostname)?,
            Security::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(hostname)?,
            Security::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(hostname),
        };

        let transport = builder.port(port).credentials(credentials).build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl SmtpSender for LettreSmtpSender {
    #[tracing::instrument(skip(self, mail))]
    async fn send(&self, mail: &RenderedMail, client_message_id: &str) -> Result<(), SendError> {
        let from: Mailbox = format!("{} <{}>", mail.from_name, mail.from_email)
            .parse()
            .map_err(|e| SendError::Permanent(format!("invalid from address: {e}")))?;
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| SendError::Permanent(format!("invalid to address: {e}")))?;

        let mut builder = LettreMessage::builder()
            .from(from)
            .to(to)
            .message_id(Some(client_message_id.to_string()))
            .subject(&mail.subject);

        if let Some(reply_to) = &mail.reply_to {
            if let Ok(reply_to) = reply_to.parse::<Mailbox>() {
                builder = builder.reply_to(reply_to);
            }
        }

        let body = mail.html_body.clone().unwrap_or_else(|| mail.text_body.clone());
        let message = builder
            .body(body)
            .map_err(|e| SendError::Permanent(format!("failed to build message: {e}")))?;

        match self.transport.send(message).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_transient() => Err(SendError::Transient(e.to_string())),
            Err(e) => Err(SendError::Permanent(e.to_string())),
        }
    }
}

#[cfg(test)]
pub mod fake {
    use std::sync::{Arc, Mutex};

    use super::{async_trait, RenderedMail, SendError, SmtpSender};

    /// Outcome a [`FakeSmtpSender`] should report for its next call.
    #[derive(Debug, Clone)]
    pub enum Scripted {
        Success,
        Transient,
        Permanent,
    }

    /// In-memory SMTP sender test double, driven by a queue of scripted
    /// outcomes consumed one per call.
    #[derive(Clone)]
    pub struct FakeSmtpSender {
        script: Arc<Mutex<Vec<Scripted>>>,
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FakeSmtpSender {
        #[must_use]
        pub fn scripted(outcomes: Vec<Scripted>) -> Self {
            Self {
                script: Arc::new(Mutex::new(outcomes)),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        #[must_use]
        pub fn always(outcome: Scripted) -> Self {
            Self {
                script: Arc::new(Mutex::new(vec![outcome])),
                sent: Arc::new(Mutex::new(Vec::new())),
            }
        }

        #[must_use]
        pub fn sent_message_ids(&self) -> Vec<String> {
            self.sent
                .lock()
                .expect("lock poisoned")
                .iter()
                .map(|(_, id)| id.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SmtpSender for FakeSmtpSender {
        async fn send(&self, mail: &RenderedMail, client_message_id: &str) -> Result<(), SendError> {
            let mut script = self.script.lock().expect("lock poisoned");
            let outcome = if script.len() > 1 {
                script.remove(0)
            } else {
                script.first().cloned().unwrap_or(Scripted::Success)
            };
            drop(script);

            self.sent
                .lock()
                .expect("lock poisoned")
                .push((mail.to.clone(), client_message_id.to_string()));

            match outcome {
                Scripted::Success => Ok(()),
                Scripted::Transient => Err(SendError::Transient("simulated transient failure".to_string())),
                Scripted::Permanent => Err(SendError::Permanent("simulated permanent failure".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use fake::{FakeSmtpSender, Scripted};

    use super::*;

    fn sample_mail() -> RenderedMail {
        RenderedMail {
            from_name: "Acme".to_string(),
            from_email: "noreply@acme.test".to_string(),
            to: "user@example.com".to_string(),
            reply_to: None,
            subject: "Hello".to_string(),
            html_body: None,
            text_body: "Hi".to_string(),
        }
    }

    #[tokio::test]
    async fn fake_sender_reports_scripted_success() {
        let sender = FakeSmtpSender::always(Scripted::Success);
        assert!(sender.send(&sample_mail(), "a1").await.is_ok());
        assert_eq!(sender.sent_message_ids(), vec!["a1".to_string()]);
    }

    #[tokio::test]
    async fn fake_sender_reports_scripted_transient_failure() {
        let sender = FakeSmtpSender::always(Scripted::Transient);
        let err = sender.send(&sample_mail(), "a1").await.unwrap_err();
        assert!(matches!(err, SendError::Transient(_)));
    }

    #[tokio::test]
    async fn fake_sender_reports_scripted_permanent_failure() {
        let sender = FakeSmtpSender::always(Scripted::Permanent);
        let err = sender.send(&sample_mail(), "a1").await.unwrap_err();
        assert!(matches!(err, SendError::Permanent(_)));
    }
}
