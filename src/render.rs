//! The template renderer collaborator (out of scope per spec §1, modeled
//! at a trait boundary). Produces either a rendered mail or a typed
//! failure, per the sum-type guidance in spec §9.

use async_trait::async_trait;
use handlebars::Handlebars;

use crate::{
    error::RenderError,
    formstore::FormRecord,
    message::Field,
};

/// A fully rendered outbound mail, ready to hand to the SMTP sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub from_name: String,
    pub from_email: String,
    pub to: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub html_body: Option<String>,
    pub text_body: String,
}

/// The template renderer. Consumes a form record, its submitted fields,
/// the provenance label, and an optional attachment-download URL; returns
/// a rendered mail or a typed, permanent failure.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        form: &FormRecord,
        fields: &[Field],
        origin: &str,
        attachment_url: Option<&str>,
    ) -> Result<RenderedMail, RenderError>;
}

/// Handlebars-backed renderer. Templates are looked up by the form's
/// `handler.template` reference and rendered with the submitted fields,
/// `origin`, and `attachment_url` available in the template context.
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        Self { registry }
    }

    /// Register a template under `name` so it can be referenced by a form's
    /// `handler.template`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails to parse.
    pub fn register_template(
        &mut self,
        name: &str,
        source: &str,
    ) -> Result<(), handlebars::TemplateError> {
        self.registry.register_template_string(name, source)
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Renderer for HandlebarsRenderer {
    #[tracing::instrument(skip(self, form, fields))]
    async fn render(
        &self,
        form: &FormRecord,
        fields: &[Field],
        origin: &str,
        attachment_url: Option<&str>,
    ) -> Result<RenderedMail, RenderError> {
        let Some(handler) = &form.handler else {
            return Err(RenderError::MissingHandler);
        };

        let mut context = serde_json::Map::new();
        for field in fields {
            context.insert(field.name.clone(), serde_json::Value::String(field.value.clone()));
        }
        context.insert("origin".to_string(), serde_json::Value::String(origin.to_string()));
        if let Some(url) = attachment_url {
            context.insert(
                "attachment_url".to_string(),
                serde_json::Value::String(url.to_string()),
            );
        }

        let body = self
            .registry
            .render(&handler.template, &context)
            .map_err(|e| RenderError::MissingTemplate(e.to_string()))?;

        if body.trim().is_empty() {
            return Err(RenderError::NoContent);
        }

        let subject = context
            .get("subject")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        if subject.is_empty() {
            return Err(RenderError::NoSubject);
        }

        Ok(RenderedMail {
            from_name: handler.from_name.clone(),
            from_email: handler.from_email.clone(),
            to: handler.to.clone(),
            reply_to: handler.reply_to.clone(),
            subject,
            html_body: Some(body.clone()),
            text_body: body,
        })
    }
}

/// Build the fixed OTP mail directly, bypassing the renderer and any
/// attachment handling (spec §4.E step 1, §8 invariant 7).
#[must_use]
pub fn synthesize_otp_mail(code: &str, from_name: &str, from_email: &str, to: &str) -> RenderedMail {
    RenderedMail {
        from_name: from_name.to_string(),
        from_email: from_email.to_string(),
        to: to.to_string(),
        reply_to: None,
        subject: format!("OTP Code: {code}"),
        html_body: None,
        text_body: format!("Your one-time code is {code}."),
    }
}

#[cfg(test)]
pub mod fake {
    use std::sync::{Arc, Mutex};

    use super::{async_trait, FormRecord, RenderError, RenderedMail, Renderer};
    use crate::message::Field;

    /// In-memory renderer test double. Returns a preset outcome and records
    /// every invocation.
    #[derive(Clone)]
    pub struct FakeRenderer {
        outcome: Arc<Mutex<Result<RenderedMail, RenderError>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl FakeRenderer {
        #[must_use]
        pub fn always_ok(mail: RenderedMail) -> Self {
            Self {
                outcome: Arc::new(Mutex::new(Ok(mail))),
                calls: Arc::new(Mutex::new(0)),
            }
        }

        #[must_use]
        pub fn always_err(err: RenderError) -> Self {
            Self {
                outcome: Arc::new(Mutex::new(Err(err))),
                calls: Arc::new(Mutex::new(0)),
            }
        }

        #[must_use]
        pub fn call_count(&self) -> usize {
            *self.calls.lock().expect("lock poisoned")
        }
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(
            &self,
            _form: &FormRecord,
            _fields: &[Field],
            _origin: &str,
            _attachment_url: Option<&str>,
        ) -> Result<RenderedMail, RenderError> {
            *self.calls.lock().expect("lock poisoned") += 1;
            self.outcome.lock().expect("lock poisoned").clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_mail_has_expected_subject_and_no_attachments() {
        let mail = synthesize_otp_mail("123456", "Acme", "noreply@acme.test", "user@example.com");
        assert_eq!(mail.subject, "OTP Code: 123456");
        assert_eq!(mail.to, "user@example.com");
        assert!(mail.html_body.is_none());
    }
}
