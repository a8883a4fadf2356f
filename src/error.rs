//! Layered error taxonomy for the mailer pipeline.
//!
//! Mirrors the permanent/temporary/system split used for delivery errors
//! elsewhere in this codebase, specialised to the stages an attempt passes
//! through: decode, lookup, render, send, and the side effects cleanup
//! performs once an outcome is known.

use thiserror::Error;

/// Top-level error type returned by bootstrap and by any call site that
/// cannot itself decide how to classify a failure.
#[derive(Debug, Error)]
pub enum MailerError {
    /// Unrecoverable startup failure. The process should abort.
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[from] BootstrapError),

    /// A stream entry could not be decoded into a `Message`.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// A referenced form record does not exist.
    #[error("lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// The renderer reported a permanent failure for this message.
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// The SMTP sender reported an outcome other than success.
    #[error("send failed: {0}")]
    Send(#[from] SendError),

    /// A cleanup side effect (object-store or side-state op) failed.
    #[error("side effect failed: {0}")]
    SideEffect(#[from] SideEffectError),
}

impl MailerError {
    /// Returns `true` if this error should abort the process.
    #[must_use]
    pub const fn is_bootstrap_fatal(&self) -> bool {
        matches!(self, Self::Bootstrap(_))
    }

    /// Returns `true` if this error is terminal for the message (no retry).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Lookup(_) | Self::Render(_) | Self::Send(SendError::Permanent(_))
        )
    }

    /// Returns `true` if this error should route the message to the retry branch.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Send(SendError::Transient(_)))
    }
}

/// Errors that abort the process at startup.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("form store authentication failed: {0}")]
    FormStoreAuth(String),

    #[error("target stream {0:?} does not exist")]
    StreamAbsent(String),

    #[error("side-state connection failed: {0}")]
    SideStateConnection(String),

    #[error("object-store connection failed: {0}")]
    ObjectStoreConnection(String),

    #[error("smtp transport initialisation failed: {0}")]
    SmtpInit(String),
}

/// Errors produced while decoding a raw stream entry into a `Message`.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} is not a valid integer: {value}")]
    InvalidInteger { field: &'static str, value: String },

    #[error("fields payload is not valid JSON: {0}")]
    InvalidFieldsJson(String),
}

/// Errors produced while looking up a form record.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("form not found")]
    FormNotFound,

    #[error("form store request failed: {0}")]
    StoreUnavailable(String),
}

/// Errors reported by the external template renderer.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("no handler configured for form")]
    MissingHandler,

    #[error("template not found: {0}")]
    MissingTemplate(String),

    #[error("rendered message has no content")]
    NoContent,

    #[error("rendered message has no subject")]
    NoSubject,
}

/// Errors reported by the external SMTP sender, split by retriability.
#[derive(Debug, Error)]
pub enum SendError {
    /// The sender reported an error object; retrying would not help.
    #[error("permanent send failure: {0}")]
    Permanent(String),

    /// The sender reported `false`; retrying later may succeed.
    #[error("transient send failure: {0}")]
    Transient(String),
}

/// Errors encountered performing cleanup side effects. These are always
/// logged and never propagated past the executor boundary.
#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error("object-store delete failed: {0}")]
    ObjectStoreDelete(String),

    #[error("side-state op failed: {0}")]
    SideState(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_is_fatal() {
        let err = MailerError::Bootstrap(BootstrapError::MissingConfig("POCKETBASE_URL"));
        assert!(err.is_bootstrap_fatal());
        assert!(!err.is_terminal());
        assert!(!err.is_transient());
    }

    #[test]
    fn decode_is_terminal() {
        let err = MailerError::Decode(DecodeError::MissingField("hex"));
        assert!(err.is_terminal());
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_send_is_transient() {
        let err = MailerError::Send(SendError::Transient("server busy".to_string()));
        assert!(err.is_transient());
        assert!(!err.is_terminal());
    }

    #[test]
    fn permanent_send_is_terminal() {
        let err = MailerError::Send(SendError::Permanent("rejected".to_string()));
        assert!(err.is_terminal());
        assert!(!err.is_transient());
    }

    #[test]
    fn display_messages() {
        let err = LookupError::FormNotFound;
        assert_eq!(err.to_string(), "form not found");
    }
}
