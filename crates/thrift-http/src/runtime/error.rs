//! Pipeline-level errors (spec §7 "Error Handling Design") and the
//! plain-text / `ApplicationError` renderings they turn into on the wire.
//!
//! Only the errors detected *before* an envelope is successfully parsed end
//! up here — once a `(name, seqId)` is known, every failure (bad message
//! type, unknown method, bad arguments, handler failure) is reported as a
//! Thrift `EXCEPTION` envelope instead, via the constructors below, not as
//! a [`PipelineError`].

use std::error::Error as StdError;
use std::fmt::Write as _;

use thrift::{ApplicationError, ApplicationErrorKind};

/// Everything that can go wrong before a request's Thrift envelope has
/// been parsed (spec §7, the rows surfaced as a non-200 HTTP status).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The request method was not `POST`.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Neither `Content-Type` nor `Accept` matched a registered format, and
    /// the permissive fallback (spec §4.1's "no hint" rule) didn't apply.
    #[error(transparent)]
    UnsupportedContentType(#[from] thrift_http_core::UnsupportedContentType),

    /// The client's `Accept` header named a format the server has, but it
    /// differs from the `Content-Type` format used to decode the request —
    /// this server always replies in the request's format.
    #[error("Accept header does not match the Content-Type's Thrift protocol")]
    AcceptMismatch,

    /// Reading/aggregating the request body failed.
    #[error("failed to read request body")]
    Aggregation(#[source] Box<dyn StdError + Send + Sync>),

    /// `readMessageBegin` on the chosen format's reader failed. No sequence
    /// id is available, so this cannot be reported as a Thrift envelope.
    #[error("failed to decode a {format} header")]
    EnvelopeDecode {
        /// Name of the format whose reader failed to parse the envelope.
        format: &'static str,
        /// Underlying protocol-level decode failure.
        #[source]
        source: thrift::Error,
    },
}

impl PipelineError {
    /// The HTTP status this error is reported under (spec §6 "Status
    /// codes").
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            Self::MethodNotAllowed => http::StatusCode::METHOD_NOT_ALLOWED,
            Self::UnsupportedContentType(_) => http::StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::AcceptMismatch => http::StatusCode::NOT_ACCEPTABLE,
            Self::Aggregation(_) => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::EnvelopeDecode { .. } => http::StatusCode::BAD_REQUEST,
        }
    }

    /// Render this error's plain-text body, per spec §4.4's per-case rules.
    ///
    /// Body aggregation failures render empty unless verbose responses are
    /// enabled (they predate format selection's validity for framing, so
    /// there's no safe default message to show); the other cases always
    /// carry their fixed summary text, with a trace appended when verbose.
    ///
    /// `verbose` is taken explicitly rather than read from
    /// [`RequestContext::current_verbose`] — by the time a [`PipelineError`]
    /// is rendered into a response, the task-local scope that carried it for
    /// this request may already have been torn down (the scope only wraps
    /// the call that produces the `Result`, not the error-handling step
    /// after it).
    #[must_use]
    pub fn render(&self, verbose: bool) -> String {
        match self {
            Self::MethodNotAllowed => String::new(),
            Self::UnsupportedContentType(err) => err.to_string(),
            Self::AcceptMismatch => self.to_string(),
            Self::Aggregation(err) => {
                if verbose {
                    render_plain_text(err.as_ref(), true)
                } else {
                    String::new()
                }
            }
            Self::EnvelopeDecode { format, source } => {
                let mut out = format!("Failed to decode a {format} header");
                if verbose {
                    let _ = write!(out, "\n---- BEGIN server-side trace ----\n0: {source}\n---- END server-side trace ----");
                }
                out
            }
        }
    }
}

/// Render any error as a summary line followed by (when `verbose`) a
/// `source()` chain framed between trace markers.
#[must_use]
pub fn render_plain_text(err: &(dyn StdError + 'static), verbose: bool) -> String {
    let mut out = err.to_string();
    if !verbose {
        return out;
    }
    let mut cause = err.source();
    if cause.is_none() {
        return out;
    }
    out.push_str("\n---- BEGIN server-side trace ----\n");
    let mut depth = 0;
    while let Some(c) = cause {
        let _ = writeln!(out, "{depth}: {c}");
        cause = c.source();
        depth += 1;
    }
    out.push_str("---- END server-side trace ----");
    out
}

/// Build the [`ApplicationError`] an undeclared handler failure (or a
/// caught panic) is reported to the caller as (spec §4.4 "Exception
/// encoding", `INTERNAL_ERROR`).
///
/// The message embeds the same verbose/non-verbose trace rendering as
/// [`render_plain_text`]; non-verbose responses carry empty-text per spec
/// §4.4 ("is empty-text otherwise").
#[must_use]
pub fn undeclared_exception(err: &(dyn StdError + Send + Sync + 'static)) -> ApplicationError {
    let verbose = RequestContext::current_verbose();
    let message = if verbose { render_plain_text(err, true) } else { String::new() };
    ApplicationError::new(ApplicationErrorKind::InternalError, message)
}

/// Build the [`ApplicationError`] reported when the envelope named a method
/// with no registered handler (spec §4.4 "Method resolution").
#[must_use]
pub fn unknown_method(envelope_name: &str) -> ApplicationError {
    ApplicationError::new(
        ApplicationErrorKind::UnknownMethod,
        format!("unknown method: {envelope_name}"),
    )
}

/// Build the [`ApplicationError`] reported when the envelope's message type
/// was neither `Call` nor `Oneway` (spec §4.4 "Envelope decode").
#[must_use]
pub fn invalid_message_type(message_type: thrift::protocol::TMessageType) -> ApplicationError {
    ApplicationError::new(
        ApplicationErrorKind::InvalidMessageType,
        format!("unexpected TMessageType: {message_type:?}"),
    )
}

/// Build the [`ApplicationError`] reported when the argument struct failed
/// to decode (spec §4.4 "Argument decode").
#[must_use]
pub fn protocol_error(cause: &thrift::Error) -> ApplicationError {
    ApplicationError::new(
        ApplicationErrorKind::ProtocolError,
        format!("failed to decode arguments: {cause}"),
    )
}
