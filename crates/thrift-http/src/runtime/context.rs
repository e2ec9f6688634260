//! Scoped request context (spec §3 "Request Context", §4.5 scoped push).

use std::future::Future;

use tracing::Span;

tokio::task_local! {
    static CURRENT: RequestContext;
}

/// Per-request state made available to handlers for the duration of their
/// invocation.
///
/// Pushed as "current" around the handler call via [`RequestContext::scope`]
/// and released on every exit path (success, synchronous panic, or
/// cancellation) because the push is a `tokio::task_local!` scope — the
/// value is torn down as soon as the scoped future stops being polled.
#[derive(Clone)]
pub struct RequestContext {
    /// Whether 400/500 plain-text bodies and `INTERNAL_ERROR` messages
    /// should include a rendered server-side trace.
    pub verbose: bool,
    /// Span this request's decode/dispatch/encode events are recorded
    /// against — the concretization of the source's "log builder".
    pub span: Span,
}

impl RequestContext {
    /// Build a new context for one request.
    #[must_use]
    pub fn new(verbose: bool, span: Span) -> Self {
        Self { verbose, span }
    }

    /// Run `fut` with `self` as the current context.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT.scope(self, fut).await
    }

    /// Is the currently-pushed context (if any) verbose? Defaults to
    /// `false` outside of a handler invocation.
    #[must_use]
    pub fn current_verbose() -> bool {
        CURRENT.try_with(|ctx| ctx.verbose).unwrap_or(false)
    }
}
