//! The decorator chain (spec §4.5): middleware wrapped around the resolved
//! dispatch handler, composed with [`tower::Layer`]/[`tower::Service`].

use std::any::Any;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use thrift_http_core::{DispatchTable, PositionalArgs, ServiceTypeTag};
use tower::Service;

/// A boxed, `'static` future — the shape every asynchronous boundary in
/// this crate uses (spec's "deferred reply").
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// One call into the dispatch table, lifted to the positional shape
/// (spec §4.4), ready to hand to whichever handler the table resolves.
pub struct DispatchCall {
    /// Envelope service name (`""` for non-multiplexed).
    pub service_name: String,
    /// Method name.
    pub method: &'static str,
    /// Owning service interface tag, for observability.
    pub service_type: ServiceTypeTag,
    /// Decoded arguments in positional shape.
    pub args: PositionalArgs,
}

/// What a handler invocation produced.
pub enum HandlerOutcome {
    /// The handler returned successfully; the boxed value is the method's
    /// declared return type (`()` for void methods).
    Success(Box<dyn Any + Send>),
    /// The handler failed. The call pipeline decides, via the method's
    /// result struct, whether this is one of the method's declared
    /// exceptions (→ `REPLY`) or not (→ `INTERNAL_ERROR`).
    Failure(Box<dyn StdError + Send + Sync>),
    /// A framework-level marker: propagate this HTTP status directly, with
    /// no Thrift framing at all.
    HttpStatus(StatusCode),
    /// A framework-level marker: propagate this HTTP response directly.
    HttpResponse(http::Response<Bytes>),
}

/// One concrete Thrift service implementation's method body.
///
/// The dispatch table (spec §4.3) holds one `Arc<dyn RpcHandler>` per
/// (service name, method name) pair.
pub trait RpcHandler: Send + Sync {
    /// Invoke this method with its decoded, positional arguments.
    fn call(&self, args: PositionalArgs) -> BoxFuture<HandlerOutcome>;
}

impl<F, Fut> RpcHandler for F
where
    F: Fn(PositionalArgs) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    fn call(&self, args: PositionalArgs) -> BoxFuture<HandlerOutcome> {
        Box::pin((self)(args))
    }
}

/// The innermost service of the decorator chain: resolves `(service_name,
/// method)` in the dispatch table and invokes the matched handler.
///
/// This is `h0` in spec §4.5's `dn(...d2(d1(h0))...)` formula.
#[derive(Clone)]
pub struct DispatchRouter {
    table: Arc<DispatchTable<Arc<dyn RpcHandler>>>,
}

impl DispatchRouter {
    /// Build a router over an already-constructed dispatch table.
    #[must_use]
    pub fn new(table: DispatchTable<Arc<dyn RpcHandler>>) -> Self {
        Self { table: Arc::new(table) }
    }

    /// Build a router sharing an existing `Arc<DispatchTable<_>>` — the
    /// shape [`Decorated::new`] needs, since it also holds that same `Arc`
    /// for its `dispatch_table()` accessor.
    #[must_use]
    pub fn from_shared(table: Arc<DispatchTable<Arc<dyn RpcHandler>>>) -> Self {
        Self { table }
    }

    /// The dispatch table this router resolves against.
    #[must_use]
    pub fn table(&self) -> &Arc<DispatchTable<Arc<dyn RpcHandler>>> {
        &self.table
    }
}

impl Service<DispatchCall> for DispatchRouter {
    type Response = HandlerOutcome;
    type Error = Infallible;
    type Future = BoxFuture<Result<HandlerOutcome, Infallible>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DispatchCall) -> Self::Future {
        let table = Arc::clone(&self.table);
        Box::pin(async move {
            match table.resolve(&req.service_name, req.method) {
                Some((_, handler)) => Ok(handler.call(req.args).await),
                None => Ok(HandlerOutcome::Failure(Box::new(std::io::Error::other(
                    "handler vanished after resolve — dispatch table mutated concurrently?",
                )))),
            }
        })
    }
}

/// A dispatch service: the (possibly decorated) object the call pipeline
/// invokes, which must still expose the dispatch table it was built over
/// (spec §4.5: "the outermost decorated object still expose the inner
/// descriptor registry").
pub trait DispatchService: Send + Sync {
    /// Resolve the dispatch table this service ultimately routes through.
    fn dispatch_table(&self) -> &DispatchTable<Arc<dyn RpcHandler>>;

    /// Invoke the (possibly decorated) handler chain.
    fn call(&self, call: DispatchCall) -> BoxFuture<HandlerOutcome>;
}

/// Wraps a [`tower::Service`] stack built on top of a [`DispatchRouter`]
/// (via [`tower::ServiceBuilder`]/[`tower::Layer`]) so it can be used as a
/// [`DispatchService`].
///
/// Rust's type system gives the "innermost handler must be the dispatch
/// handler" rule of spec §4.5 for free: `Decorated::new` requires the same
/// `Arc<DispatchTable<_>>` the service's inner `DispatchRouter` was built
/// from, so there is no value of this type whose registry and handler
/// chain disagree.
#[derive(Clone)]
pub struct Decorated<S> {
    table: Arc<DispatchTable<Arc<dyn RpcHandler>>>,
    service: S,
}

impl<S> Decorated<S> {
    /// Wrap a tower service stack built over `table`.
    #[must_use]
    pub fn new(table: Arc<DispatchTable<Arc<dyn RpcHandler>>>, service: S) -> Self {
        Self { table, service }
    }
}

impl<S> DispatchService for Decorated<S>
where
    S: Service<DispatchCall, Response = HandlerOutcome, Error = Infallible> + Clone + Send + Sync,
    S::Future: Future<Output = Result<HandlerOutcome, Infallible>> + Send + 'static,
{
    fn dispatch_table(&self) -> &DispatchTable<Arc<dyn RpcHandler>> {
        &self.table
    }

    fn call(&self, call: DispatchCall) -> BoxFuture<HandlerOutcome> {
        let mut svc = self.service.clone();
        Box::pin(async move {
            match Service::call(&mut svc, call).await {
                Ok(outcome) => outcome,
                Err(infallible) => match infallible {},
            }
        })
    }
}
