//! Runtime pieces of the call pipeline.
//!
//! - [`RequestContext`] — scoped per-request state (verbose errors, span).
//! - [`RpcHandler`] / [`DispatchRouter`] / [`DispatchService`] / [`Decorated`]
//!   — the decorator chain around the resolved dispatch handler.
//! - [`PipelineError`] — everything that can go wrong before a handler runs.
//! - [`ThriftHttpService`] / [`ThriftHttpConfig`] / [`IntoTowerService`] —
//!   the negotiate → decode → dispatch → encode pipeline itself.

mod context;
mod decorator;
mod error;
mod pipeline;

pub use context::RequestContext;
pub use decorator::{
    BoxFuture, Decorated, DispatchCall, DispatchRouter, DispatchService, HandlerOutcome,
    RpcHandler,
};
pub use error::{
    invalid_message_type, protocol_error, render_plain_text, undeclared_exception, unknown_method,
    PipelineError,
};
pub use pipeline::{IntoTowerService, ThriftHttpConfig, ThriftHttpService};
