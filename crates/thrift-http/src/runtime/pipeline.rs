//! The call pipeline (spec §4.4): negotiate a wire format, decode the
//! envelope and arguments, invoke the dispatch service, and encode a reply.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use futures_util::FutureExt;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use thrift::protocol::{
    TFieldIdentifier, TMessageIdentifier, TMessageType, TOutputProtocol, TStructIdentifier, TType,
};
use thrift::ApplicationError;
use tower::Service as TowerService;
use tracing::{field, Instrument};

use thrift_http_core::{split_envelope_name, Format, FormatRegistry};

use crate::runtime::context::RequestContext;
use crate::runtime::decorator::{DispatchCall, DispatchService, HandlerOutcome};
use crate::runtime::error::{self, PipelineError};

/// Static configuration for a [`ThriftHttpService`]: the formats it
/// negotiates and whether error bodies should include a server-side trace
/// (spec §6).
#[derive(Clone)]
pub struct ThriftHttpConfig {
    /// Wire formats this server accepts and replies in.
    pub formats: FormatRegistry,
    /// Include a `source()` chain in error bodies and undeclared-exception
    /// messages. Defaults to `false` — meant for development, not
    /// production, per spec §6.
    pub verbose_errors: bool,
}

impl ThriftHttpConfig {
    /// Start from a format registry with development-friendly defaults
    /// (`verbose_errors: false`).
    #[must_use]
    pub fn new(formats: FormatRegistry) -> Self {
        Self { formats, verbose_errors: false }
    }

    /// Toggle verbose error bodies.
    #[must_use]
    pub fn with_verbose_errors(mut self, verbose: bool) -> Self {
        self.verbose_errors = verbose;
        self
    }
}

/// Exposes a [`DispatchService`] as an HTTP request/response pipeline.
///
/// Not itself a [`tower::Service`] over arbitrary request bodies (the body
/// type varies too much across transports to fix one here) — call
/// [`ThriftHttpService::handle`] directly, or wrap it with
/// [`IntoTowerService`] when a concrete body type is known.
#[derive(Clone)]
pub struct ThriftHttpService<D> {
    dispatch: Arc<D>,
    config: Arc<ThriftHttpConfig>,
}

impl<D> ThriftHttpService<D>
where
    D: DispatchService + 'static,
{
    /// Build a pipeline over `dispatch` with `config`.
    #[must_use]
    pub fn new(dispatch: Arc<D>, config: ThriftHttpConfig) -> Self {
        Self { dispatch, config: Arc::new(config) }
    }

    /// Run one request through the full pipeline, producing a response
    /// under every outcome — this method never fails.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Bytes>
    where
        B: http_body::Body<Data = Bytes> + Send,
        B::Error: StdError + Send + Sync + 'static,
    {
        let span = tracing::info_span!("thrift_http_call", envelope = field::Empty, format = field::Empty);
        let verbose = self.config.verbose_errors;
        let ctx = RequestContext::new(verbose, span.clone());
        // Build the response inside the scoped future: `RequestContext`'s
        // task-local is torn down the instant `ctx.scope(...)` returns, so
        // rendering the error after this `.await` would always observe
        // `current_verbose() == false` regardless of `verbose`.
        ctx.scope(async {
            match self.try_handle(req, &span).await {
                Ok(resp) => resp,
                Err(err) => error_response(&err, verbose),
            }
        })
        .instrument(span)
        .await
    }

    async fn try_handle<B>(
        &self,
        req: Request<B>,
        span: &tracing::Span,
    ) -> Result<Response<Bytes>, PipelineError>
    where
        B: http_body::Body<Data = Bytes> + Send,
        B::Error: StdError + Send + Sync + 'static,
    {
        if req.method() != Method::POST {
            return Err(PipelineError::MethodNotAllowed);
        }

        let format = self.config.formats.pick(header_str(req.headers(), &CONTENT_TYPE))?;
        span.record("format", format.name());

        let accept_values = accept_values(req.headers());
        if !FormatRegistry::accept_matches(format, accept_values.iter().map(String::as_str)) {
            return Err(PipelineError::AcceptMismatch);
        }

        let body = req
            .into_body()
            .collect()
            .await
            .map_err(|e| PipelineError::Aggregation(Box::new(e)))?
            .to_bytes();

        self.dispatch_call(format, &body, span).await
    }

    async fn dispatch_call(
        &self,
        format: Format,
        body: &[u8],
        span: &tracing::Span,
    ) -> Result<Response<Bytes>, PipelineError> {
        let mut reader = format.open_reader(body);
        let msg_ident = reader
            .read_message_begin()
            .map_err(|source| PipelineError::EnvelopeDecode { format: format.name(), source })?;
        span.record("envelope", field::display(&msg_ident.name));

        // From here on the envelope's (name, seqId) is known, so every
        // remaining failure mode is reported as a Thrift EXCEPTION envelope
        // (HTTP 200) rather than a framework-level error response.
        let oneway = match msg_ident.message_type {
            TMessageType::Call => false,
            TMessageType::OneWay => true,
            other => {
                let app_err = error::invalid_message_type(other);
                return encode_exception(format, &msg_ident.name, msg_ident.sequence_number, &app_err);
            }
        };

        let (service_name, method_name) = split_envelope_name(&msg_ident.name);
        let table = self.dispatch.dispatch_table();
        let Some((descriptor, _handler)) = table.resolve(service_name, method_name) else {
            let app_err = error::unknown_method(&msg_ident.name);
            return encode_exception(format, &msg_ident.name, msg_ident.sequence_number, &app_err);
        };

        let mut args = descriptor.new_args();
        if let Err(cause) = args.read_from(&mut *reader).and_then(|()| reader.read_message_end()) {
            let app_err = error::protocol_error(&cause);
            return encode_exception(format, &msg_ident.name, msg_ident.sequence_number, &app_err);
        }
        drop(reader);

        let positional = descriptor.positional_args(args.as_ref());
        let call = DispatchCall {
            service_name: service_name.to_string(),
            method: descriptor.name,
            service_type: descriptor.service_type,
            args: positional,
        };

        let outcome = std::panic::AssertUnwindSafe(self.dispatch.call(call))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| HandlerOutcome::Failure(panic_to_error(panic)));

        match outcome {
            HandlerOutcome::HttpStatus(status) => {
                Ok(Response::builder().status(status).body(Bytes::new()).expect("valid response"))
            }
            HandlerOutcome::HttpResponse(resp) => Ok(resp),
            HandlerOutcome::Success(value) => {
                if oneway {
                    return Ok(empty_ok());
                }
                let mut result = descriptor.new_result();
                result.set_success(value);
                encode_reply(format, &msg_ident.name, msg_ident.sequence_number, result.as_ref())
            }
            HandlerOutcome::Failure(err) => {
                if oneway {
                    return Ok(empty_ok());
                }
                let mut result = descriptor.new_result();
                if result.try_set_declared_exception(err.as_ref()) {
                    encode_reply(format, &msg_ident.name, msg_ident.sequence_number, result.as_ref())
                } else {
                    let app_err = error::undeclared_exception(err.as_ref());
                    encode_exception(format, &msg_ident.name, msg_ident.sequence_number, &app_err)
                }
            }
        }
    }
}

/// Wraps a [`ThriftHttpService`] as a [`tower::Service`] over a concrete
/// body type, for composition into a transport's middleware stack.
#[derive(Clone)]
pub struct IntoTowerService<D, B> {
    inner: ThriftHttpService<D>,
    _body: std::marker::PhantomData<fn(B)>,
}

impl<D, B> IntoTowerService<D, B> {
    /// Wrap `inner` for use as a `tower::Service<http::Request<B>>`.
    #[must_use]
    pub fn new(inner: ThriftHttpService<D>) -> Self {
        Self { inner, _body: std::marker::PhantomData }
    }
}

impl<D, B> TowerService<Request<B>> for IntoTowerService<D, B>
where
    D: DispatchService + 'static,
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: StdError + Send + Sync + 'static,
{
    type Response = Response<Bytes>;
    type Error = std::convert::Infallible;
    type Future = crate::runtime::decorator::BoxFuture<Result<Response<Bytes>, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.handle(req).await) })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &http::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn accept_values(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(&ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn empty_ok() -> Response<Bytes> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Bytes::new())
        .expect("valid response")
}

fn error_response(err: &PipelineError, verbose: bool) -> Response<Bytes> {
    Response::builder()
        .status(err.status())
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Bytes::from(err.render(verbose)))
        .expect("valid response")
}

fn encode_reply(
    format: Format,
    name: &str,
    sequence_number: i32,
    result: &dyn thrift_http_core::ResultStruct,
) -> Result<Response<Bytes>, PipelineError> {
    let mut buf = Vec::with_capacity(128);
    {
        let mut writer = format.open_writer(&mut buf);
        write_message(
            &mut *writer,
            name,
            TMessageType::Reply,
            sequence_number,
            |w| result.write_to(w),
        );
    }
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, format.canonical_media_type())
        .body(Bytes::from(buf))
        .expect("valid response"))
}

fn encode_exception(
    format: Format,
    name: &str,
    sequence_number: i32,
    err: &ApplicationError,
) -> Result<Response<Bytes>, PipelineError> {
    let mut buf = Vec::with_capacity(128);
    {
        let mut writer = format.open_writer(&mut buf);
        write_message(
            &mut *writer,
            name,
            TMessageType::Exception,
            sequence_number,
            |w| write_application_error(w, err),
        );
    }
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, format.canonical_media_type())
        .body(Bytes::from(buf))
        .expect("valid response"))
}

/// Writes one complete Thrift message: `message_begin`, the caller's body,
/// then `message_end`.
///
/// A failure here means the value handed to us — freshly produced by a
/// result struct we just constructed, or an `ApplicationError` we just
/// built — couldn't round-trip through the very wire protocol we chose.
/// There is no recovery for that; it panics rather than surfacing a
/// half-written reply (spec §6's "encoder internal error" row).
fn write_message(
    writer: &mut dyn TOutputProtocol,
    name: &str,
    message_type: TMessageType,
    sequence_number: i32,
    body: impl FnOnce(&mut dyn TOutputProtocol) -> thrift::Result<()>,
) {
    (|| -> thrift::Result<()> {
        writer.write_message_begin(&TMessageIdentifier {
            name: name.to_string(),
            message_type,
            sequence_number,
        })?;
        body(writer)?;
        writer.write_message_end()
    })()
    .expect("thrift encode of a freshly built reply/exception must not fail");
}

/// Encodes an [`ApplicationError`] as the standard Thrift
/// `TApplicationException` struct: `message` at field 1, `type` at field 2.
fn write_application_error(
    writer: &mut dyn TOutputProtocol,
    err: &ApplicationError,
) -> thrift::Result<()> {
    writer.write_struct_begin(&TStructIdentifier { name: "TApplicationException".to_string() })?;
    writer.write_field_begin(&TFieldIdentifier {
        name: Some("message".to_string()),
        field_type: TType::String,
        id: Some(1),
    })?;
    writer.write_string(&err.message)?;
    writer.write_field_end()?;
    writer.write_field_begin(&TFieldIdentifier {
        name: Some("type".to_string()),
        field_type: TType::I32,
        id: Some(2),
    })?;
    writer.write_i32(err.kind as i32)?;
    writer.write_field_end()?;
    writer.write_field_stop()?;
    writer.write_struct_end()
}

fn panic_to_error(panic: Box<dyn Any + Send>) -> Box<dyn StdError + Send + Sync> {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    };
    Box::new(PanicError(message))
}

#[derive(Debug)]
struct PanicError(String);

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler panicked: {}", self.0)
    }
}

impl StdError for PanicError {}
