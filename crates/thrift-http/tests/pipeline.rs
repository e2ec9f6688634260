//! End-to-end tests driving [`thrift_http::ThriftHttpService`] through its
//! public API only, the way an embedding crate would.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use thrift::protocol::{
    TBinaryInputProtocol, TBinaryOutputProtocol, TFieldIdentifier, TInputProtocol,
    TMessageIdentifier, TMessageType, TOutputProtocol, TStructIdentifier, TType,
};
use thrift_http::{
    Decorated, DispatchCall, DispatchRouter, DispatchService, HandlerOutcome, RpcHandler,
    ThriftHttpConfig, ThriftHttpService,
};
use thrift_http_core::{
    ArgField, ArgsStruct, DispatchTableBuilder, Format, FormatRegistry, MethodDescriptor,
    PositionalArgs, ResultStruct,
};

struct Args(i64);
impl ArgsStruct for Args {
    fn read_from(&mut self, input: &mut dyn TInputProtocol) -> thrift::Result<()> {
        input.read_struct_begin()?;
        loop {
            let field = input.read_field_begin()?;
            if field.field_type == TType::Stop {
                break;
            }
            self.0 = input.read_i64()?;
            input.read_field_end()?;
        }
        input.read_struct_end()
    }
    fn field_value(&self, field_id: i16) -> Option<Box<dyn Any + Send>> {
        (field_id == 1).then(|| Box::new(self.0) as Box<dyn Any + Send>)
    }
}

struct Result_ {
    success: Option<i64>,
}
impl ResultStruct for Result_ {
    fn set_success(&mut self, value: Box<dyn Any + Send>) {
        self.success = Some(*value.downcast::<i64>().unwrap());
    }
    fn try_set_declared_exception(&mut self, _err: &(dyn StdError + Send + Sync)) -> bool {
        false
    }
    fn write_to(&self, output: &mut dyn TOutputProtocol) -> thrift::Result<()> {
        output.write_struct_begin(&TStructIdentifier { name: "result".to_string() })?;
        if let Some(v) = self.success {
            output.write_field_begin(&TFieldIdentifier {
                name: Some("success".to_string()),
                field_type: TType::I64,
                id: Some(0),
            })?;
            output.write_i64(v)?;
            output.write_field_end()?;
        }
        output.write_field_stop()?;
        output.write_struct_end()
    }
}

#[derive(Debug)]
struct Boom;
impl fmt::Display for Boom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boom")
    }
}
impl StdError for Boom {}

fn double_descriptor(oneway: bool) -> MethodDescriptor {
    static FIELDS: &[ArgField] = &[ArgField { field_id: 1, name: "n" }];
    MethodDescriptor::new(
        "double",
        "Doubler",
        FIELDS,
        oneway,
        || Box::new(Args(0)),
        || Box::new(Result_ { success: None }),
    )
}

fn encode_call(name: &str, message_type: TMessageType, value: i64) -> Bytes {
    let mut buf = Vec::new();
    {
        let mut writer = TBinaryOutputProtocol::new(&mut buf, true);
        writer
            .write_message_begin(&TMessageIdentifier {
                name: name.to_string(),
                message_type,
                sequence_number: 1,
            })
            .unwrap();
        writer.write_struct_begin(&TStructIdentifier { name: "args".to_string() }).unwrap();
        writer
            .write_field_begin(&TFieldIdentifier {
                name: Some("n".to_string()),
                field_type: TType::I64,
                id: Some(1),
            })
            .unwrap();
        writer.write_i64(value).unwrap();
        writer.write_field_end().unwrap();
        writer.write_field_stop().unwrap();
        writer.write_struct_end().unwrap();
        writer.write_message_end().unwrap();
    }
    Bytes::from(buf)
}

fn build_service(
    handler: impl RpcHandler + 'static,
    oneway: bool,
) -> ThriftHttpService<Decorated<DispatchRouter>> {
    let table = DispatchTableBuilder::new()
        .add_service("", vec![(double_descriptor(oneway), Arc::new(handler) as Arc<dyn RpcHandler>)])
        .build()
        .unwrap();
    let table = Arc::new(table);
    let router = DispatchRouter::from_shared(Arc::clone(&table));
    let decorated = Decorated::new(table, router);
    let config = ThriftHttpConfig::new(FormatRegistry::new(Format::binary(), [Format::compact()]));
    ThriftHttpService::new(Arc::new(decorated), config)
}

#[tokio::test]
async fn undeclared_failure_becomes_an_exception_message() {
    let handler = |_: PositionalArgs| async move {
        HandlerOutcome::Failure(Box::new(Boom) as Box<dyn StdError + Send + Sync>)
    };
    let service = build_service(handler, false);

    let body = encode_call("double", TMessageType::Call, 21);
    let req = Request::builder()
        .method(Method::POST)
        .header(CONTENT_TYPE, "application/x-thrift")
        .body(http_body_util::Full::new(body))
        .unwrap();
    let resp = service.handle(req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = resp.into_body();
    let mut reader = TBinaryInputProtocol::new(std::io::Cursor::new(bytes.as_ref()), true);
    let ident = reader.read_message_begin().unwrap();
    assert_eq!(ident.name, "double");
    assert!(matches!(ident.message_type, TMessageType::Exception));
}

#[tokio::test]
async fn a_panicking_handler_still_produces_an_exception_reply() {
    let handler = |_: PositionalArgs| async move {
        panic!("handler exploded");
        #[allow(unreachable_code)]
        HandlerOutcome::Success(Box::new(0i64))
    };
    let service = build_service(handler, false);

    let body = encode_call("double", TMessageType::Call, 1);
    let req = Request::builder()
        .method(Method::POST)
        .header(CONTENT_TYPE, "application/x-thrift")
        .body(http_body_util::Full::new(body))
        .unwrap();
    let resp = service.handle(req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = resp.into_body();
    let mut reader = TBinaryInputProtocol::new(std::io::Cursor::new(bytes.as_ref()), true);
    let ident = reader.read_message_begin().unwrap();
    assert!(matches!(ident.message_type, TMessageType::Exception));
}

#[tokio::test]
async fn oneway_call_gets_an_empty_ok_with_no_reply_framing() {
    let handler = |_: PositionalArgs| async move { HandlerOutcome::Success(Box::new(0i64)) };
    let service = build_service(handler, true);

    let body = encode_call("double", TMessageType::OneWay, 5);
    let req = Request::builder()
        .method(Method::POST)
        .header(CONTENT_TYPE, "application/x-thrift")
        .body(http_body_util::Full::new(body))
        .unwrap();
    let resp = service.handle(req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.into_body().is_empty());
}
