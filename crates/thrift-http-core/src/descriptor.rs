//! Per-method descriptors: the static metadata the call pipeline needs to
//! decode arguments, invoke a handler, and encode a reply.

use std::any::Any;
use std::error::Error as StdError;

use thrift::protocol::{TInputProtocol, TOutputProtocol};

/// Opaque tag identifying the generated service interface a method belongs
/// to. Propagated to tracing spans; never interpreted by the core.
pub type ServiceTypeTag = &'static str;

/// A decoded, positional view of a method's call arguments.
///
/// Built from a [`MethodDescriptor`]'s `arg_fields` in ascending field-id
/// order (spec §4.4 "Positional call shape").
pub enum PositionalArgs {
    /// Zero-argument method.
    Zero,
    /// Single-argument method.
    One(Box<dyn Any + Send>),
    /// Two-or-more argument method, in ascending field-id order.
    Many(Vec<Box<dyn Any + Send>>),
}

/// A freshly allocated, mutable Thrift argument struct.
///
/// Implemented by generated (or hand-written, in the absence of a codegen
/// toolchain) per-method argument types. Mirrors the shape real Thrift
/// codegen emits: a field-id loop over `read_field_begin`/`read_field_end`
/// terminated by `TType::Stop`.
pub trait ArgsStruct: Send {
    /// Populate `self` from a freshly opened reader, positioned just after
    /// `read_message_begin`.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`thrift::Error`] on any protocol-level
    /// decode failure.
    fn read_from(&mut self, input: &mut dyn TInputProtocol) -> thrift::Result<()>;

    /// Fetch the decoded value of one field by field id, for the positional
    /// call shape. Returns `None` if `field_id` isn't one of this struct's
    /// fields (a descriptor/struct mismatch — a configuration error).
    fn field_value(&self, field_id: i16) -> Option<Box<dyn Any + Send>>;
}

/// A freshly allocated, mutable Thrift result struct.
///
/// Carries either the method's success value or one declared exception
/// field, exactly as Thrift codegen's `<Method>Result` unions do.
pub trait ResultStruct: Send {
    /// Set the success field to the handler's return value.
    ///
    /// # Panics
    ///
    /// May panic if `value`'s concrete type doesn't match the method's
    /// declared return type — a configuration error, not a runtime one.
    fn set_success(&mut self, value: Box<dyn Any + Send>);

    /// Attempt to set a declared exception field from a caught error.
    ///
    /// Returns `true` if `err` matched a declared exception type and was
    /// set; `false` if `err` is not one of this method's declared
    /// exceptions (the caller then falls back to an undeclared-exception
    /// encoding).
    fn try_set_declared_exception(&mut self, err: &(dyn StdError + Send + Sync)) -> bool;

    /// Encode this result struct's current contents.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`thrift::Error`] on any protocol-level
    /// encode failure.
    fn write_to(&self, output: &mut dyn TOutputProtocol) -> thrift::Result<()>;
}

/// One argument field's static identity (field id and name), in the order
/// the generated struct declares it.
#[derive(Debug, Clone, Copy)]
pub struct ArgField {
    /// Thrift field id.
    pub field_id: i16,
    /// Field name, for diagnostics only.
    pub name: &'static str,
}

/// Static, per-method metadata consumed by the call pipeline.
pub struct MethodDescriptor {
    /// Method name as it appears in the Thrift IDL (and on the wire).
    pub name: &'static str,
    /// Owning service interface tag.
    pub service_type: ServiceTypeTag,
    /// Argument fields in ascending field-id order.
    pub arg_fields: &'static [ArgField],
    /// `true` if the method is declared `oneway` (no reply expected).
    pub oneway: bool,
    args_factory: fn() -> Box<dyn ArgsStruct>,
    result_factory: fn() -> Box<dyn ResultStruct>,
}

impl MethodDescriptor {
    /// Construct a descriptor from its factories and static metadata.
    #[must_use]
    pub const fn new(
        name: &'static str,
        service_type: ServiceTypeTag,
        arg_fields: &'static [ArgField],
        oneway: bool,
        args_factory: fn() -> Box<dyn ArgsStruct>,
        result_factory: fn() -> Box<dyn ResultStruct>,
    ) -> Self {
        Self { name, service_type, arg_fields, oneway, args_factory, result_factory }
    }

    /// Allocate a fresh, empty argument struct.
    #[must_use]
    pub fn new_args(&self) -> Box<dyn ArgsStruct> {
        (self.args_factory)()
    }

    /// Allocate a fresh, empty result struct.
    #[must_use]
    pub fn new_result(&self) -> Box<dyn ResultStruct> {
        (self.result_factory)()
    }

    /// Lift a decoded argument struct into the positional call shape
    /// (spec §4.4): zero args → no operands, one arg → the bare value,
    /// two-plus → values in ascending field-id order.
    ///
    /// # Panics
    ///
    /// Panics if `args` doesn't recognize one of `self.arg_fields`'
    /// field ids — a descriptor/struct mismatch, which can only happen if
    /// a descriptor was hand-built incorrectly.
    #[must_use]
    pub fn positional_args(&self, args: &dyn ArgsStruct) -> PositionalArgs {
        match self.arg_fields {
            [] => PositionalArgs::Zero,
            [only] => PositionalArgs::One(
                args.field_value(only.field_id)
                    .unwrap_or_else(|| panic!("missing field {} in args struct", only.name)),
            ),
            many => PositionalArgs::Many(
                many.iter()
                    .map(|f| {
                        args.field_value(f.field_id)
                            .unwrap_or_else(|| panic!("missing field {} in args struct", f.name))
                    })
                    .collect(),
            ),
        }
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("service_type", &self.service_type)
            .field("oneway", &self.oneway)
            .field("arity", &self.arg_fields.len())
            .finish()
    }
}
