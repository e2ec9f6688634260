#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod descriptor;
mod dispatch;
mod format;

pub use descriptor::{
    ArgField, ArgsStruct, MethodDescriptor, PositionalArgs, ResultStruct, ServiceTypeTag,
};
pub use dispatch::{split_envelope_name, DispatchTable, DispatchTableBuilder, DuplicateMethod};
pub use format::{
    Format, FormatRegistry, FormatRegistryBuilder, ReaderFactory, UnsupportedContentType,
    WriterFactory,
};
