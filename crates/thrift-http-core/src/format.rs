//! Wire format negotiation (media type ↔ Thrift protocol).

use std::io::Cursor;

use thrift::protocol::{
    TBinaryInputProtocol, TBinaryOutputProtocol, TCompactInputProtocol, TCompactOutputProtocol,
    TInputProtocol, TOutputProtocol,
};

/// Opens a reader bound to a request body buffer.
pub type ReaderFactory = for<'a> fn(&'a [u8]) -> Box<dyn TInputProtocol + 'a>;

/// Opens a writer that appends encoded bytes to a response buffer.
pub type WriterFactory = for<'a> fn(&'a mut Vec<u8>) -> Box<dyn TOutputProtocol + 'a>;

/// A single Thrift wire protocol, reachable through one or more media types.
///
/// `binary` and `compact` are the two protocols the `thrift` crate itself
/// implements. A caller that needs a third-party encoding (e.g. JSON) can
/// build its own [`Format`] with [`Format::custom`], supplying a
/// [`ReaderFactory`]/[`WriterFactory`] pair over its own `TInputProtocol`/
/// `TOutputProtocol` impls — the registry never special-cases binary or
/// compact.
#[derive(Clone, Copy)]
pub struct Format {
    name: &'static str,
    media_types: &'static [&'static str],
    canonical_media_type: &'static str,
    kind: WireKind,
}

#[derive(Clone, Copy)]
enum WireKind {
    Binary,
    Compact,
    Custom(ReaderFactory, WriterFactory),
}

impl Format {
    /// The Thrift binary protocol, reachable via `application/x-thrift` and
    /// `application/vnd.apache.thrift.binary`.
    #[must_use]
    pub const fn binary() -> Self {
        Self {
            name: "binary",
            media_types: &["application/x-thrift", "application/vnd.apache.thrift.binary"],
            canonical_media_type: "application/x-thrift",
            kind: WireKind::Binary,
        }
    }

    /// The Thrift compact protocol, reachable via
    /// `application/vnd.apache.thrift.compact`.
    #[must_use]
    pub const fn compact() -> Self {
        Self {
            name: "compact",
            media_types: &["application/vnd.apache.thrift.compact"],
            canonical_media_type: "application/vnd.apache.thrift.compact",
            kind: WireKind::Compact,
        }
    }

    /// Build a format over a caller-supplied `TInputProtocol`/
    /// `TOutputProtocol` pair, e.g. to plug in a third-party JSON codec.
    ///
    /// Not `const` (unlike [`Format::binary`]/[`Format::compact`]) because
    /// function-pointer fields in a `const fn` require the pointed-to
    /// functions to themselves be usable in const context, which rules out
    /// ordinary closures coerced to `fn` — callers pass plain top-level or
    /// nested `fn` items instead.
    #[must_use]
    pub fn custom(
        name: &'static str,
        media_types: &'static [&'static str],
        canonical_media_type: &'static str,
        reader: ReaderFactory,
        writer: WriterFactory,
    ) -> Self {
        Self { name, media_types, canonical_media_type, kind: WireKind::Custom(reader, writer) }
    }

    /// Name of this format, e.g. `"binary"`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Media types this format accepts on `Content-Type`/`Accept`.
    #[must_use]
    pub const fn media_types(&self) -> &'static [&'static str] {
        self.media_types
    }

    /// Canonical media type this format writes on outgoing `Content-Type`.
    #[must_use]
    pub const fn canonical_media_type(&self) -> &'static str {
        self.canonical_media_type
    }

    /// Does this format accept the given `Content-Type`/`Accept` value?
    ///
    /// Matches only the type/subtype, ignoring any `;charset=...` parameter.
    #[must_use]
    pub fn accepts(&self, content_type: &str) -> bool {
        let bare = content_type.split(';').next().unwrap_or("").trim();
        self.media_types.iter().any(|mt| mt.eq_ignore_ascii_case(bare))
    }

    /// Open a reader bound to `body` for this format.
    #[must_use]
    pub fn open_reader<'a>(&self, body: &'a [u8]) -> Box<dyn TInputProtocol + 'a> {
        match self.kind {
            WireKind::Binary => Box::new(TBinaryInputProtocol::new(Cursor::new(body), true)),
            WireKind::Compact => Box::new(TCompactInputProtocol::new(Cursor::new(body))),
            WireKind::Custom(reader, _) => reader(body),
        }
    }

    /// Open a writer that appends encoded bytes to `buf`.
    #[must_use]
    pub fn open_writer<'a>(&self, buf: &'a mut Vec<u8>) -> Box<dyn TOutputProtocol + 'a> {
        match self.kind {
            WireKind::Binary => Box::new(TBinaryOutputProtocol::new(buf, true)),
            WireKind::Compact => Box::new(TCompactOutputProtocol::new(buf)),
            WireKind::Custom(_, writer) => writer(buf),
        }
    }
}

impl std::fmt::Debug for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Format").field("name", &self.name).finish()
    }
}

/// Media types that fall back to the registry's default format even though
/// they don't name it explicitly (spec §4.1's "permissive fallback").
const PERMISSIVE_FALLBACK_TYPES: &[&str] = &["text/plain", "application/octet-stream"];

/// An ordered, deduplicated set of [`Format`]s with a distinguished default.
///
/// The default is always first; construction never produces an empty set.
#[derive(Clone)]
pub struct FormatRegistry {
    formats: Vec<Format>,
}

/// Negotiation outcome when a `Content-Type` matches nothing, including the
/// permissive fallback.
#[derive(Debug, thiserror::Error)]
#[error("Specified content-type not supported")]
pub struct UnsupportedContentType;

impl FormatRegistry {
    /// Build a registry with `default` first, followed by `others` in
    /// insertion order with duplicates (by name) removed.
    #[must_use]
    pub fn new(default: Format, others: impl IntoIterator<Item = Format>) -> Self {
        let mut formats = vec![default];
        for fmt in others {
            if !formats.iter().any(|f| f.name == fmt.name) {
                formats.push(fmt);
            }
        }
        Self { formats }
    }

    /// The default format (always present, always first).
    #[must_use]
    pub fn default_format(&self) -> Format {
        self.formats[0]
    }

    /// All allowed formats, default first.
    #[must_use]
    pub fn allowed(&self) -> &[Format] {
        &self.formats
    }

    /// Pick a format for an incoming `Content-Type`.
    ///
    /// - No `Content-Type` → the default format.
    /// - A `Content-Type` one of the allowed formats accepts → that format.
    /// - An unmatched but permissive `Content-Type` (`text/plain` or
    ///   `application/octet-stream`) → the default format.
    /// - Anything else → [`UnsupportedContentType`].
    pub fn pick(&self, content_type: Option<&str>) -> Result<Format, UnsupportedContentType> {
        let Some(content_type) = content_type else {
            return Ok(self.default_format());
        };
        if let Some(fmt) = self.formats.iter().find(|f| f.accepts(content_type)) {
            return Ok(*fmt);
        }
        let bare = content_type.split(';').next().unwrap_or("").trim();
        if PERMISSIVE_FALLBACK_TYPES.iter().any(|t| t.eq_ignore_ascii_case(bare)) {
            return Ok(self.default_format());
        }
        Err(UnsupportedContentType)
    }

    /// Does at least one `Accept` value match `format`'s media types?
    ///
    /// An empty `accept` iterator is vacuously satisfied (no Accept header
    /// sent at all).
    #[must_use]
    pub fn accept_matches<'a>(format: Format, accept: impl IntoIterator<Item = &'a str>) -> bool {
        let mut saw_any = false;
        for value in accept {
            saw_any = true;
            if format.accepts(value) {
                return true;
            }
        }
        !saw_any
    }
}

/// Incremental builder for [`FormatRegistry`], mirroring the codegen-config
/// builder style used elsewhere in this ecosystem.
#[derive(Default)]
pub struct FormatRegistryBuilder {
    default: Option<Format>,
    others: Vec<Format>,
}

impl FormatRegistryBuilder {
    /// Start an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default format. Calling this more than once replaces the
    /// previous default.
    #[must_use]
    pub fn with_default(mut self, format: Format) -> Self {
        self.default = Some(format);
        self
    }

    /// Add an additional allowed format.
    #[must_use]
    pub fn with(mut self, format: Format) -> Self {
        self.others.push(format);
        self
    }

    /// Finish building. Panics if no default was set — use
    /// [`FormatRegistry::new`] directly if that's not desirable.
    #[must_use]
    pub fn build(self) -> FormatRegistry {
        let default = self.default.expect("FormatRegistryBuilder: no default format set");
        FormatRegistry::new(default, self.others)
    }
}
