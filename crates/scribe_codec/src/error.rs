use thiserror::Error;
use uuid::Uuid;

use scribe_schema::info::FieldError;
use scribe_schema::registry::ResolveError;
use scribe_schema::scalar::ConversionError;

/// Boxed error carried by hook and opaque sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// -----------------------------------------------------------------------------
// CodecError

/// A failure while encoding or decoding a scripture tree.
///
/// Every variant aborts the enclosing call; nothing is retried or recovered
/// internally, and no partial result is returned.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The input text is not a well-formed document.
    #[error("document is not well formed: {0}")]
    Malformed(#[from] roxmltree::Error),

    /// The output writer failed.
    #[error("failed to write the document: {0}")]
    Write(#[from] quick_xml::Error),

    #[error("encoded document is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The decoded tree does not follow the structure the schemas prescribe.
    /// Matching is strict; nothing is skipped or guessed.
    #[error("document structure mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// A type tag could not be resolved to a sanctioned, constructible type.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A scalar text form failed to parse.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A field accessor rejected its host or value.
    #[error(transparent)]
    Field(#[from] FieldError),

    /// A scripture node reached the generic value channel. Nodes travel only
    /// through the sub-node channels, so this is a schema definition error.
    #[error("field `{field}` routed a scripture node through the value channel")]
    MisplacedNode { field: String },

    /// A back-reference names an id that was never decoded.
    #[error("back-reference `{id}` does not name a decoded object")]
    UnresolvedReference { id: Uuid },

    /// The declared collection type has no registered sequence shape.
    #[error("collection `{field}` has a shape the reconciler cannot rebuild")]
    UnsupportedShape { field: &'static str },

    /// A type with no schema of any kind was reached.
    #[error("`{ty}` is not registered with any schema")]
    Unregistered { ty: &'static str },

    /// The opaque strategy for a type failed.
    #[error("opaque codec for `{ty}` failed: {source}")]
    Opaque { ty: &'static str, source: BoxError },

    /// A node's post-decode hook reported a failure.
    #[error("post-decode hook of `{node}` failed: {source}")]
    Hook { node: &'static str, source: BoxError },
}

impl CodecError {
    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
