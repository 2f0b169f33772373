//! Descriptor tables for everything the codec can visit.
//!
//! Schemas are built once at startup, sorted deterministically, and looked up
//! through the [`SchemaRegistry`](crate::registry::SchemaRegistry) while
//! encoding or decoding.

mod composite_schema;
mod enum_schema;
mod node_schema;
mod opaque;
mod sequence_schema;

pub use composite_schema::{CompositeField, CompositeSchema, CompositeSchemaBuilder};
pub use enum_schema::EnumSchema;
pub use node_schema::{
    CollectionField, NodeSchema, NodeSchemaBuilder, SubNodeField, ValueField,
};
pub use opaque::{OpaqueCodec, OpaqueError};
pub use sequence_schema::{SequenceSchema, SequenceShape};

use core::any::{Any, TypeId};

use thiserror::Error;

// -----------------------------------------------------------------------------
// FieldError

/// Failure raised by a field accessor.
///
/// Accessors are built from typed closures at registration time, so these
/// errors indicate a schema applied to the wrong host value or a decoded
/// value of the wrong type reaching a setter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FieldError {
    #[error("field `{field}` cannot be accessed on a value that is not `{expected}`")]
    Host {
        field: &'static str,
        expected: &'static str,
    },

    #[error("field `{field}` rejected a decoded value that is not `{expected}`")]
    Reject {
        field: &'static str,
        expected: &'static str,
    },

    #[error("`{ty}` value is not present in its symbolic name table")]
    NoSymbol { ty: &'static str },
}

// -----------------------------------------------------------------------------
// NodeKind

/// The declared kind of a sub-node channel, and the expectation a decoded
/// type tag is validated against.
///
/// A kind names either a concrete node type or an abstract kind registered
/// with [`SchemaRegistry::register_abstract`]. A resolved schema satisfies a
/// kind when its base chain reaches the kind's type.
///
/// [`SchemaRegistry::register_abstract`]: crate::registry::SchemaRegistry::register_abstract
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeKind {
    ty: TypeId,
    name: &'static str,
}

impl NodeKind {
    /// The kind of type `T`, named after the type itself.
    #[inline]
    pub fn of<T: Any>() -> Self {
        Self {
            ty: TypeId::of::<T>(),
            name: short_type_name(core::any::type_name::<T>()),
        }
    }

    #[inline]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    /// The element name used for this kind in the encoded form.
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

// -----------------------------------------------------------------------------
// Helpers

/// Strips module segments from a type path.
///
/// Generic type paths keep only the head segment; types that need a usable
/// element name despite generic parameters are registered under an explicit
/// name instead.
pub fn short_type_name(full: &'static str) -> &'static str {
    let head = match full.find('<') {
        Some(idx) => &full[..idx],
        None => full,
    };
    match head.rfind("::") {
        Some(idx) => &head[idx + 2..],
        None => head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names() {
        assert_eq!(short_type_name("i32"), "i32");
        assert_eq!(short_type_name("alloc::string::String"), "String");
        assert_eq!(short_type_name("alloc::vec::Vec<core::num::i32>"), "Vec");
    }

    #[test]
    fn kind_of_uses_the_short_name() {
        struct Chapter;
        let kind = NodeKind::of::<Chapter>();
        assert_eq!(kind.name(), "Chapter");
        assert_eq!(kind.ty(), TypeId::of::<Chapter>());
    }
}
