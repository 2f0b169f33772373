//! Schema-driven codec for trees of polymorphic scripture nodes.
//!
//! The [`schema`] crate describes domain types to the codec through explicit
//! descriptor tables; the [`codec`] crate round-trips object graphs through
//! a textual tree document, preserving shared-reference identity, resolving
//! run-time types from persisted tags and filtering fields by visibility
//! tier.

pub use scribe_codec as codec;
pub use scribe_schema as schema;
