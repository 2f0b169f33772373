//! Schema layer of the scribe codec.
//!
//! Rust has no ambient runtime reflection, so everything the graph codec
//! needs to know about a type is described here explicitly: node schemas
//! with tiered value fields and sub-node channels, plain composite schemas
//! with identity-preserving handles, sequence and enum descriptors, opaque
//! strategies and scalar converters. The [`registry::SchemaRegistry`] stores
//! all of it, keyed by type and by persisted tag, and is populated once at
//! startup.
//!
//! The codec itself lives in the sibling `scribe_codec` crate and consults
//! this crate through lookups only; it never names a domain type.

// -----------------------------------------------------------------------------
// Modules

pub mod info;
pub mod node;
pub mod registry;
pub mod scalar;

// -----------------------------------------------------------------------------
// Top-level exports

pub use node::{AsAny, HookError, Scripture, Shared, Tier, shared};
