//! The encode driver.

use core::any::{Any, TypeId};
use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use uuid::Uuid;

use scribe_schema::Scripture;
use scribe_schema::registry::SchemaRegistry;

use crate::error::CodecError;
use crate::wire::{self, XmlOut};

// -----------------------------------------------------------------------------
// Encoder

/// Per-call encode context.
///
/// Holds the identity table mapping composite allocations to the id they
/// were first written under. A fresh encoder is built for every top-level
/// call, so the codec value itself stays stateless.
pub(crate) struct Encoder<'a> {
    registry: &'a SchemaRegistry,
    include_secrets: bool,
    ids: HashMap<usize, Uuid>,
    out: XmlOut,
}

impl<'a> Encoder<'a> {
    pub fn new(registry: &'a SchemaRegistry, include_secrets: bool) -> Self {
        Self {
            registry,
            include_secrets,
            ids: HashMap::new(),
            out: XmlOut::new(),
        }
    }

    pub fn encode(mut self, node: &dyn Scripture) -> Result<String, CodecError> {
        let registry = self.registry;
        let schema = registry
            .node(node.as_any().type_id())
            .ok_or(CodecError::Unregistered {
                ty: node.type_name(),
            })?;

        self.out.decl()?;
        let secrets = if self.include_secrets { "true" } else { "false" };
        self.out.start(
            wire::DOC_ROOT,
            &[(wire::ATTR_SECRETS, secrets), (wire::ATTR_TAG, schema.tag())],
        )?;
        self.encode_node(node, schema.name())?;
        self.out.end(wire::DOC_ROOT)?;
        self.out.finish()
    }

    /// Writes one node element. Sub-nodes are always inlined in full; only
    /// plain composites are deduplicated by identity.
    fn encode_node(&mut self, node: &dyn Scripture, name: &'static str) -> Result<(), CodecError> {
        let registry = self.registry;
        let schema = registry
            .node(node.as_any().type_id())
            .ok_or(CodecError::Unregistered {
                ty: node.type_name(),
            })?;

        let digest = STANDARD.encode(node.digest());
        self.out.start(
            name,
            &[
                (wire::ATTR_TAG, schema.tag()),
                (wire::ATTR_DIGEST, digest.as_str()),
            ],
        )?;

        for field in schema.value_fields(self.include_secrets) {
            let value = field.get(node)?;
            self.encode_value(field.name(), field.ty(), field.ty_name(), value.as_deref())?;
        }

        for field in schema.singles() {
            self.encode_node(field.get(node)?, field.name())?;
        }

        for field in schema.collections() {
            self.out.start(field.name(), &[])?;
            let item_name = field.item().name();
            for item in field.iter(node)? {
                self.encode_node(item, item_name)?;
            }
            self.out.end(field.name())?;
        }

        self.out.end(name)
    }

    /// Writes one generic value element.
    fn encode_value(
        &mut self,
        name: &'static str,
        ty: TypeId,
        ty_name: &'static str,
        value: Option<&dyn Any>,
    ) -> Result<(), CodecError> {
        let registry = self.registry;

        let Some(value) = value else {
            return self.out.empty(name, &[]);
        };

        if registry.is_node_kind(ty) {
            return Err(CodecError::MisplacedNode {
                field: name.to_owned(),
            });
        }

        if let Some(codec) = registry.scalars().get(ty) {
            return self.out.leaf(name, &codec.encode(value)?);
        }

        if let Some(opaque) = registry.opaque(ty) {
            let text = opaque.encode(value).map_err(|source| CodecError::Opaque {
                ty: opaque.name(),
                source,
            })?;
            return self.out.leaf(name, &text);
        }

        if let Some(seq) = registry.sequence(ty) {
            if registry.is_node_kind(seq.item()) {
                return Err(CodecError::MisplacedNode {
                    field: name.to_owned(),
                });
            }
            let item_name =
                registry
                    .name_of(seq.item())
                    .ok_or(CodecError::Unregistered { ty: seq.ty_name() })?;
            let items = seq
                .items(value)?
                .ok_or(CodecError::UnsupportedShape { field: name })?;
            self.out.start(name, &[])?;
            for item in &items {
                self.encode_value(item_name, seq.item(), seq.ty_name(), Some(&**item))?;
            }
            return self.out.end(name);
        }

        if let Some(en) = registry.enumeration(ty) {
            return self.out.leaf(name, en.to_symbol(value)?);
        }

        if let Some(composite) = registry.composite(ty) {
            let identity = composite.identity(value)?;
            if let Some(id) = self.ids.get(&identity) {
                let id = id.to_string();
                return self.out.empty(name, &[(wire::ATTR_REF, id.as_str())]);
            }

            let id = Uuid::new_v4();
            self.ids.insert(identity, id);
            let id_text = id.to_string();
            self.out.start(name, &[(wire::ATTR_ID, id_text.as_str())])?;
            for field in composite.fields() {
                let value = field.get(value)?;
                self.encode_value(field.name(), field.ty(), field.ty_name(), value.as_deref())?;
            }
            return self.out.end(name);
        }

        Err(CodecError::Unregistered { ty: ty_name })
    }
}
