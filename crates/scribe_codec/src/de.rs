//! The decode driver.

use core::any::{Any, TypeId};
use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use roxmltree::{Document, Node as XmlNode};
use uuid::Uuid;

use scribe_schema::Scripture;
use scribe_schema::info::NodeKind;
use scribe_schema::registry::{ResolveError, SchemaRegistry};
use scribe_schema::scalar::ConversionError;

use crate::error::CodecError;
use crate::reconcile::{Reconciled, reconcile};
use crate::wire;

// -----------------------------------------------------------------------------
// Expectation

/// What the caller sanctioned the document's type tags to resolve to.
pub(crate) enum Expectation {
    /// The resolved type must be exactly this kind.
    Exactly(NodeKind),
    /// The resolved type's base chain must reach this kind.
    Satisfying(NodeKind),
}

// -----------------------------------------------------------------------------
// Helpers

fn elements<'a, 'input>(
    node: XmlNode<'a, 'input>,
) -> impl Iterator<Item = XmlNode<'a, 'input>> {
    node.children().filter(XmlNode::is_element)
}

fn attr<'a>(element: XmlNode<'a, '_>, name: &str) -> Result<&'a str, CodecError> {
    element.attribute(name).ok_or_else(|| {
        CodecError::mismatch(
            format!(
                "attribute `{name}` on `{}`",
                element.tag_name().name()
            ),
            "nothing",
        )
    })
}

/// Strict, ordered walk over the element children of one parent.
struct Walk<'a, 'input> {
    parent: String,
    children: Vec<XmlNode<'a, 'input>>,
    next: usize,
}

impl<'a, 'input> Walk<'a, 'input> {
    fn new(parent: XmlNode<'a, 'input>) -> Self {
        Self {
            parent: parent.tag_name().name().to_owned(),
            children: elements(parent).collect(),
            next: 0,
        }
    }

    /// The next child, which must carry exactly the expected name.
    fn expect(&mut self, name: &str) -> Result<XmlNode<'a, 'input>, CodecError> {
        let Some(child) = self.children.get(self.next).copied() else {
            return Err(CodecError::mismatch(
                format!("element `{name}` in `{}`", self.parent),
                "end of children",
            ));
        };
        let found = child.tag_name().name();
        if found != name {
            return Err(CodecError::mismatch(
                format!("element `{name}` in `{}`", self.parent),
                format!("`{found}`"),
            ));
        }
        self.next += 1;
        Ok(child)
    }

    /// Every child must have been consumed.
    fn finish(self) -> Result<(), CodecError> {
        match self.children.get(self.next) {
            Some(extra) => Err(CodecError::mismatch(
                format!("end of `{}`", self.parent),
                format!("`{}`", extra.tag_name().name()),
            )),
            None => Ok(()),
        }
    }
}

// -----------------------------------------------------------------------------
// Decoder

/// Per-call decode context.
///
/// Holds the identity table mapping decoded ids to their reconstructed
/// handle. A fresh decoder is built for every top-level call.
pub(crate) struct Decoder<'a> {
    registry: &'a SchemaRegistry,
    secrets_included: bool,
    refs: HashMap<Uuid, Box<dyn Any>>,
}

impl<'a> Decoder<'a> {
    pub fn decode(
        registry: &'a SchemaRegistry,
        text: &str,
        expected: &Expectation,
    ) -> Result<Box<dyn Scripture>, CodecError> {
        let doc = Document::parse(text)?;
        let root = doc.root_element();

        let root_name = root.tag_name().name();
        if root_name != wire::DOC_ROOT {
            return Err(CodecError::mismatch(
                format!("root element `{}`", wire::DOC_ROOT),
                format!("`{root_name}`"),
            ));
        }

        let secrets_text = attr(root, wire::ATTR_SECRETS)?;
        let secrets_included = secrets_text.parse::<bool>().map_err(|_| {
            CodecError::mismatch("a boolean secrets attribute", format!("`{secrets_text}`"))
        })?;

        // The root tag gates what this call may construct, before anything
        // is built.
        let tag = attr(root, wire::ATTR_TAG)?;
        let schema = registry.resolve_tag(tag)?;
        check(registry, schema, expected)?;

        let mut walk = Walk::new(root);
        let element = walk.expect(schema.name())?;

        let mut decoder = Self {
            registry,
            secrets_included,
            refs: HashMap::new(),
        };
        let node = decoder.decode_node(element, &Expectation::Exactly(schema.kind()))?;
        walk.finish()?;
        Ok(node)
    }

    fn decode_node(
        &mut self,
        element: XmlNode<'_, '_>,
        expected: &Expectation,
    ) -> Result<Box<dyn Scripture>, CodecError> {
        let registry = self.registry;

        let tag = attr(element, wire::ATTR_TAG)?;
        let schema = registry.resolve_tag(tag)?;
        check(registry, schema, expected)?;

        let digest_text = attr(element, wire::ATTR_DIGEST)?;
        let digest = STANDARD.decode(digest_text).map_err(|err| {
            CodecError::mismatch("a base64 digest attribute", err.to_string())
        })?;

        let mut node = schema.construct();
        let mut walk = Walk::new(element);

        for field in schema.value_fields(self.secrets_included) {
            let child = walk.expect(field.name())?;
            let existing = field.get(&*node)?;
            if let Some(value) =
                self.decode_value(child, field.ty(), field.ty_name(), existing)?
            {
                field.set(&mut *node, value)?;
            }
        }

        for field in schema.singles() {
            let child = walk.expect(field.name())?;
            let sub = self.decode_node(child, &Expectation::Satisfying(field.kind()))?;
            field.set(&mut *node, sub)?;
        }

        for field in schema.collections() {
            let child = walk.expect(field.name())?;
            let item_name = field.item().name();

            let mut items = Vec::new();
            for item_element in elements(child) {
                let found = item_element.tag_name().name();
                if found != item_name {
                    return Err(CodecError::mismatch(
                        format!("collection items named `{item_name}`"),
                        format!("`{found}`"),
                    ));
                }
                let sub =
                    self.decode_node(item_element, &Expectation::Satisfying(field.item()))?;
                items.push(field.adapt(sub));
            }

            let seq = registry
                .sequence(field.seq())
                .ok_or(CodecError::UnsupportedShape {
                    field: field.name(),
                })?;
            let existing = field.take(&mut *node)?;
            match reconcile(seq, existing, items)? {
                Reconciled::InPlace => {}
                Reconciled::Replace(value) => field.assign(&mut *node, value)?,
            }
        }

        walk.finish()?;

        node.decoded(&digest, self.secrets_included)
            .map_err(|source| CodecError::Hook {
                node: schema.name(),
                source,
            })?;
        Ok(node)
    }

    /// Decodes one generic value element. `Ok(None)` stands for a null
    /// result, which the caller leaves unassigned.
    fn decode_value(
        &mut self,
        element: XmlNode<'_, '_>,
        ty: TypeId,
        ty_name: &'static str,
        existing: Option<Box<dyn Any>>,
    ) -> Result<Option<Box<dyn Any>>, CodecError> {
        let registry = self.registry;

        let has_identity = element.attribute(wire::ATTR_REF).is_some()
            || element.attribute(wire::ATTR_ID).is_some();
        let is_sequence = registry.sequence(ty).is_some();
        let is_empty =
            elements(element).next().is_none() && element.text().is_none_or(str::is_empty);

        if is_empty && !is_sequence && !has_identity {
            return Ok(None);
        }

        if registry.is_node_kind(ty) {
            return Err(CodecError::MisplacedNode {
                field: element.tag_name().name().to_owned(),
            });
        }

        if let Some(codec) = registry.scalars().get(ty) {
            let value = codec.decode(element.text().unwrap_or(""))?;
            return Ok(Some(value));
        }

        if let Some(opaque) = registry.opaque(ty) {
            let text = element.text().unwrap_or("");
            let value = opaque.decode(text).map_err(|source| CodecError::Opaque {
                ty: opaque.name(),
                source,
            })?;
            return Ok(Some(value));
        }

        if let Some(seq) = registry.sequence(ty) {
            let item_name =
                registry
                    .name_of(seq.item())
                    .ok_or(CodecError::Unregistered { ty: seq.ty_name() })?;

            let mut items = Vec::new();
            for item_element in elements(element) {
                let found = item_element.tag_name().name();
                if found != item_name {
                    return Err(CodecError::mismatch(
                        format!("sequence items named `{item_name}`"),
                        format!("`{found}`"),
                    ));
                }
                let item = self
                    .decode_value(item_element, seq.item(), seq.ty_name(), None)?
                    .ok_or_else(|| {
                        CodecError::mismatch(
                            format!("a `{item_name}` item value"),
                            "an empty element",
                        )
                    })?;
                items.push(item);
            }

            return match reconcile(seq, existing, items)? {
                Reconciled::InPlace => Ok(None),
                Reconciled::Replace(value) => Ok(Some(value)),
            };
        }

        if let Some(en) = registry.enumeration(ty) {
            let text = element.text().unwrap_or("");
            return match en.from_symbol(text) {
                Some(value) => Ok(Some(value)),
                None => Err(CodecError::Conversion(ConversionError {
                    ty: en.name(),
                    text: text.to_owned(),
                    source: "unknown symbolic name".into(),
                })),
            };
        }

        if let Some(composite) = registry.composite(ty) {
            if let Some(ref_text) = element.attribute(wire::ATTR_REF) {
                let id = parse_id(ref_text)?;
                let stored = self
                    .refs
                    .get(&id)
                    .ok_or(CodecError::UnresolvedReference { id })?;
                return Ok(Some(composite.clone_handle(&**stored)?));
            }

            let id_text = element.attribute(wire::ATTR_ID).ok_or_else(|| {
                CodecError::mismatch(
                    format!("an id attribute on `{}`", element.tag_name().name()),
                    "no identity",
                )
            })?;
            let id = parse_id(id_text)?;

            // Register the handle before descending so that children can
            // refer back to it.
            let handle = composite.construct();
            self.refs.insert(id, composite.clone_handle(&*handle)?);

            let mut walk = Walk::new(element);
            for field in composite.fields() {
                let child = walk.expect(field.name())?;
                let existing = field.get(&*handle)?;
                if let Some(value) =
                    self.decode_value(child, field.ty(), field.ty_name(), existing)?
                {
                    field.set(&*handle, value)?;
                }
            }
            walk.finish()?;
            return Ok(Some(handle));
        }

        Err(CodecError::Unregistered { ty: ty_name })
    }
}

fn check(
    registry: &SchemaRegistry,
    schema: &scribe_schema::info::NodeSchema,
    expected: &Expectation,
) -> Result<(), CodecError> {
    match expected {
        Expectation::Exactly(kind) => {
            if schema.ty() != kind.ty() {
                return Err(ResolveError::Incompatible {
                    name: schema.name(),
                    expected: kind.name(),
                }
                .into());
            }
            Ok(())
        }
        Expectation::Satisfying(kind) => Ok(registry.check_expected(schema, *kind)?),
    }
}

fn parse_id(text: &str) -> Result<Uuid, CodecError> {
    Uuid::parse_str(text)
        .map_err(|_| CodecError::mismatch("a well-formed identity attribute", format!("`{text}`")))
}
