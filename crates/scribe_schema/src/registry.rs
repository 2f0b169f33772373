//! The central schema store and the tag resolver.

use core::any::{Any, TypeId};
use std::collections::HashMap;

use thiserror::Error;

use crate::info::{
    CompositeSchema, EnumSchema, NodeKind, NodeSchema, OpaqueCodec, SequenceSchema,
    short_type_name,
};
use crate::scalar::ScalarRegistry;

// -----------------------------------------------------------------------------
// Errors

/// Failure while resolving a persisted type tag.
///
/// These gate what the decoder is allowed to construct, so every variant is
/// fatal for the enclosing call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    #[error("type tag `{tag}` is not registered")]
    UnknownTag { tag: String },

    #[error("type tag `{tag}` resolves to `{name}`, which cannot be constructed")]
    Unconstructable { tag: String, name: &'static str },

    #[error("`{name}` does not satisfy the expected kind `{expected}`")]
    Incompatible {
        name: &'static str,
        expected: &'static str,
    },
}

/// Failure while registering a schema.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegisterError {
    #[error("type tag `{tag}` is already registered")]
    DuplicateTag { tag: &'static str },

    #[error("`{name}` is already registered")]
    DuplicateType { name: &'static str },
}

// -----------------------------------------------------------------------------
// AbstractKind

/// A tag-less stand-in for a family of node types.
///
/// Abstract kinds anchor base chains: a concrete schema whose chain reaches
/// an abstract kind satisfies expectations of that kind. An abstract kind
/// may carry a tag of its own, in which case a document naming it resolves
/// but cannot be constructed.
struct AbstractKind {
    name: &'static str,
    base: Option<TypeId>,
    tag: Option<&'static str>,
}

// -----------------------------------------------------------------------------
// SchemaRegistry

/// Process-wide store of every schema the codec can consult.
///
/// Populated once at startup and then only read. The registry is the single
/// source of truth for node schemas (indexed both by type and by persisted
/// tag), plain composite schemas, sequence and enum descriptors, opaque
/// strategies and the scalar converter table.
///
/// # Example
///
/// ```
/// use scribe_schema::info::NodeSchema;
/// use scribe_schema::node::Scripture;
/// use scribe_schema::registry::SchemaRegistry;
///
/// #[derive(Default)]
/// struct Psalm {
///     count: i32,
/// }
///
/// impl Scripture for Psalm {}
///
/// let mut registry = SchemaRegistry::new();
/// registry
///     .register_node(
///         NodeSchema::builder::<Psalm>("liturgy/psalm")
///             .public("Count", |p: &Psalm| Some(p.count), |p, v| p.count = v)
///             .build(),
///     )
///     .unwrap();
///
/// assert_eq!(registry.resolve_tag("liturgy/psalm").unwrap().name(), "Psalm");
/// ```
pub struct SchemaRegistry {
    nodes: HashMap<TypeId, NodeSchema>,
    tags: HashMap<&'static str, TypeId>,
    abstracts: HashMap<TypeId, AbstractKind>,
    composites: HashMap<TypeId, CompositeSchema>,
    sequences: HashMap<TypeId, SequenceSchema>,
    enums: HashMap<TypeId, EnumSchema>,
    opaques: HashMap<TypeId, OpaqueCodec>,
    scalars: ScalarRegistry,
}

impl Default for SchemaRegistry {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Creates a registry preloaded with the standard scalar converters.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            tags: HashMap::new(),
            abstracts: HashMap::new(),
            composites: HashMap::new(),
            sequences: HashMap::new(),
            enums: HashMap::new(),
            opaques: HashMap::new(),
            scalars: ScalarRegistry::standard(),
        }
    }

    // -------------------------------------------------------------------------
    // Registration

    /// Registers a node schema together with its collection dependencies.
    pub fn register_node(&mut self, mut schema: NodeSchema) -> Result<(), RegisterError> {
        if self.nodes.contains_key(&schema.ty()) {
            return Err(RegisterError::DuplicateType {
                name: schema.name(),
            });
        }
        if self.tags.contains_key(schema.tag()) {
            return Err(RegisterError::DuplicateTag { tag: schema.tag() });
        }

        for dep in core::mem::take(&mut schema.sequence_deps) {
            self.sequences.entry(dep.ty()).or_insert(dep);
        }

        log::trace!("registering node `{}` under tag `{}`", schema.name(), schema.tag());
        self.tags.insert(schema.tag(), schema.ty());
        self.nodes.insert(schema.ty(), schema);
        Ok(())
    }

    /// Registers `T` as an abstract kind with no base.
    pub fn register_abstract<T: Any>(&mut self) -> Result<(), RegisterError> {
        self.register_abstract_kind::<T>(None, None)
    }

    /// Registers `T` as an abstract kind whose own base is `B`.
    pub fn register_abstract_based<T: Any, B: Any>(&mut self) -> Result<(), RegisterError> {
        self.register_abstract_kind::<T>(Some(TypeId::of::<B>()), None)
    }

    /// Registers `T` as an abstract kind that documents may name by tag.
    /// Resolving such a tag fails with [`ResolveError::Unconstructable`].
    pub fn register_abstract_tagged<T: Any>(
        &mut self,
        tag: &'static str,
    ) -> Result<(), RegisterError> {
        self.register_abstract_kind::<T>(None, Some(tag))
    }

    fn register_abstract_kind<T: Any>(
        &mut self,
        base: Option<TypeId>,
        tag: Option<&'static str>,
    ) -> Result<(), RegisterError> {
        let ty = TypeId::of::<T>();
        let name = short_type_name(core::any::type_name::<T>());
        if self.abstracts.contains_key(&ty) || self.nodes.contains_key(&ty) {
            return Err(RegisterError::DuplicateType { name });
        }
        if let Some(tag) = tag {
            if self.tags.contains_key(tag) {
                return Err(RegisterError::DuplicateTag { tag });
            }
            self.tags.insert(tag, ty);
        }
        self.abstracts.insert(ty, AbstractKind { name, base, tag });
        Ok(())
    }

    pub fn register_composite(&mut self, schema: CompositeSchema) -> Result<(), RegisterError> {
        if self.composites.contains_key(&schema.ty()) {
            return Err(RegisterError::DuplicateType {
                name: schema.name(),
            });
        }
        self.composites.insert(schema.ty(), schema);
        Ok(())
    }

    pub fn register_sequence(&mut self, schema: SequenceSchema) {
        let name = schema.ty_name();
        if self.sequences.insert(schema.ty(), schema).is_some() {
            log::warn!("replaced the sequence schema of `{name}`");
        }
    }

    pub fn register_enum(&mut self, schema: EnumSchema) {
        self.enums.insert(schema.ty(), schema);
    }

    pub fn register_opaque(&mut self, codec: OpaqueCodec) {
        self.opaques.insert(codec.ty(), codec);
    }

    /// The scalar converter table.
    #[inline]
    pub fn scalars(&self) -> &ScalarRegistry {
        &self.scalars
    }

    #[inline]
    pub fn scalars_mut(&mut self) -> &mut ScalarRegistry {
        &mut self.scalars
    }

    // -------------------------------------------------------------------------
    // Lookups

    #[inline]
    pub fn node(&self, ty: TypeId) -> Option<&NodeSchema> {
        self.nodes.get(&ty)
    }

    /// Whether `ty` names a node type or an abstract kind. Such types must
    /// never travel through the generic value channel.
    #[inline]
    pub fn is_node_kind(&self, ty: TypeId) -> bool {
        self.nodes.contains_key(&ty) || self.abstracts.contains_key(&ty)
    }

    #[inline]
    pub fn composite(&self, ty: TypeId) -> Option<&CompositeSchema> {
        self.composites.get(&ty)
    }

    #[inline]
    pub fn sequence(&self, ty: TypeId) -> Option<&SequenceSchema> {
        self.sequences.get(&ty)
    }

    #[inline]
    pub fn enumeration(&self, ty: TypeId) -> Option<&EnumSchema> {
        self.enums.get(&ty)
    }

    #[inline]
    pub fn opaque(&self, ty: TypeId) -> Option<&OpaqueCodec> {
        self.opaques.get(&ty)
    }

    /// The wire name of a leaf-encodable type, used as the element name for
    /// sequence items.
    pub fn name_of(&self, ty: TypeId) -> Option<&'static str> {
        if let Some(codec) = self.scalars.get(ty) {
            return Some(codec.name());
        }
        if let Some(schema) = self.composites.get(&ty) {
            return Some(schema.name());
        }
        if let Some(schema) = self.enums.get(&ty) {
            return Some(schema.name());
        }
        if let Some(codec) = self.opaques.get(&ty) {
            return Some(codec.name());
        }
        None
    }

    // -------------------------------------------------------------------------
    // Tag resolution

    /// Resolves a persisted tag to a constructible node schema.
    pub fn resolve_tag(&self, tag: &str) -> Result<&NodeSchema, ResolveError> {
        let ty = self.tags.get(tag).ok_or_else(|| ResolveError::UnknownTag {
            tag: tag.to_owned(),
        })?;
        match self.nodes.get(ty) {
            Some(schema) => Ok(schema),
            None => {
                let name = self
                    .abstracts
                    .get(ty)
                    .map(|kind| kind.name)
                    .unwrap_or("<unknown>");
                Err(ResolveError::Unconstructable {
                    tag: tag.to_owned(),
                    name,
                })
            }
        }
    }

    /// The persisted tag of node type `T`, if registered.
    pub fn tag_of<T: Any>(&self) -> Option<&'static str> {
        if let Some(schema) = self.nodes.get(&TypeId::of::<T>()) {
            return Some(schema.tag());
        }
        self.abstracts
            .get(&TypeId::of::<T>())
            .and_then(|kind| kind.tag)
    }

    /// Checks a resolved schema against the kind the caller sanctioned.
    pub fn check_expected(
        &self,
        schema: &NodeSchema,
        expected: NodeKind,
    ) -> Result<(), ResolveError> {
        if self.is_assignable(schema.ty(), expected.ty()) {
            Ok(())
        } else {
            Err(ResolveError::Incompatible {
                name: schema.name(),
                expected: expected.name(),
            })
        }
    }

    /// Walks the base chain from `ty` looking for `expected`.
    fn is_assignable(&self, ty: TypeId, expected: TypeId) -> bool {
        let mut current = Some(ty);
        while let Some(ty) = current {
            if ty == expected {
                return true;
            }
            current = match self.nodes.get(&ty) {
                Some(schema) => schema.base(),
                None => self.abstracts.get(&ty).and_then(|kind| kind.base),
            };
        }
        false
    }
}
