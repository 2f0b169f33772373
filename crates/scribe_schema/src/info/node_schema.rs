use core::any::{Any, TypeId};
use core::mem;

use crate::info::sequence_schema::SequenceSchema;
use crate::info::{FieldError, NodeKind, short_type_name};
use crate::node::{Scripture, Tier};

// -----------------------------------------------------------------------------
// Accessor shapes

type ValueGet = Box<dyn Fn(&dyn Scripture) -> Result<Option<Box<dyn Any>>, FieldError>>;
type ValueSet = Box<dyn Fn(&mut dyn Scripture, Box<dyn Any>) -> Result<(), FieldError>>;

type NodeGet = Box<dyn for<'a> Fn(&'a dyn Scripture) -> Result<&'a dyn Scripture, FieldError>>;
type NodeSet = Box<dyn Fn(&mut dyn Scripture, Box<dyn Scripture>) -> Result<(), FieldError>>;

type NodeIter<'a> = Box<dyn Iterator<Item = &'a dyn Scripture> + 'a>;
type CollectionIter =
    Box<dyn for<'a> Fn(&'a dyn Scripture) -> Result<NodeIter<'a>, FieldError>>;
type CollectionTake =
    Box<dyn Fn(&mut dyn Scripture) -> Result<Option<Box<dyn Any>>, FieldError>>;
type CollectionAssign = Box<dyn Fn(&mut dyn Scripture, Box<dyn Any>) -> Result<(), FieldError>>;
type ItemAdapt = Box<dyn Fn(Box<dyn Scripture>) -> Box<dyn Any>>;

fn host_ref<'a, N: Scripture>(
    field: &'static str,
    node: &'a dyn Scripture,
) -> Result<&'a N, FieldError> {
    node.as_any().downcast_ref::<N>().ok_or(FieldError::Host {
        field,
        expected: core::any::type_name::<N>(),
    })
}

fn host_mut<'a, N: Scripture>(
    field: &'static str,
    node: &'a mut dyn Scripture,
) -> Result<&'a mut N, FieldError> {
    node.as_any_mut()
        .downcast_mut::<N>()
        .ok_or(FieldError::Host {
            field,
            expected: core::any::type_name::<N>(),
        })
}

// -----------------------------------------------------------------------------
// ValueField

/// Descriptor of a leaf-encodable field with a visibility tier.
///
/// The getter yields an owned copy of the current value (`None` stands for an
/// absent value and encodes as an empty element). The setter receives decoded
/// values; a decoded null is never assigned, the field keeps whatever value
/// the freshly constructed node already holds.
pub struct ValueField {
    name: &'static str,
    tier: Tier,
    ty: TypeId,
    ty_name: &'static str,
    get: ValueGet,
    set: ValueSet,
}

impl ValueField {
    pub fn new<N, V>(
        name: &'static str,
        tier: Tier,
        get: impl Fn(&N) -> Option<V> + 'static,
        set: impl Fn(&mut N, V) + 'static,
    ) -> Self
    where
        N: Scripture,
        V: Any,
    {
        Self {
            name,
            tier,
            ty: TypeId::of::<V>(),
            ty_name: core::any::type_name::<V>(),
            get: Box::new(move |node| {
                Ok(get(host_ref::<N>(name, node)?).map(|v| Box::new(v) as Box<dyn Any>))
            }),
            set: Box::new(move |node, value| {
                let host = host_mut::<N>(name, node)?;
                let value = value.downcast::<V>().map_err(|_| FieldError::Reject {
                    field: name,
                    expected: core::any::type_name::<V>(),
                })?;
                set(host, *value);
                Ok(())
            }),
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub const fn tier(&self) -> Tier {
        self.tier
    }

    #[inline]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    /// Full path of the declared value type, for diagnostics.
    #[inline]
    pub const fn ty_name(&self) -> &'static str {
        self.ty_name
    }

    #[inline]
    pub fn get(&self, node: &dyn Scripture) -> Result<Option<Box<dyn Any>>, FieldError> {
        (self.get)(node)
    }

    #[inline]
    pub fn set(&self, node: &mut dyn Scripture, value: Box<dyn Any>) -> Result<(), FieldError> {
        (self.set)(node, value)
    }
}

// -----------------------------------------------------------------------------
// SubNodeField

/// Descriptor of a singular nested node field.
///
/// The channel has no null form; the field always holds a node satisfying the
/// declared [`NodeKind`].
pub struct SubNodeField {
    name: &'static str,
    kind: NodeKind,
    get: NodeGet,
    set: NodeSet,
}

impl SubNodeField {
    /// Field holding a concrete node type.
    pub fn new<N, V>(
        name: &'static str,
        get: impl for<'a> Fn(&'a N) -> &'a V + 'static,
        set: impl Fn(&mut N, V) + 'static,
    ) -> Self
    where
        N: Scripture,
        V: Scripture,
    {
        Self {
            name,
            kind: NodeKind::of::<V>(),
            get: Box::new(move |node| Ok(get(host_ref::<N>(name, node)?) as &dyn Scripture)),
            set: Box::new(move |node, value| {
                let host = host_mut::<N>(name, node)?;
                let value = value.into_any().downcast::<V>().map_err(|_| {
                    FieldError::Reject {
                        field: name,
                        expected: core::any::type_name::<V>(),
                    }
                })?;
                set(host, *value);
                Ok(())
            }),
        }
    }

    /// Field holding any node satisfying `kind`, stored as a boxed trait
    /// object.
    pub fn polymorphic<N>(
        name: &'static str,
        kind: NodeKind,
        get: impl for<'a> Fn(&'a N) -> &'a (dyn Scripture + 'static) + 'static,
        set: impl Fn(&mut N, Box<dyn Scripture>) + 'static,
    ) -> Self
    where
        N: Scripture,
    {
        Self {
            name,
            kind,
            get: Box::new(move |node| Ok(get(host_ref::<N>(name, node)?))),
            set: Box::new(move |node, value| {
                set(host_mut::<N>(name, node)?, value);
                Ok(())
            }),
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn get<'a>(&self, node: &'a dyn Scripture) -> Result<&'a dyn Scripture, FieldError> {
        (self.get)(node)
    }

    #[inline]
    pub fn set(
        &self,
        node: &mut dyn Scripture,
        value: Box<dyn Scripture>,
    ) -> Result<(), FieldError> {
        (self.set)(node, value)
    }
}

// -----------------------------------------------------------------------------
// CollectionField

/// Descriptor of a nested collection-of-node field.
///
/// Items are emitted under a wrapper element named after the field, each item
/// element carrying the declared kind's name. On decode the items are merged
/// into the field through the collection reconciler; `seq` names the declared
/// collection type whose [`SequenceSchema`] decides the merge shape.
pub struct CollectionField {
    name: &'static str,
    item: NodeKind,
    seq: TypeId,
    iter: CollectionIter,
    take: CollectionTake,
    assign: CollectionAssign,
    adapt: ItemAdapt,
}

impl CollectionField {
    /// Field declared as `Vec<V>` for a concrete node type `V`.
    pub fn of_vec<N, V>(
        name: &'static str,
        get: impl for<'a> Fn(&'a N) -> &'a Vec<V> + 'static,
        get_mut: impl Fn(&mut N) -> &mut Vec<V> + 'static,
    ) -> Self
    where
        N: Scripture,
        V: Scripture,
    {
        let get_mut = std::rc::Rc::new(get_mut);
        let get_mut_take = get_mut.clone();
        Self {
            name,
            item: NodeKind::of::<V>(),
            seq: TypeId::of::<Vec<V>>(),
            iter: Box::new(move |node| {
                let host = host_ref::<N>(name, node)?;
                Ok(Box::new(get(host).iter().map(|v| v as &dyn Scripture)) as NodeIter<'_>)
            }),
            take: Box::new(move |node| {
                let host = host_mut::<N>(name, node)?;
                Ok(Some(Box::new(mem::take(get_mut_take(host))) as Box<dyn Any>))
            }),
            assign: Box::new(move |node, value| {
                let host = host_mut::<N>(name, node)?;
                let value = value.downcast::<Vec<V>>().map_err(|_| FieldError::Reject {
                    field: name,
                    expected: core::any::type_name::<Vec<V>>(),
                })?;
                *get_mut(host) = *value;
                Ok(())
            }),
            adapt: Box::new(|item| item.into_any()),
        }
    }

    /// Field declared as `Vec<Box<dyn Scripture>>` holding any node
    /// satisfying `item`.
    pub fn of_dyn_vec<N>(
        name: &'static str,
        item: NodeKind,
        get: impl for<'a> Fn(&'a N) -> &'a Vec<Box<dyn Scripture>> + 'static,
        get_mut: impl Fn(&mut N) -> &mut Vec<Box<dyn Scripture>> + 'static,
    ) -> Self
    where
        N: Scripture,
    {
        let get_mut = std::rc::Rc::new(get_mut);
        let get_mut_take = get_mut.clone();
        Self {
            name,
            item,
            seq: TypeId::of::<Vec<Box<dyn Scripture>>>(),
            iter: Box::new(move |node| {
                let host = host_ref::<N>(name, node)?;
                Ok(Box::new(get(host).iter().map(|v| &**v)) as NodeIter<'_>)
            }),
            take: Box::new(move |node| {
                let host = host_mut::<N>(name, node)?;
                Ok(Some(Box::new(mem::take(get_mut_take(host))) as Box<dyn Any>))
            }),
            assign: Box::new(move |node, value| {
                let host = host_mut::<N>(name, node)?;
                let value = value
                    .downcast::<Vec<Box<dyn Scripture>>>()
                    .map_err(|_| FieldError::Reject {
                        field: name,
                        expected: "Vec<Box<dyn Scripture>>",
                    })?;
                *get_mut(host) = *value;
                Ok(())
            }),
            adapt: Box::new(|item| Box::new(item)),
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub const fn item(&self) -> NodeKind {
        self.item
    }

    /// The declared collection type, resolved to a [`SequenceSchema`] at
    /// decode time.
    #[inline]
    pub const fn seq(&self) -> TypeId {
        self.seq
    }

    #[inline]
    pub fn iter<'a>(&self, node: &'a dyn Scripture) -> Result<NodeIter<'a>, FieldError> {
        (self.iter)(node)
    }

    /// Takes the current collection value out of the node, to serve as the
    /// reconciler's existing target.
    #[inline]
    pub fn take(&self, node: &mut dyn Scripture) -> Result<Option<Box<dyn Any>>, FieldError> {
        (self.take)(node)
    }

    #[inline]
    pub fn assign(&self, node: &mut dyn Scripture, value: Box<dyn Any>) -> Result<(), FieldError> {
        (self.assign)(node, value)
    }

    /// Converts a decoded node into the item shape the declared collection
    /// stores.
    #[inline]
    pub fn adapt(&self, item: Box<dyn Scripture>) -> Box<dyn Any> {
        (self.adapt)(item)
    }
}

// -----------------------------------------------------------------------------
// NodeSchema

/// The full descriptor of a scripture node type.
///
/// Built through [`NodeSchema::builder`] and registered in the
/// [`SchemaRegistry`](crate::registry::SchemaRegistry). Field groups are kept
/// in lexicographic name order so that encode and decode always visit fields
/// in the same sequence.
pub struct NodeSchema {
    ty: TypeId,
    name: &'static str,
    tag: &'static str,
    base: Option<TypeId>,
    factory: Box<dyn Fn() -> Box<dyn Scripture>>,
    values: Vec<ValueField>,
    singles: Vec<SubNodeField>,
    collections: Vec<CollectionField>,
    pub(crate) sequence_deps: Vec<SequenceSchema>,
}

impl NodeSchema {
    /// Starts a schema for node type `N`, persisted under `tag`.
    pub fn builder<N: Scripture + Default>(tag: &'static str) -> NodeSchemaBuilder<N> {
        NodeSchemaBuilder {
            schema: NodeSchema {
                ty: TypeId::of::<N>(),
                name: short_type_name(core::any::type_name::<N>()),
                tag,
                base: None,
                factory: Box::new(|| Box::new(N::default())),
                values: Vec::new(),
                singles: Vec::new(),
                collections: Vec::new(),
                sequence_deps: Vec::new(),
            },
            _marker: core::marker::PhantomData,
        }
    }

    #[inline]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    /// The element name of this node type.
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The persisted type tag.
    #[inline]
    pub const fn tag(&self) -> &'static str {
        self.tag
    }

    #[inline]
    pub const fn base(&self) -> Option<TypeId> {
        self.base
    }

    /// This schema's type as a [`NodeKind`].
    #[inline]
    pub fn kind(&self) -> NodeKind {
        NodeKind {
            ty: self.ty,
            name: self.name,
        }
    }

    /// Constructs a blank instance ready for field population.
    #[inline]
    pub fn construct(&self) -> Box<dyn Scripture> {
        (self.factory)()
    }

    /// Value fields in field order, secret-tier fields filtered out unless
    /// requested.
    pub fn value_fields(&self, include_secrets: bool) -> impl Iterator<Item = &ValueField> {
        self.values
            .iter()
            .filter(move |field| include_secrets || field.tier() == Tier::Public)
    }

    #[inline]
    pub fn singles(&self) -> &[SubNodeField] {
        &self.singles
    }

    #[inline]
    pub fn collections(&self) -> &[CollectionField] {
        &self.collections
    }
}

// -----------------------------------------------------------------------------
// NodeSchemaBuilder

/// Builder for [`NodeSchema`].
///
/// Collection methods also record the [`SequenceSchema`] of the declared
/// collection type, so registering the node registers its collection
/// dependencies in the same step.
pub struct NodeSchemaBuilder<N: Scripture + Default> {
    schema: NodeSchema,
    _marker: core::marker::PhantomData<N>,
}

impl<N: Scripture + Default> NodeSchemaBuilder<N> {
    /// Declares the base kind this node type is assignable to.
    pub fn base<B: Any>(mut self) -> Self {
        self.schema.base = Some(TypeId::of::<B>());
        self
    }

    /// Adds a public-tier value field.
    pub fn public<V: Any>(
        mut self,
        name: &'static str,
        get: impl Fn(&N) -> Option<V> + 'static,
        set: impl Fn(&mut N, V) + 'static,
    ) -> Self {
        self.schema
            .values
            .push(ValueField::new(name, Tier::Public, get, set));
        self
    }

    /// Adds a secret-tier value field.
    pub fn secret<V: Any>(
        mut self,
        name: &'static str,
        get: impl Fn(&N) -> Option<V> + 'static,
        set: impl Fn(&mut N, V) + 'static,
    ) -> Self {
        self.schema
            .values
            .push(ValueField::new(name, Tier::Secret, get, set));
        self
    }

    /// Adds a singular sub-node field holding the concrete node type `V`.
    pub fn single<V: Scripture>(
        mut self,
        name: &'static str,
        get: impl for<'a> Fn(&'a N) -> &'a V + 'static,
        set: impl Fn(&mut N, V) + 'static,
    ) -> Self {
        self.schema.singles.push(SubNodeField::new(name, get, set));
        self
    }

    /// Adds a singular sub-node field holding any node satisfying `kind`.
    pub fn single_dyn(
        mut self,
        name: &'static str,
        kind: NodeKind,
        get: impl for<'a> Fn(&'a N) -> &'a (dyn Scripture + 'static) + 'static,
        set: impl Fn(&mut N, Box<dyn Scripture>) + 'static,
    ) -> Self {
        self.schema
            .singles
            .push(SubNodeField::polymorphic(name, kind, get, set));
        self
    }

    /// Adds a collection field declared as `Vec<V>`.
    pub fn collection<V: Scripture>(
        mut self,
        name: &'static str,
        get: impl for<'a> Fn(&'a N) -> &'a Vec<V> + 'static,
        get_mut: impl Fn(&mut N) -> &mut Vec<V> + 'static,
    ) -> Self {
        self.schema
            .collections
            .push(CollectionField::of_vec(name, get, get_mut));
        self.schema.sequence_deps.push(SequenceSchema::node_vec::<V>());
        self
    }

    /// Adds a collection field declared as `Vec<Box<dyn Scripture>>`.
    pub fn collection_dyn(
        mut self,
        name: &'static str,
        item: NodeKind,
        get: impl for<'a> Fn(&'a N) -> &'a Vec<Box<dyn Scripture>> + 'static,
        get_mut: impl Fn(&mut N) -> &mut Vec<Box<dyn Scripture>> + 'static,
    ) -> Self {
        self.schema
            .collections
            .push(CollectionField::of_dyn_vec(name, item, get, get_mut));
        self.schema.sequence_deps.push(SequenceSchema::dyn_node_vec());
        self
    }

    /// Finishes the schema, fixing the deterministic field order.
    pub fn build(mut self) -> NodeSchema {
        self.schema.values.sort_by_key(ValueField::name);
        self.schema.singles.sort_by_key(SubNodeField::name);
        self.schema.collections.sort_by_key(CollectionField::name);
        self.schema
    }
}
