use core::any::{Any, TypeId};

use crate::info::{FieldError, short_type_name};
use crate::node::{Shared, shared};

// -----------------------------------------------------------------------------
// CompositeField

type CompositeGet = Box<dyn Fn(&dyn Any) -> Result<Option<Box<dyn Any>>, FieldError>>;
type CompositeSet = Box<dyn Fn(&dyn Any, Box<dyn Any>) -> Result<(), FieldError>>;

/// Descriptor of a field on a plain composite object.
///
/// Accessors operate on the [`Shared`] handle; the setter goes through the
/// handle's interior mutability so that a registered-but-shared instance can
/// be populated while other decoded fields already alias it.
pub struct CompositeField {
    name: &'static str,
    ty: TypeId,
    ty_name: &'static str,
    get: CompositeGet,
    set: CompositeSet,
}

impl CompositeField {
    pub fn new<T, V>(
        name: &'static str,
        get: impl Fn(&T) -> Option<V> + 'static,
        set: impl Fn(&mut T, V) + 'static,
    ) -> Self
    where
        T: Any,
        V: Any,
    {
        Self {
            name,
            ty: TypeId::of::<V>(),
            ty_name: core::any::type_name::<V>(),
            get: Box::new(move |handle| {
                let handle = handle_ref::<T>(name, handle)?;
                Ok(get(&handle.borrow()).map(|v| Box::new(v) as Box<dyn Any>))
            }),
            set: Box::new(move |handle, value| {
                let handle = handle_ref::<T>(name, handle)?;
                let value = value.downcast::<V>().map_err(|_| FieldError::Reject {
                    field: name,
                    expected: core::any::type_name::<V>(),
                })?;
                set(&mut handle.borrow_mut(), *value);
                Ok(())
            }),
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    #[inline]
    pub const fn ty_name(&self) -> &'static str {
        self.ty_name
    }

    #[inline]
    pub fn get(&self, handle: &dyn Any) -> Result<Option<Box<dyn Any>>, FieldError> {
        (self.get)(handle)
    }

    #[inline]
    pub fn set(&self, handle: &dyn Any, value: Box<dyn Any>) -> Result<(), FieldError> {
        (self.set)(handle, value)
    }
}

fn handle_ref<'a, T: Any>(
    field: &'static str,
    handle: &'a dyn Any,
) -> Result<&'a Shared<T>, FieldError> {
    handle.downcast_ref::<Shared<T>>().ok_or(FieldError::Host {
        field,
        expected: core::any::type_name::<Shared<T>>(),
    })
}

// -----------------------------------------------------------------------------
// CompositeSchema

/// Descriptor of a plain composite object type `T`, registered under the
/// handle type `Shared<T>`.
///
/// Composites are the only values deduplicated by identity: the first
/// occurrence in an encode call is inlined under a fresh id, repeats become
/// back-references, and decode restores the aliasing by cloning the handle.
pub struct CompositeSchema {
    ty: TypeId,
    name: &'static str,
    factory: Box<dyn Fn() -> Box<dyn Any>>,
    identity: Box<dyn Fn(&dyn Any) -> Result<usize, FieldError>>,
    clone_handle: Box<dyn Fn(&dyn Any) -> Result<Box<dyn Any>, FieldError>>,
    fields: Vec<CompositeField>,
}

impl CompositeSchema {
    /// Starts a schema for composite type `T`.
    pub fn of<T: Any + Default>() -> CompositeSchemaBuilder<T> {
        let name = short_type_name(core::any::type_name::<T>());
        CompositeSchemaBuilder {
            schema: CompositeSchema {
                ty: TypeId::of::<Shared<T>>(),
                name,
                factory: Box::new(|| Box::new(shared(T::default()))),
                identity: Box::new(move |handle| {
                    let handle = handle_ref::<T>(name, handle)?;
                    Ok(std::rc::Rc::as_ptr(handle) as *const () as usize)
                }),
                clone_handle: Box::new(move |handle| {
                    let handle = handle_ref::<T>(name, handle)?;
                    Ok(Box::new(std::rc::Rc::clone(handle)))
                }),
                fields: Vec::new(),
            },
            _marker: core::marker::PhantomData,
        }
    }

    /// The handle type this schema is registered under.
    #[inline]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Constructs a default-initialized handle.
    #[inline]
    pub fn construct(&self) -> Box<dyn Any> {
        (self.factory)()
    }

    /// The identity of a handle, stable for the lifetime of the allocation.
    #[inline]
    pub fn identity(&self, handle: &dyn Any) -> Result<usize, FieldError> {
        (self.identity)(handle)
    }

    /// Clones the handle, preserving identity.
    #[inline]
    pub fn clone_handle(&self, handle: &dyn Any) -> Result<Box<dyn Any>, FieldError> {
        (self.clone_handle)(handle)
    }

    /// Fields in deterministic order.
    #[inline]
    pub fn fields(&self) -> &[CompositeField] {
        &self.fields
    }
}

// -----------------------------------------------------------------------------
// CompositeSchemaBuilder

pub struct CompositeSchemaBuilder<T: Any + Default> {
    schema: CompositeSchema,
    _marker: core::marker::PhantomData<T>,
}

impl<T: Any + Default> CompositeSchemaBuilder<T> {
    pub fn field<V: Any>(
        mut self,
        name: &'static str,
        get: impl Fn(&T) -> Option<V> + 'static,
        set: impl Fn(&mut T, V) + 'static,
    ) -> Self {
        self.schema.fields.push(CompositeField::new(name, get, set));
        self
    }

    pub fn build(mut self) -> CompositeSchema {
        self.schema.fields.sort_by_key(CompositeField::name);
        self.schema
    }
}
