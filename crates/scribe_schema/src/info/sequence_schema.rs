use core::any::{Any, TypeId};

use crate::info::FieldError;
use crate::node::{Scripture, Shared, shared};

// -----------------------------------------------------------------------------
// SequenceShape

/// How a declared sequence type can be rebuilt from decoded items.
///
/// The shape drives the collection reconciler's policy: shared handles are
/// appended in place, constructible sequences are rebuilt and assigned, and
/// fixed sequences are materialized from scratch in decoded order.
pub enum SequenceShape {
    /// Constructible and growable, like `Vec<V>`.
    Appendable {
        new: Box<dyn Fn() -> Box<dyn Any>>,
        push: Box<dyn Fn(&mut dyn Any, Box<dyn Any>) -> Result<(), FieldError>>,
    },

    /// A [`Shared`] handle over a growable sequence. Appending through the
    /// handle is visible to every alias, so no reassignment is needed.
    SharedAppendable {
        new: Box<dyn Fn() -> Box<dyn Any>>,
        push: Box<dyn Fn(&dyn Any, Box<dyn Any>) -> Result<(), FieldError>>,
    },

    /// Read-only once built, like `Box<[V]>`. Always replaced wholesale.
    Fixed {
        build: Box<dyn Fn(Vec<Box<dyn Any>>) -> Result<Box<dyn Any>, FieldError>>,
    },
}

// -----------------------------------------------------------------------------
// SequenceSchema

type Items = Box<dyn Fn(&dyn Any) -> Result<Vec<Box<dyn Any>>, FieldError>>;

/// Descriptor of a sequence type.
///
/// Registered for every collection type that appears as a declared field
/// type, either in the generic value channel (where items are leaf values)
/// or as the declared type of a node collection field (where items are
/// nodes and iteration goes through the field descriptor instead).
pub struct SequenceSchema {
    ty: TypeId,
    ty_name: &'static str,
    item: TypeId,
    shape: SequenceShape,
    items: Option<Items>,
}

fn seq_ref<'a, C: Any>(value: &'a dyn Any) -> Result<&'a C, FieldError> {
    value.downcast_ref::<C>().ok_or(FieldError::Host {
        field: "<sequence>",
        expected: core::any::type_name::<C>(),
    })
}

fn seq_mut<'a, C: Any>(value: &'a mut dyn Any) -> Result<&'a mut C, FieldError> {
    value.downcast_mut::<C>().ok_or(FieldError::Host {
        field: "<sequence>",
        expected: core::any::type_name::<C>(),
    })
}

fn item_of<V: Any>(item: Box<dyn Any>) -> Result<V, FieldError> {
    item.downcast::<V>()
        .map(|boxed| *boxed)
        .map_err(|_| FieldError::Reject {
            field: "<sequence>",
            expected: core::any::type_name::<V>(),
        })
}

impl SequenceSchema {
    /// Schema for `Vec<V>` holding leaf values.
    pub fn vec<V: Any + Clone>() -> Self {
        Self {
            ty: TypeId::of::<Vec<V>>(),
            ty_name: core::any::type_name::<Vec<V>>(),
            item: TypeId::of::<V>(),
            shape: SequenceShape::Appendable {
                new: Box::new(|| Box::new(Vec::<V>::new())),
                push: Box::new(|target, item| {
                    seq_mut::<Vec<V>>(target)?.push(item_of::<V>(item)?);
                    Ok(())
                }),
            },
            items: Some(Box::new(|value| {
                Ok(seq_ref::<Vec<V>>(value)?
                    .iter()
                    .map(|v| Box::new(v.clone()) as Box<dyn Any>)
                    .collect())
            })),
        }
    }

    /// Schema for `Shared<Vec<V>>` holding leaf values.
    pub fn shared_vec<V: Any + Clone>() -> Self {
        Self {
            ty: TypeId::of::<Shared<Vec<V>>>(),
            ty_name: core::any::type_name::<Shared<Vec<V>>>(),
            item: TypeId::of::<V>(),
            shape: SequenceShape::SharedAppendable {
                new: Box::new(|| Box::new(shared(Vec::<V>::new()))),
                push: Box::new(|handle, item| {
                    let handle = seq_ref::<Shared<Vec<V>>>(handle)?;
                    handle.borrow_mut().push(item_of::<V>(item)?);
                    Ok(())
                }),
            },
            items: Some(Box::new(|value| {
                Ok(seq_ref::<Shared<Vec<V>>>(value)?
                    .borrow()
                    .iter()
                    .map(|v| Box::new(v.clone()) as Box<dyn Any>)
                    .collect())
            })),
        }
    }

    /// Schema for `Box<[V]>` holding leaf values.
    pub fn boxed_slice<V: Any + Clone>() -> Self {
        Self {
            ty: TypeId::of::<Box<[V]>>(),
            ty_name: core::any::type_name::<Box<[V]>>(),
            item: TypeId::of::<V>(),
            shape: SequenceShape::Fixed {
                build: Box::new(|items| {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(item_of::<V>(item)?);
                    }
                    Ok(Box::new(out.into_boxed_slice()))
                }),
            },
            items: Some(Box::new(|value| {
                Ok(seq_ref::<Box<[V]>>(value)?
                    .iter()
                    .map(|v| Box::new(v.clone()) as Box<dyn Any>)
                    .collect())
            })),
        }
    }

    /// Schema for `Vec<V>` holding concrete nodes. Iteration goes through the
    /// owning collection field, so no leaf item access is available.
    pub fn node_vec<V: Scripture>() -> Self {
        Self {
            ty: TypeId::of::<Vec<V>>(),
            ty_name: core::any::type_name::<Vec<V>>(),
            item: TypeId::of::<V>(),
            shape: SequenceShape::Appendable {
                new: Box::new(|| Box::new(Vec::<V>::new())),
                push: Box::new(|target, item| {
                    seq_mut::<Vec<V>>(target)?.push(item_of::<V>(item)?);
                    Ok(())
                }),
            },
            items: None,
        }
    }

    /// Schema for `Vec<Box<dyn Scripture>>`.
    pub fn dyn_node_vec() -> Self {
        Self {
            ty: TypeId::of::<Vec<Box<dyn Scripture>>>(),
            ty_name: "Vec<Box<dyn Scripture>>",
            item: TypeId::of::<Box<dyn Scripture>>(),
            shape: SequenceShape::Appendable {
                new: Box::new(|| Box::new(Vec::<Box<dyn Scripture>>::new())),
                push: Box::new(|target, item| {
                    seq_mut::<Vec<Box<dyn Scripture>>>(target)?
                        .push(item_of::<Box<dyn Scripture>>(item)?);
                    Ok(())
                }),
            },
            items: None,
        }
    }

    #[inline]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    #[inline]
    pub const fn ty_name(&self) -> &'static str {
        self.ty_name
    }

    /// The declared item type.
    #[inline]
    pub const fn item(&self) -> TypeId {
        self.item
    }

    #[inline]
    pub const fn shape(&self) -> &SequenceShape {
        &self.shape
    }

    /// Copies the current items out of a sequence value, or `None` when the
    /// sequence holds nodes and cannot be read through the leaf channel.
    pub fn items(&self, value: &dyn Any) -> Result<Option<Vec<Box<dyn Any>>>, FieldError> {
        match &self.items {
            Some(read) => Ok(Some(read(value)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_items_are_copied_in_order() {
        let schema = SequenceSchema::vec::<i32>();
        let value = vec![3_i32, 1, 2];
        let items = schema.items(&value).unwrap().unwrap();
        let back: Vec<i32> = items
            .into_iter()
            .map(|v| *v.downcast::<i32>().unwrap())
            .collect();
        assert_eq!(back, [3, 1, 2]);
    }

    #[test]
    fn shared_push_is_visible_through_aliases() {
        let schema = SequenceSchema::shared_vec::<String>();
        let handle = shared(Vec::<String>::new());
        let alias = handle.clone();
        let SequenceShape::SharedAppendable { push, .. } = schema.shape() else {
            panic!("expected a shared shape");
        };
        push(&handle, Box::new("amen".to_owned())).unwrap();
        assert_eq!(alias.borrow().as_slice(), ["amen".to_owned()]);
    }

    #[test]
    fn fixed_build_preserves_order() {
        let schema = SequenceSchema::boxed_slice::<u16>();
        let SequenceShape::Fixed { build } = schema.shape() else {
            panic!("expected a fixed shape");
        };
        let built = build(vec![
            Box::new(9_u16) as Box<dyn Any>,
            Box::new(4_u16) as Box<dyn Any>,
        ])
        .unwrap();
        let slice = built.downcast::<Box<[u16]>>().unwrap();
        assert_eq!(&**slice, &[9, 4]);
    }

    #[test]
    fn wrong_item_type_is_rejected() {
        let schema = SequenceSchema::vec::<i32>();
        let SequenceShape::Appendable { new, push } = schema.shape() else {
            panic!("expected an appendable shape");
        };
        let mut target = new();
        let err = push(&mut *target, Box::new("nope".to_owned()));
        assert!(matches!(err, Err(FieldError::Reject { .. })));
    }
}
