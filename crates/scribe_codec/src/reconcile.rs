//! Merges decoded sequence items into their target field.

use core::any::Any;

use scribe_schema::info::{FieldError, SequenceSchema, SequenceShape};

// -----------------------------------------------------------------------------
// Reconciled

/// Outcome of a reconciliation.
pub enum Reconciled {
    /// The existing target was mutated through its handle; the field keeps
    /// its current value and nothing is assigned.
    InPlace,

    /// A rebuilt sequence that must be assigned to the field.
    Replace(Box<dyn Any>),
}

// -----------------------------------------------------------------------------
// reconcile

/// Merges `items`, in order, into a target of the declared sequence type.
///
/// Policy, in priority order:
///
/// 1. a present shared appendable target is appended to in place;
/// 2. a constructible appendable sequence starts from the existing value
///    (or a fresh one) and appends every item, returning a replacement;
/// 3. a fixed sequence is materialized from the items alone;
///
/// Item order is always preserved. There is no reordering and no
/// deduplication; decoded items are never dropped.
pub fn reconcile(
    schema: &SequenceSchema,
    existing: Option<Box<dyn Any>>,
    items: Vec<Box<dyn Any>>,
) -> Result<Reconciled, FieldError> {
    match schema.shape() {
        SequenceShape::SharedAppendable { new, push } => match existing {
            Some(handle) => {
                for item in items {
                    push(&*handle, item)?;
                }
                Ok(Reconciled::InPlace)
            }
            None => {
                let handle = new();
                for item in items {
                    push(&*handle, item)?;
                }
                Ok(Reconciled::Replace(handle))
            }
        },
        SequenceShape::Appendable { new, push } => {
            let mut target = existing.unwrap_or_else(|| new());
            for item in items {
                push(&mut *target, item)?;
            }
            Ok(Reconciled::Replace(target))
        }
        SequenceShape::Fixed { build } => Ok(Reconciled::Replace(build(items)?)),
    }
}
