use core::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

// -----------------------------------------------------------------------------
// Shared handles

/// Handle type for plain composite objects.
///
/// Composite values reachable from a value field are deduplicated by identity
/// during one encode call, and sharing is restored on decode. The only object
/// shape that can express that in safe Rust is a reference-counted cell, so
/// composite fields are declared as `Shared<T>` and identity is the `Rc`
/// allocation address.
///
/// The codec is single threaded by contract, so `Rc` is used over `Arc`.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wraps a value into a fresh [`Shared`] handle.
#[inline]
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

// -----------------------------------------------------------------------------
// AsAny

/// Upcast support for trait objects.
///
/// Automatically implemented for every `'static` type, so `dyn`
/// [`Scripture`] values can be inspected and unboxed through [`Any`].
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// The full path of the underlying type, for diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    #[inline]
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    #[inline]
    fn type_name(&self) -> &'static str {
        core::any::type_name::<T>()
    }
}

// -----------------------------------------------------------------------------
// Scripture

/// Error type surfaced by the post-decode hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// A polymorphic domain value that the graph codec can round-trip.
///
/// A scripture node owns an opaque integrity digest. The codec transports the
/// digest verbatim (it never computes or checks it) and hands it back through
/// [`decoded`](Scripture::decoded) once the node is fully populated, so the
/// domain layer can verify integrity itself.
///
/// Implementors describe their fields separately through a
/// [`NodeSchema`](crate::info::NodeSchema) registered in the
/// [`SchemaRegistry`](crate::registry::SchemaRegistry); the trait itself stays
/// minimal so that domain types carry no codec machinery.
///
/// # Example
///
/// ```
/// use scribe_schema::node::{HookError, Scripture};
///
/// #[derive(Default)]
/// struct Psalm {
///     count: i32,
///     digest: Vec<u8>,
/// }
///
/// impl Scripture for Psalm {
///     fn digest(&self) -> &[u8] {
///         &self.digest
///     }
///
///     fn decoded(&mut self, digest: &[u8], _secrets_included: bool) -> Result<(), HookError> {
///         self.digest = digest.to_vec();
///         Ok(())
///     }
/// }
/// ```
pub trait Scripture: AsAny {
    /// The integrity digest owned by this node.
    fn digest(&self) -> &[u8] {
        &[]
    }

    /// Post-population hook, invoked exactly once per node per decode.
    ///
    /// `digest` is the transported digest of the encoded form and
    /// `secrets_included` the visibility setting recorded in the document.
    /// An error aborts the whole decode call.
    fn decoded(&mut self, digest: &[u8], secrets_included: bool) -> Result<(), HookError> {
        let _ = (digest, secrets_included);
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Tier

/// Visibility tier of a value field.
///
/// Secret fields are only written when the caller asks for them, and a
/// document encoded without secrets leaves secret fields untouched on decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    Public,
    Secret,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Verse;

    impl Scripture for Verse {}

    #[test]
    fn default_digest_is_empty() {
        assert!(Verse.digest().is_empty());
    }

    #[test]
    fn boxed_node_unboxes_through_any() {
        let node: Box<dyn Scripture> = Box::new(Verse);
        assert!(node.into_any().downcast::<Verse>().is_ok());
    }

    #[test]
    fn shared_handles_are_identity_equal() {
        let a = shared(7_i32);
        let b = Rc::clone(&a);
        assert!(Rc::ptr_eq(&a, &b));
    }
}
