//! Bidirectional text codecs for primitive and opaque scalar types.

use core::any::{Any, TypeId};
use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use num_bigint::BigInt;
use thiserror::Error;
use uuid::Uuid;

use crate::info::FieldError;

/// Boxed error carried by converter sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// -----------------------------------------------------------------------------
// ConversionError

/// A scalar text form failed to parse for its declared type.
#[derive(Debug, Error)]
#[error("`{text}` is not a valid `{ty}` value: {source}")]
pub struct ConversionError {
    pub ty: &'static str,
    pub text: String,
    pub source: BoxError,
}

// -----------------------------------------------------------------------------
// ScalarCodec

type ScalarEncode = Box<dyn Fn(&dyn Any) -> Result<String, FieldError>>;
type ScalarDecode = Box<dyn Fn(&str) -> Result<Box<dyn Any>, ConversionError>>;

/// One registered converter pair.
pub struct ScalarCodec {
    ty: TypeId,
    name: &'static str,
    encode: ScalarEncode,
    decode: ScalarDecode,
}

impl ScalarCodec {
    #[inline]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    /// The wire name, used as the element name for sequence items.
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The exact text form of a value.
    #[inline]
    pub fn encode(&self, value: &dyn Any) -> Result<String, FieldError> {
        (self.encode)(value)
    }

    /// Parses the text form back into a value.
    #[inline]
    pub fn decode(&self, text: &str) -> Result<Box<dyn Any>, ConversionError> {
        (self.decode)(text)
    }
}

// -----------------------------------------------------------------------------
// ScalarRegistry

/// Registry of scalar converters, keyed by value type.
///
/// Converters are exact inverses of each other for every representable value.
/// Registering a converter never disturbs unrelated entries; registering the
/// same type again replaces its converter.
///
/// # Example
///
/// ```
/// use scribe_schema::scalar::ScalarRegistry;
///
/// let registry = ScalarRegistry::standard();
/// assert!(registry.contains::<i32>());
/// assert!(!registry.contains::<f32>());
/// ```
pub struct ScalarRegistry {
    table: HashMap<TypeId, ScalarCodec>,
}

impl Default for ScalarRegistry {
    #[inline]
    fn default() -> Self {
        Self::standard()
    }
}

impl ScalarRegistry {
    /// Creates a registry with no converters.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Creates a registry with the standard converter set: unique
    /// identifiers, byte blobs in base64, strings, booleans, signed and
    /// unsigned integers of 16, 32 and 64 bits, and arbitrary-precision
    /// integers.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("Uuid", Uuid::to_string, |s| {
            s.parse::<Uuid>().map_err(Into::into)
        });
        registry.register(
            "Bytes",
            |v: &Vec<u8>| STANDARD.encode(v),
            |s| STANDARD.decode(s).map_err(Into::into),
        );
        registry.register("String", String::clone, |s| Ok(s.to_owned()));
        registry.register("Bool", bool::to_string, |s| {
            s.parse::<bool>().map_err(Into::into)
        });
        registry.register("I16", i16::to_string, |s| {
            s.parse::<i16>().map_err(Into::into)
        });
        registry.register("I32", i32::to_string, |s| {
            s.parse::<i32>().map_err(Into::into)
        });
        registry.register("I64", i64::to_string, |s| {
            s.parse::<i64>().map_err(Into::into)
        });
        registry.register("U16", u16::to_string, |s| {
            s.parse::<u16>().map_err(Into::into)
        });
        registry.register("U32", u32::to_string, |s| {
            s.parse::<u32>().map_err(Into::into)
        });
        registry.register("U64", u64::to_string, |s| {
            s.parse::<u64>().map_err(Into::into)
        });
        registry.register("BigInt", BigInt::to_string, |s| {
            s.parse::<BigInt>().map_err(Into::into)
        });
        registry
    }

    /// Registers a converter pair for `T` under a wire name.
    pub fn register<T, E, D>(&mut self, name: &'static str, encode: E, decode: D)
    where
        T: Any,
        E: Fn(&T) -> String + 'static,
        D: Fn(&str) -> Result<T, BoxError> + 'static,
    {
        let codec = ScalarCodec {
            ty: TypeId::of::<T>(),
            name,
            encode: Box::new(move |value| {
                let value = value.downcast_ref::<T>().ok_or(FieldError::Host {
                    field: name,
                    expected: core::any::type_name::<T>(),
                })?;
                Ok(encode(value))
            }),
            decode: Box::new(move |text| {
                decode(text)
                    .map(|v| Box::new(v) as Box<dyn Any>)
                    .map_err(|source| ConversionError {
                        ty: name,
                        text: text.to_owned(),
                        source,
                    })
            }),
        };
        self.table.insert(codec.ty, codec);
    }

    /// Whether a converter for `T` is registered.
    #[inline]
    pub fn contains<T: Any>(&self) -> bool {
        self.contains_id(TypeId::of::<T>())
    }

    #[inline]
    pub fn contains_id(&self, ty: TypeId) -> bool {
        self.table.contains_key(&ty)
    }

    /// The converter for a type, if registered.
    #[inline]
    pub fn get(&self, ty: TypeId) -> Option<&ScalarCodec> {
        self.table.get(&ty)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
