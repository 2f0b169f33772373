use core::any::{Any, TypeId};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::info::short_type_name;

// -----------------------------------------------------------------------------
// OpaqueCodec

/// Error surfaced by an opaque strategy.
pub type OpaqueError = Box<dyn std::error::Error + Send + Sync>;

type OpaqueEncode = Box<dyn Fn(&dyn Any) -> Result<String, OpaqueError>>;
type OpaqueDecode = Box<dyn Fn(&str) -> Result<Box<dyn Any>, OpaqueError>>;

/// A pluggable fallback strategy for types that bypass field-by-field
/// handling.
///
/// A type registered with an opaque codec short-circuits the generic value
/// channel: the whole value travels as a single text payload produced and
/// consumed by the strategy. [`OpaqueCodec::serde`] covers types that carry a
/// serde implementation; anything else can plug in custom closures.
pub struct OpaqueCodec {
    ty: TypeId,
    name: &'static str,
    encode: OpaqueEncode,
    decode: OpaqueDecode,
}

impl OpaqueCodec {
    /// Custom strategy from a pair of closures.
    pub fn new<T: Any>(
        encode: impl Fn(&T) -> Result<String, OpaqueError> + 'static,
        decode: impl Fn(&str) -> Result<T, OpaqueError> + 'static,
    ) -> Self {
        Self {
            ty: TypeId::of::<T>(),
            name: short_type_name(core::any::type_name::<T>()),
            encode: Box::new(move |value| {
                let value = value
                    .downcast_ref::<T>()
                    .ok_or_else(|| -> OpaqueError {
                        format!("opaque value is not `{}`", core::any::type_name::<T>()).into()
                    })?;
                encode(value)
            }),
            decode: Box::new(move |text| Ok(Box::new(decode(text)?))),
        }
    }

    /// serde-backed strategy with a JSON payload.
    pub fn serde<T>() -> Self
    where
        T: Any + Serialize + DeserializeOwned,
    {
        Self::new::<T>(
            |value| serde_json::to_string(value).map_err(Into::into),
            |text| serde_json::from_str(text).map_err(Into::into),
        )
    }

    #[inline]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn encode(&self, value: &dyn Any) -> Result<String, OpaqueError> {
        (self.encode)(value)
    }

    #[inline]
    pub fn decode(&self, text: &str) -> Result<Box<dyn Any>, OpaqueError> {
        (self.decode)(text)
    }
}
