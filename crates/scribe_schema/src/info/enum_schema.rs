use core::any::{Any, TypeId};

use crate::info::{FieldError, short_type_name};

// -----------------------------------------------------------------------------
// EnumSchema

/// Symbolic-name table for a closed-choice type.
///
/// Values of a registered enum type encode as the symbol paired with them in
/// the table, and decode by exact symbol lookup.
pub struct EnumSchema {
    ty: TypeId,
    name: &'static str,
    to_symbol: Box<dyn Fn(&dyn Any) -> Result<&'static str, FieldError>>,
    from_symbol: Box<dyn Fn(&str) -> Option<Box<dyn Any>>>,
}

impl EnumSchema {
    /// Builds the table for `E` from symbol and value pairs.
    pub fn of<E>(table: &'static [(&'static str, E)]) -> Self
    where
        E: Any + Clone + PartialEq,
    {
        let ty_name = short_type_name(core::any::type_name::<E>());
        Self {
            ty: TypeId::of::<E>(),
            name: ty_name,
            to_symbol: Box::new(move |value| {
                let value = value.downcast_ref::<E>().ok_or(FieldError::Host {
                    field: "<enum>",
                    expected: core::any::type_name::<E>(),
                })?;
                table
                    .iter()
                    .find(|(_, candidate)| candidate == value)
                    .map(|(symbol, _)| *symbol)
                    .ok_or(FieldError::NoSymbol { ty: ty_name })
            }),
            from_symbol: Box::new(move |symbol| {
                table
                    .iter()
                    .find(|(candidate, _)| *candidate == symbol)
                    .map(|(_, value)| Box::new(value.clone()) as Box<dyn Any>)
            }),
        }
    }

    #[inline]
    pub const fn ty(&self) -> TypeId {
        self.ty
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The symbol of a value.
    #[inline]
    pub fn to_symbol(&self, value: &dyn Any) -> Result<&'static str, FieldError> {
        (self.to_symbol)(value)
    }

    /// The value of a symbol, or `None` when the symbol is not in the table.
    #[inline]
    pub fn from_symbol(&self, symbol: &str) -> Option<Box<dyn Any>> {
        (self.from_symbol)(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum Mode {
        Plain,
        Ornate,
    }

    const MODES: &[(&str, Mode)] = &[("Plain", Mode::Plain), ("Ornate", Mode::Ornate)];

    #[test]
    fn symbols_round_trip() {
        let schema = EnumSchema::of(MODES);
        assert_eq!(schema.to_symbol(&Mode::Ornate).unwrap(), "Ornate");
        let back = schema.from_symbol("Ornate").unwrap();
        assert_eq!(*back.downcast::<Mode>().unwrap(), Mode::Ornate);
    }

    #[test]
    fn unknown_symbol_is_none() {
        let schema = EnumSchema::of(MODES);
        assert!(schema.from_symbol("Gilded").is_none());
    }
}
