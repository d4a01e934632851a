//! Typed row identifiers.
//!
//! Every table uses a `SERIAL` key. Wrapping each in its own type keeps an
//! order ID from being passed where a product ID is expected, while still
//! reading and writing as a plain integer in JSON and `PostgreSQL`.

use std::num::ParseIntError;

/// Declare an `i32`-backed identifier type.
///
/// The generated type is ordered (so maps keyed by it iterate in key order,
/// which checkout relies on when locking rows), parses from path segments,
/// serializes as a bare number and, with the `postgres` feature, binds both
/// as a single value and as an array for `= ANY($1)` queries.
///
/// ```rust
/// # use kitshop_core::define_id;
/// define_id!(ShirtId);
/// define_id!(BadgeId);
///
/// let shirt: ShirtId = "7".parse().unwrap();
/// assert_eq!(shirt, ShirtId::new(7));
/// assert_eq!(shirt.as_i32(), BadgeId::new(7).as_i32());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(i32);

        impl $name {
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::types::id::IdParseError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                $crate::types::id::parse_id(s).map(Self)
            }
        }

        impl From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Type<::sqlx::Postgres> for $name {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <i32 as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <i32 as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::postgres::PgHasArrayType for $name {
            fn array_type_info() -> ::sqlx::postgres::PgTypeInfo {
                <i32 as ::sqlx::postgres::PgHasArrayType>::array_type_info()
            }
        }

        #[cfg(feature = "postgres")]
        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $name {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> ::core::result::Result<Self, ::sqlx::error::BoxDynError> {
                <i32 as ::sqlx::Decode<::sqlx::Postgres>>::decode(value).map(Self)
            }
        }

        #[cfg(feature = "postgres")]
        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> ::core::result::Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <i32 as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

/// An identifier that is not a positive integer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("invalid id: {0}")]
    NotANumber(#[from] ParseIntError),
    #[error("id must be positive")]
    NotPositive,
}

/// Shared parser behind the generated `FromStr` impls. Keys start at 1.
///
/// # Errors
///
/// Returns `IdParseError` if `s` is not a positive `i32`.
pub fn parse_id(s: &str) -> Result<i32, IdParseError> {
    let id: i32 = s.trim().parse()?;
    if id < 1 {
        return Err(IdParseError::NotPositive);
    }
    Ok(id)
}

define_id!(UserId);
define_id!(CustomerId);
define_id!(EmployeeId);
define_id!(ProductId);
define_id!(OrderId);
define_id!(OrderItemId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_conversions() {
        let id = ProductId::from(42);
        assert_eq!(id.as_i32(), 42);
        assert_eq!(i32::from(id), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let json = serde_json::to_string(&OrderId::new(7)).ok();
        assert_eq!(json.as_deref(), Some("7"));

        let parsed: Option<UserId> = serde_json::from_str("12").ok();
        assert_eq!(parsed, Some(UserId::new(12)));
    }

    #[test]
    fn test_id_parses_positive_only() {
        assert_eq!(" 15 ".parse::<OrderId>(), Ok(OrderId::new(15)));
        assert_eq!("0".parse::<OrderId>(), Err(IdParseError::NotPositive));
        assert!(matches!("abc".parse::<OrderId>(), Err(IdParseError::NotANumber(_))));
    }

    #[test]
    fn test_ids_order_numerically() {
        let mut ids = vec![ProductId::new(10), ProductId::new(2), ProductId::new(7)];
        ids.sort();
        assert_eq!(ids, vec![ProductId::new(2), ProductId::new(7), ProductId::new(10)]);
    }
}
