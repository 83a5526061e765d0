use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identifier.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identifier.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Identifier of an order owned by this service.
    OrderId
);

numeric_id!(
    /// Identifier of a customer owned by the customers service.
    CustomerId
);

numeric_id!(
    /// Identifier of a product owned by the products service.
    ProductId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_numbers() {
        let json = serde_json::to_string(&OrderId::new(7)).unwrap();
        assert_eq!(json, "7");

        let id: CustomerId = serde_json::from_str("3").unwrap();
        assert_eq!(id, CustomerId::new(3));
    }

    #[test]
    fn ids_parse_from_path_segments() {
        let id: ProductId = "42".parse().unwrap();
        assert_eq!(id.as_i64(), 42);
        assert!("forty-two".parse::<ProductId>().is_err());
    }

    #[test]
    fn display_matches_raw_value() {
        assert_eq!(OrderId::new(12).to_string(), "12");
    }
}
