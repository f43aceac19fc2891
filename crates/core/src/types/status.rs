//! Closed vocabularies shared by the API, the store, and the access policy.
//!
//! The string literals are part of the public wire contract and the database
//! schema, so every enum serialises to exactly the literal returned by
//! `as_str()` and parses back only from that literal.

use serde::{Deserialize, Serialize};

/// Error returned when a string is outside one of the fixed vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! literal_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $literal:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $literal)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The wire/database literal for this variant.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $literal),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($literal => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

literal_enum! {
    /// City a pickup point can be opened in.
    City, "city" {
        Moscow => "Москва",
        SaintPetersburg => "Санкт-Петербург",
        Kazan => "Казань",
    }
}

literal_enum! {
    /// Category of an item logged during a reception.
    ProductType, "product type" {
        Electronics => "электроника",
        Clothes => "одежда",
        Shoes => "обувь",
    }
}

literal_enum! {
    /// Lifecycle state of a reception. `Closed` is terminal.
    ReceptionStatus, "reception status" {
        Open => "in_progress",
        Closed => "close",
    }
}

literal_enum! {
    /// Role carried in an identity token.
    Role, "role" {
        /// Pickup point staff: runs receptions.
        Employee => "employee",
        /// Administrative user: creates pickup points.
        Moderator => "moderator",
    }
}
