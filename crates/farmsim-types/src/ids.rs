//! Type-safe agent identifiers.
//!
//! Farmers and buyers are numbered from 1 in spawn order. The number doubles
//! as the agent's display name (`Farmer 3`, `Buyer 1`) and as the salt that
//! derives the agent's random stream from the world seed.

use serde::{Deserialize, Serialize};

/// Generates a numbered agent identifier newtype with standard derives.
macro_rules! define_agent_id {
    (
        $(#[$meta:meta])*
        $name:ident => $label:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Create an identifier from its 1-based spawn number.
            pub const fn new(number: u32) -> Self {
                Self(number)
            }

            /// Return the 1-based spawn number.
            pub const fn number(self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!($label, " {}"), self.0)
            }
        }

        impl From<u32> for $name {
            fn from(number: u32) -> Self {
                Self(number)
            }
        }
    };
}

define_agent_id! {
    /// Identifier of a farmer (producer agent).
    FarmerId => "Farmer"
}

define_agent_id! {
    /// Identifier of a buyer (consumer agent).
    BuyerId => "Buyer"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_role_and_number() {
        assert_eq!(FarmerId::new(2).to_string(), "Farmer 2");
        assert_eq!(BuyerId::new(11).to_string(), "Buyer 11");
    }

    #[test]
    fn ids_order_by_number() {
        assert!(BuyerId::new(1) < BuyerId::new(2));
        assert_eq!(FarmerId::from(4).number(), 4);
    }
}
