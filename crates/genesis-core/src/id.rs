use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::borrow::Borrow;
use std::fmt;

new_key_type! {
    /// Identifies a scheduled timer. Generational, so a cancelled timer's
    /// key never resolves to a later timer.
    pub struct TimerId;
}

/// Declares a string-backed content key. Keys borrow as `str`, so maps keyed
/// by them can be queried with plain string literals.
macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_string())
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_key! {
    /// Names a resource in the ledger (`iron_ore`, `research_points`, ...).
    ResourceKey
}

string_key! {
    /// Names a machine type in the catalog and roster.
    MachineKey
}

string_key! {
    /// Names an automatic recipe.
    RecipeKey
}

string_key! {
    /// Names a manual action (`mine_iron`, `smelt_iron`, ...).
    ActionKey
}

string_key! {
    /// Names a technology in the tech tree.
    TechKey
}

string_key! {
    /// Names a skill that gains experience from manual actions.
    SkillKey
}
