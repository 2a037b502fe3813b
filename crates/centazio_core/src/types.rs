//! Names and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

name_type!(
    /// An external application being integrated.
    SystemName
);
name_type!(
    /// A system's native record type, e.g. `Contact`.
    SystemEntityTypeName
);
name_type!(
    /// A canonical core record type, e.g. `Customer`.
    CoreEntityTypeName
);
name_type!(
    /// The object an operation works on: a system entity type for Read and
    /// Promote, a core entity type for Write.
    ObjectName
);
name_type!(
    /// The id of a record inside an external system.
    SystemEntityId
);
name_type!(
    /// The id of a canonical core entity.
    CoreEntityId
);

impl CoreEntityId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<SystemEntityTypeName> for ObjectName {
    fn from(value: SystemEntityTypeName) -> Self {
        Self(value.0)
    }
}

impl From<CoreEntityTypeName> for ObjectName {
    fn from(value: CoreEntityTypeName) -> Self {
        Self(value.0)
    }
}

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleStage {
    /// External system to staged entities.
    Read,
    /// Staged entities to core storage.
    Promote,
    /// Core storage to external system.
    Write,
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleStage::Read => "Read",
            LifecycleStage::Promote => "Promote",
            LifecycleStage::Write => "Write",
        };
        f.write_str(s)
    }
}
