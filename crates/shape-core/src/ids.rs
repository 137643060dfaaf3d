//! Core identifier types for instance-shape.
//!
//! The provider addresses every object by a positive integer. Each kind of
//! object gets its own newtype so a disk ID can never be passed where a volume
//! ID is expected. Zero is reserved by the provider to mean "no object" and is
//! rejected when parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create an identifier from its raw numeric value.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Return the raw numeric value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Convert from an optional raw value, treating zero as absent.
            #[must_use]
            pub fn from_nonzero(value: u64) -> Option<Self> {
                NonZeroU64::new(value).map(|v| Self(v.get()))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value: u64 = s
                    .trim()
                    .parse()
                    .map_err(|_| IdError::NotNumeric(s.to_string()))?;
                Self::from_nonzero(value).ok_or(IdError::Zero)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Identifier of a compute instance (a Linode).
    InstanceId
);

numeric_id!(
    /// Identifier of a disk owned by an instance.
    DiskId
);

numeric_id!(
    /// Identifier of a boot configuration owned by an instance.
    ConfigId
);

numeric_id!(
    /// Identifier of an external block-storage volume.
    VolumeId
);

numeric_id!(
    /// Identifier of a provider event.
    EventId
);

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a base-10 integer.
    #[error("not a numeric identifier: {0:?}")]
    NotNumeric(String),

    /// The input is zero, which the provider uses for "unset".
    #[error("identifier must be non-zero")]
    Zero,
}
