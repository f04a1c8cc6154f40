//! Type-safe identifier wrappers around [`String`].
//!
//! Every identifier that crosses the pipeline has its own newtype so that a
//! gym id can never be passed where an encounter id is expected. The wire
//! format is the bare string (`#[serde(transparent)]`). Some scanners send
//! numeric ids, so deserialization also accepts an integer and keeps its
//! decimal form.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Accepts a string or an integer and yields the string form.
struct IdVisitor;

impl Visitor<'_> for IdVisitor {
    type Value = String;

    fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("a string or integer identifier")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(v.to_owned())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(v.to_string())
    }
}

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(IdVisitor).map(Self)
            }
        }

        impl $name {
            /// Create an identifier from anything string-like.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier of a single creature spawn, assigned by the scanner.
    EncounterId
}

define_id! {
    /// Identifier of a gym (raid host and roster holder).
    GymId
}

define_id! {
    /// Identifier of a configured matching rule.
    RuleId
}

define_id! {
    /// Identifier of a configured notification target.
    TargetId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_string() {
        let gym = GymId::new("g1");
        assert_eq!(gym.to_string(), "g1");
        assert_eq!(gym.as_str(), "g1");
    }

    #[test]
    fn serializes_as_bare_string() {
        let id = EncounterId::from("abc");
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, "\"abc\"");

        let back: Result<EncounterId, _> = serde_json::from_str("\"abc\"");
        assert_eq!(back.ok(), Some(id));
    }

    #[test]
    fn integer_ids_keep_decimal_form() {
        let id: Result<EncounterId, _> = serde_json::from_str("1234567890123");
        assert_eq!(id.ok(), Some(EncounterId::new("1234567890123")));

        let gym: Result<GymId, _> = serde_json::from_str("-7");
        assert_eq!(gym.ok(), Some(GymId::new("-7")));

        assert!(serde_json::from_str::<EncounterId>("1.5").is_err());
        assert!(serde_json::from_str::<EncounterId>("null").is_err());
    }

    #[test]
    fn empty_detection() {
        assert!(RuleId::new("").is_empty());
        assert!(!TargetId::new("discord").is_empty());
    }
}
