//! Subscriber identifiers.
//!
//! Every streaming session is named by a [`SubscriberId`], a newtype around a
//! UUID v7 string so IDs sort by creation time in logs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one subscriber connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(String);

impl SubscriberId {
    /// Create a new time-ordered ID with the `sub_` prefix.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("sub_{}", Uuid::now_v7()))
    }

    /// Wrap an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriberId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = SubscriberId::new();
        let b = SubscriberId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn ids_carry_prefix() {
        let id = SubscriberId::new();
        assert!(id.as_str().starts_with("sub_"));
    }

    #[test]
    fn display_matches_inner() {
        let id = SubscriberId::from("sub_fixed");
        assert_eq!(id.to_string(), "sub_fixed");
    }

    #[test]
    fn serializes_transparently() {
        let id = SubscriberId::from_string("sub_1".into());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sub_1\"");
        let back: SubscriberId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
