//! Aggregate abstractions: the closed set of aggregate types, the command-side
//! aggregate root, and the pure fold that read paths use to rebuild state.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::DomainEvent;

/// Closed set of aggregate types. Each one owns an independent version
/// sequence even though storage is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateType {
    /// `identity.organization`
    Organization,
    /// `identity.user`
    User,
}

impl AggregateType {
    /// Returns the namespaced tag persisted alongside events and snapshots.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "identity.organization",
            Self::User => "identity.user",
        }
    }

    /// Returns `true` if a stored tag belongs to this aggregate type.
    #[must_use]
    pub fn matches(self, tag: &str) -> bool {
        self.as_str() == tag
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateType {
    type Err = DomainError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "identity.organization" => Ok(Self::Organization),
            "identity.user" => Ok(Self::User),
            other => Err(DomainError::DataIntegrity(format!(
                "unknown aggregate type: {other}"
            ))),
        }
    }
}

/// Trait for aggregate roots that record new facts in response to commands.
pub trait AggregateRoot: Send + Sync {
    /// The event type this aggregate produces.
    type Event: DomainEvent;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the version of the last fact already persisted.
    fn version(&self) -> i64;

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self);
}

/// Pure state transition for one aggregate type.
///
/// Implementors are the snapshot state of the aggregate. `decode` is the
/// explicit table from fact tag to typed fact; tags outside that table are
/// rejected instead of being probed structurally.
pub trait Fold: Sized + Serialize + DeserializeOwned {
    /// The aggregate type whose history this state folds.
    const AGGREGATE_TYPE: AggregateType;

    /// Typed fact decoded from a stored event.
    type Fact;

    /// Decodes a stored `(event_type, data)` pair into a typed fact.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DataIntegrity` for unknown tags or payloads that
    /// do not match the fact schema.
    fn decode(event_type: &str, data: &serde_json::Value) -> Result<Self::Fact, DomainError>;

    /// Applies one fact to the state so far. `None` means no creation fact
    /// has been seen yet.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DataIntegrity` when the fact cannot legally
    /// follow the current state.
    fn fold(state: Option<Self>, fact: Self::Fact) -> Result<Self, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_type_tags_round_trip() {
        for aggregate_type in [AggregateType::Organization, AggregateType::User] {
            let parsed: AggregateType = aggregate_type.as_str().parse().unwrap();
            assert_eq!(parsed, aggregate_type);
        }
    }

    #[test]
    fn test_unknown_aggregate_type_is_data_integrity_error() {
        let result = "billing.invoice".parse::<AggregateType>();

        match result {
            Err(DomainError::DataIntegrity(msg)) => {
                assert_eq!(msg, "unknown aggregate type: billing.invoice");
            }
            other => panic!("expected DataIntegrity, got {other:?}"),
        }
    }

    #[test]
    fn test_matches_compares_stored_tag() {
        assert!(AggregateType::User.matches("identity.user"));
        assert!(!AggregateType::User.matches("identity.organization"));
    }
}
