//! Domain events for the identity context.
//!
//! The stored `data` column holds the bare fact struct; which struct it is
//! follows from the event type tag, never from the shape of the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tenantry_core::aggregate::AggregateType;
use tenantry_core::error::DomainError;
use tenantry_core::event::{DomainEvent, EventMetadata};
use uuid::Uuid;

use super::aggregates::{Membership, OrganizationRef, UserProfile};

/// Tag of [`OrganizationCreated`].
pub const ORGANIZATION_CREATED: &str = "identity.organization.created";
/// Tag of [`OrganizationRenamed`].
pub const ORGANIZATION_RENAMED: &str = "identity.organization.renamed";
/// Tag of [`UserRegistered`].
pub const USER_REGISTERED: &str = "identity.user.registered";

/// Emitted once when an organization is founded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationCreated {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// Display name.
    pub name: String,
    /// Short code shown next to the name.
    pub short_code: String,
    /// The user owning the organization.
    pub owner_id: Uuid,
    /// The user who created it.
    pub created_by: Uuid,
    /// When the organization was created.
    pub occurred_at: DateTime<Utc>,
}

/// Emitted when an organization changes its name or short code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRenamed {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// New display name.
    pub name: String,
    /// New short code.
    pub short_code: String,
    /// The user who renamed it.
    pub renamed_by: Uuid,
    /// When the rename happened.
    pub occurred_at: DateTime<Utc>,
}

/// Emitted once when a user signs up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRegistered {
    /// Identity of the new user.
    pub user: UserProfile,
    /// Organization the user signed up into, as it was at registration.
    pub default_organization: OrganizationRef,
    /// Initial memberships.
    pub memberships: Vec<Membership>,
    /// Whether the user may contribute content.
    pub is_contributor: bool,
    /// When the user registered.
    pub occurred_at: DateTime<Utc>,
}

/// Event payload variants for the organization aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum OrganizationEventKind {
    /// The organization was created.
    Created(OrganizationCreated),
    /// The organization was renamed.
    Renamed(OrganizationRenamed),
}

impl OrganizationEventKind {
    /// Returns the stored tag for this fact.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created(_) => ORGANIZATION_CREATED,
            Self::Renamed(_) => ORGANIZATION_RENAMED,
        }
    }

    /// Decodes a stored fact by its tag.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DataIntegrity` for an unknown tag or a payload
    /// that does not match it.
    pub fn decode(event_type: &str, data: &serde_json::Value) -> Result<Self, DomainError> {
        match event_type {
            ORGANIZATION_CREATED => decode_payload(event_type, data).map(Self::Created),
            ORGANIZATION_RENAMED => decode_payload(event_type, data).map(Self::Renamed),
            other => Err(DomainError::DataIntegrity(format!(
                "unknown organization event type: {other}"
            ))),
        }
    }

    fn to_data(&self) -> serde_json::Value {
        let value = match self {
            Self::Created(payload) => serde_json::to_value(payload),
            Self::Renamed(payload) => serde_json::to_value(payload),
        };
        // Serialization of derived Serialize types to Value is infallible.
        value.expect("organization fact serialization is infallible")
    }
}

/// Event payload variants for the user aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEventKind {
    /// The user registered.
    Registered(UserRegistered),
}

impl UserEventKind {
    /// Returns the stored tag for this fact.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Registered(_) => USER_REGISTERED,
        }
    }

    /// Decodes a stored fact by its tag.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DataIntegrity` for an unknown tag or a payload
    /// that does not match it.
    pub fn decode(event_type: &str, data: &serde_json::Value) -> Result<Self, DomainError> {
        match event_type {
            USER_REGISTERED => decode_payload(event_type, data).map(Self::Registered),
            other => Err(DomainError::DataIntegrity(format!(
                "unknown user event type: {other}"
            ))),
        }
    }

    fn to_data(&self) -> serde_json::Value {
        let value = match self {
            Self::Registered(payload) => serde_json::to_value(payload),
        };
        value.expect("user fact serialization is infallible")
    }
}

fn decode_payload<T: DeserializeOwned>(
    event_type: &str,
    data: &serde_json::Value,
) -> Result<T, DomainError> {
    serde_json::from_value(data.clone()).map_err(|e| {
        DomainError::DataIntegrity(format!("malformed {event_type} payload: {e}"))
    })
}

/// Domain event envelope for the organization aggregate.
#[derive(Debug, Clone)]
pub struct OrganizationEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: OrganizationEventKind,
}

impl DomainEvent for OrganizationEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn aggregate_type(&self) -> AggregateType {
        AggregateType::Organization
    }

    fn to_data(&self) -> serde_json::Value {
        self.kind.to_data()
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Domain event envelope for the user aggregate.
#[derive(Debug, Clone)]
pub struct UserEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: UserEventKind,
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn aggregate_type(&self) -> AggregateType {
        AggregateType::User
    }

    fn to_data(&self) -> serde_json::Value {
        self.kind.to_data()
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
