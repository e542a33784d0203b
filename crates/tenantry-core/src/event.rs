//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::AggregateType;
use crate::repository::NewEvent;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Owning organization scope.
    pub tenant_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Version within the aggregate stream, starting at 1.
    pub version: i64,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Session that issued the command, when there is one.
    pub session_id: Option<String>,
    /// Timestamp of the fact.
    pub occurred_at: DateTime<Utc>,
}

/// Cross-cutting references persisted in the `meta` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Issuing session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Trait that all domain events implement.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the namespaced fact tag, e.g. `identity.organization.renamed`.
    fn event_type(&self) -> &'static str;

    /// Returns the aggregate type this fact belongs to.
    fn aggregate_type(&self) -> AggregateType;

    /// Serializes the fact content to JSON.
    fn to_data(&self) -> serde_json::Value;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Converts the event into its storage form with an explicit version.
    fn to_new_event(&self) -> NewEvent {
        let meta = self.metadata();
        let references = EventMeta {
            correlation_id: meta.correlation_id,
            session_id: meta.session_id.clone(),
        };
        NewEvent {
            event_id: meta.event_id,
            tenant_id: meta.tenant_id,
            aggregate_id: meta.aggregate_id,
            aggregate_type: self.aggregate_type(),
            version: Some(meta.version),
            event_type: self.event_type().to_owned(),
            data: self.to_data(),
            // Serialization of a plain struct to Value is infallible.
            meta: serde_json::to_value(references).expect("EventMeta serialization is infallible"),
            created_at: meta.occurred_at,
        }
    }
}
