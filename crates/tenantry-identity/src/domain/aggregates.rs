//! Aggregate roots and folded states for the identity context.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tenantry_core::aggregate::{AggregateRoot, AggregateType, Fold};
use tenantry_core::clock::Clock;
use tenantry_core::error::DomainError;
use tenantry_core::event::EventMetadata;
use tenantry_core::id::IdGenerator;
use uuid::Uuid;

use super::events::{
    OrganizationCreated, OrganizationEvent, OrganizationEventKind, OrganizationRenamed,
    UserEvent, UserEventKind, UserRegistered,
};

/// Copy of an organization's identifying fields embedded in other
/// aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRef {
    /// The organization identifier. Never changes.
    pub organization_id: Uuid,
    /// Display name at the time the copy was taken.
    pub name: String,
    /// Short code at the time the copy was taken.
    pub short_code: String,
}

/// Identity of a registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user identifier.
    pub user_id: Uuid,
    /// Login name, stored trimmed.
    pub username: String,
    /// Email address, stored trimmed and lower-cased.
    pub email: String,
}

/// Role a user holds within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Owns the organization.
    Owner,
    /// Administers the organization.
    Admin,
    /// Regular member.
    Member,
}

/// A user's membership in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Embedded copy of the organization.
    pub organization: OrganizationRef,
    /// Role held.
    pub role: Role,
}

/// Folded state of an organization. Also its snapshot document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationState {
    /// The organization identifier.
    pub organization_id: Uuid,
    /// Current display name.
    pub name: String,
    /// Current short code.
    pub short_code: String,
    /// The owning user.
    pub owner_id: Uuid,
}

impl OrganizationState {
    /// Returns the fields other aggregates embed.
    #[must_use]
    pub fn to_ref(&self) -> OrganizationRef {
        OrganizationRef {
            organization_id: self.organization_id,
            name: self.name.clone(),
            short_code: self.short_code.clone(),
        }
    }
}

impl Fold for OrganizationState {
    const AGGREGATE_TYPE: AggregateType = AggregateType::Organization;
    type Fact = OrganizationEventKind;

    fn decode(event_type: &str, data: &serde_json::Value) -> Result<Self::Fact, DomainError> {
        OrganizationEventKind::decode(event_type, data)
    }

    fn fold(state: Option<Self>, fact: Self::Fact) -> Result<Self, DomainError> {
        match (state, fact) {
            (None, OrganizationEventKind::Created(created)) => Ok(Self {
                organization_id: created.organization_id,
                name: created.name,
                short_code: created.short_code,
                owner_id: created.owner_id,
            }),
            (Some(state), OrganizationEventKind::Created(_)) => Err(DomainError::DataIntegrity(
                format!("organization {} created twice", state.organization_id),
            )),
            (None, OrganizationEventKind::Renamed(renamed)) => Err(DomainError::DataIntegrity(
                format!(
                    "organization {} renamed before it was created",
                    renamed.organization_id
                ),
            )),
            (Some(state), OrganizationEventKind::Renamed(renamed)) => {
                if renamed.organization_id != state.organization_id {
                    return Err(DomainError::DataIntegrity(format!(
                        "rename of organization {} found in history of {}",
                        renamed.organization_id, state.organization_id
                    )));
                }
                Ok(Self {
                    name: renamed.name,
                    short_code: renamed.short_code,
                    ..state
                })
            }
        }
    }
}

/// Folded state of a user. Also its snapshot document, which is what the
/// projection sync rewrites when an embedded organization changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    /// Identity of the user.
    pub user: UserProfile,
    /// Organization the user registered into.
    pub default_organization: OrganizationRef,
    /// Organization the user currently works in.
    pub preferred_organization: OrganizationRef,
    /// All memberships.
    pub memberships: Vec<Membership>,
    /// Whether the user may contribute content.
    pub is_contributor: bool,
    /// Last time the state or its embedded copies changed.
    pub updated_at: DateTime<Utc>,
}

impl UserState {
    /// Returns every organization id embedded in the state.
    #[must_use]
    pub fn organization_ids(&self) -> BTreeSet<Uuid> {
        let mut ids = BTreeSet::new();
        ids.insert(self.default_organization.organization_id);
        ids.insert(self.preferred_organization.organization_id);
        ids.extend(
            self.memberships
                .iter()
                .map(|m| m.organization.organization_id),
        );
        ids
    }

    /// Overwrites every embedded copy of `organization` with its current
    /// fields. Returns `true` if anything changed.
    pub fn refresh_organization(&mut self, organization: &OrganizationRef) -> bool {
        let mut changed = false;
        let embeddings = std::iter::once(&mut self.default_organization)
            .chain(std::iter::once(&mut self.preferred_organization))
            .chain(self.memberships.iter_mut().map(|m| &mut m.organization));
        for embedded in embeddings {
            if embedded.organization_id == organization.organization_id && *embedded != *organization
            {
                embedded.name.clone_from(&organization.name);
                embedded.short_code.clone_from(&organization.short_code);
                changed = true;
            }
        }
        changed
    }
}

impl Fold for UserState {
    const AGGREGATE_TYPE: AggregateType = AggregateType::User;
    type Fact = UserEventKind;

    fn decode(event_type: &str, data: &serde_json::Value) -> Result<Self::Fact, DomainError> {
        UserEventKind::decode(event_type, data)
    }

    fn fold(state: Option<Self>, fact: Self::Fact) -> Result<Self, DomainError> {
        match (state, fact) {
            (None, UserEventKind::Registered(registered)) => Ok(Self {
                user: registered.user,
                preferred_organization: registered.default_organization.clone(),
                default_organization: registered.default_organization,
                memberships: registered.memberships,
                is_contributor: registered.is_contributor,
                updated_at: registered.occurred_at,
            }),
            (Some(state), UserEventKind::Registered(_)) => Err(DomainError::DataIntegrity(
                format!("user {} registered twice", state.user.user_id),
            )),
        }
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_owned())
}

/// The aggregate root for an organization.
#[derive(Debug)]
pub struct Organization {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Version of the last persisted fact.
    pub(crate) version: i64,
    /// State including uncommitted facts. `None` until created.
    state: Option<OrganizationState>,
    /// Uncommitted events pending persistence.
    uncommitted_events: Vec<OrganizationEvent>,
}

impl Organization {
    /// Resumes an organization from its folded state at `version`.
    #[must_use]
    pub fn from_state(state: OrganizationState, version: i64) -> Self {
        Self {
            id: state.organization_id,
            version,
            state: Some(state),
            uncommitted_events: Vec::new(),
        }
    }

    /// Founds a new organization, producing an `OrganizationCreated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name or short code is blank.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: Uuid,
        name: &str,
        short_code: &str,
        owner_id: Uuid,
        created_by: Uuid,
        correlation_id: Uuid,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let mut organization = Self {
            id,
            version: 0,
            state: None,
            uncommitted_events: Vec::new(),
        };
        let kind = OrganizationEventKind::Created(OrganizationCreated {
            organization_id: id,
            name: require_non_blank("name", name)?,
            short_code: require_non_blank("short_code", short_code)?,
            owner_id,
            created_by,
            occurred_at: clock.now(),
        });
        organization.record(kind, correlation_id, None, ids, clock)?;
        Ok(organization)
    }

    /// Renames the organization, producing an `OrganizationRenamed` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name or short code is blank
    /// and `DomainError::AggregateNotFound` if the organization was never
    /// created.
    #[allow(clippy::too_many_arguments)]
    pub fn rename(
        &mut self,
        name: &str,
        short_code: &str,
        renamed_by: Uuid,
        correlation_id: Uuid,
        session_id: Option<String>,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.state.is_none() {
            return Err(DomainError::AggregateNotFound(self.id));
        }
        let kind = OrganizationEventKind::Renamed(OrganizationRenamed {
            organization_id: self.id,
            name: require_non_blank("name", name)?,
            short_code: require_non_blank("short_code", short_code)?,
            renamed_by,
            occurred_at: clock.now(),
        });
        self.record(kind, correlation_id, session_id, ids, clock)
    }

    /// Current state, including uncommitted facts.
    #[must_use]
    pub fn state(&self) -> Option<&OrganizationState> {
        self.state.as_ref()
    }

    /// Version the aggregate reaches once uncommitted facts are persisted.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn pending_version(&self) -> i64 {
        self.version + self.uncommitted_events.len() as i64
    }

    fn record(
        &mut self,
        kind: OrganizationEventKind,
        correlation_id: Uuid,
        session_id: Option<String>,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.state = Some(OrganizationState::fold(self.state.take(), kind.clone())?);
        let event = OrganizationEvent {
            metadata: EventMetadata {
                event_id: ids.next_id(),
                tenant_id: self.id,
                aggregate_id: self.id,
                version: self.pending_version() + 1,
                correlation_id,
                session_id,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.uncommitted_events.push(event);
        Ok(())
    }
}

impl AggregateRoot for Organization {
    type Event = OrganizationEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn clear_uncommitted_events(&mut self) {
        self.version = self.pending_version();
        self.uncommitted_events.clear();
    }
}

/// The aggregate root for a user.
#[derive(Debug)]
pub struct User {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Version of the last persisted fact.
    pub(crate) version: i64,
    state: Option<UserState>,
    uncommitted_events: Vec<UserEvent>,
}

impl User {
    /// Registers a new user into `default_organization`, producing a
    /// `UserRegistered` event. The user starts with one membership there.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the username is blank or the
    /// email is not an address.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        id: Uuid,
        username: &str,
        email: &str,
        default_organization: OrganizationRef,
        role: Role,
        is_contributor: bool,
        correlation_id: Uuid,
        ids: &dyn IdGenerator,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        let username = require_non_blank("username", username)?;
        let email = require_non_blank("email", email)?.to_lowercase();
        if !email.contains('@') {
            return Err(DomainError::Validation(format!(
                "email is not an address: {email}"
            )));
        }

        let kind = UserEventKind::Registered(UserRegistered {
            user: UserProfile {
                user_id: id,
                username,
                email,
            },
            memberships: vec![Membership {
                organization: default_organization.clone(),
                role,
            }],
            default_organization,
            is_contributor,
            occurred_at: clock.now(),
        });
        let state = UserState::fold(None, kind.clone())?;
        let event = UserEvent {
            metadata: EventMetadata {
                event_id: ids.next_id(),
                tenant_id: state.default_organization.organization_id,
                aggregate_id: id,
                version: 1,
                correlation_id,
                session_id: None,
                occurred_at: clock.now(),
            },
            kind,
        };
        Ok(Self {
            id,
            version: 0,
            state: Some(state),
            uncommitted_events: vec![event],
        })
    }

    /// Current state, including uncommitted facts.
    #[must_use]
    pub fn state(&self) -> Option<&UserState> {
        self.state.as_ref()
    }
}

impl AggregateRoot for User {
    type Event = UserEvent;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    #[allow(clippy::cast_possible_wrap)]
    fn clear_uncommitted_events(&mut self) {
        self.version += self.uncommitted_events.len() as i64;
        self.uncommitted_events.clear();
    }
}
