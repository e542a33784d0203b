//! Commands for the identity context.

use uuid::Uuid;

use super::aggregates::Role;

/// Command to found a new organization.
#[derive(Debug, Clone)]
pub struct CreateOrganization {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Display name.
    pub name: String,
    /// Short code.
    pub short_code: String,
    /// The owning user.
    pub owner_id: Uuid,
    /// The user issuing the command.
    pub created_by: Uuid,
}

/// Command to rename an organization.
#[derive(Debug, Clone)]
pub struct RenameOrganization {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The organization to rename.
    pub organization_id: Uuid,
    /// New display name.
    pub name: String,
    /// New short code.
    pub short_code: String,
    /// The user issuing the command.
    pub renamed_by: Uuid,
    /// Version the caller last observed.
    pub expected_version: i64,
    /// Session that issued the command, if any.
    pub session_id: Option<String>,
}

/// Command to register a user into an existing organization.
#[derive(Debug, Clone)]
pub struct RegisterUser {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Login name.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Organization the user signs up into.
    pub default_organization_id: Uuid,
    /// Role within that organization.
    pub role: Role,
    /// Whether the user may contribute content.
    pub is_contributor: bool,
}
