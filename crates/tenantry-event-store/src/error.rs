//! Mapping of `sqlx` failures onto domain errors.

use tenantry_core::error::DomainError;

/// Name of the constraint guarding per-aggregate version uniqueness.
pub(crate) const AGGREGATE_VERSION_CONSTRAINT: &str = "events_aggregate_version_unique";

/// Classifies a database failure.
///
/// Rows that cannot be decoded point at corrupt or foreign data and become
/// `DataIntegrity`; everything else is treated as a transient outage.
#[must_use]
pub fn map_sqlx_error(error: sqlx::Error) -> DomainError {
    match error {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => DomainError::DataIntegrity(error.to_string()),
        other => DomainError::StorageUnavailable(other.to_string()),
    }
}

/// Returns `true` when the error is a unique violation of the
/// `(aggregate_id, version)` constraint.
pub(crate) fn is_version_collision(error: &sqlx::Error) -> bool {
    error.as_database_error().is_some_and(|db| {
        db.is_unique_violation() && db.constraint() == Some(AGGREGATE_VERSION_CONSTRAINT)
    })
}

/// Returns `true` for any other unique violation, such as a reused event id.
pub(crate) fn is_other_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation() && !is_version_collision(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_storage_unavailable() {
        let mapped = map_sqlx_error(sqlx::Error::PoolTimedOut);

        assert!(matches!(mapped, DomainError::StorageUnavailable(_)));
    }

    #[test]
    fn test_missing_column_is_data_integrity() {
        let mapped = map_sqlx_error(sqlx::Error::ColumnNotFound("state".into()));

        match mapped {
            DomainError::DataIntegrity(message) => assert!(message.contains("state")),
            other => panic!("expected DataIntegrity, got {other:?}"),
        }
    }

    #[test]
    fn test_non_database_errors_are_not_collisions() {
        let error = sqlx::Error::RowNotFound;

        assert!(!is_version_collision(&error));
        assert!(!is_other_unique_violation(&error));
    }
}
