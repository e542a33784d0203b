//! Test repositories: mock `EventRepository` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tenantry_core::error::DomainError;
use tenantry_core::repository::{EventRepository, NewEvent, StoredEvent};
use uuid::Uuid;

/// An event repository that records all `append` calls. Returns the
/// configured stream from `load_stream` on every call and always succeeds on
/// `append`.
#[derive(Debug)]
pub struct RecordingEventRepository {
    stream: Vec<StoredEvent>,
    appended: Mutex<Vec<(Vec<NewEvent>, Option<i64>)>>,
}

impl RecordingEventRepository {
    /// Create a new recording repository that will return `stream` (filtered
    /// by `from_version`) from every `load_stream` call.
    #[must_use]
    pub fn new(stream: Vec<StoredEvent>) -> Self {
        Self {
            stream,
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns every batch passed to `append`, with its expected version.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended(&self) -> Vec<(Vec<NewEvent>, Option<i64>)> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn append(
        &self,
        events: &[NewEvent],
        expected_version: Option<i64>,
    ) -> Result<(), DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((events.to_vec(), expected_version));
        Ok(())
    }

    async fn load_stream(
        &self,
        aggregate_id: Uuid,
        from_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .stream
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .filter(|e| e.version >= from_version.unwrap_or(1))
            .cloned()
            .collect())
    }
}

/// An event repository that always returns an empty stream and silently
/// accepts appends. Useful for "aggregate not found" scenarios.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn append(
        &self,
        _events: &[NewEvent],
        _expected_version: Option<i64>,
    ) -> Result<(), DomainError> {
        Ok(())
    }

    async fn load_stream(
        &self,
        _aggregate_id: Uuid,
        _from_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }
}

/// An event repository whose storage is always unreachable. Useful for
/// testing error propagation.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn append(
        &self,
        _events: &[NewEvent],
        _expected_version: Option<i64>,
    ) -> Result<(), DomainError> {
        Err(DomainError::StorageUnavailable("connection refused".into()))
    }

    async fn load_stream(
        &self,
        _aggregate_id: Uuid,
        _from_version: Option<i64>,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::StorageUnavailable("connection refused".into()))
    }
}
