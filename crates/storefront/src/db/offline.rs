//! Primary store used when no database is configured.

use async_trait::async_trait;
use uuid::Uuid;

use super::store::{Document, Filter, Kind, PrimaryStore, StoreError};

const REASON: &str = "no primary database configured";

/// A primary store that is never reachable.
///
/// Every operation runs in degraded mode against the volatile store.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineStore;

#[async_trait]
impl PrimaryStore for OfflineStore {
    async fn get(&self, _kind: Kind, _id: Uuid) -> Result<Option<Document>, StoreError> {
        Err(StoreError::Unavailable(REASON.to_owned()))
    }

    async fn list(&self, _kind: Kind, _filter: &Filter) -> Result<Vec<Document>, StoreError> {
        Err(StoreError::Unavailable(REASON.to_owned()))
    }

    async fn create(
        &self,
        _kind: Kind,
        _id: Uuid,
        _document: Document,
    ) -> Result<Document, StoreError> {
        Err(StoreError::Unavailable(REASON.to_owned()))
    }

    async fn update(
        &self,
        _kind: Kind,
        _id: Uuid,
        _patch: Document,
    ) -> Result<Option<Document>, StoreError> {
        Err(StoreError::Unavailable(REASON.to_owned()))
    }

    async fn delete(&self, _kind: Kind, _id: Uuid) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable(REASON.to_owned()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(REASON.to_owned()))
    }
}
