//! Fallback repository facade.
//!
//! Every call walks the same path independently:
//!
//! 1. Attempt the primary store.
//! 2. On success, return its result. Reads of kinds that merge on read also
//!    pull matching volatile records whose merge key the primary lacks.
//! 3. On `Unavailable`, log a degraded-mode event and attempt the same
//!    operation against the volatile store.
//! 4. If that fails too, return [`RepositoryError::Unavailable`].
//!
//! A `Conflict` from either tier is a real answer and is returned as is.
//! There is no retry loop, and no lock is held across a primary round trip.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use marketstall_core::UserId;

use super::RepositoryError;
use super::merge::{merge_cart_items, primary_wins};
use super::store::{Document, Filter, Kind, PrimaryStore, StoreError, apply_patch};
use super::volatile::{PendingWrite, VolatileStore};
use crate::clock::Clock;
use crate::models::{Cart, CartItem};

/// A record type stored through the repository.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: Kind;

    fn id(&self) -> Uuid;

    /// Key used to deduplicate records across tiers.
    fn merge_key(&self) -> String {
        self.id().to_string()
    }

    /// Business rules a record must satisfy before it is written.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending field.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A result tagged with the tier that produced it.
///
/// Serializes as the response envelope `{ "data": ..., "primary": bool }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    pub value: T,
    /// `false` when the result is best-effort data from the volatile store.
    pub from_primary: bool,
}

impl<T> Fetched<T> {
    #[must_use]
    pub const fn primary(value: T) -> Self {
        Self {
            value,
            from_primary: true,
        }
    }

    #[must_use]
    pub const fn fallback(value: T) -> Self {
        Self {
            value,
            from_primary: false,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            value: f(self.value),
            from_primary: self.from_primary,
        }
    }
}

impl<T: Serialize> Serialize for Fetched<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut envelope = serializer.serialize_struct("Fetched", 2)?;
        envelope.serialize_field("data", &self.value)?;
        envelope.serialize_field("primary", &self.from_primary)?;
        envelope.end()
    }
}

/// Why one tier's attempt ended.
enum Failure {
    Store(StoreError),
    Repository(RepositoryError),
}

impl From<StoreError> for Failure {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<RepositoryError> for Failure {
    fn from(e: RepositoryError) -> Self {
        Self::Repository(e)
    }
}

/// Typed access to both storage tiers.
#[derive(Clone)]
pub struct Repository {
    primary: Arc<dyn PrimaryStore>,
    volatile: Arc<VolatileStore>,
    clock: Arc<dyn Clock>,
}

impl Repository {
    #[must_use]
    pub fn new(
        primary: Arc<dyn PrimaryStore>,
        volatile: Arc<VolatileStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            primary,
            volatile,
            clock,
        }
    }

    /// Probe the primary store.
    ///
    /// # Errors
    ///
    /// Returns the primary store's error when it cannot be reached.
    pub async fn ping_primary(&self) -> Result<(), StoreError> {
        self.primary.ping().await
    }

    /// Writes that landed only in the volatile store and still need to be
    /// replayed into the primary store out of band.
    #[must_use]
    pub fn pending_reconciliation(&self) -> Vec<PendingWrite> {
        self.volatile.pending_reconciliation()
    }

    async fn run<R>(
        &self,
        kind: Kind,
        operation: &'static str,
        primary: impl Future<Output = Result<R, Failure>>,
        volatile: impl FnOnce(&VolatileStore) -> Result<R, Failure>,
    ) -> Result<Fetched<R>, RepositoryError> {
        let reason = match primary.await {
            Ok(value) => return Ok(Fetched::primary(value)),
            Err(Failure::Repository(e)) => return Err(e),
            Err(Failure::Store(StoreError::Conflict(detail))) => {
                return Err(RepositoryError::Conflict(detail));
            }
            Err(Failure::Store(StoreError::Unavailable(reason))) => reason,
        };

        warn!(
            kind = %kind,
            operation,
            error = %reason,
            "Primary store unavailable, falling back to volatile store"
        );

        match volatile(&self.volatile) {
            Ok(value) => Ok(Fetched::fallback(value)),
            Err(Failure::Repository(e)) => Err(e),
            Err(Failure::Store(StoreError::Conflict(detail))) => {
                Err(RepositoryError::Conflict(detail))
            }
            Err(Failure::Store(StoreError::Unavailable(fallback))) => {
                error!(
                    kind = %kind,
                    operation,
                    primary = %reason,
                    fallback = %fallback,
                    "Both storage tiers failed"
                );
                Err(RepositoryError::Unavailable {
                    kind,
                    operation,
                    primary: reason,
                    fallback,
                })
            }
        }
    }

    /// Volatile data consulted while the primary is healthy. Failures only
    /// mean there is nothing extra to merge.
    fn volatile_extras<R: Default>(
        &self,
        kind: Kind,
        read: impl FnOnce(&VolatileStore) -> Result<R, StoreError>,
    ) -> R {
        read(&self.volatile).unwrap_or_else(|e| {
            debug!(kind = %kind, error = %e, "Volatile store skipped during merge");
            R::default()
        })
    }

    /// Fetch one record by id.
    ///
    /// # Errors
    ///
    /// `Unavailable` when both tiers fail; `DataCorruption` for undecodable records.
    #[instrument(skip(self), fields(kind = %T::KIND))]
    pub async fn get<T: Entity>(&self, id: Uuid) -> Result<Fetched<Option<T>>, RepositoryError> {
        let kind = T::KIND;
        self.run(
            kind,
            "get",
            async move {
                let mut found = self.primary.get(kind, id).await?;
                if found.is_none() && kind.merges_on_read() {
                    found = self.volatile_extras(kind, |v| v.get(kind, id));
                }
                Ok::<_, Failure>(found.map(decode::<T>).transpose()?)
            },
            |volatile| Ok(volatile.get(kind, id)?.map(decode::<T>).transpose()?),
        )
        .await
    }

    /// List records matching `filter`.
    ///
    /// # Errors
    ///
    /// `Unavailable` when both tiers fail; `DataCorruption` for undecodable records.
    #[instrument(skip(self), fields(kind = %T::KIND))]
    pub async fn list<T: Entity>(&self, filter: Filter) -> Result<Fetched<Vec<T>>, RepositoryError> {
        let kind = T::KIND;
        let filter = &filter;
        self.run(
            kind,
            "list",
            async move {
                let records = decode_all::<T>(self.primary.list(kind, filter).await?)?;
                if !kind.merges_on_read() {
                    return Ok(records);
                }
                let extras = decode_all::<T>(self.volatile_extras(kind, |v| v.list(kind, filter)))?;
                Ok::<_, Failure>(primary_wins(records, extras, T::merge_key))
            },
            |volatile| Ok(decode_all::<T>(volatile.list(kind, filter)?)?),
        )
        .await
    }

    /// First record matching `filter`.
    ///
    /// # Errors
    ///
    /// Same as [`Repository::list`].
    pub async fn find_one<T: Entity>(
        &self,
        filter: Filter,
    ) -> Result<Fetched<Option<T>>, RepositoryError> {
        Ok(self.list::<T>(filter).await?.map(|records| records.into_iter().next()))
    }

    /// Store a new record.
    ///
    /// # Errors
    ///
    /// `Invalid` if the record fails [`Entity::validate`]; `Conflict` on a
    /// duplicate id or business key; `Unavailable` when both tiers fail.
    #[instrument(skip(self, record), fields(kind = %T::KIND))]
    pub async fn create<T: Entity>(&self, record: &T) -> Result<Fetched<T>, RepositoryError> {
        let kind = T::KIND;
        record.validate().map_err(RepositoryError::Invalid)?;
        let id = record.id();
        let document = encode(record)?;
        let fallback_document = document.clone();
        self.run(
            kind,
            "create",
            async move {
                let stored = self.primary.create(kind, id, document).await?;
                Ok::<_, Failure>(decode::<T>(stored)?)
            },
            |volatile| Ok(decode::<T>(volatile.create(kind, id, fallback_document)?)?),
        )
        .await
    }

    /// Shallow-merge `patch` into a record and stamp `updated_at`.
    ///
    /// The patch is applied to the current record in memory first; it is
    /// only written if the result still decodes and validates as `T`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the tier that answered has no such record; `Invalid` if
    /// the patched record would not be a valid `T`; `Unavailable` when both
    /// tiers fail.
    #[instrument(skip(self, patch), fields(kind = %T::KIND))]
    pub async fn update<T: Entity>(
        &self,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Fetched<T>, RepositoryError> {
        let kind = T::KIND;
        let mut patch = patch;
        patch.remove("id");
        patch.insert("updated_at".to_owned(), encode(&self.clock.now())?);
        let patch = Value::Object(patch);
        let fallback_patch = patch.clone();

        self.run(
            kind,
            "update",
            async move {
                check_patch::<T>(self.primary.get(kind, id).await?, &patch)?;
                let updated = self.primary.update(kind, id, patch).await?;
                let stored = updated.ok_or(RepositoryError::NotFound)?;
                Ok::<_, Failure>(decode::<T>(stored)?)
            },
            |volatile| {
                check_patch::<T>(volatile.get(kind, id)?, &fallback_patch)?;
                let updated = volatile.update(kind, id, &fallback_patch)?;
                let stored = updated.ok_or(RepositoryError::NotFound)?;
                Ok(decode::<T>(stored)?)
            },
        )
        .await
    }

    /// Remove a record.
    ///
    /// # Errors
    ///
    /// `NotFound` if the tier that answered has no such record; `Unavailable`
    /// when both tiers fail.
    #[instrument(skip(self), fields(kind = %T::KIND))]
    pub async fn delete<T: Entity>(&self, id: Uuid) -> Result<Fetched<()>, RepositoryError> {
        let kind = T::KIND;
        self.run(
            kind,
            "delete",
            async move {
                if self.primary.delete(kind, id).await? {
                    Ok(())
                } else {
                    Err(Failure::Repository(RepositoryError::NotFound))
                }
            },
            |volatile| {
                if volatile.delete(kind, id)? {
                    Ok(())
                } else {
                    Err(Failure::Repository(RepositoryError::NotFound))
                }
            },
        )
        .await
    }

    /// The cart owned by `user_id`, if any.
    ///
    /// # Errors
    ///
    /// Same as [`Repository::list`].
    pub async fn cart_for(&self, user_id: UserId) -> Result<Fetched<Option<Cart>>, RepositoryError> {
        self.find_one::<Cart>(cart_filter(user_id)).await
    }

    /// Fold `incoming` lines into the cart owned by `user_id`, creating the
    /// cart if needed.
    ///
    /// The merged line list is computed in full and written in one step, so
    /// readers never observe a partially merged cart.
    ///
    /// # Errors
    ///
    /// `Unavailable` when both tiers fail; `Conflict` if a concurrent request
    /// created the cart first.
    #[instrument(skip(self, incoming), fields(lines = incoming.len()))]
    pub async fn merge_cart(
        &self,
        user_id: UserId,
        incoming: Vec<CartItem>,
    ) -> Result<Fetched<Cart>, RepositoryError> {
        let now = self.clock.now();
        let filter = &cart_filter(user_id);
        let fallback_incoming = incoming.clone();

        self.run(
            Kind::Cart,
            "merge_cart",
            async move {
                let existing = first::<Cart>(self.primary.list(Kind::Cart, filter).await?)?;
                let (cart, is_new) = fold_cart(existing, user_id, incoming, now);
                let stored = if is_new {
                    self.primary
                        .create(Kind::Cart, cart.id(), encode(&cart)?)
                        .await?
                } else {
                    self.primary
                        .update(Kind::Cart, cart.id(), items_patch(&cart)?)
                        .await?
                        .ok_or(RepositoryError::NotFound)?
                };
                Ok::<_, Failure>(decode::<Cart>(stored)?)
            },
            |volatile| {
                let existing = first::<Cart>(volatile.list(Kind::Cart, filter)?)?;
                let (cart, is_new) = fold_cart(existing, user_id, fallback_incoming, now);
                let stored = if is_new {
                    volatile.create(Kind::Cart, cart.id(), encode(&cart)?)?
                } else {
                    volatile
                        .update(Kind::Cart, cart.id(), &items_patch(&cart)?)?
                        .ok_or(RepositoryError::NotFound)?
                };
                Ok(decode::<Cart>(stored)?)
            },
        )
        .await
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("volatile", &self.volatile)
            .finish_non_exhaustive()
    }
}

fn cart_filter(user_id: UserId) -> Filter {
    Filter::eq("user_id", user_id.to_string())
}

fn fold_cart(
    existing: Option<Cart>,
    user_id: UserId,
    incoming: Vec<CartItem>,
    now: chrono::DateTime<chrono::Utc>,
) -> (Cart, bool) {
    let (mut cart, is_new) = match existing {
        Some(cart) => (cart, false),
        None => (Cart::empty(user_id, now), true),
    };
    cart.items = merge_cart_items(std::mem::take(&mut cart.items), incoming);
    cart.updated_at = now;
    (cart, is_new)
}

fn items_patch(cart: &Cart) -> Result<Document, RepositoryError> {
    let mut patch = Map::new();
    patch.insert("items".to_owned(), encode(&cart.items)?);
    patch.insert("updated_at".to_owned(), encode(&cart.updated_at)?);
    Ok(Value::Object(patch))
}

/// Reject a patch that would leave the record undecodable or invalid.
fn check_patch<T: Entity>(current: Option<Document>, patch: &Document) -> Result<(), RepositoryError> {
    let mut candidate = current.ok_or(RepositoryError::NotFound)?;
    apply_patch(&mut candidate, patch);
    let record: T = serde_json::from_value(candidate)
        .map_err(|e| RepositoryError::Invalid(format!("{}: {e}", T::KIND)))?;
    record.validate().map_err(RepositoryError::Invalid)
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Value, RepositoryError> {
    serde_json::to_value(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("unencodable record: {e}")))
}

fn decode<T: Entity>(document: Document) -> Result<T, RepositoryError> {
    serde_json::from_value(document)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid {} record: {e}", T::KIND)))
}

fn decode_all<T: Entity>(documents: Vec<Document>) -> Result<Vec<T>, RepositoryError> {
    documents.into_iter().map(decode::<T>).collect()
}

fn first<T: Entity>(documents: Vec<Document>) -> Result<Option<T>, RepositoryError> {
    documents.into_iter().next().map(decode::<T>).transpose()
}
