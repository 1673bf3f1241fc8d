//! Storage-tier contract shared by the primary and volatile stores.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// A stored record: a JSON object carrying at least an `"id"` field.
pub type Document = Value;

/// Entity kinds held by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    User,
    Cart,
    Product,
    Discount,
    Order,
    Review,
}

impl Kind {
    /// Every kind.
    pub const ALL: [Self; 6] = [
        Self::User,
        Self::Cart,
        Self::Product,
        Self::Discount,
        Self::Order,
        Self::Review,
    ];

    /// Value of the `kind` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Cart => "cart",
            Self::Product => "product",
            Self::Discount => "discount",
            Self::Order => "order",
            Self::Review => "review",
        }
    }

    /// Whether reads of this kind also pull records from the volatile store.
    #[must_use]
    pub const fn merges_on_read(self) -> bool {
        matches!(self, Self::User | Self::Product | Self::Discount)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection applied to a list.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    /// Top-level field equals `value`.
    Eq { field: String, value: Value },
}

impl Filter {
    /// Shorthand for [`Filter::Eq`].
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether `document` is selected.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Eq { field, value } => document.get(field) == Some(value),
        }
    }

    /// JSON object usable as a containment (`@>`) pattern.
    #[must_use]
    pub fn as_containment(&self) -> Value {
        match self {
            Self::All => Value::Object(serde_json::Map::new()),
            Self::Eq { field, value } => {
                let mut pattern = serde_json::Map::new();
                pattern.insert(field.clone(), value.clone());
                Value::Object(pattern)
            }
        }
    }
}

/// Failure reported by a storage tier.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The tier could not serve the call. Triggers fallback.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint rejected the write. Never triggers fallback.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// The external, durable system of record.
///
/// Every call is independent and may fail. Implementations bound their own
/// latency (connection and statement timeouts); callers do not retry.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    async fn get(&self, kind: Kind, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn list(&self, kind: Kind, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    async fn create(&self, kind: Kind, id: Uuid, document: Document)
    -> Result<Document, StoreError>;

    /// Shallow-merge `patch` into the stored object. `None` if absent.
    async fn update(
        &self,
        kind: Kind,
        id: Uuid,
        patch: Document,
    ) -> Result<Option<Document>, StoreError>;

    /// Remove a record. `false` if it did not exist.
    async fn delete(&self, kind: Kind, id: Uuid) -> Result<bool, StoreError>;

    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Top-level merge of `patch` into `target`.
///
/// Non-object patches are ignored. The `id` field is never overwritten.
pub fn apply_patch(target: &mut Document, patch: &Document) {
    let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) else {
        return;
    };
    for (field, value) in patch {
        if field != "id" {
            target.insert(field.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_merge_kinds() {
        let merging: Vec<Kind> = Kind::ALL
            .into_iter()
            .filter(|k| k.merges_on_read())
            .collect();
        assert_eq!(merging, vec![Kind::User, Kind::Product, Kind::Discount]);
    }

    #[test]
    fn test_filter_matches_top_level_field() {
        let doc = json!({"id": "1", "email": "a@b.co", "nested": {"email": "x"}});
        assert!(Filter::All.matches(&doc));
        assert!(Filter::eq("email", "a@b.co").matches(&doc));
        assert!(!Filter::eq("email", "x").matches(&doc));
        assert!(!Filter::eq("missing", "a@b.co").matches(&doc));
    }

    #[test]
    fn test_containment_pattern() {
        assert_eq!(Filter::All.as_containment(), json!({}));
        assert_eq!(
            Filter::eq("code", "SAVE10").as_containment(),
            json!({"code": "SAVE10"})
        );
    }

    #[test]
    fn test_apply_patch_is_shallow_and_keeps_id() {
        let mut doc = json!({"id": "1", "name": "Mug", "tags": ["a"], "price": {"amount": "5"}});
        apply_patch(
            &mut doc,
            &json!({"id": "2", "name": "Cup", "price": {"currency_code": "EUR"}}),
        );
        assert_eq!(
            doc,
            json!({"id": "1", "name": "Cup", "tags": ["a"], "price": {"currency_code": "EUR"}})
        );
    }
}
