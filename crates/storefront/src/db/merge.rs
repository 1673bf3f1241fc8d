//! Cross-tier merge rules.

use std::collections::{HashMap, HashSet};

use crate::models::CartItem;

/// Combine records from both tiers, primary first.
///
/// A volatile record is kept only when no primary record shares its merge key,
/// so a stale fallback copy can never shadow authoritative data. Duplicate
/// keys within the volatile list keep their first occurrence.
pub fn primary_wins<T>(primary: Vec<T>, volatile: Vec<T>, key: impl Fn(&T) -> String) -> Vec<T> {
    let mut seen: HashSet<String> = primary.iter().map(&key).collect();
    let mut merged = primary;
    for record in volatile {
        if seen.insert(key(&record)) {
            merged.push(record);
        }
    }
    merged
}

/// Identity of a cart line across submissions.
///
/// Item id, else product id, else the line's shape with the quantity left out.
#[must_use]
pub fn line_key(item: &CartItem) -> String {
    if let Some(id) = &item.id {
        return format!("id:{id}");
    }
    if let Some(product_id) = item.product_id {
        return format!("product:{product_id}");
    }
    // `Map` keeps keys sorted, so equal shapes serialize identically.
    let shape = serde_json::to_string(&item.attributes).unwrap_or_default();
    format!("shape:{shape}")
}

/// Fold `incoming` lines into `existing`.
///
/// Lines with a known key get their quantities summed and the incoming fields
/// laid over the previous ones. New keys are appended in arrival order. The
/// operation is a fold over deltas: submitting the same list twice adds its
/// quantities twice.
#[must_use]
pub fn merge_cart_items(existing: Vec<CartItem>, incoming: Vec<CartItem>) -> Vec<CartItem> {
    let mut merged = existing;
    let mut index: HashMap<String, usize> = HashMap::with_capacity(merged.len());
    for (position, item) in merged.iter().enumerate() {
        index.entry(line_key(item)).or_insert(position);
    }

    for item in incoming {
        let key = line_key(&item);
        match index.get(&key).and_then(|&position| merged.get_mut(position)) {
            Some(previous) => overlay(previous, item),
            None => {
                index.insert(key, merged.len());
                merged.push(item);
            }
        }
    }
    merged
}

fn overlay(previous: &mut CartItem, incoming: CartItem) {
    let quantity = previous.units().saturating_add(incoming.units());
    if incoming.id.is_some() {
        previous.id = incoming.id;
    }
    if incoming.product_id.is_some() {
        previous.product_id = incoming.product_id;
    }
    previous.attributes.extend(incoming.attributes);
    previous.quantity = Some(quantity);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use marketstall_core::{Email, ProductId, Role, UserId};
    use serde_json::{Value, json};

    use super::*;
    use crate::db::Entity;
    use crate::models::User;

    fn items(value: Value) -> Vec<CartItem> {
        serde_json::from_value(value).unwrap()
    }

    fn as_json(items: &[CartItem]) -> Value {
        serde_json::to_value(items).unwrap()
    }

    #[test]
    fn test_cart_merge_sums_matching_lines() {
        let existing = items(json!([{"id": "a", "quantity": 2}, {"id": "b", "quantity": 1}]));
        let incoming = items(json!([{"id": "a", "quantity": 1}]));

        let merged = merge_cart_items(existing, incoming);
        assert_eq!(
            as_json(&merged),
            json!([{"id": "a", "quantity": 3}, {"id": "b", "quantity": 1}])
        );
    }

    #[test]
    fn test_cart_merge_missing_quantity_counts_as_one() {
        let existing = items(json!([{"id": "a"}]));
        let incoming = items(json!([{"id": "a"}]));
        let merged = merge_cart_items(existing, incoming);
        assert_eq!(as_json(&merged), json!([{"id": "a", "quantity": 2}]));
    }

    #[test]
    fn test_cart_merge_overlays_incoming_fields() {
        let existing = items(json!([{"id": "a", "quantity": 1, "color": "red", "note": "gift"}]));
        let incoming = items(json!([{"id": "a", "quantity": 1, "color": "blue"}]));
        let merged = merge_cart_items(existing, incoming);
        assert_eq!(
            as_json(&merged),
            json!([{"id": "a", "quantity": 2, "color": "blue", "note": "gift"}])
        );
    }

    #[test]
    fn test_cart_merge_keys_by_product_then_shape() {
        let product = ProductId::generate();
        let existing = vec![
            CartItem::for_product(product, 1),
            items(json!([{"sku": "X-1", "quantity": 4}])).remove(0),
        ];
        let incoming = vec![
            CartItem::for_product(product, 2),
            items(json!([{"sku": "X-1", "quantity": 1}])).remove(0),
            items(json!([{"sku": "X-2"}])).remove(0),
        ];

        let merged = merge_cart_items(existing, incoming);
        let quantities: Vec<Option<u32>> = merged.iter().map(|i| i.quantity).collect();
        assert_eq!(quantities, vec![Some(3), Some(5), None]);
    }

    #[test]
    fn test_cart_merge_is_a_fold_over_deltas() {
        let delta = items(json!([{"id": "a", "quantity": 2}]));
        let once = merge_cart_items(Vec::new(), delta.clone());
        let twice = merge_cart_items(once, delta.clone());
        let thrice = merge_cart_items(twice.clone(), delta);

        assert_eq!(twice.first().unwrap().quantity, Some(4));
        assert_eq!(thrice.first().unwrap().quantity, Some(6));
    }

    #[test]
    fn test_line_key_prefers_id_then_product() {
        let product = ProductId::generate();
        let mut item = CartItem::for_product(product, 1);
        assert_eq!(line_key(&item), format!("product:{product}"));
        item.id = Some("line-1".to_owned());
        assert_eq!(line_key(&item), "id:line-1");
    }

    fn user(email: &str, role: Role) -> User {
        User {
            id: UserId::generate(),
            email: Email::parse(email).unwrap(),
            name: email.to_owned(),
            role,
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_primary_record_wins_on_shared_merge_key() {
        let primary = vec![user("x@x.com", Role::Admin)];
        let volatile = vec![user("X@x.com", Role::User), user("new@x.com", Role::User)];

        let merged = primary_wins(primary, volatile, User::merge_key);

        let for_x: Vec<&User> = merged
            .iter()
            .filter(|u| u.merge_key() == "x@x.com")
            .collect();
        assert_eq!(for_x.len(), 1);
        assert_eq!(for_x.first().unwrap().role, Role::Admin);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_primary_wins_keeps_order_and_dedupes_volatile() {
        let merged = primary_wins(
            vec![1, 2],
            vec![2, 3, 3, 4],
            |n: &i32| n.to_string(),
        );
        assert_eq!(merged, vec![1, 2, 3, 4]);
    }
}
