use super::*;
use crate::classify::DisplayCategory;
use crate::entity::{EntityId, EntityState};
use chrono::{TimeZone, Utc};
use serde_json::json;

fn entity(id: &str, label: &str, state: &str) -> EntityState {
    serde_json::from_value(json!({
        "id": id,
        "label": label,
        "user": {"state": state}
    }))
    .unwrap()
}

fn sorted_ids(store: &StateStore) -> Vec<String> {
    store
        .sorted()
        .into_iter()
        .map(|entry| entry.id.to_string())
        .collect()
}

#[test]
fn test_reset_all_sets_display_order() {
    let mut store = StateStore::new();
    store.reset_all(vec![entity("a", "A", "offline"), entity("b", "B", "online")], None);

    let order: Vec<&str> = store.display_order().iter().map(|id| id.as_str()).collect();
    assert_eq!(order, vec!["a", "b"]);
    assert!(store.get("a").unwrap().previous.is_none());
    assert!(store.get("b").unwrap().previous.is_none());

    // ONLINE sorts before OFFLINE
    assert_eq!(sorted_ids(&store), vec!["b", "a"]);
}

#[test]
fn test_reset_all_replaces_previous_contents() {
    let mut store = StateStore::new();
    store.reset_all(vec![entity("a", "A", "online")], None);
    store.upsert(entity("z", "Z", "online"));

    store.reset_all(vec![entity("c", "C", "online")], None);

    assert_eq!(store.len(), 1);
    assert!(store.get("a").is_none());
    assert!(store.get("z").is_none());
    assert_eq!(store.display_order(), &[EntityId::from("c")]);
}

#[test]
fn test_reset_all_duplicate_keeps_first_position_last_snapshot() {
    let mut store = StateStore::new();
    store.reset_all(
        vec![
            entity("a", "first", "offline"),
            entity("b", "B", "offline"),
            entity("a", "second", "offline"),
        ],
        None,
    );

    assert_eq!(store.display_order(), &[EntityId::from("a"), EntityId::from("b")]);
    assert_eq!(store.get("a").unwrap().latest.label, "second");
}

#[test]
fn test_reset_all_records_server_start() {
    let mut store = StateStore::new();
    let started = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    store.reset_all(vec![], Some(started));
    assert_eq!(store.server_started_at(), Some(started));

    // A later reset without metadata keeps the known start time
    store.reset_all(vec![], None);
    assert_eq!(store.server_started_at(), Some(started));
}

#[test]
fn test_reset_then_sort_preserves_input_order_within_category() {
    let mut store = StateStore::new();
    store.reset_all(
        vec![
            entity("c", "C", "online"),
            entity("a", "A", "online"),
            entity("d", "D", "offline"),
            entity("b", "B", "online"),
        ],
        None,
    );

    assert_eq!(sorted_ids(&store), vec!["c", "a", "b", "d"]);
}

#[test]
fn test_upsert_new_entity_appends_to_tail() {
    let mut store = StateStore::new();
    store.reset_all(vec![entity("a", "A", "online")], None);

    let previous = store.upsert(entity("new", "New", "online"));

    assert!(previous.is_none());
    assert_eq!(store.display_order(), &[EntityId::from("a"), EntityId::from("new")]);
    assert!(store.get("new").unwrap().previous.is_none());
}

#[test]
fn test_upsert_shifts_latest_into_previous() {
    let mut store = StateStore::new();
    store.reset_all(vec![entity("a", "A", "offline")], None);

    let previous = store.upsert(entity("a", "A", "online"));
    assert_eq!(previous.unwrap().label, "A");

    let record = store.get("a").unwrap();
    assert_eq!(record.previous.as_ref().unwrap().user.as_ref().unwrap().state.as_deref(), Some("offline"));
    assert_eq!(record.latest.user.as_ref().unwrap().state.as_deref(), Some("online"));

    // One-deep history: the next update drops the oldest snapshot
    store.upsert(entity("a", "A2", "online"));
    let record = store.get("a").unwrap();
    assert_eq!(record.previous.as_ref().unwrap().label, "A");
    assert_eq!(record.latest.label, "A2");
}

#[test]
fn test_upsert_existing_entity_never_reorders() {
    let mut store = StateStore::new();
    store.reset_all(vec![entity("a", "A", "online"), entity("b", "B", "online")], None);

    store.upsert(entity("a", "A", "offline"));
    store.upsert(entity("a", "A", "online"));

    assert_eq!(store.display_order(), &[EntityId::from("a"), EntityId::from("b")]);
    assert_eq!(sorted_ids(&store), vec!["a", "b"]);
}

#[test]
fn test_category_change_signals_full_redraw_then_patch() {
    let mut store = StateStore::new();
    store.reset_all(vec![entity("a", "A", "offline"), entity("b", "B", "online")], None);

    let next = entity("a", "A", "online");
    let previous = store.upsert(next.clone());
    assert_eq!(reconcile(previous.as_ref(), &next), ReconcileDecision::FullRedraw);
    assert_eq!(sorted_ids(&store), vec!["a", "b"]);

    let relabelled = entity("a", "Alice", "online");
    let previous = store.upsert(relabelled.clone());
    match reconcile(previous.as_ref(), &relabelled) {
        ReconcileDecision::Patch { id, attributes } => {
            assert_eq!(id.as_str(), "a");
            assert_eq!(attributes.label, "Alice");
            assert_eq!(attributes.category, DisplayCategory::Online);
            assert!(!attributes.light_text);
        }
        other => panic!("expected patch, got {:?}", other),
    }
}

#[test]
fn test_same_snapshot_twice_is_patch() {
    let mut store = StateStore::new();
    let snapshot = entity("a", "A", "offline");
    store.upsert(snapshot.clone());

    let previous = store.upsert(snapshot.clone());
    let decision = reconcile(previous.as_ref(), &snapshot);
    assert!(matches!(decision, ReconcileDecision::Patch { .. }));
}

#[test]
fn test_first_sighting_is_full_redraw() {
    let next = entity("a", "A", "online");
    assert_eq!(reconcile(None, &next), ReconcileDecision::FullRedraw);
}

#[test]
fn test_rendered_attributes_for_error_entity() {
    let state: EntityState = serde_json::from_value(json!({
        "id": "e",
        "label": "Eve",
        "statusType": "ERROR",
        "errorMessage": "fetch failed"
    }))
    .unwrap();

    let attributes = RenderedAttributes::from_state(&state);
    assert_eq!(attributes.category, DisplayCategory::Error);
    assert!(attributes.light_text);
    assert_eq!(attributes.error_message.as_deref(), Some("fetch failed"));
}

#[test]
fn test_sort_uses_category_then_order() {
    let mut store = StateStore::new();
    store.reset_all(
        vec![
            entity("off", "Off", "offline"),
            entity("other", "Other", "busy"),
            entity("web", "Web", "active"),
            entity("on", "On", "online"),
        ],
        None,
    );
    let err: EntityState =
        serde_json::from_value(json!({"id": "err", "statusType": "ERROR"})).unwrap();
    store.upsert(err);

    assert_eq!(sorted_ids(&store), vec!["on", "web", "err", "other", "off"]);
    let indices: Vec<usize> = store.sorted().iter().map(|entry| entry.order_index).collect();
    assert_eq!(indices, vec![3, 2, 4, 1, 0]);
}
