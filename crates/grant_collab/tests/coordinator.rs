use grant_collab::{
    CollabError, CollabNotification, CollaborationCoordinator, CursorPosition, LocalUser, LockStatus,
    NotificationKind, HEARTBEAT_TIMER, POLL_TIMER,
};
use grant_config::CollaborationConfig;
use grant_store::{MemoryRemoteStore, RemoteStore};
use grant_test_helpers::prelude::*;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ORG: &str = "org-42";

struct Peer {
    coordinator: Arc<CollaborationCoordinator>,
    scheduler: ManualScheduler,
}

fn peer(store: Arc<dyn RemoteStore>, clock: &Arc<ManualClock>) -> Peer {
    peer_with(store, clock, CollaborationConfig::default())
}

fn peer_with(store: Arc<dyn RemoteStore>, clock: &Arc<ManualClock>, config: CollaborationConfig) -> Peer {
    let scheduler = ManualScheduler::new();
    let coordinator =
        CollaborationCoordinator::new(store, clock.clone(), Arc::new(scheduler.clone()), config);
    Peer {
        coordinator,
        scheduler,
    }
}

async fn joined(store: &Arc<MemoryRemoteStore>, clock: &Arc<ManualClock>, id: &str, name: &str) -> Peer {
    let peer = peer(store.clone(), clock);
    peer.coordinator
        .initialize(ORG, LocalUser::new(id, name))
        .await
        .unwrap();
    peer
}

async fn shared_events(store: &MemoryRemoteStore) -> Vec<Value> {
    match store.get("collaboration_events_org-42").await.unwrap() {
        Some(Value::Array(events)) => events,
        other => panic!("event list missing: {:?}", other),
    }
}

/// Collect (value, has_conflict) for every field update delivered
fn record_updates(coordinator: &CollaborationCoordinator) -> Arc<Mutex<Vec<(Value, bool)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    coordinator.on(NotificationKind::FieldUpdated, move |n| {
        if let CollabNotification::FieldUpdated(update) = n {
            sink.lock().unwrap().push((update.value.clone(), update.has_conflict));
        }
    });
    seen
}

#[tokio::test]
async fn test_initialize_starts_timers() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;

    assert!(ada.coordinator.is_initialized());
    assert_eq!(ada.scheduler.active_timers(), vec![HEARTBEAT_TIMER, POLL_TIMER]);
    assert_eq!(ada.scheduler.period_of(POLL_TIMER), Some(Duration::from_secs(2)));
    assert_eq!(ada.scheduler.period_of(HEARTBEAT_TIMER), Some(Duration::from_secs(30)));

    let again = ada
        .coordinator
        .initialize(ORG, LocalUser::new("u-ada", "Ada"))
        .await;
    assert!(matches!(again, Err(CollabError::AlreadyInitialized)));

    // Presence and the join event are in the shared store
    let users = store.get("collaboration_users_org-42").await.unwrap().unwrap();
    assert!(users.get("u-ada").is_some());
    let events = store.get("collaboration_events_org-42").await.unwrap().unwrap();
    assert_eq!(events[0]["type"], "user_joined");
}

#[tokio::test]
async fn test_initialize_rejects_empty_identity() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let p = peer(store, &clock);

    let result = p.coordinator.initialize("  ", LocalUser::new("u1", "Ada")).await;
    assert!(matches!(result, Err(CollabError::InvalidSession(_))));
    let result = p.coordinator.initialize(ORG, LocalUser::new("", "Ada")).await;
    assert!(matches!(result, Err(CollabError::InvalidSession(_))));
    assert!(!p.coordinator.is_initialized());
    assert!(p.scheduler.active_timers().is_empty());
}

#[tokio::test]
async fn test_lock_is_exclusive_across_clients() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;

    assert!(ada.coordinator.lock_field("budget").await);
    assert!(!bob.coordinator.lock_field("budget").await);

    assert_eq!(bob.coordinator.is_field_locked("budget"), LockStatus::locked_by("Ada"));
    // The holder does not see its own lock
    assert_eq!(ada.coordinator.is_field_locked("budget"), LockStatus::unlocked());

    // Re-locking a field we already hold succeeds
    assert!(ada.coordinator.lock_field("budget").await);

    ada.coordinator.unlock_field("budget").await;
    bob.coordinator.poll_once().await;
    assert_eq!(bob.coordinator.is_field_locked("budget"), LockStatus::unlocked());
    assert!(bob.coordinator.lock_field("budget").await);
    assert_eq!(ada.coordinator.poll_once().await, 1); // Bob's user_joined
    assert_eq!(ada.coordinator.is_field_locked("budget"), LockStatus::locked_by("Bob"));
}

#[tokio::test]
async fn test_unlock_by_non_holder_is_noop() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;

    assert!(ada.coordinator.lock_field("budget").await);
    bob.coordinator.poll_once().await;
    bob.coordinator.unlock_field("budget").await;

    let locks = store.get("collaboration_locks_org-42").await.unwrap().unwrap();
    assert_eq!(locks["budget"]["userId"], "u-ada");
}

#[tokio::test]
async fn test_field_update_reaches_other_client_once() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;
    let updates = record_updates(&bob.coordinator);

    clock.advance_millis(100);
    ada.coordinator
        .update_field("profile", "org_name", json!("Food Bank"))
        .await;

    clock.advance_millis(500);
    // Ada's join and her update; Bob's own events are skipped
    assert_eq!(bob.coordinator.poll_once().await, 2);
    assert_eq!(*updates.lock().unwrap(), vec![(json!("Food Bank"), false)]);

    clock.advance_millis(2_000);
    assert_eq!(bob.coordinator.poll_once().await, 0);
    assert_eq!(updates.lock().unwrap().len(), 1);

    // The author never receives its own update
    let own = record_updates(&ada.coordinator);
    ada.coordinator.poll_once().await;
    assert!(own.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stale_events_are_not_applied() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;
    let updates = record_updates(&bob.coordinator);

    ada.coordinator
        .update_field("profile", "org_name", json!("Too late"))
        .await;
    clock.advance(Duration::from_secs(6));

    assert_eq!(bob.coordinator.poll_once().await, 0);
    assert!(updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_newest_update_wins() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let cy = joined(&store, &clock, "u-cy", "Cy").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;
    let updates = record_updates(&bob.coordinator);

    clock.advance_millis(100);
    ada.coordinator.update_field("budget", "total", json!(1000)).await;
    clock.advance_millis(100);
    cy.coordinator.update_field("budget", "total", json!(2000)).await;

    clock.advance_millis(100);
    bob.coordinator.poll_once().await;

    let values = updates.lock().unwrap();
    assert_eq!(values.last().map(|(v, _)| v.clone()), Some(json!(2000)));
}

#[tokio::test]
async fn test_update_on_focused_field_is_parked() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;
    let updates = record_updates(&bob.coordinator);

    assert!(bob.coordinator.lock_field("mission").await);
    clock.advance_millis(100);
    ada.coordinator
        .update_field("narrative", "mission", json!("Theirs"))
        .await;

    clock.advance_millis(100);
    bob.coordinator.poll_once().await;

    assert_eq!(*updates.lock().unwrap(), vec![(json!("Theirs"), true)]);
    let conflict = bob.coordinator.conflict("mission").unwrap();
    assert_eq!(conflict.user_id, "u-ada");

    assert_eq!(bob.coordinator.resolve_conflict("mission", true), Some(json!("Theirs")));
    assert!(bob.coordinator.conflict("mission").is_none());
    assert_eq!(bob.coordinator.resolve_conflict("mission", true), None);
}

#[tokio::test]
async fn test_inactive_user_is_evicted_with_locks() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;

    assert!(ada.coordinator.lock_field("budget").await);
    bob.coordinator.poll_once().await;
    assert_eq!(bob.coordinator.get_active_users().len(), 1);
    assert!(bob.coordinator.is_field_locked("budget").locked);

    let left = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&left);
    bob.coordinator.on(NotificationKind::UserLeft, move |n| {
        if let CollabNotification::UserLeft { user_id, .. } = n {
            sink.lock().unwrap().push(user_id.clone());
        }
    });

    // Ada goes silent for longer than the presence timeout
    clock.advance(Duration::from_secs(5 * 60 + 1));
    bob.coordinator.heartbeat().await;

    assert!(bob.coordinator.get_active_users().is_empty());
    assert_eq!(*left.lock().unwrap(), vec!["u-ada".to_string()]);
    assert_eq!(bob.coordinator.is_field_locked("budget"), LockStatus::unlocked());

    let users = store.get("collaboration_users_org-42").await.unwrap().unwrap();
    assert!(users.get("u-ada").is_none());
    let locks = store.get("collaboration_locks_org-42").await.unwrap().unwrap();
    assert!(locks.get("budget").is_none());
}

#[tokio::test]
async fn test_failed_broadcast_is_kept_pending() {
    let memory = Arc::new(MemoryRemoteStore::new());
    let store = Arc::new(FaultyStore::new(memory));
    let clock = Arc::new(ManualClock::default());
    let ada = peer(store.clone(), &clock);
    ada.coordinator
        .initialize(ORG, LocalUser::new("u-ada", "Ada"))
        .await
        .unwrap();

    store.set_fail_writes(true);
    ada.coordinator
        .update_field("profile", "ein", json!("12-3456789"))
        .await;

    let pending = ada.coordinator.pending_changes();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].field_id.as_deref(), Some("ein"));
}

#[tokio::test]
async fn test_unreachable_store_does_not_break_session() {
    let memory = Arc::new(MemoryRemoteStore::new());
    let store = Arc::new(FaultyStore::new(memory));
    let clock = Arc::new(ManualClock::default());
    store.set_unreachable(true);

    let ada = peer(store.clone(), &clock);
    ada.coordinator
        .initialize(ORG, LocalUser::new("u-ada", "Ada"))
        .await
        .unwrap();

    assert_eq!(ada.coordinator.poll_once().await, 0);
    ada.coordinator.heartbeat().await;
    // Claim stays local without a fresh read of the shared map
    assert!(ada.coordinator.lock_field("budget").await);
    assert!(store.inner().is_empty());
}

#[tokio::test]
async fn test_cleanup_announces_departure() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;

    assert!(ada.coordinator.lock_field("budget").await);
    bob.coordinator.poll_once().await;

    let left = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&left);
    bob.coordinator.on(NotificationKind::UserLeft, move |_| {
        *counter.lock().unwrap() += 1;
    });

    clock.advance_millis(100);
    ada.coordinator.cleanup().await;
    assert!(!ada.coordinator.is_initialized());
    assert!(ada.scheduler.active_timers().is_empty());
    assert!(!ada.scheduler.fire(POLL_TIMER).await);

    clock.advance_millis(100);
    bob.coordinator.poll_once().await;
    assert_eq!(*left.lock().unwrap(), 1);
    assert!(bob.coordinator.get_active_users().is_empty());
    assert!(!bob.coordinator.is_field_locked("budget").locked);

    let users = store.get("collaboration_users_org-42").await.unwrap().unwrap();
    assert!(users.get("u-ada").is_none());
    assert!(users.get("u-bob").is_some());
}

#[tokio::test]
async fn test_poll_timer_drives_updates() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;
    let updates = record_updates(&bob.coordinator);

    ada.coordinator
        .update_field("profile", "org_name", json!("Via timer"))
        .await;
    assert!(bob.scheduler.fire(POLL_TIMER).await);
    assert_eq!(*updates.lock().unwrap(), vec![(json!("Via timer"), false)]);
}

#[tokio::test]
async fn test_event_list_drops_expired_events() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    assert_eq!(shared_events(&store).await.len(), 1);

    // Past the 30s retention window the join event is pruned on the next write
    clock.advance(Duration::from_secs(31));
    ada.coordinator.update_field("profile", "org_name", json!("A")).await;
    let events = shared_events(&store).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "field_update");

    // Within the window both survive
    clock.advance(Duration::from_secs(10));
    ada.coordinator.update_field("profile", "org_name", json!("B")).await;
    let events = shared_events(&store).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["data"]["value"], "B");
}

#[tokio::test]
async fn test_event_list_is_capped() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let config = CollaborationConfig {
        max_events: 5,
        ..CollaborationConfig::default()
    };
    let ada = peer_with(store.clone(), &clock, config);
    ada.coordinator
        .initialize(ORG, LocalUser::new("u-ada", "Ada"))
        .await
        .unwrap();

    for i in 0..10 {
        clock.advance_millis(1);
        ada.coordinator.update_field("budget", "total", json!(i)).await;
    }

    let events = shared_events(&store).await;
    assert_eq!(events.len(), 5);
    // The oldest entries go first, the join event among them
    let values: Vec<i64> = events
        .iter()
        .map(|e| e["data"]["value"].as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![5, 6, 7, 8, 9]);
}

#[tokio::test]
async fn test_cursor_and_section_updates_reach_other_client() {
    let store = Arc::new(MemoryRemoteStore::new());
    let clock = Arc::new(ManualClock::default());
    let ada = joined(&store, &clock, "u-ada", "Ada").await;
    let bob = joined(&store, &clock, "u-bob", "Bob").await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in [NotificationKind::CursorMoved, NotificationKind::SectionUpdated] {
        let sink = Arc::clone(&seen);
        bob.coordinator.on(kind, move |n| sink.lock().unwrap().push(n.clone()));
    }

    clock.advance_millis(100);
    ada.coordinator
        .update_cursor("narrative", CursorPosition::new(12.0, 48.5))
        .await;
    clock.advance_millis(100);
    ada.coordinator
        .update_section("narrative", json!({"summary": "Meals for 300 families"}))
        .await;

    clock.advance_millis(500);
    bob.coordinator.poll_once().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    match &seen[0] {
        CollabNotification::CursorMoved {
            user_id,
            section_id,
            position,
        } => {
            assert_eq!(user_id, "u-ada");
            assert_eq!(section_id.as_deref(), Some("narrative"));
            assert_eq!((position.x, position.y), (12.0, 48.5));
        }
        other => panic!("expected a cursor move, got {:?}", other),
    }
    match &seen[1] {
        CollabNotification::SectionUpdated {
            section_id,
            data,
            user_name,
            ..
        } => {
            assert_eq!(section_id, "narrative");
            assert_eq!(data["summary"], "Meals for 300 families");
            assert_eq!(user_name, "Ada");
        }
        other => panic!("expected a section update, got {:?}", other),
    }

    let users = bob.coordinator.get_active_users();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].current_section.as_deref(), Some("narrative"));
    let cursor = users[0].cursor_position.unwrap();
    assert_eq!((cursor.x, cursor.y), (12.0, 48.5));
}
