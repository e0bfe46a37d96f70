//! End-to-end scenarios: several clients sharing one remote store,
//! each running the full stack (session manager, optimistic store,
//! reconciler, drag debouncer).

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use noteboard_collab::{
    BoardState, DocumentStore, DragDebouncer, InMemoryStore, NoteDraft, NotePatch, SessionManager,
    SessionState, SpaceStore, SyncError, SyncReconciler, UserIdentity,
};
use noteboard_core::model::Position;
use noteboard_core::BoardConfig;
use noteboard_layout::GridLayout;
use tokio::time::timeout;

fn test_config() -> BoardConfig {
    BoardConfig {
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 4,
        ..Default::default()
    }
}

struct Client {
    store: Arc<SpaceStore>,
    reconciler: Arc<SyncReconciler>,
    session: Arc<SessionManager>,
    debouncer: DragDebouncer,
}

fn client(remote: &Arc<InMemoryStore>, config: &BoardConfig) -> Client {
    let grid = GridLayout::from_config(config).expect("valid grid");
    let store = Arc::new(SpaceStore::new(grid));
    let reconciler = Arc::new(SyncReconciler::new(
        remote.clone() as Arc<dyn DocumentStore>,
        store.clone(),
        grid,
        config.clone(),
    ));
    let session = Arc::new(SessionManager::new(
        remote.clone() as Arc<dyn DocumentStore>,
        store.clone(),
    ));
    let debouncer = DragDebouncer::new(
        store.clone(),
        reconciler.clone(),
        config.drag_quiet_period(),
    );
    Client {
        store,
        reconciler,
        session,
        debouncer,
    }
}

async fn join(client: &Client, space_id: &str, identity: &UserIdentity) {
    client.session.set_identity(Some(identity.clone())).await;
    client
        .reconciler
        .join_space(space_id, identity)
        .await
        .expect("join failed");
    client
        .session
        .set_current_space(Some(space_id.to_string()))
        .await;

    let mut rx = client.session.state();
    timeout(Duration::from_secs(2), async {
        loop {
            if *rx.borrow_and_update() == SessionState::Subscribed {
                return;
            }
            rx.changed().await.expect("session state channel closed");
        }
    })
    .await
    .expect("never subscribed");
}

async fn wait_for(store: &SpaceStore, pred: impl Fn(&BoardState) -> bool) {
    let mut rx = store.subscribe();
    timeout(Duration::from_secs(2), async {
        loop {
            let state = rx.borrow_and_update().clone();
            if pred(&state) {
                return;
            }
            rx.changed().await.expect("store channel closed");
        }
    })
    .await
    .expect("condition never reached");
}

#[tokio::test]
async fn test_two_clients_converge_on_added_note() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);
    let bob = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;
    join(&bob, "spc1", &UserIdentity::new("u-bob", "Bob")).await;

    let note = alice
        .reconciler
        .add_note("spc1", "u-alice", NoteDraft::new("groceries", "milk, eggs"))
        .await
        .unwrap();

    wait_for(&bob.store, |s| s.note("u-alice", &note.id).is_some()).await;
    let state = bob.store.snapshot();
    let seen = state.note("u-alice", &note.id).unwrap();
    assert_eq!(seen.title, "groceries");
    assert_eq!(seen.position, Position::new(20.0, 20.0));
}

#[tokio::test]
async fn test_notes_land_in_own_column_only() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);
    let bob = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;
    join(&bob, "spc1", &UserIdentity::new("u-bob", "Bob")).await;

    alice
        .reconciler
        .add_note("spc1", "u-alice", NoteDraft::new("a", "a"))
        .await
        .unwrap();
    bob.reconciler
        .add_note("spc1", "u-bob", NoteDraft::new("b", "b"))
        .await
        .unwrap();

    wait_for(&alice.store, |s| {
        s.space.as_ref().is_some_and(|sp| {
            sp.note_count("u-alice") == 1 && sp.note_count("u-bob") == 1
        })
    })
    .await;

    // Both columns start at the top-left cell of their own canvas.
    let state = alice.store.snapshot();
    let space = state.space.as_ref().unwrap();
    let alice_note = space.users["u-alice"].notes_by_recency()[0];
    let bob_note = space.users["u-bob"].notes_by_recency()[0];
    assert_eq!(alice_note.position, Position::new(20.0, 20.0));
    assert_eq!(bob_note.position, Position::new(20.0, 20.0));
}

#[tokio::test]
async fn test_create_then_join_after_not_found() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);
    let identity = UserIdentity::new("u-alice", "Alice");

    let err = alice
        .reconciler
        .join_space("fresh", &identity)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));

    alice.reconciler.create_space("fresh").await.unwrap();
    let space = alice.reconciler.join_space("fresh", &identity).await.unwrap();
    assert!(space.users.contains_key("u-alice"));
}

#[tokio::test]
async fn test_offline_blip_retries_and_recovers() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;

    remote.fail_next(SyncError::Unavailable("offline".into()));
    remote.fail_next(SyncError::Unavailable("offline".into()));

    let note = alice
        .reconciler
        .add_note("spc1", "u-alice", NoteDraft::new("a", "a"))
        .await
        .unwrap();
    assert!(!note.is_pending());
    assert_eq!(remote.counters().adds(), 3);
    assert_eq!(remote.counters().reconnects(), 2);
}

#[tokio::test]
async fn test_terminal_failure_leaves_no_trace() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);
    let bob = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;
    join(&bob, "spc1", &UserIdentity::new("u-bob", "Bob")).await;

    remote.fail_next(SyncError::PermissionDenied("rules".into()));
    let err = alice
        .reconciler
        .add_note("spc1", "u-alice", NoteDraft::new("a", "a"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::PermissionDenied(_)));

    assert!(remote.get_notes_in_space("spc1").await.unwrap().is_empty());
    let state = alice.store.snapshot();
    assert_eq!(state.space.as_ref().unwrap().note_count("u-alice"), 0);
}

#[tokio::test]
async fn test_cap_enforced_against_synced_state() {
    let remote = Arc::new(InMemoryStore::new());
    let config = BoardConfig {
        max_notes_per_user: 3,
        ..test_config()
    };
    let alice = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;

    for i in 0..3 {
        alice
            .reconciler
            .add_note("spc1", "u-alice", NoteDraft::new(format!("n{i}"), "c"))
            .await
            .unwrap();
    }
    let adds_before = remote.counters().adds();

    let err = alice
        .reconciler
        .add_note("spc1", "u-alice", NoteDraft::new("overflow", "c"))
        .await
        .unwrap_err();
    assert_eq!(err, SyncError::LimitExceeded { limit: 3 });
    assert_eq!(remote.counters().adds(), adds_before);
    assert_eq!(remote.get_notes_in_space("spc1").await.unwrap().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_drag_costs_one_write_and_converges() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);
    let bob = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;
    join(&bob, "spc1", &UserIdentity::new("u-bob", "Bob")).await;

    let note = alice
        .reconciler
        .add_note("spc1", "u-alice", NoteDraft::new("a", "a"))
        .await
        .unwrap();
    wait_for(&bob.store, |s| s.note("u-alice", &note.id).is_some()).await;
    let updates_before = remote.counters().updates();

    // A drag across several intermediate positions.
    for (x, y) in [(60.0, 40.0), (150.0, 120.0), (240.0, 200.0), (296.0, 240.0)] {
        alice
            .debouncer
            .position_changed("spc1", "u-alice", &note.id, Position::new(x, y));
    }
    tokio::time::sleep(Duration::from_millis(450)).await;

    assert_eq!(remote.counters().updates() - updates_before, 1);
    wait_for(&bob.store, |s| {
        s.note("u-alice", &note.id)
            .is_some_and(|n| n.position == Position::new(296.0, 240.0))
    })
    .await;
}

#[tokio::test]
async fn test_drop_back_at_origin_writes_nothing() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;

    let note = alice
        .reconciler
        .add_note("spc1", "u-alice", NoteDraft::new("a", "a"))
        .await
        .unwrap();
    let updates_before = remote.counters().updates();

    // Dragged around, then dropped exactly where it started.
    alice
        .debouncer
        .position_changed("spc1", "u-alice", &note.id, Position::new(150.0, 120.0));
    alice
        .debouncer
        .position_changed("spc1", "u-alice", &note.id, note.position);
    alice.debouncer.flush(&note.id).await.unwrap();

    assert_eq!(remote.counters().updates() - updates_before, 0);
}

#[tokio::test]
async fn test_overlapping_remote_notes_repaired_on_arrival() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;

    // Another replica wrote two notes onto the same cell.
    let first = alice
        .reconciler
        .add_note(
            "spc1",
            "u-alice",
            NoteDraft {
                position: Some(Position::new(20.0, 20.0)),
                ..NoteDraft::new("a", "a")
            },
        )
        .await
        .unwrap();
    let second = alice
        .reconciler
        .add_note(
            "spc1",
            "u-alice",
            NoteDraft {
                position: Some(Position::new(24.0, 18.0)),
                ..NoteDraft::new("b", "b")
            },
        )
        .await
        .unwrap();

    // The repair pass on snapshot arrival moves the newer note off
    // the contested cell; the older one keeps its spot.
    wait_for(&alice.store, |s| {
        s.note("u-alice", &second.id)
            .is_some_and(|n| n.position == Position::new(296.0, 20.0))
    })
    .await;
    let state = alice.store.snapshot();
    let a = state.note("u-alice", &first.id).unwrap();
    assert_eq!(a.position, Position::new(20.0, 20.0));
}

#[tokio::test]
async fn test_concurrent_adds_land_on_distinct_cells() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;

    let drafts: Vec<_> = (0..4)
        .map(|i| {
            alice
                .reconciler
                .add_note("spc1", "u-alice", NoteDraft::new(format!("n{i}"), "c"))
        })
        .collect();
    let notes: Vec<_> = join_all(drafts)
        .await
        .into_iter()
        .collect::<Result<_, _>>()
        .unwrap();

    let mut positions: Vec<(i64, i64)> = notes
        .iter()
        .map(|n| (n.position.x as i64, n.position.y as i64))
        .collect();
    positions.sort_unstable();
    positions.dedup();
    assert_eq!(positions.len(), 4);
}

#[tokio::test]
async fn test_edit_and_delete_propagate() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);
    let bob = client(&remote, &config);

    alice.reconciler.create_space("spc1").await.unwrap();
    join(&alice, "spc1", &UserIdentity::new("u-alice", "Alice")).await;
    join(&bob, "spc1", &UserIdentity::new("u-bob", "Bob")).await;

    let note = alice
        .reconciler
        .add_note("spc1", "u-alice", NoteDraft::new("draft", "v1"))
        .await
        .unwrap();

    let patch = NotePatch {
        content: Some("v2".into()),
        ..Default::default()
    };
    alice
        .reconciler
        .update_note("spc1", "u-alice", &note.id, patch)
        .await
        .unwrap();
    wait_for(&bob.store, |s| {
        s.note("u-alice", &note.id).is_some_and(|n| n.content == "v2")
    })
    .await;

    alice
        .reconciler
        .remove_note("spc1", "u-alice", &note.id)
        .await
        .unwrap();
    wait_for(&bob.store, |s| s.note("u-alice", &note.id).is_none()).await;
}

#[tokio::test]
async fn test_switching_space_isolates_state() {
    let remote = Arc::new(InMemoryStore::new());
    let config = test_config();
    let alice = client(&remote, &config);
    let identity = UserIdentity::new("u-alice", "Alice");

    alice.reconciler.create_space("spc1").await.unwrap();
    alice.reconciler.create_space("spc2").await.unwrap();
    join(&alice, "spc1", &identity).await;
    alice
        .reconciler
        .add_note("spc1", "u-alice", NoteDraft::new("in-one", "c"))
        .await
        .unwrap();

    join(&alice, "spc2", &identity).await;
    wait_for(&alice.store, |s| {
        s.current_space.as_deref() == Some("spc2") && s.space.is_some()
    })
    .await;
    let state = alice.store.snapshot();
    assert_eq!(state.space.as_ref().unwrap().note_count("u-alice"), 0);
}
