//! Session lifecycle: identity × space → at most one live subscription.
//!
//! The manager reconciles two inputs (the signed-in identity and the
//! selected space id) into zero or one active snapshot subscription.
//! Switching spaces synchronously tears down the old forwarding task
//! before subscribing to the new one, so deliveries for the old space
//! can never interleave into the new session. Selecting a space with
//! no identity is a session error, not a crash.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::auth::UserIdentity;
use crate::remote::DocumentStore;
use crate::store::SpaceStore;

/// Observable session phase.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No space selected (or nothing to subscribe to yet).
    NoSession,
    /// Subscription requested, first snapshot not yet delivered.
    Subscribing,
    /// Live: snapshots are flowing into the store.
    Subscribed,
    /// Subscription failed or is not allowed.
    Error(String),
}

struct SessionInner {
    identity: Option<UserIdentity>,
    current_space: Option<String>,
    /// Space the live forwarding task is attached to, if any.
    subscribed_space: Option<String>,
    task: Option<JoinHandle<()>>,
}

/// Owns the snapshot subscription for the current (identity, space)
/// pair.
pub struct SessionManager {
    remote: Arc<dyn DocumentStore>,
    store: Arc<SpaceStore>,
    state_tx: watch::Sender<SessionState>,
    inner: Mutex<SessionInner>,
}

impl SessionManager {
    pub fn new(remote: Arc<dyn DocumentStore>, store: Arc<SpaceStore>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::NoSession);
        Self {
            remote,
            store,
            state_tx,
            inner: Mutex::new(SessionInner {
                identity: None,
                current_space: None,
                subscribed_space: None,
                task: None,
            }),
        }
    }

    /// Subscribe to session phase changes.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Current session phase.
    pub fn current_state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    /// Update the signed-in identity (`None` = signed out).
    pub async fn set_identity(&self, identity: Option<UserIdentity>) {
        let mut inner = self.inner.lock().await;
        if inner.identity == identity {
            return;
        }
        inner.identity = identity;
        self.reconcile(&mut inner).await;
    }

    /// Select (or clear) the space this session follows.
    pub async fn set_current_space(&self, space_id: Option<String>) {
        let mut inner = self.inner.lock().await;
        if inner.current_space == space_id {
            return;
        }
        inner.current_space = space_id.clone();
        self.store.set_current_space(space_id);
        self.reconcile(&mut inner).await;
    }

    /// Forward identity changes from a provider feed into this
    /// session. The returned handle stops the forwarding when aborted
    /// or when the feed closes.
    pub fn attach_identity_feed(
        self: &Arc<Self>,
        mut feed: watch::Receiver<Option<UserIdentity>>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                let identity = feed.borrow_and_update().clone();
                manager.set_identity(identity).await;
                if feed.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// End the session: drop the subscription and all selection state.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        Self::teardown(&mut inner);
        inner.identity = None;
        inner.current_space = None;
        self.store.set_current_space(None);
        self.state_tx.send_replace(SessionState::NoSession);
    }

    fn teardown(inner: &mut SessionInner) {
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        inner.subscribed_space = None;
    }

    /// Drive the subscription to match (identity, current_space).
    async fn reconcile(&self, inner: &mut SessionInner) {
        let desired = match (&inner.identity, &inner.current_space) {
            (Some(_), Some(space_id)) => Some(space_id.clone()),
            (None, Some(_)) => {
                Self::teardown(inner);
                self.state_tx.send_replace(SessionState::Error(
                    "Please sign in to access the space".into(),
                ));
                return;
            }
            _ => None,
        };

        // Already attached to the right space: nothing to do.
        if desired == inner.subscribed_space && desired.is_some() {
            return;
        }

        Self::teardown(inner);
        let Some(space_id) = desired else {
            self.state_tx.send_replace(SessionState::NoSession);
            return;
        };

        self.state_tx.send_replace(SessionState::Subscribing);
        match self.remote.subscribe_to_space(&space_id).await {
            Ok(mut subscription) => {
                let store = self.store.clone();
                let state_tx = self.state_tx.clone();
                inner.subscribed_space = Some(space_id.clone());
                inner.task = Some(tokio::spawn(async move {
                    let mut first = true;
                    while let Some(event) = subscription.recv().await {
                        if first {
                            state_tx.send_replace(SessionState::Subscribed);
                            first = false;
                        }
                        store.set_space_data(event);
                    }
                    log::debug!("snapshot feed for {space_id} closed");
                }));
            }
            Err(err) => {
                log::warn!("subscribing to {space_id} failed: {err}");
                self.state_tx
                    .send_replace(SessionState::Error(err.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentityProvider, StaticIdentityProvider};
    use crate::mock::InMemoryStore;
    use crate::remote::{NoteFields, UserRecord};
    use noteboard_core::model::{NoteColor, NoteFont, Position};
    use noteboard_core::BoardConfig;
    use noteboard_layout::GridLayout;
    use std::time::Duration;
    use uuid::Uuid;

    async fn wait_for_state(rx: &mut watch::Receiver<SessionState>, wanted: SessionState) {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if *rx.borrow_and_update() == wanted {
                    return;
                }
                rx.changed().await.expect("state channel closed");
            }
        })
        .await
        .expect("timed out waiting for session state");
    }

    async fn setup() -> (Arc<InMemoryStore>, Arc<SpaceStore>, Arc<SessionManager>) {
        let grid = GridLayout::from_config(&BoardConfig::default()).unwrap();
        let remote = Arc::new(InMemoryStore::new());
        let store = Arc::new(SpaceStore::new(grid));
        let manager = Arc::new(SessionManager::new(remote.clone(), store.clone()));
        remote.create_space("spc1").await.unwrap();
        remote
            .upsert_user_in_space(
                "spc1",
                &UserRecord {
                    id: "u1".into(),
                    name: "Alice".into(),
                    email: None,
                    avatar: None,
                },
            )
            .await
            .unwrap();
        (remote, store, manager)
    }

    fn fields(space: &str, user: &str) -> NoteFields {
        NoteFields {
            client_key: Uuid::new_v4(),
            space_id: space.into(),
            user_id: user.into(),
            title: "t".into(),
            content: "c".into(),
            color: NoteColor::default(),
            font: NoteFont::default(),
            position: Position::new(20.0, 20.0),
        }
    }

    #[tokio::test]
    async fn test_space_without_identity_is_an_error() {
        let (_, _, manager) = setup().await;
        manager.set_current_space(Some("spc1".into())).await;
        match manager.current_state() {
            SessionState::Error(msg) => assert!(msg.contains("sign in")),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscribes_and_fills_store() {
        let (_, store, manager) = setup().await;
        let mut rx = manager.state();

        manager
            .set_identity(Some(UserIdentity::new("u1", "Alice")))
            .await;
        manager.set_current_space(Some("spc1".into())).await;
        wait_for_state(&mut rx, SessionState::Subscribed).await;

        let state = store.snapshot();
        assert_eq!(state.current_space.as_deref(), Some("spc1"));
        assert!(state.space.as_ref().unwrap().users.contains_key("u1"));
    }

    #[tokio::test]
    async fn test_remote_mutations_flow_into_store() {
        let (remote, store, manager) = setup().await;
        let mut rx = manager.state();
        manager
            .set_identity(Some(UserIdentity::new("u1", "Alice")))
            .await;
        manager.set_current_space(Some("spc1".into())).await;
        wait_for_state(&mut rx, SessionState::Subscribed).await;

        let record = remote.add_note(&fields("spc1", "u1")).await.unwrap();
        let mut store_rx = store.subscribe();
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if store_rx.borrow_and_update().note("u1", &record.id).is_some() {
                    return;
                }
                store_rx.changed().await.expect("store channel closed");
            }
        })
        .await
        .expect("note never arrived");
    }

    #[tokio::test]
    async fn test_switching_space_drops_old_feed() {
        let (remote, store, manager) = setup().await;
        remote.create_space("spc2").await.unwrap();
        let mut rx = manager.state();
        manager
            .set_identity(Some(UserIdentity::new("u1", "Alice")))
            .await;
        manager.set_current_space(Some("spc1".into())).await;
        wait_for_state(&mut rx, SessionState::Subscribed).await;

        manager.set_current_space(Some("spc2".into())).await;
        wait_for_state(&mut rx, SessionState::Subscribed).await;

        // A mutation in the old space never lands in the store.
        remote.add_note(&fields("spc1", "u1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let state = store.snapshot();
        assert_eq!(state.current_space.as_deref(), Some("spc2"));
        assert_eq!(
            state.space.as_ref().map_or(0, |s| s.note_count("u1")),
            0
        );
    }

    #[tokio::test]
    async fn test_reselecting_same_space_is_idempotent() {
        let (_, _, manager) = setup().await;
        let mut rx = manager.state();
        manager
            .set_identity(Some(UserIdentity::new("u1", "Alice")))
            .await;
        manager.set_current_space(Some("spc1".into())).await;
        wait_for_state(&mut rx, SessionState::Subscribed).await;

        rx.mark_unchanged();
        manager.set_current_space(Some("spc1".into())).await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(manager.current_state(), SessionState::Subscribed);
    }

    #[tokio::test]
    async fn test_sign_out_mid_session_errors() {
        let (_, _, manager) = setup().await;
        let mut rx = manager.state();
        manager
            .set_identity(Some(UserIdentity::new("u1", "Alice")))
            .await;
        manager.set_current_space(Some("spc1".into())).await;
        wait_for_state(&mut rx, SessionState::Subscribed).await;

        manager.set_identity(None).await;
        match manager.current_state() {
            SessionState::Error(msg) => assert!(msg.contains("sign in")),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_identity_feed_drives_session() {
        let (_, _, manager) = setup().await;
        let provider = StaticIdentityProvider::new(UserIdentity::new("u1", "Alice"));
        let feed_task = manager.attach_identity_feed(provider.identity_changes());

        provider.sign_in().await.unwrap();
        let mut rx = manager.state();
        manager.set_current_space(Some("spc1".into())).await;
        wait_for_state(&mut rx, SessionState::Subscribed).await;

        provider.sign_out();
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                if matches!(*rx.borrow_and_update(), SessionState::Error(_)) {
                    return;
                }
                rx.changed().await.expect("state channel closed");
            }
        })
        .await
        .expect("sign-out never surfaced");
        feed_task.abort();
    }

    #[tokio::test]
    async fn test_shutdown_resets_everything() {
        let (_, store, manager) = setup().await;
        let mut rx = manager.state();
        manager
            .set_identity(Some(UserIdentity::new("u1", "Alice")))
            .await;
        manager.set_current_space(Some("spc1".into())).await;
        wait_for_state(&mut rx, SessionState::Subscribed).await;

        manager.shutdown().await;
        assert_eq!(manager.current_state(), SessionState::NoSession);
        assert!(store.snapshot().current_space.is_none());
    }
}
