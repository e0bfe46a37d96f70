//! Identity provider seam.
//!
//! Authentication is an external collaborator: the session layer only
//! needs a signed-in identity and a feed of identity changes. Provider
//! failures propagate to the caller untouched.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::SyncError;

/// An authenticated user identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            avatar: None,
        }
    }
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Interactive sign-in. Provider-specific failures surface as
    /// [`SyncError::PermissionDenied`] or [`SyncError::Unavailable`].
    async fn sign_in(&self) -> Result<UserIdentity, SyncError>;

    /// Feed of identity changes (`None` = signed out). The returned
    /// receiver is the unsubscribe handle: drop it to stop listening.
    fn identity_changes(&self) -> watch::Receiver<Option<UserIdentity>>;
}

/// Fixed-identity provider for tests and demos.
pub struct StaticIdentityProvider {
    identity: UserIdentity,
    tx: watch::Sender<Option<UserIdentity>>,
}

impl StaticIdentityProvider {
    pub fn new(identity: UserIdentity) -> Self {
        let (tx, _) = watch::channel(None);
        Self { identity, tx }
    }

    /// Simulate the provider signing the user out.
    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn sign_in(&self) -> Result<UserIdentity, SyncError> {
        self.tx.send_replace(Some(self.identity.clone()));
        Ok(self.identity.clone())
    }

    fn identity_changes(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.tx.subscribe()
    }
}
