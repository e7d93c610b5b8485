//! Access gate: who is acting.
//!
//! A [`TaskSession`](crate::tasks::TaskSession) asks its gate for the current
//! identity before every load and mutation. With no identity, nothing reaches
//! the store.

use parking_lot::RwLock;
use taskdeck_proto::task::Identity;

/// Supplies the identity the session acts as.
pub trait AccessGate: Send + Sync {
    /// The signed-in identity, or `None` when signed out.
    fn current_identity(&self) -> Option<Identity>;

    /// Returns `true` if an identity is available.
    fn is_authenticated(&self) -> bool {
        self.current_identity().is_some()
    }
}

/// A gate whose identity can change at runtime (sign in, sign out).
#[derive(Debug, Default)]
pub struct SessionGate {
    identity: RwLock<Option<Identity>>,
}

impl SessionGate {
    /// Creates a gate already signed in as `identity`.
    #[must_use]
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            identity: RwLock::new(Some(identity)),
        }
    }

    /// Creates a signed-out gate.
    #[must_use]
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Signs in as `identity`, replacing any previous identity.
    pub fn sign_in(&self, identity: Identity) {
        tracing::info!(identity = %identity, "signed in");
        *self.identity.write() = Some(identity);
    }

    /// Signs out. Returns the identity that was signed in, if any.
    pub fn sign_out(&self) -> Option<Identity> {
        let previous = self.identity.write().take();
        if let Some(identity) = &previous {
            tracing::info!(identity = %identity, "signed out");
        }
        previous
    }
}

impl AccessGate for SessionGate {
    fn current_identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }
}

impl<G: AccessGate> AccessGate for std::sync::Arc<G> {
    fn current_identity(&self) -> Option<Identity> {
        (**self).current_identity()
    }
}
