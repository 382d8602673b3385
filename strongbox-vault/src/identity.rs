//! Identity provider port.

use crate::state::IdentityId;
use tokio::sync::watch;

/// Source of the currently signed-in account.
///
/// Implementations must publish every sign-in, sign-out, and account
/// switch on the [`changes`](IdentityProvider::changes) channel.
pub trait IdentityProvider: Send + Sync {
    /// The signed-in identity, if any.
    fn current(&self) -> Option<IdentityId>;

    /// A receiver that observes identity changes.
    fn changes(&self) -> watch::Receiver<Option<IdentityId>>;
}

/// In-process identity holder for hosts that manage sign-in themselves.
#[derive(Debug)]
pub struct SessionIdentity {
    tx: watch::Sender<Option<IdentityId>>,
}

impl SessionIdentity {
    /// Starts signed out.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn signed_in(identity: impl Into<IdentityId>) -> Self {
        let session = Self::new();
        session.sign_in(identity);
        session
    }

    pub fn sign_in(&self, identity: impl Into<IdentityId>) {
        self.tx.send_replace(Some(identity.into()));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for SessionIdentity {
    fn current(&self) -> Option<IdentityId> {
        self.tx.borrow().clone()
    }

    fn changes(&self) -> watch::Receiver<Option<IdentityId>> {
        self.tx.subscribe()
    }
}
