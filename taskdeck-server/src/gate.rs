//! Token-to-identity resolution for incoming connections.

use std::collections::HashMap;

use taskdeck_proto::task::Identity;

use crate::config::Account;

/// Resolves bearer tokens presented in `Hello` to the identity they act as.
#[derive(Debug, Default, Clone)]
pub struct TokenGate {
    tokens: HashMap<String, Identity>,
}

impl TokenGate {
    /// Creates a gate that accepts no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a gate from provisioned accounts.
    ///
    /// When two accounts share a token, the later one wins.
    #[must_use]
    pub fn from_accounts(accounts: &[Account]) -> Self {
        let mut gate = Self::new();
        for account in accounts {
            gate.insert(&account.token, Identity::new(account.identity.clone()));
        }
        gate
    }

    /// Adds or replaces a token. Empty tokens are ignored.
    pub fn insert(&mut self, token: &str, identity: Identity) {
        if token.is_empty() {
            tracing::warn!(identity = %identity, "ignoring account with empty token");
            return;
        }
        if let Some(previous) = self.tokens.insert(token.to_string(), identity) {
            tracing::warn!(previous = %previous, "token reassigned to a different account");
        }
    }

    /// Returns the identity for `token`, or `None` if it is unknown.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<Identity> {
        if token.is_empty() {
            return None;
        }
        self.tokens.get(token).cloned()
    }

    /// Number of accepted tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns `true` if no token is accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
