//! Bearer token handling.
//!
//! Token presence is the only evidence of being connected. There is no
//! expiry tracking: a 401 from the remote is what invalidates a token.

use crate::error::StoreError;
use crate::store::{keys, LocalStore};

/// The persisted access token, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    token: Option<String>,
}

impl Auth {
    /// Read the stored token.
    pub fn load<S: LocalStore + ?Sized>(store: &S) -> Result<Self, StoreError> {
        let token = store
            .get(keys::ACCESS_TOKEN)?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Ok(Self { token })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Store a token deposited by the OAuth redirect. A blank token clears
    /// the stored one.
    pub fn set<S: LocalStore + ?Sized>(
        &mut self,
        store: &mut S,
        token: impl Into<String>,
    ) -> Result<(), StoreError> {
        let token = token.into();
        let token = token.trim();
        if token.is_empty() {
            return self.clear(store);
        }
        store.set(keys::ACCESS_TOKEN, token)?;
        self.token = Some(token.to_string());
        Ok(())
    }

    /// Forget the token in memory and on disk.
    pub fn clear<S: LocalStore + ?Sized>(&mut self, store: &mut S) -> Result<(), StoreError> {
        self.token = None;
        store.remove(keys::ACCESS_TOKEN)
    }
}

/// `Authorization` header value for a token.
pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Extract the token from an `Authorization` header value.
pub fn parse_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
