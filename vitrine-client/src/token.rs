//! Bearer credential seam.
//!
//! The authentication collaborator owns token lifecycle (refresh, expiry);
//! this layer only re-reads the current token on each call and attaches it
//! when present. Unauthenticated calls are allowed for read-only browsing.

use std::sync::RwLock;

/// Supplies the current bearer token, if any.
pub trait TokenProvider: Send + Sync {
    /// The token to attach to the next request, or `None` for an
    /// unauthenticated call.
    fn current_token(&self) -> Option<String>;
}

/// Token provider backed by a swappable in-memory slot.
///
/// Suits tests and embedders whose auth layer pushes tokens in; anything
/// that derives tokens on demand implements [`TokenProvider`] directly.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    token: RwLock<Option<String>>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    /// Replace the stored token (e.g. after the auth layer refreshes it).
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().expect("token slot lock poisoned") = token;
    }
}

impl TokenProvider for StaticTokenProvider {
    fn current_token(&self) -> Option<String> {
        self.token.read().expect("token slot lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_provider_roundtrip() {
        let provider = StaticTokenProvider::new(None);
        assert_eq!(provider.current_token(), None);

        provider.set_token(Some("t-123".to_string()));
        assert_eq!(provider.current_token().as_deref(), Some("t-123"));

        provider.set_token(None);
        assert_eq!(provider.current_token(), None);
    }
}
