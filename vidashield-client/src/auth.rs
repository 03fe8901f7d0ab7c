//! Bearer credentials for API calls.
//!
//! The identity provider is an external collaborator. All the client needs
//! from it is "is someone signed in?" and "give me a currently valid token
//! or fail".

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, PoisonError, RwLock};
use vidashield_cache::{FetchError, FetchResult, SessionState};

/// Source of bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Whether a credential is available without a network round trip.
    fn is_authenticated(&self) -> bool;

    /// A token valid for the next request, or [`FetchError::Unauthenticated`].
    async fn access_token(&self) -> FetchResult<SecretString>;
}

/// In-memory session holding the current bearer token.
#[derive(Debug, Default)]
pub struct SessionStore {
    token: RwLock<Option<SecretString>>,
}

impl SessionStore {
    /// A signed-out session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.sign_in(token);
        store
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        let token = SecretString::from(token.into());
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        tracing::info!("Session signed in");
    }

    pub fn sign_out(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!("Session signed out");
    }
}

#[async_trait]
impl TokenProvider for SessionStore {
    fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn access_token(&self) -> FetchResult<SecretString> {
        let guard = self.token.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(token) => Ok(SecretString::from(token.expose_secret().to_owned())),
            None => Err(FetchError::unauthenticated("no bearer token in session")),
        }
    }
}

/// Lets any [`TokenProvider`] gate a [`RequestCache`](vidashield_cache::RequestCache).
pub struct ProviderSession(pub Arc<dyn TokenProvider>);

impl SessionState for ProviderSession {
    fn is_authenticated(&self) -> bool {
        self.0.is_authenticated()
    }
}
