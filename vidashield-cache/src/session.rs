//! Credential availability seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Answers "is a credential available right now?".
///
/// Checked before every request; a `false` answer fails the request
/// without running its loader.
pub trait SessionState: Send + Sync {
    fn is_authenticated(&self) -> bool;
}

/// Shared login flag. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct SessionFlag {
    authenticated: Arc<AtomicBool>,
}

impl SessionFlag {
    pub fn signed_in() -> Self {
        Self {
            authenticated: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn sign_in(&self) {
        self.authenticated.store(true, Ordering::SeqCst);
    }

    pub fn sign_out(&self) {
        self.authenticated.store(false, Ordering::SeqCst);
    }
}

impl SessionState for SessionFlag {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }
}
