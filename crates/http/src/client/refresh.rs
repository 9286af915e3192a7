//! Shared silent sign-in for requests that fail together
//!
//! When several requests hit a 401 at about the same time, only the first to
//! take the gate calls [`IdentitySession::sign_in_silently`]. The others see
//! that the generation moved past the one they observed and reuse the
//! recorded outcome. Reading the generation never waits on a refresh in
//! progress, so requests that are not unauthorized are never held up.

use portal_core::{IdentityError, IdentitySession};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Serializes silent sign-ins across clones of one client
#[derive(Debug, Default)]
pub struct RefreshGate {
    generation: AtomicU64,
    last: Mutex<Option<Result<(), IdentityError>>>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current refresh generation; capture it before sending a request
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Refresh the session unless someone already did since `observed`
    ///
    /// # Errors
    ///
    /// Returns the silent sign-in failure, either this caller's own or the
    /// one recorded by the refresh it joined
    pub async fn refresh(
        &self,
        identity: &dyn IdentitySession,
        observed: u64,
    ) -> Result<(), IdentityError> {
        let mut last = self.last.lock().await;

        let current = self.generation();
        if current != observed {
            if let Some(outcome) = last.as_ref() {
                debug!(
                    observed,
                    current,
                    "Reusing silent sign-in completed by a concurrent request"
                );
                return outcome.clone();
            }
        }

        let outcome = identity.sign_in_silently().await;
        // Outcome is recorded before the generation moves
        *last = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::Release);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portal_core::identity::mock::MockIdentitySession;

    #[tokio::test]
    async fn test_first_refresh_calls_provider() {
        let mut identity = MockIdentitySession::new();
        identity.expect_sign_in_silently().times(1).returning(|| Ok(()));

        let gate = RefreshGate::new();
        let observed = gate.generation();
        gate.refresh(&identity, observed).await.unwrap();
        assert_eq!(gate.generation(), observed + 1);
    }

    #[tokio::test]
    async fn test_stale_observer_reuses_outcome() {
        let mut identity = MockIdentitySession::new();
        identity
            .expect_sign_in_silently()
            .times(1)
            .returning(|| Err(IdentityError::SilentSignInFailed("idp down".into())));

        let gate = RefreshGate::new();
        let observed = gate.generation();

        let first = gate.refresh(&identity, observed).await;
        let second = gate.refresh(&identity, observed).await;

        assert!(first.is_err());
        assert_eq!(first, second);
        assert_eq!(gate.generation(), 1);
    }

    #[tokio::test]
    async fn test_current_observer_refreshes_again() {
        let mut identity = MockIdentitySession::new();
        identity.expect_sign_in_silently().times(2).returning(|| Ok(()));

        let gate = RefreshGate::new();
        gate.refresh(&identity, 0).await.unwrap();
        gate.refresh(&identity, 1).await.unwrap();
        assert_eq!(gate.generation(), 2);
    }
}
