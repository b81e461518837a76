//! Remote-backed services.
//!
//! Each service owns one concern of the account tree in the document store. Mutations are
//! read-modify-write cycles against a versioned snapshot; a lost version race is retried from
//! a fresh read according to the [`RetryPolicy`].

pub mod addresses;
pub mod cart_sync;
pub mod orders;
pub mod profile;

pub use addresses::AddressBook;
pub use cart_sync::CartSync;
pub use orders::{OrderBook, OrderSource, Placement};
pub use profile::Profile;

use std::future::Future;
use tracing::{error, warn};
use crate::domain::aggregates::UserSession;
use crate::store::{Collection, DocumentPath, RetryPolicy};
use crate::Result;

/// Path of one of the signed-in account's documents.
pub fn account_path(session: &UserSession, collection: Collection) -> DocumentPath {
    DocumentPath::new(session.email.as_str(), collection, session.id.as_str())
}

/// Runs `attempt` until it succeeds, fails with something other than a write conflict, or the
/// policy runs out of attempts.
pub(crate) async fn retry_on_conflict<T, F, Fut>(policy: &RetryPolicy, operation: &'static str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        match attempt().await {
            Err(e) if e.is_conflict() && tries < policy.attempts() => {
                warn!(operation, attempt = tries, error = %e, "write conflict, re-reading");
                tokio::time::sleep(policy.backoff(tries)).await;
            }
            Err(e) => {
                error!(operation, attempts = tries, error = %e, "remote write failed");
                return Err(e);
            }
            Ok(value) => return Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use crate::StorefrontError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick() -> RetryPolicy { RetryPolicy { max_attempts: 3, base_backoff_ms: 1 } }

    fn conflict() -> StorefrontError { StoreError::Conflict { path: "users/a/cart/b".into() }.into() }

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let value = retry_on_conflict(&quick(), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 { Err(conflict()) } else { Ok(7) }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let result: Result<()> = retry_on_conflict(&quick(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StorefrontError::NotAuthenticated)
        })
        .await;
        assert!(matches!(result, Err(StorefrontError::NotAuthenticated)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let result: Result<()> = retry_on_conflict(&quick(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
