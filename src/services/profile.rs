//! Account profile document.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use crate::domain::aggregates::{Identity, ProfileDetails, UserSession};
use crate::services::account_path;
use crate::store::{Collection, DocumentStore, StoreError, WriteBatch};
use crate::Result;

#[derive(Clone)]
pub struct Profile {
    store: Arc<dyn DocumentStore>,
}

impl Profile {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self { Self { store } }

    /// Writes the `details` document on first sign-in. Returns whether it was created.
    #[instrument(skip(self, session, identity), fields(email = %session.email))]
    pub async fn ensure_details(&self, session: &UserSession, identity: &Identity, now: DateTime<Utc>) -> Result<bool> {
        let path = account_path(session, Collection::Details);
        if self.store.get(&path).await?.is_some() {
            return Ok(false);
        }
        let details = ProfileDetails::from_identity(identity, now);
        let data = serde_json::to_value(&details).map_err(|source| StoreError::Encode { path: path.to_string(), source })?;
        match self.store.commit(WriteBatch::new().put(path, data, 0)).await {
            Ok(()) => Ok(true),
            // Created by another sign-in in the meantime.
            Err(e) if e.is_conflict() => {
                debug!("profile details already created");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn identity() -> Identity {
        Identity {
            uid: "uid-1".into(),
            email: "shopper@example.com".into(),
            display_name: Some("Asha".into()),
            photo_url: None,
            phone_number: Some("9876543210".into()),
        }
    }

    #[tokio::test]
    async fn details_are_written_once() {
        let store = Arc::new(MemoryStore::new());
        let profile = Profile::new(store.clone());
        let session = UserSession::from_identity(&identity());
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert!(profile.ensure_details(&session, &identity(), first).await.unwrap());
        assert!(!profile.ensure_details(&session, &identity(), Utc::now()).await.unwrap());

        let doc = store.get(&account_path(&session, Collection::Details)).await.unwrap().unwrap();
        let details: ProfileDetails = serde_json::from_value(doc.data).unwrap();
        assert_eq!(details.created_on, first);
        assert_eq!(details.mobile.as_deref(), Some("9876543210"));
        assert_eq!(store.commit_count(), 1);
    }
}
