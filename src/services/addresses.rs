//! Saved shipping addresses.

use std::sync::Arc;
use tracing::{info, instrument};
use crate::domain::aggregates::{Address, UserSession};
use crate::services::{account_path, retry_on_conflict};
use crate::store::{read_array, Collection, DocumentStore, RetryPolicy, WriteBatch};
use crate::Result;

#[derive(Clone)]
pub struct AddressBook {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl AddressBook {
    pub fn new(store: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self { Self { store, retry } }

    #[instrument(skip(self, session), fields(email = %session.email))]
    pub async fn fetch(&self, session: &UserSession) -> Result<Vec<Address>> {
        Ok(read_array::<Address>(self.store.as_ref(), &account_path(session, Collection::ShippingAddresses)).await?.0)
    }

    /// Validates `address` and appends it. Saved addresses are never edited or removed.
    #[instrument(skip(self, session, address), fields(email = %session.email))]
    pub async fn save(&self, session: &UserSession, address: &Address) -> Result<Vec<Address>> {
        address.check()?;
        let path = &account_path(session, Collection::ShippingAddresses);
        let saved = retry_on_conflict(&self.retry, "addresses.save", move || async move {
            let (mut addresses, version) = read_array::<Address>(self.store.as_ref(), path).await?;
            addresses.push(address.clone());
            self.store.commit(WriteBatch::new().put_array(path.clone(), &addresses, version)?).await?;
            Ok(addresses)
        })
        .await?;
        info!(count = saved.len(), "address saved");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::address::tests::valid_address;
    use crate::domain::aggregates::AddressError;
    use crate::store::MemoryStore;
    use crate::StorefrontError;

    fn session() -> UserSession {
        UserSession { id: "uid-1".into(), name: None, email: "shopper@example.com".into(), image: None, is_authenticated: true }
    }

    #[tokio::test]
    async fn saves_append_under_the_addresses_field() {
        let store = Arc::new(MemoryStore::new());
        let book = AddressBook::new(store.clone(), RetryPolicy::default());
        assert!(book.fetch(&session()).await.unwrap().is_empty());

        book.save(&session(), &valid_address()).await.unwrap();
        let second = Address { city: "Mysuru".into(), ..valid_address() };
        let saved = book.save(&session(), &second).await.unwrap();

        assert_eq!(saved.len(), 2);
        assert_eq!(book.fetch(&session()).await.unwrap(), saved);
        let doc = store.get(&account_path(&session(), Collection::ShippingAddresses)).await.unwrap().unwrap();
        assert_eq!(doc.data["Addresses"][1]["city"], "Mysuru");
    }

    #[tokio::test]
    async fn invalid_address_is_not_written() {
        let store = Arc::new(MemoryStore::new());
        let book = AddressBook::new(store.clone(), RetryPolicy::default());
        let bad = Address { mobile: "12345".into(), ..valid_address() };

        let err = book.save(&session(), &bad).await.unwrap_err();

        let StorefrontError::Address(AddressError::Invalid(fields)) = err else { panic!("expected validation error") };
        assert_eq!(fields["mobile"], "Please enter a valid phone number");
        assert!(store.is_empty().await);
    }
}
