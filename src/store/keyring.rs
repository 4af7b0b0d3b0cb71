use async_trait::async_trait;
use keyring::Entry;

use super::{StoreError, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

/// Service name registered with the OS keychain
const SERVICE_NAME: &str = "authkeeper";

/// Token store backed by the OS keychain via the `keyring` crate.
///
/// Keyring calls are blocking (they may talk to a system service), so
/// every operation is moved onto the blocking thread pool.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a custom service name, e.g. to keep test entries apart from
    /// real ones.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(String) -> Result<T, StoreError> + Send + 'static,
    {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || op(service))
            .await
            .map_err(|e| StoreError::Backend(format!("blocking task failed: {e}")))?
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn backend_err(e: keyring::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl TokenStore for KeyringTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.run_blocking(move |service| {
            let entry = Entry::new(&service, &key).map_err(backend_err)?;
            match entry.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(backend_err(e)),
            }
        })
        .await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.run_blocking(move |service| {
            let entry = Entry::new(&service, &key).map_err(backend_err)?;
            entry.set_password(&value).map_err(backend_err)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.run_blocking(move |service| {
            let entry = Entry::new(&service, &key).map_err(backend_err)?;
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(backend_err(e)),
            }
        })
        .await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.remove(ACCESS_TOKEN_KEY).await?;
        self.remove(REFRESH_TOKEN_KEY).await
    }
}
