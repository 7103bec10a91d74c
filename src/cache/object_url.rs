//! Local object URLs for in-memory payloads.
//!
//! A payload registered here gets a `blob:tunecache/<token>` URL that the
//! audio output can be pointed at. URLs stay valid until revoked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Scheme prefix of every URL minted by the registry.
pub const OBJECT_URL_PREFIX: &str = "blob:tunecache/";

/// Registry mapping object URLs to payloads.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    payloads: Arc<Mutex<HashMap<String, Arc<Vec<u8>>>>>,
}

impl ObjectUrlRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `payload` and returns its new URL.
    pub fn create(&self, payload: Vec<u8>) -> String {
        let url = format!("{}{:032x}", OBJECT_URL_PREFIX, rand::random::<u128>());
        self.lock().insert(url.clone(), Arc::new(payload));
        url
    }

    /// Returns the payload behind `url` without revoking it.
    pub fn resolve(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        self.lock().get(url).cloned()
    }

    /// Revokes `url` and returns its payload.
    pub fn take(&self, url: &str) -> Option<Vec<u8>> {
        let payload = self.lock().remove(url)?;
        Some(Arc::try_unwrap(payload).unwrap_or_else(|shared| shared.as_ref().clone()))
    }

    /// Revokes `url`. Returns true if it was registered.
    pub fn revoke(&self, url: &str) -> bool {
        self.lock().remove(url).is_some()
    }

    /// Returns the number of live URLs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no URL is live.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Vec<u8>>>> {
        self.payloads.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Returns true if `url` was minted by an [`ObjectUrlRegistry`].
pub fn is_object_url(url: &str) -> bool {
    url.starts_with(OBJECT_URL_PREFIX)
}
