//! The put/get surface of the DHT, and the two stores behind it.
//!
//! [`SwarmHandle`] answers from the Kademlia swarm. [`MemoryDht`] keeps
//! records in process memory and is shared by cloning, which lets several
//! directory clients in one process see the same records.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use peerbook_shared::{DirectoryError, DirectoryKey};

use crate::swarm::SwarmHandle;

/// Key/value primitives of a distributed hash table.
#[async_trait]
pub trait Dht: Send + Sync {
    /// Store `value` under `key`, replacing whatever was there.
    async fn put(&self, key: DirectoryKey, value: Vec<u8>) -> Result<(), DirectoryError>;

    /// Fetch the value under `key`. `Ok(None)` means nothing is stored.
    async fn get(&self, key: DirectoryKey) -> Result<Option<Vec<u8>>, DirectoryError>;
}

#[async_trait]
impl Dht for SwarmHandle {
    async fn put(&self, key: DirectoryKey, value: Vec<u8>) -> Result<(), DirectoryError> {
        self.put_record(key, value).await
    }

    async fn get(&self, key: DirectoryKey) -> Result<Option<Vec<u8>>, DirectoryError> {
        self.get_record(key).await
    }
}

#[async_trait]
impl<D: Dht + ?Sized> Dht for Arc<D> {
    async fn put(&self, key: DirectoryKey, value: Vec<u8>) -> Result<(), DirectoryError> {
        (**self).put(key, value).await
    }

    async fn get(&self, key: DirectoryKey) -> Result<Option<Vec<u8>>, DirectoryError> {
        (**self).get(key).await
    }
}

/// In-process DHT. Clones share the same records.
#[derive(Debug, Clone)]
pub struct MemoryDht {
    records: Arc<Mutex<HashMap<DirectoryKey, Vec<u8>>>>,
    available: Arc<AtomicBool>,
}

impl MemoryDht {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate the store becoming unreachable (`false`) or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Drop the record under `key`, as an expiry would.
    pub fn expire(&self, key: &DirectoryKey) -> bool {
        self.records
            .lock()
            .map(|mut records| records.remove(key).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DirectoryError::Unavailable(
                "in-memory DHT marked unavailable".to_string(),
            ))
        }
    }
}

impl Default for MemoryDht {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Dht for MemoryDht {
    async fn put(&self, key: DirectoryKey, value: Vec<u8>) -> Result<(), DirectoryError> {
        self.check_available()?;
        let mut records = self
            .records
            .lock()
            .map_err(|e| DirectoryError::Unavailable(format!("Lock poisoned: {e}")))?;
        debug!(key = %key.short(), len = value.len(), "Memory DHT put");
        records.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: DirectoryKey) -> Result<Option<Vec<u8>>, DirectoryError> {
        self.check_available()?;
        let records = self
            .records
            .lock()
            .map_err(|e| DirectoryError::Unavailable(format!("Lock poisoned: {e}")))?;
        Ok(records.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_dht_last_writer_wins() {
        let dht = MemoryDht::new();
        let key = DirectoryKey::for_username("alice");

        dht.put(key, b"first".to_vec()).await.unwrap();
        dht.put(key, b"second".to_vec()).await.unwrap();

        assert_eq!(dht.get(key).await.unwrap(), Some(b"second".to_vec()));
        assert_eq!(dht.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_dht_clones_share_records() {
        let a = MemoryDht::new();
        let b = a.clone();
        let key = DirectoryKey::for_username("bob");

        a.put(key, vec![1, 2, 3]).await.unwrap();
        assert_eq!(b.get(key).await.unwrap(), Some(vec![1, 2, 3]));

        assert!(b.expire(&key));
        assert_eq!(a.get(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_dht_unavailable() {
        let dht = MemoryDht::new();
        let key = DirectoryKey::for_username("carol");
        dht.set_available(false);

        assert!(matches!(
            dht.put(key, vec![]).await,
            Err(DirectoryError::Unavailable(_))
        ));
        assert!(matches!(dht.get(key).await, Err(DirectoryError::Unavailable(_))));

        dht.set_available(true);
        assert_eq!(dht.get(key).await.unwrap(), None);
    }
}
