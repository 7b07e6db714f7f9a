//! Presence directory on top of a [`Dht`].
//!
//! Usernames are hashed into the DHT key space with [`DirectoryKey`] and the
//! stored value is a bincode [`PresenceRecord`]. The client keeps no state of
//! its own.

use async_trait::async_trait;
use tracing::{debug, info};

use peerbook_shared::{DirectoryError, DirectoryKey, PresenceRecord, SessionError};

use crate::dht::Dht;

/// Publish-self / resolve-by-username gateway to the DHT.
#[derive(Debug, Clone)]
pub struct DirectoryClient<D> {
    dht: D,
}

impl<D: Dht> DirectoryClient<D> {
    pub fn new(dht: D) -> Self {
        Self { dht }
    }

    pub fn dht(&self) -> &D {
        &self.dht
    }

    /// Write `record` under the key of `username`. Last write wins.
    ///
    /// The record must name the same user it is published under, otherwise
    /// nobody could resolve it.
    pub async fn publish(
        &self,
        username: &str,
        record: &PresenceRecord,
    ) -> Result<(), DirectoryError> {
        if record.username != username {
            return Err(DirectoryError::InvalidRecord {
                username: username.to_string(),
                reason: format!("record names '{}'", record.username),
            });
        }

        let key = DirectoryKey::for_username(username);
        let value = record.to_bytes().map_err(|e| DirectoryError::InvalidRecord {
            username: username.to_string(),
            reason: e.to_string(),
        })?;

        self.dht.put(key, value).await?;
        info!(
            username = %username,
            key = %key.short(),
            address = %record.address,
            port = record.port,
            "Presence record published"
        );
        Ok(())
    }

    /// Read the record published for `username`.
    ///
    /// `NotFound` is expected right after a remote publish; the DHT is only
    /// eventually consistent.
    pub async fn resolve(&self, username: &str) -> Result<PresenceRecord, DirectoryError> {
        let key = DirectoryKey::for_username(username);
        let value = self
            .dht
            .get(key)
            .await?
            .ok_or_else(|| DirectoryError::NotFound(username.to_string()))?;

        let record =
            PresenceRecord::from_bytes(&value).map_err(|e| DirectoryError::InvalidRecord {
                username: username.to_string(),
                reason: e.to_string(),
            })?;

        if record.username != username {
            return Err(DirectoryError::InvalidRecord {
                username: username.to_string(),
                reason: format!("record names '{}'", record.username),
            });
        }

        debug!(username = %username, address = %record.address, port = record.port, "Resolved user");
        Ok(record)
    }
}

/// What the friend-request layer needs from a running node.
#[async_trait]
pub trait UserResolver: Send + Sync {
    /// Look up the presence record of `username`.
    async fn resolve_user(&self, username: &str) -> Result<PresenceRecord, SessionError>;

    /// The record this node last published, if it has published.
    fn local_record(&self) -> Option<PresenceRecord>;
}

/// A node whose directory is any [`Dht`] and whose own record is fixed at
/// construction. Used for in-process embedding over [`crate::MemoryDht`].
#[derive(Debug, Clone)]
pub struct LocalDirectory<D> {
    client: DirectoryClient<D>,
    record: PresenceRecord,
}

impl<D: Dht> LocalDirectory<D> {
    pub fn new(dht: D, record: PresenceRecord) -> Self {
        Self {
            client: DirectoryClient::new(dht),
            record,
        }
    }

    /// Publish the fixed record.
    pub async fn announce(&self) -> Result<(), DirectoryError> {
        self.client.publish(&self.record.username, &self.record).await
    }

    pub fn client(&self) -> &DirectoryClient<D> {
        &self.client
    }
}

#[async_trait]
impl<D: Dht> UserResolver for LocalDirectory<D> {
    async fn resolve_user(&self, username: &str) -> Result<PresenceRecord, SessionError> {
        Ok(self.client.resolve(username).await?)
    }

    fn local_record(&self) -> Option<PresenceRecord> {
        Some(self.record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::MemoryDht;

    #[tokio::test]
    async fn test_publish_resolve_roundtrip() {
        let client = DirectoryClient::new(MemoryDht::new());
        let record = PresenceRecord::new("alice", "192.168.1.5", 5001);

        client.publish("alice", &record).await.unwrap();
        let resolved = client.resolve("alice").await.unwrap();

        assert_eq!(resolved, record);
        assert_eq!(resolved.port, 5001);
    }

    #[tokio::test]
    async fn test_resolve_unpublished_is_not_found() {
        let client = DirectoryClient::new(MemoryDht::new());
        assert_eq!(
            client.resolve("nobody").await,
            Err(DirectoryError::NotFound("nobody".to_string()))
        );
    }

    #[tokio::test]
    async fn test_republish_overwrites() {
        let client = DirectoryClient::new(MemoryDht::new());
        client
            .publish("alice", &PresenceRecord::new("alice", "10.0.0.1", 5001))
            .await
            .unwrap();
        client
            .publish("alice", &PresenceRecord::new("alice", "10.0.0.9", 5002))
            .await
            .unwrap();

        let resolved = client.resolve("alice").await.unwrap();
        assert_eq!(resolved.address, "10.0.0.9");
        assert_eq!(resolved.port, 5002);
    }

    #[tokio::test]
    async fn test_same_username_collides() {
        // Two nodes choosing one username share a key; the later one wins.
        let dht = MemoryDht::new();
        let first = DirectoryClient::new(dht.clone());
        let second = DirectoryClient::new(dht);

        first
            .publish("sam", &PresenceRecord::new("sam", "10.0.0.1", 4001))
            .await
            .unwrap();
        second
            .publish("sam", &PresenceRecord::new("sam", "10.0.0.2", 4001))
            .await
            .unwrap();

        assert_eq!(first.resolve("sam").await.unwrap().address, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_publish_rejects_mismatched_record() {
        let client = DirectoryClient::new(MemoryDht::new());
        let result = client
            .publish("alice", &PresenceRecord::new("mallory", "10.0.0.1", 4001))
            .await;
        assert!(matches!(result, Err(DirectoryError::InvalidRecord { .. })));
        assert!(client.dht().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_garbage_is_invalid_record() {
        let dht = MemoryDht::new();
        dht.put(DirectoryKey::for_username("eve"), vec![0xde, 0xad])
            .await
            .unwrap();
        let client = DirectoryClient::new(dht);

        assert!(matches!(
            client.resolve("eve").await,
            Err(DirectoryError::InvalidRecord { .. })
        ));
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let dht = MemoryDht::new();
        dht.set_available(false);
        let client = DirectoryClient::new(dht);

        assert!(matches!(
            client.resolve("alice").await,
            Err(DirectoryError::Unavailable(_))
        ));
        assert!(matches!(
            client
                .publish("alice", &PresenceRecord::new("alice", "10.0.0.1", 4001))
                .await,
            Err(DirectoryError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_local_directory_resolver() {
        let dht = MemoryDht::new();
        let alice = LocalDirectory::new(dht.clone(), PresenceRecord::new("alice", "10.0.0.1", 5001));
        let bob = LocalDirectory::new(dht, PresenceRecord::new("bob", "10.0.0.2", 5002));

        alice.announce().await.unwrap();
        let found = bob.resolve_user("alice").await.unwrap();
        assert_eq!(found.port, 5001);

        assert!(matches!(
            alice.resolve_user("bob").await,
            Err(SessionError::Directory(DirectoryError::NotFound(_)))
        ));
        assert_eq!(bob.local_record().unwrap().username, "bob");
    }
}
