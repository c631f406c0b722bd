//! Byte-bounded LRU cache of decrypted blocks, used by the read paths
//! (restore, and any filesystem or HTTP view built on top of the library).
//! The upload path never goes through it.

use {
    crate::{encryption::Cipher, error::SyncError},
    anyhow::Result,
    blockhaus_protocol::{BlockHash, Provider},
    bytes::Bytes,
    lru::LruCache,
    tracing::debug,
};

pub struct BlockCache {
    entries: LruCache<BlockHash, Bytes>,
    total_bytes: u64,
    capacity: u64,
}

impl BlockCache {
    /// `capacity` bounds the total cached bytes; the entry count is
    /// unbounded.
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            total_bytes: 0,
            capacity,
        }
    }

    /// Returns the decrypted block, fetching it from the store on a miss.
    /// The fetched ciphertext must hash back to `hash`; a mismatch means
    /// the store returned the wrong bytes and is never retried.
    pub async fn get(
        &mut self,
        provider: &impl Provider,
        cipher: &Cipher,
        hash: &BlockHash,
    ) -> Result<Bytes> {
        if let Some(block) = self.entries.get(hash) {
            return Ok(block.clone());
        }
        debug!("fetching block {hash}");
        let encrypted = provider.get_block(hash).await?;
        if BlockHash::compute(&encrypted) != *hash {
            return Err(SyncError::Integrity { hash: *hash }.into());
        }
        let block = Bytes::from(cipher.decrypt(&encrypted)?);
        self.total_bytes += block.len() as u64;
        self.entries.put(*hash, block.clone());
        while self.total_bytes > self.capacity {
            let Some((_, evicted)) = self.entries.pop_lru() else {
                break;
            };
            self.total_bytes -= evicted.len() as u64;
        }
        Ok(block)
    }

    pub fn cached_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Presence check that does not touch recency.
    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.entries.contains(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use blockhaus_protocol::{EncryptedPath, TreeItem};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubStore {
        blocks: Mutex<HashMap<BlockHash, Vec<u8>>>,
        fetches: AtomicU64,
    }

    impl StubStore {
        fn insert(&self, data: &[u8]) -> BlockHash {
            let hash = BlockHash::compute(data);
            self.blocks.lock().unwrap().insert(hash, data.to_vec());
            hash
        }

        fn insert_corrupted(&self, data: &[u8]) -> BlockHash {
            let hash = BlockHash::compute(b"something else entirely");
            self.blocks.lock().unwrap().insert(hash, data.to_vec());
            hash
        }
    }

    #[async_trait]
    impl Provider for StubStore {
        async fn get_tree(&self) -> Result<Vec<TreeItem>> {
            unimplemented!()
        }

        async fn bulk_head_block(&self, _hashes: &[BlockHash]) -> Result<Vec<bool>> {
            unimplemented!()
        }

        async fn bulk_post_block(&self, _blocks: Vec<Vec<u8>>) -> Result<()> {
            unimplemented!()
        }

        async fn get_block(&self, hash: &BlockHash) -> Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            self.blocks
                .lock()
                .unwrap()
                .get(hash)
                .cloned()
                .ok_or_else(|| anyhow!("no such block: {hash}"))
        }

        async fn post_tree(
            &self,
            _put_items: Vec<TreeItem>,
            _delete_paths: Vec<EncryptedPath>,
        ) -> Result<bool> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn evicts_least_recently_used_first() {
        let store = StubStore::default();
        let cipher = Cipher::new("");
        let a = store.insert(&[1u8; 40]);
        let b = store.insert(&[2u8; 40]);
        let c = store.insert(&[3u8; 40]);

        let mut cache = BlockCache::new(100);
        cache.get(&store, &cipher, &a).await.unwrap();
        cache.get(&store, &cipher, &b).await.unwrap();
        assert_eq!(cache.cached_bytes(), 80);

        // 120 bytes > 100: the oldest entry goes
        cache.get(&store, &cipher, &c).await.unwrap();
        assert_eq!(cache.cached_bytes(), 80);
        assert!(!cache.contains(&a));
        assert!(cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[tokio::test]
    async fn access_refreshes_recency() {
        let store = StubStore::default();
        let cipher = Cipher::new("");
        let a = store.insert(&[1u8; 40]);
        let b = store.insert(&[2u8; 40]);
        let c = store.insert(&[3u8; 40]);

        let mut cache = BlockCache::new(100);
        cache.get(&store, &cipher, &a).await.unwrap();
        cache.get(&store, &cipher, &b).await.unwrap();
        // touch `a` again: `b` becomes the eviction candidate
        cache.get(&store, &cipher, &a).await.unwrap();
        assert_eq!(store.fetches.load(Ordering::Relaxed), 2);

        cache.get(&store, &cipher, &c).await.unwrap();
        assert!(cache.contains(&a));
        assert!(!cache.contains(&b));
        assert!(cache.contains(&c));
    }

    #[tokio::test]
    async fn cached_blocks_are_not_refetched() {
        let store = StubStore::default();
        let cipher = Cipher::new("secret");
        let plaintext = b"block payload";
        let encrypted = cipher.encrypt(plaintext).unwrap();
        let hash = store.insert(&encrypted);

        let mut cache = BlockCache::new(1024);
        let first = cache.get(&store, &cipher, &hash).await.unwrap();
        assert_eq!(first.as_ref(), plaintext);
        let second = cache.get(&store, &cipher, &hash).await.unwrap();
        assert_eq!(second.as_ref(), plaintext);
        assert_eq!(store.fetches.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn hash_mismatch_is_fatal() {
        let store = StubStore::default();
        let cipher = Cipher::new("");
        let bad = store.insert_corrupted(b"wrong bytes");

        let mut cache = BlockCache::new(1024);
        let err = cache.get(&store, &cipher, &bad).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Integrity { .. })
        ));
        assert!(cache.is_empty());
    }
}
