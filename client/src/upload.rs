//! Buffered, deduplicating block upload.
//!
//! Blocks are held in memory until the buffer reaches its byte threshold,
//! then flushed as one existence check plus one bulk upload. A block whose
//! hash is already pending, or already known to exist remotely, is dropped
//! immediately without ever being stored twice. The extra existence check
//! per flush trades one round trip for never uploading a block the store
//! already has.

use {
    crate::{counters::Counters, encryption::Cipher, info::pretty_size, remote::RemoteTree},
    anyhow::Result,
    blockhaus_protocol::{BlockHash, Provider},
    std::{
        collections::{HashMap, HashSet},
        sync::atomic::Ordering,
    },
    tracing::info,
};

pub struct UploadBuffer<'a, P: Provider> {
    provider: &'a P,
    cipher: &'a Cipher,
    /// The mirror's global hash set. Flushed hashes are merged into it, so
    /// later files in the same run dedup against earlier ones for free.
    remote_hashes: &'a mut HashSet<BlockHash>,
    pending: HashMap<BlockHash, Vec<u8>>,
    pending_bytes: u64,
    threshold: u64,
    counters: &'a Counters,
}

impl<'a, P: Provider> UploadBuffer<'a, P> {
    pub fn new(
        provider: &'a P,
        cipher: &'a Cipher,
        remote_hashes: &'a mut HashSet<BlockHash>,
        threshold: u64,
        counters: &'a Counters,
    ) -> Self {
        Self {
            provider,
            cipher,
            remote_hashes,
            pending: HashMap::new(),
            pending_bytes: 0,
            threshold,
            counters,
        }
    }

    /// Encrypts and hashes one plaintext block, queueing it for upload
    /// unless an identical block is already pending or already remote.
    pub async fn put_block(&mut self, plaintext: &[u8]) -> Result<BlockHash> {
        let encrypted = self.cipher.encrypt(plaintext)?;
        let hash = BlockHash::compute(&encrypted);
        if self.remote_hashes.contains(&hash) || self.pending.contains_key(&hash) {
            self.counters.reused_blocks.fetch_add(1, Ordering::Relaxed);
            return Ok(hash);
        }
        self.pending_bytes += encrypted.len() as u64;
        self.pending.insert(hash, encrypted);
        if self.pending_bytes >= self.threshold {
            self.upload_all().await?;
        }
        Ok(hash)
    }

    /// Flushes the buffer: one bulk existence check, then one bulk upload
    /// of whatever the store does not have yet.
    pub async fn upload_all(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let hashes: Vec<BlockHash> = self.pending.keys().copied().collect();
        self.remote_hashes.extend(hashes.iter().copied());
        let existing = RemoteTree::check_hashes(self.provider, &hashes).await?;

        let mut blocks = Vec::new();
        let mut upload_bytes: u64 = 0;
        for (hash, block) in self.pending.drain() {
            if existing.contains(&hash) {
                self.counters.reused_blocks.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            upload_bytes += block.len() as u64;
            blocks.push(block);
        }
        self.pending_bytes = 0;
        if blocks.is_empty() {
            return Ok(());
        }
        info!(
            "uploading {} blocks ({})",
            blocks.len(),
            pretty_size(upload_bytes)
        );
        let count = blocks.len() as u64;
        self.provider.bulk_post_block(blocks).await?;
        self.counters
            .uploaded_blocks
            .fetch_add(count, Ordering::Relaxed);
        self.counters
            .uploaded_bytes
            .fetch_add(upload_bytes, Ordering::Relaxed);
        Ok(())
    }
}
