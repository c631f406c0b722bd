use {
    crate::{BlockHash, EncryptedPath, TreeItem},
    anyhow::Result,
    async_trait::async_trait,
};

/// The remote block store, as seen by the sync engine.
///
/// Implementations are expected to be idempotent for block uploads
/// (re-posting an existing hash is a no-op) and atomic for `post_tree`:
/// concurrent readers never observe a half-applied tree mutation.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Full remote tree listing.
    async fn get_tree(&self) -> Result<Vec<TreeItem>>;

    /// One existence flag per input hash, in input order.
    async fn bulk_head_block(&self, hashes: &[BlockHash]) -> Result<Vec<bool>>;

    /// Uploads a batch of encrypted blocks.
    async fn bulk_post_block(&self, blocks: Vec<Vec<u8>>) -> Result<()>;

    /// Fetches one block's encrypted bytes.
    async fn get_block(&self, hash: &BlockHash) -> Result<Vec<u8>>;

    /// Atomic tree mutation. `Ok(false)` means the store rejected the
    /// mutation without applying any of it.
    async fn post_tree(
        &self,
        put_items: Vec<TreeItem>,
        delete_paths: Vec<EncryptedPath>,
    ) -> Result<bool>;
}
