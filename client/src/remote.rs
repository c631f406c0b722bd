//! Local mirror of the remote tree.
//!
//! The remote listing is fully decrypted into the same `Tree` shape the
//! scanner produces, so the diff engine never sees ciphertext. A malformed
//! item aborts the whole fetch: diffing against a partially reconstructed
//! remote view could wrongly delete remote entries.

use {
    crate::{encryption::Cipher, error::SyncError},
    anyhow::{bail, Context, Result},
    blockhaus_protocol::{BlockHash, Node, Provider, Tree, TreeItem, TreePath},
    std::collections::{BTreeMap, BTreeSet, HashSet},
};

pub struct RemoteTree {
    pub tree: Tree,
    /// Every block hash referenced anywhere in the remote tree. Used to
    /// short-circuit existence checks during upload.
    pub all_block_hashes: HashSet<BlockHash>,
}

impl RemoteTree {
    pub async fn fetch(provider: &impl Provider, cipher: &Cipher) -> Result<Self> {
        let items = provider.get_tree().await?;
        let mut tree = Tree::new();
        let mut all_block_hashes = HashSet::new();
        for item in items {
            let (path, node) = decode_item(cipher, &item)
                .map_err(|err| SyncError::Protocol(format!("{err:#}")))?;
            all_block_hashes.extend(node.block_hashes().unwrap_or_default().iter().copied());
            tree.insert(path, node);
        }
        Ok(Self {
            tree,
            all_block_hashes,
        })
    }

    /// One bulk existence query; returns the subset of `hashes` that the
    /// store confirms present.
    pub async fn check_hashes(
        provider: &impl Provider,
        hashes: &[BlockHash],
    ) -> Result<HashSet<BlockHash>> {
        if hashes.is_empty() {
            return Ok(HashSet::new());
        }
        let flags = provider.bulk_head_block(hashes).await?;
        if flags.len() != hashes.len() {
            return Err(SyncError::Protocol(format!(
                "existence check returned {} flags for {} hashes",
                flags.len(),
                hashes.len()
            ))
            .into());
        }
        Ok(hashes
            .iter()
            .zip(flags)
            .filter(|(_, exists)| *exists)
            .map(|(hash, _)| *hash)
            .collect())
    }

    /// Issues the single atomic mutation that makes the remote tree match
    /// the local one. `Ok(false)` means the store rejected the mutation;
    /// nothing was applied and the caller decides what to do.
    pub async fn commit(
        &self,
        provider: &impl Provider,
        cipher: &Cipher,
        add: &BTreeMap<TreePath, Node>,
        remove: &BTreeSet<TreePath>,
    ) -> Result<bool> {
        let mut delete_paths = Vec::with_capacity(remove.len());
        for path in remove {
            let node = self
                .tree
                .get(path)
                .with_context(|| format!("unknown remote path in remove set: {path}"))?;
            delete_paths.push(cipher.encrypt_tree_path(path, node.is_dir())?);
        }
        let mut put_items = Vec::with_capacity(add.len());
        for (path, node) in add {
            put_items.push(encode_item(cipher, path, node)?);
        }
        provider.post_tree(put_items, delete_paths).await
    }
}

fn decode_item(cipher: &Cipher, item: &TreeItem) -> Result<(TreePath, Node)> {
    let (path, is_dir) = cipher.decrypt_tree_path(&item.path)?;
    if is_dir != item.is_dir {
        bail!("kind marker mismatch for {path}");
    }
    let meta = cipher.decrypt_meta(&item.meta)?;
    let node = Node::from_wire(is_dir, meta, item.blocks.clone())?;
    Ok((path, node))
}

pub(crate) fn encode_item(cipher: &Cipher, path: &TreePath, node: &Node) -> Result<TreeItem> {
    let blocks = if node.is_dir() {
        Vec::new()
    } else {
        node.block_hashes()
            .with_context(|| format!("no block hashes computed for {path}"))?
            .to_vec()
    };
    Ok(TreeItem {
        path: cipher.encrypt_tree_path(path, node.is_dir())?,
        meta: cipher.encrypt_meta(&node.meta())?,
        blocks,
        is_dir: node.is_dir(),
    })
}
