//! Shared vocabulary of the blockhaus client and its remote block store.
//!
//! The remote side stores two things: a flat namespace of content-addressed
//! blocks, and a single tree of encrypted path/metadata items. Everything the
//! server sees is ciphertext; a [`BlockHash`] is the digest of a block's
//! *encrypted* bytes, so existence checks never require decryption.

pub mod encoding;
pub mod endpoints;
mod path;
mod provider;

pub use crate::path::TreePath;
pub use crate::provider::Provider;

use anyhow::{bail, Result};
use base64::{prelude::BASE64_URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::collections::BTreeMap;
use std::fmt;

pub type DateTimeUtc = chrono::DateTime<Utc>;

/// One snapshot of a directory tree: relative path to entry.
///
/// The scan root itself is implicit and never present as a key.
pub type Tree = BTreeMap<TreePath, Node>;

pub const BLOCK_HASH_LEN: usize = 32;

/// Content address of a block: SHA3-256 of its encrypted bytes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub [u8; BLOCK_HASH_LEN]);

impl BlockHash {
    pub fn compute(encrypted_block: &[u8]) -> Self {
        Self(Sha3_256::digest(encrypted_block).into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Canonical lowercase hex form, used in URLs and logs.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        let array: [u8; BLOCK_HASH_LEN] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| anyhow::anyhow!("invalid hash length: {}", bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.to_hex())
    }
}

/// Ciphertext of a tree path. Directory paths carry a trailing `/` in
/// plaintext, so the server can distinguish kinds without decrypting.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptedPath(pub Vec<u8>);

impl EncryptedPath {
    pub fn to_url_safe(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(&self.0)
    }
}

impl fmt::Debug for EncryptedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedPath({})", self.to_url_safe())
    }
}

/// Ciphertext of a serialized [`NodeMeta`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedMeta(pub Vec<u8>);

impl fmt::Debug for EncryptedMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedMeta({})", BASE64_URL_SAFE_NO_PAD.encode(&self.0))
    }
}

/// One item of the remote tree, as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub path: EncryptedPath,
    pub meta: EncryptedMeta,
    pub blocks: Vec<BlockHash>,
    pub is_dir: bool,
}

/// Plaintext per-entry metadata, serialized to JSON before encryption.
/// `size` is present for files only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub mode: u32,
    pub mtime: DateTimeUtc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// In-memory record for one path of a tree.
///
/// `block_hashes` stays `None` until the file is actually chunked and
/// hashed; hashing is deferred to upload time so unchanged files are never
/// re-read.
#[derive(Debug, Clone)]
pub enum Node {
    Directory {
        mode: u32,
        mtime: DateTimeUtc,
    },
    File {
        mode: u32,
        mtime: DateTimeUtc,
        size: u64,
        block_hashes: Option<Vec<BlockHash>>,
    },
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }

    pub fn mode(&self) -> u32 {
        match self {
            Node::Directory { mode, .. } | Node::File { mode, .. } => *mode,
        }
    }

    pub fn mtime(&self) -> DateTimeUtc {
        match self {
            Node::Directory { mtime, .. } | Node::File { mtime, .. } => *mtime,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            Node::Directory { .. } => None,
            Node::File { size, .. } => Some(*size),
        }
    }

    pub fn block_hashes(&self) -> Option<&[BlockHash]> {
        match self {
            Node::Directory { .. } => None,
            Node::File { block_hashes, .. } => block_hashes.as_deref(),
        }
    }

    pub fn set_block_hashes(&mut self, hashes: Vec<BlockHash>) {
        if let Node::File { block_hashes, .. } = self {
            *block_hashes = Some(hashes);
        }
    }

    pub fn meta(&self) -> NodeMeta {
        NodeMeta {
            mode: self.mode(),
            mtime: self.mtime(),
            size: self.size(),
        }
    }

    /// Reconstructs a node from decrypted wire data.
    pub fn from_wire(is_dir: bool, meta: NodeMeta, blocks: Vec<BlockHash>) -> Result<Self> {
        if is_dir {
            if meta.size.is_some() || !blocks.is_empty() {
                bail!("directory item carries file content");
            }
            Ok(Node::Directory {
                mode: meta.mode,
                mtime: meta.mtime,
            })
        } else {
            let Some(size) = meta.size else {
                bail!("file item is missing size");
            };
            Ok(Node::File {
                mode: meta.mode,
                mtime: meta.mtime,
                size,
                block_hashes: Some(blocks),
            })
        }
    }
}

/// Metadata-only comparison: two files that differ only in a not-yet-computed
/// `block_hashes` (or `size`) compare equal, so unchanged files are detected
/// without re-hashing. A file whose content changed while `size` and `mtime`
/// stayed identical is therefore never detected; this is a known limitation.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Node::Directory { mode, mtime },
                Node::Directory {
                    mode: other_mode,
                    mtime: other_mtime,
                },
            ) => mode == other_mode && mtime == other_mtime,
            (
                Node::File {
                    mode,
                    mtime,
                    size,
                    block_hashes,
                },
                Node::File {
                    mode: other_mode,
                    mtime: other_mtime,
                    size: other_size,
                    block_hashes: other_hashes,
                },
            ) => {
                mode == other_mode
                    && mtime == other_mtime
                    && size == other_size
                    && match (block_hashes, other_hashes) {
                        (Some(a), Some(b)) => a == b,
                        _ => true,
                    }
            }
            _ => false,
        }
    }
}
