//! Local tree scanning and file chunking.
//!
//! The scan records metadata only; block hashes are filled in later, and only
//! for paths that are actually going to be uploaded. Per-path failures are
//! logged and the path is skipped, they never abort the whole scan.

use {
    crate::{counters::Counters, encryption::Cipher, error::SyncError},
    blockhaus_protocol::{BlockHash, DateTimeUtc, Node, Tree, TreePath},
    fs_err as fs,
    std::{
        io::{self, Read},
        path::{Path, PathBuf},
        sync::atomic::Ordering,
    },
    tracing::warn,
    walkdir::WalkDir,
};

/// Walks `root` (following directory symlinks) into a tree snapshot.
/// The root itself is omitted. Non-regular files are skipped with a warning.
pub fn scan(root: &Path, counters: &Counters) -> Tree {
    let mut tree = Tree::new();
    for entry in WalkDir::new(root).follow_links(true).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable path: {err}");
                counters.skipped_paths.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        let path = match tree_path(root, entry.path()) {
            Ok(path) => path,
            Err(err) => {
                warn!("skipping {:?}: {err}", entry.path());
                counters.skipped_paths.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };
        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            warn!("skipping non-regular file {:?}", entry.path());
            counters.skipped_paths.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        match entry
            .metadata()
            .map_err(walkdir_io_error)
            .and_then(|metadata| node_from_metadata(&metadata))
        {
            Ok(node) => {
                counters.scanned_entries.fetch_add(1, Ordering::Relaxed);
                tree.insert(path, node);
            }
            Err(err) => {
                warn!("skipping {:?}: {err}", entry.path());
                counters.skipped_paths.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    tree
}

/// Re-stats one path. Used right before hashing to detect files that
/// changed between the diff and the upload.
pub fn refresh_entry(root: &Path, path: &TreePath) -> Result<Node, SyncError> {
    let local_path = to_local_path(root, path);
    let metadata = fs::metadata(&local_path).map_err(|source| SyncError::Io {
        path: local_path.clone(),
        source,
    })?;
    node_from_metadata(&metadata).map_err(|source| SyncError::Io {
        path: local_path,
        source,
    })
}

/// Chunks, encrypts and hashes one file in a single forward read.
/// Block order is significant: it is the order the file is reassembled in.
pub fn compute_block_hashes(
    root: &Path,
    path: &TreePath,
    cipher: &Cipher,
    chunk_size: usize,
) -> anyhow::Result<Vec<BlockHash>> {
    let mut reader = ChunkReader::open(root, path, chunk_size)?;
    let mut hashes = Vec::new();
    while let Some(chunk) = reader.next_chunk()? {
        hashes.push(BlockHash::compute(&cipher.encrypt(&chunk)?));
    }
    Ok(hashes)
}

/// Reads a file forward in fixed-size chunks; only the final chunk may be
/// short. No seeking, ever.
pub struct ChunkReader {
    file: fs::File,
    path: PathBuf,
    chunk_size: usize,
}

impl ChunkReader {
    pub fn open(root: &Path, path: &TreePath, chunk_size: usize) -> Result<Self, SyncError> {
        let local_path = to_local_path(root, path);
        let file = fs::File::open(&local_path).map_err(|source| SyncError::Io {
            path: local_path.clone(),
            source,
        })?;
        Ok(Self {
            file,
            path: local_path,
            chunk_size,
        })
    }

    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, SyncError> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let len = self
                .file
                .read(&mut buf[filled..])
                .map_err(|source| SyncError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            if len == 0 {
                break;
            }
            filled += len;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}

pub fn to_local_path(root: &Path, path: &TreePath) -> PathBuf {
    let mut local_path = root.to_path_buf();
    for component in path.components() {
        local_path.push(component);
    }
    local_path
}

fn tree_path(root: &Path, full: &Path) -> anyhow::Result<TreePath> {
    let relative = full.strip_prefix(root)?;
    let Some(relative) = relative.to_str() else {
        anyhow::bail!("path is not valid unicode");
    };
    TreePath::new(&relative.replace('\\', "/"))
}

fn node_from_metadata(metadata: &std::fs::Metadata) -> io::Result<Node> {
    let mtime: DateTimeUtc = metadata.modified()?.into();
    let mode = unix_mode(metadata).unwrap_or(0);
    Ok(if metadata.is_dir() {
        Node::Directory { mode, mtime }
    } else {
        Node::File {
            mode,
            mtime,
            size: metadata.len(),
            block_hashes: None,
        }
    })
}

fn walkdir_io_error(err: walkdir::Error) -> io::Error {
    err.into_io_error()
        .unwrap_or_else(|| io::Error::other("walk loop"))
}

#[cfg(target_family = "unix")]
pub fn unix_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::prelude::PermissionsExt;

    Some(metadata.permissions().mode())
}

#[cfg(not(target_family = "unix"))]
pub fn unix_mode(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}
