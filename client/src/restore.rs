//! Materializes the remote tree into a local directory.

use {
    crate::{cache::BlockCache, config::Config, encryption::Cipher, remote::RemoteTree},
    anyhow::{bail, Result},
    blockhaus_protocol::{Node, Provider},
    filetime::FileTime,
    fs_err as fs,
    std::{
        io::Write,
        path::{Path, PathBuf},
    },
    tracing::info,
};

/// Downloads the whole remote tree into `target`, which must be empty or
/// absent. Blocks are fetched through the read cache, so a block shared by
/// several files is downloaded once.
pub async fn restore(
    provider: &impl Provider,
    cipher: &Cipher,
    config: &Config,
    target: &Path,
) -> Result<()> {
    let remote = RemoteTree::fetch(provider, cipher).await?;
    if target.exists() && fs::read_dir(target)?.next().is_some() {
        bail!("target directory {:?} is not empty", target);
    }
    fs::create_dir_all(target)?;

    let mut cache = BlockCache::new(config.cache_capacity);
    let mut dir_mtimes: Vec<(PathBuf, FileTime)> = Vec::new();
    // BTreeMap iteration gives parents before children.
    for (path, node) in &remote.tree {
        let local_path = crate::scan::to_local_path(target, path);
        let mtime = FileTime::from_system_time(node.mtime().into());
        match node {
            Node::Directory { .. } => {
                info!("restoring directory {path}");
                fs::create_dir_all(&local_path)?;
                dir_mtimes.push((local_path.clone(), mtime));
            }
            Node::File { .. } => {
                info!("restoring file {path}");
                if let Some(parent) = local_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut file = fs::File::create(&local_path)?;
                for hash in node.block_hashes().unwrap_or_default() {
                    let block = cache.get(provider, cipher, hash).await?;
                    file.write_all(&block)?;
                }
                drop(file);
                filetime::set_file_mtime(&local_path, mtime)?;
            }
        }
        apply_mode(&local_path, node.mode())?;
    }
    // Writing children bumps a directory's mtime, so directories get
    // theirs applied afterwards, depth first.
    for (local_path, mtime) in dir_mtimes.into_iter().rev() {
        filetime::set_file_mtime(&local_path, mtime)?;
    }
    info!("restored {} items into {:?}", remote.tree.len(), target);
    Ok(())
}

#[cfg(target_family = "unix")]
fn apply_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::fs::Permissions;
    use std::os::unix::prelude::PermissionsExt;

    // Mode 0 means the scanning side had no mode to record.
    if mode == 0 {
        return Ok(());
    }
    fs::set_permissions(path, Permissions::from_mode(mode))
}

#[cfg(not(target_family = "unix"))]
fn apply_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
