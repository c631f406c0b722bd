//! The sync driver: one full pass from remote fetch to reconciliation.
//!
//! Phases run strictly in sequence. Local per-path failures exclude the
//! path from the run; transport and protocol failures abort the run before
//! the tree mutation, so an interrupted run leaves the remote tree exactly
//! as it was. Stray uploaded blocks are harmless: they are content
//! addressed and the next run reuses them.

use {
    crate::{
        config::Config,
        counters::Counters,
        diff::{diff, TreeDiff},
        encryption::Cipher,
        error::SyncError,
        remote::RemoteTree,
        scan::{self, ChunkReader},
        upload::UploadBuffer,
    },
    anyhow::{bail, Result},
    blockhaus_protocol::{Node, Provider, TreePath},
    std::{
        collections::{BTreeMap, BTreeSet},
        fmt,
        path::Path,
        sync::atomic::Ordering,
    },
    tracing::{info, warn},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    FetchingRemote,
    ScanningLocal,
    Diffing,
    Uploading,
    Reconciling,
    Done,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::FetchingRemote => "fetching remote tree",
            SyncPhase::ScanningLocal => "scanning local tree",
            SyncPhase::Diffing => "calculating changes",
            SyncPhase::Uploading => "uploading blocks",
            SyncPhase::Reconciling => "updating remote tree",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        };
        write!(f, "{text}")
    }
}

struct SyncRun {
    phase: SyncPhase,
}

impl SyncRun {
    fn enter(&mut self, phase: SyncPhase) {
        self.phase = phase;
        info!("{phase}");
    }
}

/// Runs one sync pass. Returns `true` if the remote tree was changed, so
/// callers can re-run until the trees are stable.
pub async fn sync(
    provider: &impl Provider,
    cipher: &Cipher,
    config: &Config,
    counters: &Counters,
    local_root: &Path,
) -> Result<bool> {
    let mut run = SyncRun {
        phase: SyncPhase::Idle,
    };
    match execute(&mut run, provider, cipher, config, counters, local_root).await {
        Ok(changed) => Ok(changed),
        Err(err) => {
            warn!("sync failed while {}", run.phase);
            run.phase = SyncPhase::Failed;
            Err(err)
        }
    }
}

async fn execute(
    run: &mut SyncRun,
    provider: &impl Provider,
    cipher: &Cipher,
    config: &Config,
    counters: &Counters,
    local_root: &Path,
) -> Result<bool> {
    run.enter(SyncPhase::FetchingRemote);
    let mut remote = RemoteTree::fetch(provider, cipher).await?;
    info!("{} items in remote tree", remote.tree.len());

    run.enter(SyncPhase::ScanningLocal);
    let local = scan::scan(local_root, counters);
    info!("{} items in local tree", local.len());

    run.enter(SyncPhase::Diffing);
    let TreeDiff { remove, add } = diff(&remote.tree, &local);
    info!(
        "{} items to remove, {} items to upload",
        remove.len(),
        add.len()
    );
    if remove.is_empty() && add.is_empty() {
        run.enter(SyncPhase::Done);
        return Ok(false);
    }

    run.enter(SyncPhase::Uploading);
    let mut failed = BTreeSet::new();
    let mut confirmed: BTreeMap<TreePath, Node> = BTreeMap::new();
    {
        let mut buffer = UploadBuffer::new(
            provider,
            cipher,
            &mut remote.all_block_hashes,
            config.upload_threshold,
            counters,
        );
        for path in &add {
            let node = &local[path];
            if node.is_dir() {
                confirmed.insert(path.clone(), node.clone());
                continue;
            }
            match upload_file(&mut buffer, config, local_root, path, node).await? {
                Some(node) => {
                    counters.hashed_files.fetch_add(1, Ordering::Relaxed);
                    confirmed.insert(path.clone(), node);
                }
                None => {
                    counters.skipped_paths.fetch_add(1, Ordering::Relaxed);
                    failed.insert(path.clone());
                }
            }
        }
        buffer.upload_all().await?;
    }

    run.enter(SyncPhase::Reconciling);
    // A path that errored locally is excluded from this run entirely; the
    // next run sees it again.
    let remove: BTreeSet<TreePath> = remove.difference(&failed).cloned().collect();
    if confirmed.is_empty() && remove.is_empty() {
        run.enter(SyncPhase::Done);
        return Ok(false);
    }
    if !remote.commit(provider, cipher, &confirmed, &remove).await? {
        bail!("remote tree mutation was not applied");
    }
    if !failed.is_empty() {
        warn!("{} paths were skipped and remain unsynced", failed.len());
    }
    run.enter(SyncPhase::Done);
    Ok(true)
}

/// Hashes one file through the upload buffer. `Ok(None)` means the file was
/// excluded from this run (changed under our feet or unreadable); transport
/// failures propagate and abort the run.
async fn upload_file<P: Provider>(
    buffer: &mut UploadBuffer<'_, P>,
    config: &Config,
    root: &Path,
    path: &TreePath,
    node: &Node,
) -> Result<Option<Node>> {
    let refreshed = match scan::refresh_entry(root, path) {
        Ok(refreshed) => refreshed,
        Err(err) => {
            warn!("{err}");
            return Ok(None);
        }
    };
    if &refreshed != node {
        warn!(
            "{}",
            SyncError::ChangedDuringSync {
                path: scan::to_local_path(root, path),
            }
        );
        return Ok(None);
    }

    info!("uploading {path}");
    let mut reader = match ChunkReader::open(root, path, config.chunk_size) {
        Ok(reader) => reader,
        Err(err) => {
            warn!("{err}");
            return Ok(None);
        }
    };
    let mut hashes = Vec::new();
    loop {
        match reader.next_chunk() {
            Ok(Some(chunk)) => hashes.push(buffer.put_block(&chunk).await?),
            Ok(None) => break,
            Err(err) => {
                warn!("{err}");
                return Ok(None);
            }
        }
    }
    let mut node = node.clone();
    node.set_block_hashes(hashes);
    Ok(Some(node))
}
