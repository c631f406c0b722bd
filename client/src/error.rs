use blockhaus_protocol::BlockHash;
use std::path::PathBuf;
use thiserror::Error;

/// Failure classes the sync engine tells apart.
///
/// `Io` and `ChangedDuringSync` affect a single path: the path is excluded
/// from the current run and reported, nothing else is touched. The other
/// classes abort the run before the remote tree is reconciled.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("I/O failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?} changed while the sync was running")]
    ChangedDuringSync { path: PathBuf },
    #[error("malformed remote data: {0}")]
    Protocol(String),
    #[error("integrity check failed for block {hash}")]
    Integrity { hash: BlockHash },
    #[error("{0}")]
    Config(String),
}
