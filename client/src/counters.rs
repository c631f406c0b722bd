use std::sync::atomic::{AtomicU64, Ordering};

use crate::info::pretty_size;
use tracing::info;

#[derive(Debug, Default)]
pub struct Counters {
    pub scanned_entries: AtomicU64,
    pub hashed_files: AtomicU64,
    pub uploaded_blocks: AtomicU64,
    pub uploaded_bytes: AtomicU64,
    pub reused_blocks: AtomicU64,
    pub skipped_paths: AtomicU64,
}

impl Counters {
    pub fn report(&self) {
        let scanned_entries = self.scanned_entries.load(Ordering::Relaxed);
        let hashed_files = self.hashed_files.load(Ordering::Relaxed);
        let uploaded_blocks = self.uploaded_blocks.load(Ordering::Relaxed);
        let uploaded_bytes = self.uploaded_bytes.load(Ordering::Relaxed);
        let reused_blocks = self.reused_blocks.load(Ordering::Relaxed);
        let skipped_paths = self.skipped_paths.load(Ordering::Relaxed);
        info!("scanned {} entries", scanned_entries);
        if hashed_files > 0 {
            info!("hashed {} files", hashed_files);
        }
        if uploaded_blocks > 0 {
            info!(
                "uploaded {} blocks ({})",
                uploaded_blocks,
                pretty_size(uploaded_bytes)
            );
        }
        if reused_blocks > 0 {
            info!("{} blocks deduplicated", reused_blocks);
        }
        if skipped_paths > 0 {
            info!("skipped {} paths", skipped_paths);
        }
    }
}
