use {
    byte_unit::Byte,
    clap::{Parser, Subcommand},
    std::path::PathBuf,
    url::Url,
};

#[derive(Debug, Parser)]
#[clap(name = "blockhaus", version, about = "Encrypted deduplicating directory mirror")]
pub struct Cli {
    /// Block size used for chunking and content addressing.
    #[clap(long, global = true)]
    pub chunk_size: Option<Byte>,
    /// Upload buffer flush threshold (defaults to 20 chunks).
    #[clap(long, global = true)]
    pub upload_threshold: Option<Byte>,
    /// Read cache capacity used when restoring.
    #[clap(long, global = true)]
    pub cache_capacity: Option<Byte>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Mirror a local directory into the remote tree, re-running until no
    /// more changes are found.
    Sync {
        server: Url,
        access_token: String,
        local_dir: PathBuf,
        /// Encryption passphrase; prompted for when omitted.
        key: Option<String>,
    },
    /// Download the remote tree into an empty local directory.
    Restore {
        server: Url,
        access_token: String,
        target_dir: PathBuf,
        /// Encryption passphrase; prompted for when omitted.
        key: Option<String>,
    },
    /// List the remote tree.
    Ls {
        server: Url,
        access_token: String,
        /// Encryption passphrase; prompted for when omitted.
        key: Option<String>,
    },
}
