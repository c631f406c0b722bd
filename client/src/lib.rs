pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod counters;
pub mod diff;
pub mod encryption;
pub mod error;
pub mod info;
pub mod remote;
pub mod restore;
pub mod scan;
pub mod sync;
pub mod upload;

use {
    crate::{
        cli::{Cli, Command},
        client::Client,
        config::Config,
        counters::Counters,
        encryption::Cipher,
        error::SyncError,
    },
    anyhow::Result,
    byte_unit::Byte,
    derivative::Derivative,
    tracing::warn,
    url::Url,
};

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Ctx {
    pub config: Config,
    #[derivative(Debug = "ignore")]
    pub client: Client,
    #[derivative(Debug = "ignore")]
    pub cipher: Cipher,
    pub counters: Counters,
}

impl Ctx {
    fn new(
        server: Url,
        access_token: String,
        key: Option<String>,
        sizes: (Option<Byte>, Option<Byte>, Option<Byte>),
    ) -> Result<Self> {
        let (chunk_size, upload_threshold, cache_capacity) = sizes;
        let config = Config::new(
            server,
            access_token,
            chunk_size,
            upload_threshold,
            cache_capacity,
        )?;
        let cipher = Cipher::new(&resolve_passphrase(key)?);
        let client = Client::new(config.server_url.clone(), config.access_token.clone())?;
        Ok(Self {
            config,
            client,
            cipher,
            counters: Counters::default(),
        })
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let Cli {
        chunk_size,
        upload_threshold,
        cache_capacity,
        command,
    } = cli;
    let sizes = (chunk_size, upload_threshold, cache_capacity);
    match command {
        Command::Sync {
            server,
            access_token,
            local_dir,
            key,
        } => {
            let ctx = Ctx::new(server, access_token, key, sizes)?;
            let local_dir = fs_err::canonicalize(local_dir)?;
            // Changes landing while a pass runs are picked up by the next
            // pass; stop once a pass finds nothing to do.
            loop {
                let changed = sync::sync(
                    &ctx.client,
                    &ctx.cipher,
                    &ctx.config,
                    &ctx.counters,
                    &local_dir,
                )
                .await?;
                if !changed {
                    break;
                }
            }
            ctx.counters.report();
        }
        Command::Restore {
            server,
            access_token,
            target_dir,
            key,
        } => {
            let ctx = Ctx::new(server, access_token, key, sizes)?;
            restore::restore(&ctx.client, &ctx.cipher, &ctx.config, &target_dir).await?;
        }
        Command::Ls {
            server,
            access_token,
            key,
        } => {
            let ctx = Ctx::new(server, access_token, key, sizes)?;
            info::ls(&ctx.client, &ctx.cipher).await?;
        }
    }
    Ok(())
}

fn resolve_passphrase(key: Option<String>) -> Result<String> {
    if let Some(key) = key {
        return Ok(key);
    }
    let first = rpassword::prompt_password("Encryption passphrase (empty for no encryption): ")?;
    let second = rpassword::prompt_password("Repeat passphrase: ")?;
    if first != second {
        return Err(SyncError::Config("passphrases do not match".into()).into());
    }
    if first.is_empty() {
        warn!("no passphrase given, data will be stored unencrypted");
    }
    Ok(first)
}
