use {
    anyhow::Result,
    blockhaus::cli::Cli,
    clap::Parser,
    tracing::metadata::LevelFilter,
    tracing_subscriber::{prelude::*, EnvFilter},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()?,
        )
        .init();
    blockhaus::run(Cli::parse()).await
}
