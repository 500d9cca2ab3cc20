#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod logging;
mod repl;

use args::Args;
use clap::Parser;
use colloquy_client::{ChatClient, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init(&args.log_filter, args.log_format);

    let config = ClientConfig::load(&args.config)?;
    let client = ChatClient::new(config)?;

    tracing::info!(
        config_path = %args.config.display(),
        stream = args.stream,
        "starting colloquy"
    );

    repl::run(&client, &args).await?;

    tracing::info!("colloquy stopped");
    Ok(())
}
