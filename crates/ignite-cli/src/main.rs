//! `ignite` command-line entry point.

mod args;
mod commands;

use std::path::Path;

use clap::Parser as _;

use crate::args::{Cli, Command};

/// Loads `.env` from the crate directory, then from the working directory.
fn load_env() {
    let _ = dotenvy::from_path(Path::new(
        format!("{}/.env", env!("CARGO_MANIFEST_DIR")).as_str(),
    ));
    dotenvy::dotenv().ok();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    load_env();
    ignite_stream::init_observability();

    let cli = Cli::parse();
    let output = match cli.command {
        Command::Replay {
            input,
            config,
            chunk_size,
            format,
        } => commands::replay(input.as_deref(), config.as_deref(), chunk_size, format).await?,
        Command::Render { input, chunk_size } => commands::render(input.as_deref(), chunk_size).await?,
    };
    println!("{output}");
    Ok(())
}
