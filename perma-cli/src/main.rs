use std::time::Duration;

use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod logging;

use crate::commands::Cli;

fn main() -> Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-runtime")
        .worker_threads(2)
        .enable_all()
        .build()?;
    rt.block_on(main_impl())?;
    // give the runtime some time to finish, but do not wait indefinitely.
    rt.shutdown_timeout(Duration::from_millis(500));
    Ok(())
}

async fn main_impl() -> Result<()> {
    logging::init_terminal_logging()?;
    let cli = Cli::parse();
    cli.run().await
}
