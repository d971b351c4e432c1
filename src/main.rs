//! `spiped-rs` entry point: parses the CLI, loads the shared secret,
//! spawns the printout drain, and runs the listener to completion.
//! Grounded on the teacher's `main.rs`, which does the same sequence
//! (parse args, set up logging/printing, hand off to the long-running
//! subsystem loops) on top of the Tokio multi-threaded runtime.

use clap::Parser;

use spiped_rs::config::Cli;
use spiped_rs::secret::SharedSecret;
use spiped_rs::{listener, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config()?;

    let (print_tx, print_rx) = logging::channel();
    let printer = tokio::spawn(logging::run_printer(print_rx, config.verbosity));

    let result = run(config, print_tx).await;

    // `printer` exits once every `PrintSender` clone has been dropped;
    // `run` already dropped its own, so awaiting here just drains the
    // remaining buffered lines before the process exits.
    let _ = printer.await;

    result
}

async fn run(
    config: spiped_rs::config::Config,
    print_tx: logging::PrintSender,
) -> anyhow::Result<()> {
    let secret = SharedSecret::load(&config.keyfile).await?;

    let listener_config = listener::ListenerConfig {
        source: config.source,
        targets: vec![config.target],
        decr: config.decr,
        nopfs: config.nopfs,
        requirepfs: config.requirepfs,
        nokeepalive: config.nokeepalive,
        secret,
        timeout: config.timeout,
        print_tx,
    };

    listener::run(listener_config).await
}
