use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use rdt_sender::{Cli, Sender};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = cli
        .resolve()
        .and_then(Sender::new)
        .and_then(|mut sender| sender.run());

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
