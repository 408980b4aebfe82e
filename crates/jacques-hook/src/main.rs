//! jacques-hook: the CLI invoked directly by the assistant's lifecycle
//! hooks. Translates one hook invocation into a WS producer event and
//! forwards it to the WS Hub (spec §4.8); never blocks the assistant for
//! more than a connect-and-send round trip.

mod daemon_client;
mod handle;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jacques-hook")]
#[command(about = "jacques session-state hook handler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one hook event, read as JSON from stdin.
    Handle,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Handle => handle::run().await,
    };

    if let Err(err) = result {
        tracing::warn!(error = %err, "jacques-hook failed");
        std::process::exit(1);
    }
}
