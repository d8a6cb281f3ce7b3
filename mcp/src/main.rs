use clap::Parser;

use geopin_assistant::mcp::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "geopin-mcp",
    version,
    about = "geopin MCP server: map tools over stdio, acting on the local map store"
)]
struct Cli {
    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = run_mcp(cli.command).await;
    std::process::exit(code);
}
