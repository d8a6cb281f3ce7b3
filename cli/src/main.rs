use std::path::PathBuf;

use clap::{Parser, Subcommand};

use geopin_assistant::mcp::McpCommands;

mod commands;
mod util;

use commands::chat::ChatArgs;
use commands::markers::MarkersCommands;
use commands::view::ViewCommands;

#[derive(Parser)]
#[command(name = "geopin", version, about = "geopin: map markers, geocoding and an assistant that edits them")]
struct Cli {
    /// Directory holding map-store.json and chat-store.json
    /// (defaults to GEOPIN_DATA_DIR, then the platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Marker operations
    Markers {
        #[command(subcommand)]
        command: MarkersCommands,
    },
    /// Map view: center, zoom, selection
    View {
        #[command(subcommand)]
        command: ViewCommands,
    },
    /// Import locations from a JSON file ('-' for stdin)
    Import { file: String },
    /// Export all markers as JSON (stdout when no file is given)
    Export { file: Option<String> },
    /// Look up a place with the geocoder
    Geocode {
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 5)]
        limit: u8,
    },
    /// Talk to the assistant; tool calls act on the local map
    Chat(ChatArgs),
    /// Replay tool calls returned by the HTTP API into the local map
    Apply {
        /// Chat response or toolsUsed array ('-' for stdin)
        file: String,
    },
    /// Print the tool catalog offered to the model
    Tools,
    /// MCP server over stdio
    Mcp {
        #[command(subcommand)]
        command: McpCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays machine-readable JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let data_dir = cli.data_dir;

    let code = match cli.command {
        Commands::Markers { command } => commands::markers::run(data_dir, command),
        Commands::View { command } => commands::view::run(data_dir, command),
        Commands::Import { file } => commands::transfer::import(data_dir, &file),
        Commands::Export { file } => commands::transfer::export(data_dir, file.as_deref()),
        Commands::Geocode { query, limit } => commands::geocode::run(&query, limit).await,
        Commands::Chat(args) => commands::chat::run(data_dir, args).await,
        Commands::Apply { file } => commands::apply::run(data_dir, &file),
        Commands::Tools => commands::tools::run(),
        Commands::Mcp { command } => {
            let command = match command {
                McpCommands::Serve(mut args) => {
                    args.data_dir = args.data_dir.or(data_dir);
                    McpCommands::Serve(args)
                }
            };
            geopin_assistant::mcp::run(command).await
        }
    };

    std::process::exit(code);
}
