use clap::{Parser, Subcommand};

mod client;
mod config;
mod downloader;
mod jobs;
mod logging;
mod server;

use client::FetchArgs;
use config::{ServeArgs, ServerConfig};

#[derive(Parser)]
#[command(name = "mediafetch")]
#[command(about = "Web front-end that downloads video and audio through yt-dlp")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Ask a running server to download a URL and wait for the result
    Fetch(FetchArgs),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(args)) => {
            let config = ServerConfig::from(args);
            logging::init_logging(config.debug);
            server::startup(config).await?;
        }
        Some(Commands::Fetch(args)) => {
            logging::init_logging(false);
            client::fetch(args).await?;
        }
        None => {
            println!("Use --help for available commands");
        }
    }

    Ok(())
}
