

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;

mod commands;
mod config;
mod logging;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "ibd")]
#[command(propagate_version = true)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Incrementally archive one-minute bars for the configured universe
  Fetch(commands::fetch::FetchCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
  // Load environment variables
  dotenv().ok();

  // Parse CLI arguments
  let cli = Cli::parse();

  let exit_code = match cli.command {
    Commands::Fetch(cmd) => match commands::fetch::execute(cmd).await {
      Ok(code) => code,
      Err(e) => {
        eprintln!("Error: {e:#}");
        1
      }
    },
  };

  std::process::exit(exit_code);
}
