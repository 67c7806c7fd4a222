use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hemograph::cli::commands;

#[derive(Parser)]
#[command(name = "hemograph")]
#[command(
  about = "Hemograph - chromatograph peak analysis\nPeak fingerprinting and hybrid similarity ranking for hemoglobin chromatographs"
)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
  /// Optional JSON config file
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Analyze one chromatograph image into a peak feature record
  Analyze {
    /// Image file (PNG or JPEG)
    image: PathBuf,
    /// Emit the record as JSON
    #[arg(short, long)]
    json: bool,
  },
  /// Compare two chromatograph images clinically
  Compare {
    /// First image
    first: PathBuf,
    /// Second image
    second: PathBuf,
  },
  /// Rank manifest candidates against a query image
  Rank {
    /// Query image
    query: PathBuf,
    /// JSON manifest of candidates with embedding similarities
    manifest: PathBuf,
    /// Number of results to return
    #[arg(short = 'k', long, default_value = "10")]
    top_k: usize,
    /// Screen top candidates through the remote vision judge
    #[arg(long)]
    screen: bool,
    /// Directory holding main-database candidate images
    #[arg(long, default_value = "data/cropped_images_main")]
    main_dir: PathBuf,
    /// Directory holding reference candidate images
    #[arg(long, default_value = "data/cropped_images_reference")]
    reference_dir: PathBuf,
    /// Emit the ranking as JSON
    #[arg(short, long)]
    json: bool,
  },
}

async fn handle(cli: Cli) -> Result<()> {
  let config = cli.config.as_deref();
  match cli.command {
    Command::Analyze { image, json } => commands::analyze(&image, config, json).await,
    Command::Compare { first, second } => commands::compare(&first, &second, config).await,
    Command::Rank { query, manifest, top_k, screen, main_dir, reference_dir, json } => {
      commands::rank(&query, &manifest, top_k, screen, &main_dir, &reference_dir, config, json)
        .await
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  handle(cli).await?;
  Ok(())
}
