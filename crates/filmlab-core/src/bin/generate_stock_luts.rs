//! filmlab-stock-luts - write the bundled film-stock HaldCLUTs as PNG files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use filmlab_core::StockFilm;
use filmlab_core::lut::hald::{DEFAULT_LEVEL, HaldLut};
use tracing::info;

#[derive(Parser)]
#[command(name = "filmlab-stock-luts")]
#[command(about = "Generate the built-in film stock HaldCLUT PNGs")]
struct Cli {
    /// Output directory (created if missing)
    #[arg(default_value = "luts/stocks")]
    out_dir: PathBuf,

    /// HaldCLUT level (8 gives 512x512 images)
    #[arg(short, long, default_value_t = DEFAULT_LEVEL)]
    level: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let side = HaldLut::side_for_level(cli.level)?;

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("Failed to create {}", cli.out_dir.display()))?;

    for stock in StockFilm::ALL {
        let path = cli.out_dir.join(stock.file_name());
        stock
            .generate(cli.level)?
            .to_image()
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(stock = stock.label(), path = %path.display(), side, "generated stock LUT");
    }
    Ok(())
}
