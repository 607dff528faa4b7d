//! Pantiler CLI - Command-line interface
//!
//! Builds a vector-tile dataset from a tilefile:
//!
//! ```text
//! pantiler <tilefile> <directory> [--clear-cache] [--bounds minLon,minLat,maxLon,maxLat]
//! ```

mod error;
mod logging;
mod reporter;
mod tilefile;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pantiler::cache::DEFAULT_CACHE_DIR;
use pantiler::{ClipBounds, Pipeline, PipelineConfig, ToolConfig};
use tracing::info;

use crate::error::CliError;
use crate::reporter::TerminalReporter;

/// Build servable vector tiles, a style document, glyphs and sprites from a tilefile
#[derive(Parser, Debug)]
#[command(name = "pantiler", version, about, long_about = None)]
struct Args {
    /// Tilefile describing the dataset (YAML or JSON)
    tilefile: PathBuf,

    /// Output directory; must not exist yet
    directory: PathBuf,

    /// Remove the cache after completing
    #[arg(short = 'c', long)]
    clear_cache: bool,

    /// A set of coordinates to clip the data with as minLong,minLat,maxLong,maxLat (using WGS84)
    #[arg(short = 'b', long, allow_hyphen_values = true)]
    bounds: Option<ClipBounds>,

    /// Cache directory, reused between runs
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    cache: PathBuf,

    /// Tippecanoe executable
    #[arg(long, value_name = "PATH")]
    tippecanoe: Option<PathBuf>,

    /// ogr2ogr executable
    #[arg(long, value_name = "PATH")]
    ogr2ogr: Option<PathBuf>,

    /// Give up on downloads after this many seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Log debug output from the pipeline
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> PipelineConfig {
        let mut tippecanoe = ToolConfig::tippecanoe();
        if let Some(program) = &self.tippecanoe {
            tippecanoe = tippecanoe.with_program(program);
        }
        let mut ogr2ogr = ToolConfig::ogr2ogr();
        if let Some(program) = &self.ogr2ogr {
            ogr2ogr = ogr2ogr.with_program(program);
        }

        let mut config = PipelineConfig::new(&self.directory)
            .with_cache(&self.cache)
            .with_clear_cache(self.clear_cache)
            .with_bounds(self.bounds)
            .with_tippecanoe(tippecanoe)
            .with_ogr2ogr(ogr2ogr);
        if let Some(seconds) = self.timeout {
            config = config.with_http_timeout(Duration::from_secs(seconds));
        }
        config
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let document = tilefile::load(&args.tilefile)?;
    let reporter = Arc::new(TerminalReporter::new());
    let pipeline = Pipeline::new(args.config(), reporter.clone())?;

    let result = pipeline.run(&document).await;
    reporter.finish();
    let summary = result?;

    info!(
        style = %summary.style.display(),
        layers = summary.layers,
        glyph_files = summary.glyph_files,
        sprite_sheets = summary.sprite_sheets,
        fetched = ?summary.fetched,
        extracted = ?summary.extracted,
        converted = ?summary.converted,
        "Build finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _guard = match logging::init(args.verbose, args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e.render());
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.render());
            ExitCode::FAILURE
        }
    }
}
