//! Command-line driver: scan a folder, compute the matrix, write CSV.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use similarity_kernel::{loader, matrix, Image, MatrixConfig, Metric};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MetricArg {
    Ssim,
    SsimUniform,
    MeanAbsDiff,
}

impl From<MetricArg> for Metric {
    fn from(m: MetricArg) -> Self {
        match m {
            MetricArg::Ssim => Metric::Ssim,
            MetricArg::SsimUniform => Metric::SsimUniform,
            MetricArg::MeanAbsDiff => Metric::MeanAbsDiff,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "simmatrix")]
#[command(about = "Pairwise SSIM similarity matrix with resumable per-row checkpoints")]
struct Args {
    /// Folder containing .jpg/.jpeg/.png/.bmp images.
    image_dir: PathBuf,

    /// Output CSV path.
    output: PathBuf,

    /// JSON config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Checkpoint directory.
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Similarity metric.
    #[arg(short, long, value_enum)]
    metric: Option<MetricArg>,

    /// Compute rows one at a time.
    #[arg(long)]
    sequential: bool,

    /// Worker threads for parallel rows.
    #[arg(short, long)]
    threads: Option<usize>,

    /// Delete existing checkpoints before starting.
    #[arg(long)]
    fresh: bool,

    /// Verbose output.
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set subscriber")?;
    Ok(())
}

fn build_config(args: &Args) -> Result<MatrixConfig> {
    let mut config = match &args.config {
        Some(path) => MatrixConfig::from_file(path)?,
        None => MatrixConfig::default(),
    };
    if let Some(dir) = &args.checkpoint_dir {
        config = config.with_checkpoint_dir(dir);
    }
    if let Some(metric) = args.metric {
        config = config.with_metric(metric.into());
    }
    if args.sequential {
        config = config.with_parallel(false);
    }
    if args.threads.is_some() {
        config = config.with_threads(args.threads);
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;
    let config = build_config(&args)?;
    let store = config.store();

    if args.fresh {
        let removed = store.clear()?;
        info!(removed, dir = %store.dir().display(), "cleared checkpoints");
    }

    let loaded = loader::load_dir(&args.image_dir)
        .with_context(|| format!("loading images from {}", args.image_dir.display()))?;
    let images: Vec<Image> = loaded.into_iter().map(|(_, img)| img).collect();
    info!(count = images.len(), metric = %config.metric, "calculating similarity matrix");

    let rows = match config.threads {
        Some(n) if config.parallel => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .context("failed to build thread pool")?;
            pool.install(|| matrix::compute_rows(&images, &config.metric, &store, true))?
        }
        _ => matrix::compute_rows(&images, &config.metric, &store, config.parallel)?,
    };
    let similarity = matrix::assemble(images.len(), &rows)?;

    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    matrix::write_csv(&similarity, BufWriter::new(file))?;
    info!(path = %args.output.display(), "similarity matrix saved");
    Ok(())
}
