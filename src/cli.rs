//! Command-line interface definitions and argument parsing

use std::path::PathBuf;

use clap::Parser;

use crate::config::{PipelineConfig, SmallPopulationPolicy};

/// Customer segmentation and product recommendation CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the transaction file (.csv or .parquet)
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// Number of customer segments
    #[arg(short = 'k', long, default_value = "4")]
    pub clusters: usize,

    /// Seed for K-Means initialisation
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Maximum iterations for a K-Means run
    #[arg(long, default_value = "300")]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Number of K-Means restarts
    #[arg(long, default_value = "10")]
    pub runs: usize,

    /// Number of products in each segment ranking
    #[arg(long, default_value = "10")]
    pub top_n: usize,

    /// Segment to recommend products for; all occupied segments when omitted
    #[arg(short, long)]
    pub segment: Option<usize>,

    /// Fail instead of leaving segments empty when there are fewer distinct customers than segments
    #[arg(long)]
    pub strict_clusters: bool,

    /// Output path for the segment scatter plot
    #[arg(short, long, default_value = "segments.png")]
    pub output: String,

    /// Skip chart rendering
    #[arg(long)]
    pub no_plots: bool,

    /// Directory for CSV exports of the customer table and rankings
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Pipeline configuration described by these arguments
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            n_segments: self.clusters,
            seed: self.seed,
            max_iterations: self.max_iters,
            tolerance: self.tolerance,
            n_runs: self.runs,
            top_n: self.top_n,
            small_population: if self.strict_clusters {
                SmallPopulationPolicy::Reject
            } else {
                SmallPopulationPolicy::Degrade
            },
        }
    }

    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
