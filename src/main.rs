//! SegmentForge: customer segmentation and product recommendations
//!
//! This is the main entrypoint that orchestrates data loading, segmentation,
//! recommendation, visualization and export.

use anyhow::{bail, Context, Result};
use clap::Parser;
use segmentforge::{export, viz, Args, SegmentationPipeline};
use std::path::Path;
use std::time::Instant;

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.default_log_filter()),
    )
    .init();

    run_pipeline(&args)
}

/// Run the full segmentation pipeline
fn run_pipeline(args: &Args) -> Result<()> {
    println!("=== Customer Segmentation Pipeline ===\n");

    let start_time = Instant::now();
    let pipeline = SegmentationPipeline::new(args.pipeline_config())
        .context("Invalid pipeline configuration")?;

    // Step 1: Load and clean transactions
    let data_start = Instant::now();
    let transactions = pipeline
        .load(&args.input)
        .with_context(|| format!("Failed to load transactions from {}", args.input))?;

    println!(
        "✓ Data loaded: {} valid transactions ({} removed)",
        transactions.len(),
        transactions.dropped_rows()
    );
    if args.verbose {
        println!("  Processing time: {:.2}s", data_start.elapsed().as_secs_f64());
        println!("{}", transactions.head(5));
    }

    // Step 2: Features, segmentation and projection
    let model_start = Instant::now();
    let segments = pipeline
        .segment(&transactions)
        .context("Customer segmentation failed")?;

    println!(
        "✓ {} customers segmented into {} segments",
        segments.customer_count(),
        pipeline.config().n_segments
    );
    if args.verbose {
        println!("  Fitting time: {:.2}s", model_start.elapsed().as_secs_f64());
        println!("{}", segments.customer_table()?.head(Some(5)));
    }

    // Step 3: Recommendations
    let selected: Vec<usize> = match args.segment {
        Some(segment) if segment >= pipeline.config().n_segments => bail!(
            "Segment {} does not exist, valid segments are 0..{}",
            segment,
            pipeline.config().n_segments
        ),
        Some(segment) => vec![segment],
        None => segments.segment_ids(),
    };

    let mut rankings = Vec::with_capacity(selected.len());
    for segment in selected {
        let ranking = pipeline.recommend(&transactions, &segments, segment)?;
        viz::print_rankings(segment, &ranking);
        rankings.push((segment, ranking));
    }

    // Step 4: Charts and statistics
    if args.no_plots {
        viz::print_segment_statistics(&segments);
    } else {
        let charts = viz::generate_visualization_report(&segments, &rankings, &args.output)
            .context("Failed to render charts")?;
        println!();
        for chart in &charts {
            println!("✓ Chart saved to: {}", chart.display());
        }
    }

    // Step 5: Exports
    if let Some(dir) = &args.export_dir {
        let dir: &Path = dir.as_path();
        let customers = export::export_customer_table(&segments, dir)?;
        println!("Customer table saved to: {}", customers.display());
        for (segment, ranking) in &rankings {
            let path = export::export_rankings(*segment, ranking, dir)?;
            println!("Segment {} ranking saved to: {}", segment, path.display());
        }
    }

    println!("\n=== Pipeline Complete ===");
    println!(
        "Total processing time: {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
