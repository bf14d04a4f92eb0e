//! Visualization functions using Plotters for segment analysis

use std::path::{Path, PathBuf};

use plotters::prelude::*;

use crate::features::FEATURE_NAMES;
use crate::pipeline::CustomerSegments;
use crate::recommend::ProductRanking;

/// Color palette for segments, reused cyclically beyond its length
const SEGMENT_COLORS: [RGBColor; 8] = [
    RGBColor(102, 194, 165),
    RGBColor(252, 141, 98),
    RGBColor(141, 160, 203),
    RGBColor(231, 138, 195),
    RGBColor(166, 216, 84),
    RGBColor(255, 217, 47),
    RGBColor(229, 196, 148),
    RGBColor(179, 179, 179),
];

pub fn segment_color(segment: usize) -> RGBColor {
    SEGMENT_COLORS[segment % SEGMENT_COLORS.len()]
}

/// Bounds of `values` padded by `pad` on each side
pub fn padded_range(values: &[f64], pad: f64) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (-pad, pad);
    }
    (min - pad, max + pad)
}

/// Scatter plot of the 2D projection colored by segment
///
/// # Arguments
/// * `segments` - Segmented customers with projection coordinates
/// * `output_path` - Path to save the PNG plot
/// * `plot_title` - Title for the plot
pub fn create_segment_scatter(
    segments: &CustomerSegments,
    output_path: &str,
    plot_title: Option<&str>,
) -> anyhow::Result<()> {
    let title = plot_title.unwrap_or("Customer Segments (2D PCA projection)");

    let pca1 = segments.projection.pca1();
    let pca2 = segments.projection.pca2();
    let labels = segments.model.labels();

    let (x_min, x_max) = padded_range(&pca1, 0.5);
    let (y_min, y_max) = padded_range(&pca2, 0.5);

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("PCA1")
        .y_desc("PCA2")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for segment in 0..segments.model.n_segments() {
        let color = segment_color(segment);
        let points: Vec<(f64, f64)> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == segment)
            .map(|(i, _)| (pca1[i], pca2[i]))
            .collect();
        if points.is_empty() {
            continue;
        }

        chart
            .draw_series(
                points
                    .into_iter()
                    .map(|point| Circle::new(point, 4, color.filled())),
            )?
            .label(format!("Segment {}", segment))
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    log::info!("Segment scatter plot saved to: {}", output_path);

    Ok(())
}

/// Bar chart of customers per segment
pub fn create_segment_size_chart(sizes: &[usize], output_path: &str) -> anyhow::Result<()> {
    let max_size = *sizes.iter().max().unwrap_or(&1).max(&1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customers per Segment", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..(sizes.len() as f64 - 0.5), 0f64..(max_size * 1.1))?;

    chart
        .configure_mesh()
        .x_desc("Segment")
        .y_desc("Number of Customers")
        .x_labels(sizes.len().max(1))
        .x_label_formatter(&|x| format!("{:.0}", x))
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (segment, &size) in sizes.iter().enumerate() {
        chart.draw_series(std::iter::once(Rectangle::new(
            [
                (segment as f64 - 0.4, 0.0),
                (segment as f64 + 0.4, size as f64),
            ],
            segment_color(segment).filled(),
        )))?;
    }

    root.present()?;
    log::info!("Segment size chart saved to: {}", output_path);

    Ok(())
}

/// Bar chart of the top products of one segment
pub fn create_top_products_chart(
    segment: usize,
    rankings: &[ProductRanking],
    output_path: &str,
) -> anyhow::Result<()> {
    let max_quantity = rankings
        .iter()
        .map(|r| r.total_quantity)
        .max()
        .unwrap_or(1)
        .max(1) as f64;
    let descriptions: Vec<String> = rankings.iter().map(|r| truncate_label(&r.description)).collect();

    let root = BitMapBackend::new(output_path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Top {} Products in Segment {}", rankings.len(), segment),
            ("sans-serif", 26),
        )
        .margin(10)
        .x_label_area_size(120)
        .y_label_area_size(60)
        .build_cartesian_2d(
            -0.5f64..(rankings.len().max(1) as f64 - 0.5),
            0f64..(max_quantity * 1.1),
        )?;

    let label_for = |x: &f64| {
        let idx = x.round();
        if (x - idx).abs() > 1e-6 || idx < 0.0 {
            return String::new();
        }
        descriptions.get(idx as usize).cloned().unwrap_or_default()
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(rankings.len().max(1))
        .x_label_formatter(&label_for)
        .x_label_style(
            ("sans-serif", 11)
                .into_font()
                .transform(FontTransform::Rotate90),
        )
        .y_desc("Total Quantity Sold")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(rankings.iter().enumerate().map(|(i, ranking)| {
        Rectangle::new(
            [
                (i as f64 - 0.4, 0.0),
                (i as f64 + 0.4, ranking.total_quantity as f64),
            ],
            RGBColor(135, 206, 235).filled(),
        )
    }))?;

    root.present()?;
    log::info!("Top products chart saved to: {}", output_path);

    Ok(())
}

fn truncate_label(description: &str) -> String {
    const MAX_CHARS: usize = 24;
    if description.chars().count() <= MAX_CHARS {
        description.to_string()
    } else {
        let head: String = description.chars().take(MAX_CHARS - 1).collect();
        format!("{}…", head)
    }
}

/// Print segment statistics to console
pub fn print_segment_statistics(segments: &CustomerSegments) {
    let model = &segments.model;
    let total = segments.customer_count();

    println!("\n=== Segment Statistics ===");
    println!("Number of segments: {}", model.n_segments());
    println!("Total customers: {}", total);
    println!("Within-cluster sum of squares (Inertia): {:.2}", model.inertia);

    let silhouette_score = model.compute_silhouette_sample(&segments.normalized.matrix, 100);
    println!("Silhouette score (sample): {:.3}", silhouette_score);

    let ratio = segments.projection.explained_variance_ratio;
    println!(
        "Explained variance: PCA1 {:.1}%, PCA2 {:.1}%",
        ratio[0] * 100.0,
        ratio[1] * 100.0
    );

    let degenerate = segments.normalized.degenerate_features();
    if !degenerate.is_empty() {
        println!("Constant features (ignored): {}", degenerate.join(", "));
    }

    println!("\nSegment sizes:");
    for (i, &size) in model.segment_sizes().iter().enumerate() {
        let percentage = if total > 0 {
            (size as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!("  Segment {}: {} customers ({:.1}%)", i, size, percentage);
    }

    println!("\nSegment centroids (normalized):");
    println!(
        "  Segment | {:>12} | {:>13} | {:>12} | {:>11}",
        FEATURE_NAMES[0], FEATURE_NAMES[1], FEATURE_NAMES[2], FEATURE_NAMES[3]
    );
    for (i, centroid_row) in model.centroids.outer_iter().enumerate() {
        println!(
            "  {:7} | {:12.2} | {:13.2} | {:12.2} | {:11.2}",
            i, centroid_row[0], centroid_row[1], centroid_row[2], centroid_row[3]
        );
    }
}

/// Print one segment's product ranking to console
pub fn print_rankings(segment: usize, rankings: &[ProductRanking]) {
    println!("\nTop products purchased in segment {}:", segment);
    if rankings.is_empty() {
        println!("  (no products)");
        return;
    }
    for (rank, ranking) in rankings.iter().enumerate() {
        println!(
            "  {:2}. {:<40} {:>8}",
            rank + 1,
            ranking.description,
            ranking.total_quantity
        );
    }
}

/// Chart path next to `base` with `suffix` appended to the file stem.
///
/// `out/report.jpg` with `_sizes` becomes `out/report_sizes.jpg`. A base
/// without an extension gets `.png`, since the bitmap backend picks the image
/// format from the extension.
pub fn chart_path(base: &Path, suffix: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "segments".to_string());
    let ext = base
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string());
    base.with_file_name(format!("{}{}.{}", stem, suffix, ext))
}

/// Generate the scatter plot, segment size chart and one product chart per
/// ranking. Returns the written paths, scatter plot first.
pub fn generate_visualization_report(
    segments: &CustomerSegments,
    rankings: &[(usize, Vec<ProductRanking>)],
    base_output_path: &str,
) -> anyhow::Result<Vec<PathBuf>> {
    let base = Path::new(base_output_path);
    let mut written = Vec::with_capacity(rankings.len() + 2);

    let scatter_path = chart_path(base, "");
    create_segment_scatter(segments, &scatter_path.to_string_lossy(), None)?;
    written.push(scatter_path);

    let size_chart_path = chart_path(base, "_sizes");
    create_segment_size_chart(&segments.segment_sizes(), &size_chart_path.to_string_lossy())?;
    written.push(size_chart_path);

    for (segment, ranking) in rankings {
        let ranking_path = chart_path(base, &format!("_segment_{}", segment));
        create_top_products_chart(*segment, ranking, &ranking_path.to_string_lossy())?;
        written.push(ranking_path);
    }

    print_segment_statistics(segments);

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::clean_transactions;
    use crate::pipeline::SegmentationPipeline;
    use polars::prelude::*;
    use tempfile::tempdir;

    fn create_test_data() -> CustomerSegments {
        let raw = df!(
            "CustomerID" => ["C1", "C2", "C3", "C4", "C5", "C6"],
            "InvoiceNo" => ["I1", "I2", "I3", "I4", "I5", "I6"],
            "StockCode" => ["A", "B", "A", "C", "D", "A"],
            "Description" => ["MUG", "LANTERN", "MUG", "CANDLE", "TIN", "MUG"],
            "Quantity" => [2i64, 30, 10, 1, 7, 50],
            "UnitPrice" => [1.0, 2.0, 1.5, 8.0, 9.0, 0.5]
        )
        .unwrap();
        let transactions = clean_transactions(raw).unwrap();
        SegmentationPipeline::new(PipelineConfig::default())
            .unwrap()
            .segment(&transactions)
            .unwrap()
    }

    #[test]
    fn test_segment_color_cycles() {
        assert_eq!(segment_color(0), segment_color(SEGMENT_COLORS.len()));
        assert_ne!(segment_color(0), segment_color(1));
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range(&[1.0, -2.0, 3.0], 0.5), (-2.5, 3.5));
        assert_eq!(padded_range(&[], 0.5), (-0.5, 0.5));
    }

    #[test]
    fn test_truncate_label() {
        assert_eq!(truncate_label("MUG"), "MUG");
        let long = "WHITE HANGING HEART T-LIGHT HOLDER";
        assert_eq!(truncate_label(long).chars().count(), 24);
    }

    #[test]
    fn test_chart_path_keeps_extension_and_directory() {
        let base = Path::new("out.dir.png/report.PNG");
        assert_eq!(
            chart_path(base, "_sizes"),
            PathBuf::from("out.dir.png/report_sizes.PNG")
        );
        assert_eq!(chart_path(base, ""), PathBuf::from("out.dir.png/report.PNG"));

        assert_eq!(
            chart_path(Path::new("out.jpg"), "_segment_3"),
            PathBuf::from("out_segment_3.jpg")
        );
    }

    #[test]
    fn test_chart_path_defaults_to_png() {
        assert_eq!(chart_path(Path::new("segments"), ""), PathBuf::from("segments.png"));
        assert_eq!(
            chart_path(Path::new("charts/segments"), "_sizes"),
            PathBuf::from("charts/segments_sizes.png")
        );
    }

    #[test]
    fn test_chart_paths_are_distinct() {
        let base = Path::new("report.jpg");
        let mut paths = vec![chart_path(base, ""), chart_path(base, "_sizes")];
        paths.extend((0..4).map(|segment| chart_path(base, &format!("_segment_{}", segment))));

        let unique: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
    }

    #[test]
    #[ignore = "text rendering needs system fonts"]
    fn test_create_segment_scatter() {
        let segments = create_test_data();
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("test_plot.png");
        let output_str = output_path.to_str().unwrap();

        let result = create_segment_scatter(&segments, output_str, None);
        assert!(result.is_ok());
        assert!(Path::new(output_str).exists());
    }

    #[test]
    #[ignore = "text rendering needs system fonts"]
    fn test_generate_visualization_report() {
        let segments = create_test_data();
        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("test_report.png");
        let output_str = output_path.to_str().unwrap();

        let rankings = vec![(
            0,
            vec![ProductRanking {
                description: "MUG".into(),
                total_quantity: 12,
            }],
        )];
        let written = generate_visualization_report(&segments, &rankings, output_str).unwrap();
        assert_eq!(written.len(), 3);
        assert!(written.iter().all(|path| path.exists()));
        assert!(Path::new(output_str).exists());
        assert!(temp_dir.path().join("test_report_sizes.png").exists());
        assert!(temp_dir.path().join("test_report_segment_0.png").exists());
    }
}
