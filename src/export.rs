//! CSV export of the tables handed to display surfaces

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::info;
use polars::prelude::*;

use crate::pipeline::CustomerSegments;
use crate::recommend::{rankings_to_frame, ProductRanking};

fn write_csv(frame: &mut DataFrame, path: &Path) -> crate::Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(frame)?;
    info!("Wrote {} rows to {}", frame.height(), path.display());
    Ok(())
}

/// Write the customer table (features, segment, projection) to `dir/customers.csv`
pub fn export_customer_table(segments: &CustomerSegments, dir: &Path) -> crate::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("customers.csv");
    let mut frame = segments.customer_table()?;
    write_csv(&mut frame, &path)?;
    Ok(path)
}

/// Write one segment's ranking to `dir/segment_<id>_top_products.csv`
pub fn export_rankings(
    segment: usize,
    rankings: &[ProductRanking],
    dir: &Path,
) -> crate::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("segment_{}_top_products.csv", segment));
    let mut frame = rankings_to_frame(rankings)?;
    write_csv(&mut frame, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_export_rankings() {
        let temp_dir = tempdir().unwrap();
        let rankings = vec![
            ProductRanking {
                description: "MUG, LARGE".into(),
                total_quantity: 12,
            },
            ProductRanking {
                description: "TIN".into(),
                total_quantity: 3,
            },
        ];

        let path = export_rankings(2, &rankings, temp_dir.path()).unwrap();
        assert!(path.ends_with("segment_2_top_products.csv"));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "Description,TotalQuantity");
        assert_eq!(lines[1], "\"MUG, LARGE\",12");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_export_empty_rankings_writes_header() {
        let temp_dir = tempdir().unwrap();
        let path = export_rankings(0, &[], &temp_dir.path().join("nested")).unwrap();
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().next(), Some("Description,TotalQuantity"));
    }
}
