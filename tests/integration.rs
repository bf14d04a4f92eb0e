//! Integration tests for SegmentForge

use segmentforge::{
    aggregate, export, fit_segments, load_transactions, normalize, project, top_products, Error,
    PipelineConfig, SchemaError, SegmentationPipeline, SmallPopulationPolicy,
};
use std::collections::HashSet;
use std::io::Write;
use tempfile::NamedTempFile;

const HEADER: &str = "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country";

/// Create a test CSV file with sample data
fn create_test_csv() -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "{}", HEADER).unwrap();

    // Customer 17850 - several invoices, several items
    writeln!(file, "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01 08:26,2.55,17850,United Kingdom").unwrap();
    writeln!(file, "536365,71053,WHITE METAL LANTERN,6,2010-12-01 08:26,3.39,17850,United Kingdom").unwrap();
    writeln!(file, "536366,22633,HAND WARMER UNION JACK,6,2011-11-01 08:28,1.85,17850,United Kingdom").unwrap();

    // Customer 13047 - single purchase
    writeln!(file, "536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,2010-12-01 08:34,2.75,13047,United Kingdom").unwrap();

    // Customer 12345 - bulk buyer of cheap items
    writeln!(file, "536368,22752,SET 7 BABUSHKA NESTING BOXES,2,2011-12-05 10:15,7.65,12345,United Kingdom").unwrap();
    writeln!(file, "536368,21730,GLASS STAR FROSTED T-LIGHT HOLDER,120,2011-12-05 10:15,1.25,12345,United Kingdom").unwrap();

    // Customer 98765 - expensive single item
    writeln!(file, "536369,22457,NATURAL SLATE HEART CHALKBOARD,1,2010-01-15 09:00,35.00,98765,United Kingdom").unwrap();

    // Customer 55555 - two invoices of the same item
    writeln!(file, "536370,85123A,WHITE HANGING HEART T-LIGHT HOLDER,12,2011-02-01 12:00,2.55,55555,France").unwrap();
    writeln!(file, "536371,85123A,WHITE HANGING HEART T-LIGHT HOLDER,24,2011-03-01 12:00,2.55,55555,France").unwrap();

    // Invalid rows: refund, zero price, missing customer
    writeln!(file, "C536372,85123A,WHITE HANGING HEART T-LIGHT HOLDER,-6,2011-03-02 12:00,2.55,55555,France").unwrap();
    writeln!(file, "536373,22633,HAND WARMER UNION JACK,3,2011-03-03 12:00,0,13047,United Kingdom").unwrap();
    writeln!(file, "536374,22633,HAND WARMER UNION JACK,3,2011-03-03 12:00,1.85,,United Kingdom").unwrap();

    file
}

#[test]
fn test_end_to_end_pipeline() {
    let test_file = create_test_csv();
    let pipeline = SegmentationPipeline::new(PipelineConfig::default()).unwrap();

    let transactions = pipeline.load(test_file.path()).unwrap();
    assert_eq!(transactions.len(), 9);
    assert_eq!(transactions.dropped_rows(), 3);

    let segments = pipeline.segment(&transactions).unwrap();

    // One feature row per customer with valid transactions
    assert_eq!(segments.customer_count(), 5);
    assert_eq!(transactions.customer_count().unwrap(), 5);

    let labels = segments.model.labels();
    assert_eq!(labels.len(), 5);
    assert!(labels.iter().all(|&label| label < 4));
    assert_eq!(segments.segment_sizes().iter().sum::<usize>(), 5);

    let table = segments.customer_table().unwrap();
    assert_eq!(table.height(), 5);

    for segment in segments.segment_ids() {
        let rankings = pipeline.recommend(&transactions, &segments, segment).unwrap();
        assert!(!rankings.is_empty());
        assert!(rankings.len() <= 10);
        assert!(rankings
            .windows(2)
            .all(|pair| pair[0].total_quantity >= pair[1].total_quantity));
    }
}

#[test]
fn test_feature_values() {
    let test_file = create_test_csv();
    let transactions = load_transactions(test_file.path()).unwrap();
    let features = aggregate(&transactions).unwrap();

    let idx = features
        .customer_ids
        .iter()
        .position(|id| id == "17850")
        .unwrap();
    assert_eq!(features.num_purchases[idx], 2);
    assert_eq!(features.total_quantity[idx], 18);
    assert!((features.avg_unit_price[idx] - (2.55 + 3.39 + 1.85) / 3.0).abs() < 1e-9);
    assert_eq!(features.unique_items[idx], 3);

    // The refund for 55555 does not reduce its quantity
    let idx = features
        .customer_ids
        .iter()
        .position(|id| id == "55555")
        .unwrap();
    assert_eq!(features.num_purchases[idx], 2);
    assert_eq!(features.total_quantity[idx], 36);
    assert_eq!(features.unique_items[idx], 1);

    let ids: HashSet<&str> = features.customer_ids.iter().map(String::as_str).collect();
    assert_eq!(ids.len(), features.len());
}

#[test]
fn test_segmentation_is_reproducible() {
    let test_file = create_test_csv();
    let transactions = load_transactions(test_file.path()).unwrap();
    let config = PipelineConfig {
        n_segments: 3,
        seed: 1234,
        ..Default::default()
    };

    let pipeline = SegmentationPipeline::new(config).unwrap();
    let first = pipeline.segment(&transactions).unwrap();
    let second = pipeline.segment(&transactions).unwrap();

    assert_eq!(first.model.assignment, second.model.assignment);
    assert_eq!(first.projection.coordinates, second.projection.coordinates);
}

#[test]
fn test_stages_share_customer_order() {
    let test_file = create_test_csv();
    let transactions = load_transactions(test_file.path()).unwrap();

    let features = aggregate(&transactions).unwrap();
    let normalized = normalize(&features);
    let model = fit_segments(&normalized, &PipelineConfig::default()).unwrap();
    let projection = project(&normalized.matrix);

    assert_eq!(model.assignment.customer_ids, features.customer_ids);
    assert_eq!(projection.coordinates.nrows(), features.len());

    // Normalized columns have zero mean
    for column in normalized.matrix.columns() {
        assert!(column.mean().unwrap().abs() < 1e-9);
    }
}

#[test]
fn test_two_customers_four_segments() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    writeln!(file, "1,A,ITEM A,2,2011-01-01 10:00,10.0,C1,UK").unwrap();
    writeln!(file, "1,B,ITEM B,3,2011-01-01 10:00,10.0,C1,UK").unwrap();
    writeln!(file, "2,A,ITEM A,40,2011-01-02 10:00,1.0,C2,UK").unwrap();

    let pipeline = SegmentationPipeline::new(PipelineConfig::default()).unwrap();
    let transactions = pipeline.load(file.path()).unwrap();
    let segments = pipeline.segment(&transactions).unwrap();

    let sizes = segments.segment_sizes();
    assert_eq!(sizes.len(), 4);
    assert!(sizes.iter().filter(|&&size| size > 0).count() <= 2);

    // Unoccupied segments rank nothing
    let empty = (0..4).find(|&s| sizes[s] == 0).unwrap();
    let rankings = top_products(&transactions, segments.assignment(), empty, 10).unwrap();
    assert!(rankings.is_empty());

    // Strict policy refuses the same input
    let strict = SegmentationPipeline::new(PipelineConfig {
        small_population: SmallPopulationPolicy::Reject,
        ..Default::default()
    })
    .unwrap();
    assert!(matches!(
        strict.segment(&transactions),
        Err(Error::TooFewCustomers { .. })
    ));
}

#[test]
fn test_error_handling() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "InvoiceNo,StockCode,Quantity,UnitPrice,CustomerID").unwrap();
    writeln!(file, "1,A,2,10.0,C1").unwrap();
    assert!(matches!(
        load_transactions(file.path()),
        Err(Error::Schema(SchemaError::MissingColumns { .. }))
    ));

    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    writeln!(file, "1,A,ITEM A,-2,2011-01-01 10:00,10.0,C1,UK").unwrap();
    assert!(matches!(
        load_transactions(file.path()),
        Err(Error::EmptyDataset { .. })
    ));
}

#[test]
fn test_export_customer_table() {
    let test_file = create_test_csv();
    let pipeline = SegmentationPipeline::new(PipelineConfig::default()).unwrap();
    let transactions = pipeline.load(test_file.path()).unwrap();
    let segments = pipeline.segment(&transactions).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = export::export_customer_table(&segments, dir.path()).unwrap();
    let contents = std::fs::read_to_string(path).unwrap();
    let mut lines = contents.lines();

    assert_eq!(
        lines.next(),
        Some("CustomerID,NumPurchases,TotalQuantity,AvgUnitPrice,UniqueItems,Cluster,PCA1,PCA2")
    );
    assert_eq!(lines.count(), 5);
}
