//! Stage-by-stage segmentation pipeline and dataset memoization

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, info};
use polars::prelude::*;

use crate::config::PipelineConfig;
use crate::data::{load_transactions, TransactionTable, CUSTOMER_ID};
use crate::error::SchemaError;
use crate::features::{
    aggregate, normalize, CustomerFeatures, NormalizedFeatures, AVG_UNIT_PRICE, NUM_PURCHASES,
    TOTAL_QUANTITY, UNIQUE_ITEMS,
};
use crate::model::{fit_segments, SegmentAssignment, SegmentModel};
use crate::projection::{project, Projection};
use crate::recommend::{top_products, ProductRanking};

pub const CLUSTER: &str = "Cluster";
pub const PCA1: &str = "PCA1";
pub const PCA2: &str = "PCA2";

/// Everything derived from one transaction table: features, labels and projection.
///
/// All parts are row-aligned on the same customer order.
#[derive(Debug, Clone)]
pub struct CustomerSegments {
    pub features: CustomerFeatures,
    pub normalized: NormalizedFeatures,
    pub model: SegmentModel,
    pub projection: Projection,
}

impl CustomerSegments {
    pub fn assignment(&self) -> &SegmentAssignment {
        &self.model.assignment
    }

    /// Occupied segment ids, for populating a selector
    pub fn segment_ids(&self) -> Vec<usize> {
        self.model.assignment.segment_ids()
    }

    /// Customer count for every segment in `0..K`
    pub fn segment_sizes(&self) -> Vec<usize> {
        self.model.segment_sizes()
    }

    pub fn customer_count(&self) -> usize {
        self.features.len()
    }

    /// Feature table with segment labels and projection coordinates merged in
    pub fn customer_table(&self) -> crate::Result<DataFrame> {
        let labels: Vec<u32> = self
            .model
            .labels()
            .iter()
            .map(|&label| label as u32)
            .collect();

        Ok(df!(
            CUSTOMER_ID => self.features.customer_ids.clone(),
            NUM_PURCHASES => self.features.num_purchases.clone(),
            TOTAL_QUANTITY => self.features.total_quantity.clone(),
            AVG_UNIT_PRICE => self.features.avg_unit_price.clone(),
            UNIQUE_ITEMS => self.features.unique_items.clone(),
            CLUSTER => labels,
            PCA1 => self.projection.pca1(),
            PCA2 => self.projection.pca2()
        )?)
    }
}

/// Explicit pipeline: each stage is a plain function of its inputs, so a
/// caller only re-runs the stages whose inputs changed.
#[derive(Debug, Clone)]
pub struct SegmentationPipeline {
    config: PipelineConfig,
}

impl SegmentationPipeline {
    pub fn new(config: PipelineConfig) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn load(&self, path: impl AsRef<Path>) -> crate::Result<TransactionTable> {
        load_transactions(path)
    }

    /// Aggregate, normalize, segment and project.
    pub fn segment(&self, transactions: &TransactionTable) -> crate::Result<CustomerSegments> {
        let features = aggregate(transactions)?;
        let normalized = normalize(&features);
        let model = fit_segments(&normalized, &self.config)?;
        let projection = project(&normalized.matrix);

        info!(
            "Segmented {} customers into {} segments (inertia {:.2})",
            features.len(),
            self.config.n_segments,
            model.inertia
        );

        Ok(CustomerSegments {
            features,
            normalized,
            model,
            projection,
        })
    }

    /// Top products for the selected segment
    pub fn recommend(
        &self,
        transactions: &TransactionTable,
        segments: &CustomerSegments,
        segment: usize,
    ) -> crate::Result<Vec<ProductRanking>> {
        top_products(
            transactions,
            segments.assignment(),
            segment,
            self.config.top_n,
        )
    }
}

/// Identity of a dataset file at load time
#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceFingerprint {
    path: PathBuf,
    len: u64,
    modified: Option<SystemTime>,
}

impl SourceFingerprint {
    fn of(path: &Path) -> crate::Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| SchemaError::Unreadable {
            path: path.to_path_buf(),
            source: PolarsError::from(e),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// Memoizes the load/clean stage, reloading only when the source changes.
#[derive(Debug, Default)]
pub struct DatasetCache {
    entry: Option<(SourceFingerprint, Arc<TransactionTable>)>,
    loads: usize,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, path: impl AsRef<Path>) -> crate::Result<Arc<TransactionTable>> {
        let path = path.as_ref();
        let fingerprint = SourceFingerprint::of(path)?;

        if let Some((cached, table)) = &self.entry {
            if *cached == fingerprint {
                debug!("Using cached transactions for {}", path.display());
                return Ok(Arc::clone(table));
            }
        }

        let table = Arc::new(load_transactions(path)?);
        self.loads += 1;
        self.entry = Some((fingerprint, Arc::clone(&table)));
        Ok(table)
    }

    /// Number of times the source was actually read
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::clean_transactions;
    use std::io::Write;

    fn create_test_transactions() -> TransactionTable {
        let raw = df!(
            "CustomerID" => ["C1", "C1", "C2", "C3", "C3", "C4", "C5", "C5", "C6"],
            "InvoiceNo" => ["I1", "I2", "I3", "I4", "I4", "I5", "I6", "I7", "I8"],
            "StockCode" => ["A", "B", "A", "C", "D", "A", "B", "E", "F"],
            "Description" => ["MUG", "LANTERN", "MUG", "CANDLE", "TIN", "MUG", "LANTERN", "CARD", "BAG"],
            "Quantity" => [2i64, 3, 10, 1, 1, 50, 5, 5, 1],
            "UnitPrice" => [1.0, 2.0, 1.5, 8.0, 9.0, 0.5, 2.0, 1.0, 12.0]
        )
        .unwrap();
        clean_transactions(raw).unwrap()
    }

    #[test]
    fn test_segment_produces_aligned_tables() {
        let pipeline = SegmentationPipeline::new(PipelineConfig::default()).unwrap();
        let transactions = create_test_transactions();
        let segments = pipeline.segment(&transactions).unwrap();

        assert_eq!(segments.customer_count(), 6);
        assert_eq!(segments.normalized.len(), 6);
        assert_eq!(segments.projection.coordinates.nrows(), 6);
        assert_eq!(segments.segment_sizes().iter().sum::<usize>(), 6);

        let table = segments.customer_table().unwrap();
        assert_eq!(table.shape(), (6, 8));
        for name in [CLUSTER, PCA1, PCA2] {
            assert!(table.column(name).is_ok());
        }

        for id in segments.segment_ids() {
            assert!(id < 4);
            let rankings = pipeline.recommend(&transactions, &segments, id).unwrap();
            assert!(!rankings.is_empty());
            assert!(rankings.len() <= 10);
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            n_segments: 0,
            ..Default::default()
        };
        assert!(SegmentationPipeline::new(config).is_err());
    }

    #[test]
    fn test_dataset_cache_reloads_on_change() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "InvoiceNo,StockCode,Description,Quantity,UnitPrice,CustomerID").unwrap();
        writeln!(file, "536365,85123A,LANTERN,6,2.55,17850").unwrap();
        file.flush().unwrap();

        let mut cache = DatasetCache::new();
        let first = cache.get_or_load(file.path()).unwrap();
        let second = cache.get_or_load(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.loads(), 1);

        // Appending changes the file length
        writeln!(file, "536366,71053,WHITE METAL LANTERN,6,3.39,13047").unwrap();
        file.flush().unwrap();
        let third = cache.get_or_load(file.path()).unwrap();
        assert_eq!(third.len(), 2);
        assert_eq!(cache.loads(), 2);

        cache.invalidate();
        cache.get_or_load(file.path()).unwrap();
        assert_eq!(cache.loads(), 3);
    }

    #[test]
    fn test_dataset_cache_missing_file() {
        let mut cache = DatasetCache::new();
        assert!(cache.get_or_load("/definitely/not/here.csv").is_err());
        assert_eq!(cache.loads(), 0);
    }
}
