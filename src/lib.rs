//! SegmentForge: customer segmentation and per-segment product recommendations
//!
//! This library derives per-customer purchase features from transaction data,
//! groups customers into segments with K-Means, projects them to 2D for
//! visualization and ranks the best-selling products of each segment.

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod projection;
pub mod recommend;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::{PipelineConfig, SmallPopulationPolicy};
pub use data::{clean_transactions, load_transactions, TransactionTable};
pub use error::{Error, SchemaError};
pub use features::{aggregate, normalize, CustomerFeatures, NormalizedFeatures, StandardScaler};
pub use model::{fit_segments, SegmentAssignment, SegmentModel};
pub use pipeline::{CustomerSegments, DatasetCache, SegmentationPipeline};
pub use projection::{project, Projection};
pub use recommend::{top_products, ProductRanking};

/// Common result type used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;
