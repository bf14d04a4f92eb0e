//! Transaction loading, schema validation and cleaning using Polars

use std::fs::File;
use std::path::Path;

use log::{debug, info};
use polars::prelude::*;

use crate::error::{Error, SchemaError};

pub const CUSTOMER_ID: &str = "CustomerID";
pub const INVOICE_NO: &str = "InvoiceNo";
pub const STOCK_CODE: &str = "StockCode";
pub const DESCRIPTION: &str = "Description";
pub const QUANTITY: &str = "Quantity";
pub const UNIT_PRICE: &str = "UnitPrice";

/// Columns every transaction source must provide (after trimming names).
pub const REQUIRED_COLUMNS: [&str; 6] = [
    CUSTOMER_ID,
    INVOICE_NO,
    STOCK_CODE,
    DESCRIPTION,
    QUANTITY,
    UNIT_PRICE,
];

/// Cleaned transaction rows.
///
/// Every row has a positive quantity, a positive unit price and no missing
/// values. Ids and descriptions are strings, `Quantity` is `Int64` and
/// `UnitPrice` is `Float64`.
#[derive(Debug, Clone)]
pub struct TransactionTable {
    frame: DataFrame,
    dropped: usize,
}

impl TransactionTable {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Number of valid transaction rows
    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Rows removed by cleaning
    pub fn dropped_rows(&self) -> usize {
        self.dropped
    }

    /// Number of distinct customers with at least one valid transaction
    pub fn customer_count(&self) -> crate::Result<usize> {
        Ok(self.frame.column(CUSTOMER_ID)?.n_unique()?)
    }

    /// First `n` rows, for previews
    pub fn head(&self, n: usize) -> DataFrame {
        self.frame.head(Some(n))
    }
}

/// Load a transaction file and clean it. Dispatch by extension.
///
/// Supported formats:
/// * `.csv` with a header row; every column is read as text and typed later
/// * `.parquet` / `.pq`
pub fn load_transactions(path: impl AsRef<Path>) -> crate::Result<TransactionTable> {
    let path = path.as_ref();
    let raw = read_raw(path)?;
    info!(
        "Read {} rows x {} columns from {}",
        raw.height(),
        raw.width(),
        path.display()
    );
    clean_transactions(raw)
}

fn read_raw(path: &Path) -> crate::Result<DataFrame> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let unreadable = |source: PolarsError| SchemaError::Unreadable {
        path: path.to_path_buf(),
        source,
    };

    let df = match ext.as_str() {
        "csv" => CsvReadOptions::default()
            .with_has_header(true)
            // Keep ids like "00123" intact; typed columns are cast during cleaning
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .and_then(|reader| reader.finish())
            .map_err(unreadable)?,
        "parquet" | "pq" => {
            let file = File::open(path).map_err(|e| unreadable(PolarsError::from(e)))?;
            ParquetReader::new(file).finish().map_err(unreadable)?
        }
        _ => return Err(SchemaError::UnsupportedFormat(path.to_path_buf()).into()),
    };

    Ok(df)
}

/// Validate and clean a raw transaction frame.
///
/// Column names are trimmed, rows with a missing value in any column are
/// dropped, and rows with `Quantity <= 0` or `UnitPrice <= 0` are removed.
/// Values that cannot be cast to their column type count as missing, and a
/// quantity with a fractional part (`2.5`) is invalid rather than truncated.
pub fn clean_transactions(raw: DataFrame) -> crate::Result<TransactionTable> {
    let raw_rows = raw.height();

    let names: Vec<String> = raw
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let trimmed: Vec<String> = names.iter().map(|name| name.trim().to_string()).collect();
    debug!("Columns after trimming: {:?}", trimmed);

    validate_schema(&trimmed)?;

    let renamed: Vec<Expr> = names
        .iter()
        .zip(trimmed.iter())
        .map(|(name, clean)| col(name.as_str()).alias(clean.as_str()))
        .collect();

    let frame = raw
        .lazy()
        .select(renamed)
        .drop_nulls(None)
        .select([
            col(CUSTOMER_ID).cast(DataType::String),
            col(INVOICE_NO).cast(DataType::String),
            col(STOCK_CODE).cast(DataType::String),
            col(DESCRIPTION).cast(DataType::String),
            col(QUANTITY).cast(DataType::Float64),
            col(UNIT_PRICE).cast(DataType::Float64),
        ])
        .drop_nulls(None)
        .filter(
            col(QUANTITY)
                .gt(lit(0.0))
                .and(col(UNIT_PRICE).gt(lit(0.0)))
                // fractional quantities are invalid, not rounded
                .and(
                    col(QUANTITY)
                        .cast(DataType::Int64)
                        .cast(DataType::Float64)
                        .eq(col(QUANTITY)),
                ),
        )
        .with_column(col(QUANTITY).cast(DataType::Int64))
        .collect()?;

    let dropped = raw_rows - frame.height();
    if frame.height() == 0 {
        return Err(Error::EmptyDataset { dropped });
    }

    info!(
        "Kept {} of {} transactions ({} removed)",
        frame.height(),
        raw_rows,
        dropped
    );

    Ok(TransactionTable { frame, dropped })
}

/// Fail fast when required columns are absent or a trimmed name is ambiguous.
fn validate_schema(columns: &[String]) -> Result<(), SchemaError> {
    for (i, name) in columns.iter().enumerate() {
        if columns[..i].contains(name) {
            return Err(SchemaError::DuplicateColumn(name.clone()));
        }
    }

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.iter().any(|c| c == *required))
        .map(|required| required.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(SchemaError::MissingColumns {
            missing,
            found: columns.to_vec(),
        });
    }

    Ok(())
}
