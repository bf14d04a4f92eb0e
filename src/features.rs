//! Per-customer feature aggregation and standardization

use log::{debug, warn};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;

use crate::data::{TransactionTable, CUSTOMER_ID, INVOICE_NO, QUANTITY, STOCK_CODE, UNIT_PRICE};
use crate::error::Error;

pub const NUM_PURCHASES: &str = "NumPurchases";
pub const TOTAL_QUANTITY: &str = "TotalQuantity";
pub const AVG_UNIT_PRICE: &str = "AvgUnitPrice";
pub const UNIQUE_ITEMS: &str = "UniqueItems";

/// Feature columns in matrix order
pub const FEATURE_NAMES: [&str; 4] = [NUM_PURCHASES, TOTAL_QUANTITY, AVG_UNIT_PRICE, UNIQUE_ITEMS];

/// Standard deviations below this (relative to the column mean) are treated as zero.
const MIN_RELATIVE_STD: f64 = 1e-12;

/// One feature vector per customer, ordered by customer id
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerFeatures {
    pub customer_ids: Vec<String>,
    /// Distinct invoices
    pub num_purchases: Vec<u32>,
    pub total_quantity: Vec<i64>,
    pub avg_unit_price: Vec<f64>,
    /// Distinct stock codes
    pub unique_items: Vec<u32>,
}

impl CustomerFeatures {
    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }

    /// Features as an `(n_customers, 4)` matrix in [`FEATURE_NAMES`] order
    pub fn raw_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), FEATURE_NAMES.len()), |(i, j)| match j {
            0 => self.num_purchases[i] as f64,
            1 => self.total_quantity[i] as f64,
            2 => self.avg_unit_price[i],
            _ => self.unique_items[i] as f64,
        })
    }

    pub fn to_frame(&self) -> crate::Result<DataFrame> {
        Ok(df!(
            CUSTOMER_ID => self.customer_ids.clone(),
            NUM_PURCHASES => self.num_purchases.clone(),
            TOTAL_QUANTITY => self.total_quantity.clone(),
            AVG_UNIT_PRICE => self.avg_unit_price.clone(),
            UNIQUE_ITEMS => self.unique_items.clone()
        )?)
    }
}

/// Collapse cleaned transactions into one feature vector per customer.
pub fn aggregate(transactions: &TransactionTable) -> crate::Result<CustomerFeatures> {
    let grouped = transactions
        .frame()
        .clone()
        .lazy()
        .group_by([col(CUSTOMER_ID)])
        .agg([
            col(INVOICE_NO).n_unique().alias(NUM_PURCHASES),
            col(QUANTITY).sum().alias(TOTAL_QUANTITY),
            col(UNIT_PRICE).mean().alias(AVG_UNIT_PRICE),
            col(STOCK_CODE).n_unique().alias(UNIQUE_ITEMS),
        ])
        .sort([CUSTOMER_ID], SortMultipleOptions::default())
        .collect()?;

    let features = CustomerFeatures {
        customer_ids: string_column(&grouped, CUSTOMER_ID)?,
        num_purchases: u32_column(&grouped, NUM_PURCHASES)?,
        total_quantity: i64_column(&grouped, TOTAL_QUANTITY)?,
        avg_unit_price: f64_column(&grouped, AVG_UNIT_PRICE)?,
        unique_items: u32_column(&grouped, UNIQUE_ITEMS)?,
    };
    debug!("Aggregated features for {} customers", features.len());

    Ok(features)
}

pub(crate) fn string_column(frame: &DataFrame, name: &'static str) -> crate::Result<Vec<String>> {
    frame
        .column(name)?
        .str()?
        .into_iter()
        .map(|value| {
            value
                .map(str::to_string)
                .ok_or(Error::UnexpectedNull { column: name })
        })
        .collect()
}

fn u32_column(frame: &DataFrame, name: &'static str) -> crate::Result<Vec<u32>> {
    let values = frame.column(name)?.cast(&DataType::UInt32)?;
    let values = values.u32()?;
    values
        .into_iter()
        .map(|value| value.ok_or(Error::UnexpectedNull { column: name }))
        .collect()
}

pub(crate) fn i64_column(frame: &DataFrame, name: &'static str) -> crate::Result<Vec<i64>> {
    let values = frame.column(name)?.cast(&DataType::Int64)?;
    let values = values.i64()?;
    values
        .into_iter()
        .map(|value| value.ok_or(Error::UnexpectedNull { column: name }))
        .collect()
}

pub(crate) fn f64_column(frame: &DataFrame, name: &'static str) -> crate::Result<Vec<f64>> {
    let values = frame.column(name)?.cast(&DataType::Float64)?;
    let values = values.f64()?;
    values
        .into_iter()
        .map(|value| value.ok_or(Error::UnexpectedNull { column: name }))
        .collect()
}

/// Per-column standardization using the population standard deviation.
///
/// Columns with zero variance map every value to 0 instead of dividing by zero.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let ncols = x.ncols();
        if x.nrows() == 0 {
            return Self {
                mean: Array1::zeros(ncols),
                std: Array1::zeros(ncols),
            };
        }

        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(ncols));
        let std = x.std_axis(Axis(0), 0.0);
        Self { mean, std }
    }

    pub fn is_degenerate(&self, column: usize) -> bool {
        self.std[column] <= MIN_RELATIVE_STD * self.mean[column].abs().max(1.0)
    }

    /// Indices of zero-variance columns
    pub fn degenerate_columns(&self) -> Vec<usize> {
        (0..self.std.len())
            .filter(|&j| self.is_degenerate(j))
            .collect()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = x - &self.mean;
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            if self.is_degenerate(j) {
                column.fill(0.0);
            } else {
                column /= self.std[j];
            }
        }
        out
    }

    /// Scale a single feature vector with the fitted statistics
    pub fn transform_row(&self, row: &[f64]) -> crate::Result<Array1<f64>> {
        if row.len() != self.mean.len() {
            return Err(Error::InvalidConfig(format!(
                "feature vector must have exactly {} values, got {}",
                self.mean.len(),
                row.len()
            )));
        }
        let input = Array2::from_shape_vec((1, row.len()), row.to_vec())?;
        Ok(self.transform(&input).row(0).to_owned())
    }
}

/// Standardized features, row-aligned with the customer ids they came from.
///
/// Both the segmenter and the projector consume this same matrix.
#[derive(Debug, Clone)]
pub struct NormalizedFeatures {
    pub customer_ids: Vec<String>,
    pub matrix: Array2<f64>,
    pub scaler: StandardScaler,
}

impl NormalizedFeatures {
    pub fn len(&self) -> usize {
        self.customer_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customer_ids.is_empty()
    }

    /// Names of the features that carried no variance
    pub fn degenerate_features(&self) -> Vec<&'static str> {
        self.scaler
            .degenerate_columns()
            .into_iter()
            .map(|j| FEATURE_NAMES[j])
            .collect()
    }
}

pub fn normalize(features: &CustomerFeatures) -> NormalizedFeatures {
    let raw = features.raw_matrix();
    let scaler = StandardScaler::fit(&raw);

    for j in scaler.degenerate_columns() {
        warn!(
            "Feature {} has zero variance across {} customers, it will not influence segmentation",
            FEATURE_NAMES[j],
            features.len()
        );
    }

    let matrix = scaler.transform(&raw);
    NormalizedFeatures {
        customer_ids: features.customer_ids.clone(),
        matrix,
        scaler,
    }
}
