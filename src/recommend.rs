//! Best-selling products per customer segment

use log::debug;
use polars::prelude::*;

use crate::data::{TransactionTable, CUSTOMER_ID, DESCRIPTION, QUANTITY};
use crate::features::{i64_column, string_column, TOTAL_QUANTITY};
use crate::model::SegmentAssignment;

/// One entry of a segment's product ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRanking {
    pub description: String,
    pub total_quantity: i64,
}

/// Rank products bought by the customers of `segment` by total quantity.
///
/// The result is sorted by descending quantity (ties by description) and holds
/// at most `top_n` entries. A segment without members or without matching
/// transactions yields an empty ranking.
pub fn top_products(
    transactions: &TransactionTable,
    assignment: &SegmentAssignment,
    segment: usize,
    top_n: usize,
) -> crate::Result<Vec<ProductRanking>> {
    let members = assignment.members(segment);
    if members.is_empty() || top_n == 0 {
        debug!("Segment {} has no members, nothing to rank", segment);
        return Ok(Vec::new());
    }

    let members = df!(CUSTOMER_ID => members)?;

    let ranked = transactions
        .frame()
        .clone()
        .lazy()
        .inner_join(members.lazy(), col(CUSTOMER_ID), col(CUSTOMER_ID))
        .group_by([col(DESCRIPTION)])
        .agg([col(QUANTITY).sum().alias(TOTAL_QUANTITY)])
        .sort(
            [TOTAL_QUANTITY, DESCRIPTION],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .limit(top_n as IdxSize)
        .collect()?;

    let rankings: Vec<ProductRanking> = string_column(&ranked, DESCRIPTION)?
        .into_iter()
        .zip(i64_column(&ranked, TOTAL_QUANTITY)?)
        .map(|(description, total_quantity)| ProductRanking {
            description,
            total_quantity,
        })
        .collect();

    if rankings.is_empty() {
        debug!("Segment {} has no matching transactions", segment);
    }

    Ok(rankings)
}

/// Rankings as a two-column frame for display or export
pub fn rankings_to_frame(rankings: &[ProductRanking]) -> crate::Result<DataFrame> {
    let descriptions: Vec<&str> = rankings.iter().map(|r| r.description.as_str()).collect();
    let quantities: Vec<i64> = rankings.iter().map(|r| r.total_quantity).collect();
    Ok(df!(
        DESCRIPTION => descriptions,
        TOTAL_QUANTITY => quantities
    )?)
}
