use polars::prelude::*;
use tracing::debug;

use crate::dataset::FACT_ORDER_DETAILS;
use crate::error::{PipelineError, Result};
use crate::table::Table;

/// Builds `fact_order_details` by left-joining the order items with orders, products,
/// sellers, payments and reviews, in that order.
///
/// Every item row survives. Payments and reviews are one-to-many on `order_id`, so an item
/// fans out once per matching payment and review. A non-key column that already exists on
/// the left side is renamed to `<column>_<right table name>` before its join; if that name is
/// taken as well the build fails with [`PipelineError::DuplicateColumn`].
pub fn build_fact(
    items: &Table,
    orders: &Table,
    products: &Table,
    sellers: &Table,
    payments: &Table,
    reviews: &Table,
) -> Result<Table> {
    let joins = [
        (orders, "order_id"),
        (products, "product_id"),
        (sellers, "seller_id"),
        (payments, "order_id"),
        (reviews, "order_id"),
    ];

    items.column("order_id")?;
    let mut fact = items.frame().clone();
    for (right, key) in joins {
        fact = left_join(fact, right, key)?;
        debug!(right = right.name(), key, rows = fact.height(), "joined into fact");
    }

    Ok(Table::new(FACT_ORDER_DETAILS, fact))
}

fn left_join(left: DataFrame, right: &Table, key: &str) -> Result<DataFrame> {
    if left.column(key).is_err() {
        return Err(PipelineError::MissingColumn {
            table: FACT_ORDER_DETAILS.to_string(),
            column: key.to_string(),
        });
    }
    right.column(key)?;

    let mut right_frame = right.frame().clone();
    let collisions: Vec<String> = right_frame
        .get_column_names()
        .iter()
        .filter(|name| name.as_str() != key && left.column(name.as_str()).is_ok())
        .map(|name| name.to_string())
        .collect();
    for column in collisions {
        let renamed = format!("{column}_{}", right.name());
        if left.column(&renamed).is_ok() || right_frame.column(&renamed).is_ok() {
            return Err(PipelineError::DuplicateColumn {
                table: FACT_ORDER_DETAILS.to_string(),
                column: renamed,
            });
        }
        right_frame.rename(&column, renamed.into())?;
    }

    let joined = left
        .lazy()
        .join(
            right_frame.lazy(),
            [col(key)],
            [col(key)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    Ok(joined)
}
