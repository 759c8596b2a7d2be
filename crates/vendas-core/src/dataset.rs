//! Source extracts of the Olist e-commerce dataset and the staging outputs derived from them.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    Customers,
    Orders,
    OrderItems,
    Payments,
    Reviews,
    Products,
    Sellers,
    Geolocation,
}

impl SourceTable {
    pub const ALL: [SourceTable; 8] = [
        SourceTable::Customers,
        SourceTable::Orders,
        SourceTable::OrderItems,
        SourceTable::Payments,
        SourceTable::Reviews,
        SourceTable::Products,
        SourceTable::Sellers,
        SourceTable::Geolocation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SourceTable::Customers => "customers",
            SourceTable::Orders => "orders",
            SourceTable::OrderItems => "order_items",
            SourceTable::Payments => "payments",
            SourceTable::Reviews => "reviews",
            SourceTable::Products => "products",
            SourceTable::Sellers => "sellers",
            SourceTable::Geolocation => "geolocation",
        }
    }

    /// File name inside the dataset archive and the landing bucket.
    pub fn file_name(self) -> &'static str {
        match self {
            SourceTable::Customers => "olist_customers_dataset.csv",
            SourceTable::Orders => "olist_orders_dataset.csv",
            SourceTable::OrderItems => "olist_order_items_dataset.csv",
            SourceTable::Payments => "olist_order_payments_dataset.csv",
            SourceTable::Reviews => "olist_order_reviews_dataset.csv",
            SourceTable::Products => "olist_products_dataset.csv",
            SourceTable::Sellers => "olist_sellers_dataset.csv",
            SourceTable::Geolocation => "olist_geolocation_dataset.csv",
        }
    }

    /// Columns kept when the cleaned extract is projected for staging.
    pub fn staged_columns(self) -> &'static [&'static str] {
        match self {
            SourceTable::Customers => &[
                "customer_id",
                "customer_unique_id",
                "customer_zip_code_prefix",
                "customer_city",
                "customer_state",
            ],
            SourceTable::Orders => &[
                "order_id",
                "customer_id",
                "order_status",
                "order_purchase_timestamp",
                "order_approved_at",
                "order_delivered_customer_date",
                "order_estimated_delivery_date",
            ],
            SourceTable::OrderItems => &[
                "order_id",
                "order_item_id",
                "product_id",
                "seller_id",
                "shipping_limit_date",
                "price",
                "freight_value",
            ],
            SourceTable::Payments => &[
                "order_id",
                "payment_sequential",
                "payment_type",
                "payment_installments",
                "payment_value",
            ],
            SourceTable::Reviews => &[
                "review_id",
                "order_id",
                "review_score",
                "review_comment_title",
                "review_comment_message",
            ],
            // "lenght" is the dataset's own spelling
            SourceTable::Products => &[
                "product_id",
                "product_category_name",
                "product_name_lenght",
                "product_description_lenght",
                "product_photos_qty",
                "product_weight_g",
                "product_length_cm",
                "product_height_cm",
                "product_width_cm",
            ],
            SourceTable::Sellers => &[
                "seller_id",
                "seller_zip_code_prefix",
                "seller_city",
                "seller_state",
            ],
            SourceTable::Geolocation => &[
                "geolocation_zip_code_prefix",
                "geolocation_lat",
                "geolocation_lng",
                "geolocation_city",
                "geolocation_state",
            ],
        }
    }
}

/// A staging dimension: which cleaned extract it projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionSpec {
    pub name: &'static str,
    pub source: SourceTable,
}

impl DimensionSpec {
    pub fn columns(&self) -> &'static [&'static str] {
        self.source.staged_columns()
    }
}

pub const DIMENSIONS: [DimensionSpec; 7] = [
    DimensionSpec {
        name: "dim_customers",
        source: SourceTable::Customers,
    },
    DimensionSpec {
        name: "dim_products",
        source: SourceTable::Products,
    },
    DimensionSpec {
        name: "dim_sellers",
        source: SourceTable::Sellers,
    },
    DimensionSpec {
        name: "dim_geolocation",
        source: SourceTable::Geolocation,
    },
    DimensionSpec {
        name: "dim_orders",
        source: SourceTable::Orders,
    },
    DimensionSpec {
        name: "dim_payments",
        source: SourceTable::Payments,
    },
    DimensionSpec {
        name: "dim_reviews",
        source: SourceTable::Reviews,
    },
];

pub const FACT_ORDER_DETAILS: &str = "fact_order_details";
