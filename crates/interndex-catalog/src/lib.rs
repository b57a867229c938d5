//! Catalog pipeline: tag aggregation, filter/sort derivation and load orchestration.

mod aggregate;
mod config;
mod load;
mod rules;
mod view;

pub use aggregate::aggregate_tags;
pub use config::{AppConfig, DEFAULT_SHEET_ID};
pub use load::{Catalog, CatalogHandle, CatalogLoader, CatalogSummary, LoadState};
pub use rules::{PositionRule, PositionRules};
pub use view::{
    days_left, deadline_text, derive_view, featured, listing_detail, stipend_amount_value,
    Featured, FeaturedMode, ListingDetail, SortKey, ViewQuery, CLOSING_SOON_DAYS, FEATURED_LIMIT,
};

pub const CRATE_NAME: &str = "interndex-catalog";

/// Loads the catalog once using environment configuration.
pub async fn load_catalog_from_env() -> anyhow::Result<Catalog> {
    let config = AppConfig::from_env();
    CatalogLoader::from_config(&config)?.load().await
}
