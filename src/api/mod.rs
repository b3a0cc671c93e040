pub mod akira;
pub mod client;
pub mod fastmirror;
pub mod mcsl;
pub mod models;
pub mod polars;
pub mod source;

use std::sync::Arc;

pub use client::{ApiError, CatalogClient, Result};
pub use models::ApiConfig;
pub use source::CatalogSource;

use crate::domain::McslCategory;

/// Every catalog source the application knows, sharing one HTTP client.
pub fn default_sources(client: &CatalogClient, config: &ApiConfig) -> Vec<Arc<dyn CatalogSource>> {
    let mut sources: Vec<Arc<dyn CatalogSource>> = McslCategory::ALL
        .iter()
        .map(|category| {
            Arc::new(mcsl::McslSource::new(client.clone(), &config.mcsl_base, *category))
                as Arc<dyn CatalogSource>
        })
        .collect();

    sources.push(Arc::new(fastmirror::FastMirrorSource::new(
        client.clone(),
        &config.fastmirror_base,
    )));
    sources.push(Arc::new(polars::PolarsSource::new(
        client.clone(),
        &config.polars_base,
    )));
    sources.push(Arc::new(akira::AkiraSource::new(
        client.clone(),
        &config.akira_base,
    )));
    sources
}
