use tracing::info;

use super::client::{CatalogClient, Result};
use super::models::{PolarsCoreFile, PolarsCoreType};
use super::source::{require_key, CatalogSource};
use crate::domain::{CatalogEntry, SourceId, SourceResult};
use crate::utils::{join_url, split_filename};

/// Two-tier source: core type → core file.
pub struct PolarsSource {
    client: CatalogClient,
    base_url: String,
}

impl PolarsSource {
    pub fn new(client: CatalogClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn fetch_types(&self) -> Result<Vec<CatalogEntry>> {
        let url = join_url(&self.base_url, &["api", "query", "minecraft", "core"])?;
        let types: Vec<PolarsCoreType> = self.client.get_json(&url).await?;
        info!(count = types.len(), "Polars core types loaded");
        adapt_types(&self.base_url, &types)
    }

    pub async fn fetch_cores(&self, type_id: &str) -> Result<Vec<CatalogEntry>> {
        let url = join_url(&self.base_url, &["api", "query", "minecraft", "core", type_id])?;
        let files: Vec<PolarsCoreFile> = self.client.get_json(&url).await?;
        adapt_core_files(files)
    }
}

pub fn adapt_types(base_url: &str, types: &[PolarsCoreType]) -> Result<Vec<CatalogEntry>> {
    types
        .iter()
        .map(|t| -> Result<CatalogEntry> {
            let id = t.id.to_string();
            let url = join_url(base_url, &["api", "query", "minecraft", "core", id.as_str()])?;
            Ok(CatalogEntry::new(&t.name, url, &t.name, "")?
                .with_key(id)
                .with_label(t.description.clone()))
        })
        .collect()
}

/// Upstream lists oldest first; reversed so the newest file leads.
pub fn adapt_core_files(files: Vec<PolarsCoreFile>) -> Result<Vec<CatalogEntry>> {
    files
        .iter()
        .rev()
        .map(|file| -> Result<CatalogEntry> {
            let (stem, format) = split_filename(&file.name);
            Ok(CatalogEntry::new(&file.name, &file.download_url, stem, format)?)
        })
        .collect()
}

#[async_trait::async_trait]
impl CatalogSource for PolarsSource {
    fn id(&self) -> SourceId {
        SourceId::Polars
    }

    async fn fetch(&self, level: usize, parents: &[String]) -> SourceResult {
        let result = match level {
            0 => self.fetch_types().await,
            _ => match require_key(parents, 0, "type") {
                Ok(type_id) => self.fetch_cores(type_id).await,
                Err(e) => Err(e),
            },
        };

        match result {
            Ok(entries) => SourceResult::from_entries(entries),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn source(server: &mockito::Server) -> PolarsSource {
        let client = CatalogClient::new(Duration::from_secs(5)).unwrap();
        PolarsSource::new(client, server.url())
    }

    #[tokio::test]
    async fn test_types_keyed_by_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/query/minecraft/core")
            .with_status(200)
            .with_body(r#"[{"id": 3, "name": "Mohist", "description": "Forge + Bukkit"}]"#)
            .create_async()
            .await;

        let result = source(&server).fetch(0, &[]).await;
        let entry = &result.entries()[0];
        assert_eq!(entry.key(), "3");
        assert_eq!(entry.title(), "Mohist");
        assert_eq!(entry.label(), Some("Forge + Bukkit"));
    }

    #[tokio::test]
    async fn test_core_files_newest_first() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/query/minecraft/core/3")
            .with_status(200)
            .with_body(
                r#"[
                {"name": "mohist-1.19.2-100.jar", "downloadUrl": "https://mirror.example/mohist-100.jar"},
                {"name": "mohist-1.20.1-200.jar", "downloadUrl": "https://mirror.example/mohist-200.jar"}
            ]"#,
            )
            .create_async()
            .await;

        let result = source(&server).fetch(1, &["3".to_string()]).await;
        let entries = result.entries();
        assert_eq!(entries[0].disk_name(), "mohist-1.20.1-200.jar");
        assert_eq!(entries[1].title(), "mohist-1.19.2-100.jar");
    }

    #[tokio::test]
    async fn test_empty_core_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/query/minecraft/core/9")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        assert_eq!(
            source(&server).fetch(1, &["9".to_string()]).await,
            SourceResult::Empty
        );
    }
}
