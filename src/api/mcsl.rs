use tracing::info;

use super::client::{CatalogClient, Result};
use super::models::McslDownloadList;
use super::source::CatalogSource;
use crate::domain::{CatalogEntry, McslCategory, SourceId, SourceResult};
use crate::utils::join_url;

/// Flat-list source: one document per category, no drill-down.
pub struct McslSource {
    client: CatalogClient,
    base_url: String,
    category: McslCategory,
}

impl McslSource {
    pub fn new(client: CatalogClient, base_url: impl Into<String>, category: McslCategory) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            category,
        }
    }

    fn document_url(&self) -> Result<String> {
        Ok(join_url(
            &self.base_url,
            &[&format!("{}DownloadInfo.json", self.category.document())],
        )?)
    }

    pub async fn fetch_files(&self) -> Result<Vec<CatalogEntry>> {
        let list: McslDownloadList = self.client.get_json(&self.document_url()?).await?;
        let entries = adapt_download_list(list)?;
        info!(source = %self.id(), count = entries.len(), "MCSL list loaded");
        Ok(entries)
    }
}

/// Upstream lists oldest first; the last item becomes the first entry.
pub fn adapt_download_list(list: McslDownloadList) -> Result<Vec<CatalogEntry>> {
    let mut entries = Vec::with_capacity(list.items.len());
    for item in list.items.into_iter().rev() {
        let entry = CatalogEntry::new(&item.name, &item.url, &item.filename, &item.format)?
            .with_key(item.url);
        entries.push(entry);
    }
    Ok(entries)
}

#[async_trait::async_trait]
impl CatalogSource for McslSource {
    fn id(&self) -> SourceId {
        SourceId::Mcsl(self.category)
    }

    async fn fetch(&self, _level: usize, _parents: &[String]) -> SourceResult {
        match self.fetch_files().await {
            Ok(entries) => SourceResult::from_entries(entries),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const JAVA_LIST: &str = r#"{"MCSLDownloadList": [
        {"name": "Java 8", "url": "https://dl.example.com/java8.zip", "format": "zip", "filename": "Java8"},
        {"name": "Java 17", "url": "https://dl.example.com/java17.zip", "format": "zip", "filename": "Java17"}
    ]}"#;

    fn source(server: &mockito::Server) -> McslSource {
        let client = CatalogClient::new(Duration::from_secs(5)).unwrap();
        McslSource::new(client, server.url(), McslCategory::Java)
    }

    #[tokio::test]
    async fn test_fetch_reverses_upstream_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/JavaDownloadInfo.json")
            .with_status(200)
            .with_body(JAVA_LIST)
            .create_async()
            .await;

        let result = source(&server).fetch(0, &[]).await;
        let titles: Vec<_> = result.entries().iter().map(|e| e.title()).collect();
        assert_eq!(titles, vec!["Java 17", "Java 8"]);
        assert_eq!(result.entries()[0].disk_name(), "Java17.zip");
    }

    #[tokio::test]
    async fn test_empty_list_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/JavaDownloadInfo.json")
            .with_status(200)
            .with_body(r#"{"MCSLDownloadList": []}"#)
            .create_async()
            .await;

        assert_eq!(source(&server).fetch(0, &[]).await, SourceResult::Empty);
    }

    #[tokio::test]
    async fn test_missing_field_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/JavaDownloadInfo.json")
            .with_status(200)
            .with_body(r#"{"MCSLDownloadList": [{"name": "Java 8"}]}"#)
            .create_async()
            .await;

        assert!(matches!(
            source(&server).fetch(0, &[]).await,
            SourceResult::ParseError(_)
        ));
    }

    #[test]
    fn test_relative_url_rejected() {
        let list: McslDownloadList = serde_json::from_str(
            r#"{"MCSLDownloadList": [{"name": "x", "url": "java8.zip", "format": "zip", "filename": "x"}]}"#,
        )
        .unwrap();
        assert!(adapt_download_list(list).is_err());
    }
}
