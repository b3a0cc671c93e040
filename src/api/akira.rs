use tracing::info;

use super::client::{CatalogClient, Result};
use super::models::AkiraFileList;
use super::source::{require_key, CatalogSource};
use crate::domain::{CatalogEntry, SourceId, SourceResult};
use crate::utils::{join_url, split_filename};

/// Simple-list source: plain type names, then plain file names per type.
pub struct AkiraSource {
    client: CatalogClient,
    base_url: String,
}

impl AkiraSource {
    pub fn new(client: CatalogClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn fetch_types(&self) -> Result<Vec<CatalogEntry>> {
        let url = join_url(&self.base_url, &["api", "types"])?;
        let names: Vec<String> = self.client.get_json(&url).await?;
        info!(count = names.len(), "Akira Cloud types loaded");

        names
            .iter()
            .map(|name| -> Result<CatalogEntry> {
                let url = join_url(&self.base_url, &["api", "types", name.as_str()])?;
                Ok(CatalogEntry::new(name, url, name, "")?)
            })
            .collect()
    }

    pub async fn fetch_files(&self, core_type: &str) -> Result<Vec<CatalogEntry>> {
        let url = join_url(&self.base_url, &["api", "types", core_type])?;
        let body: AkiraFileList = self.client.get_json(&url).await?;
        adapt_file_list(&self.base_url, core_type, &body)
    }
}

/// Files are served from `{base}/{type}/{file}`.
pub fn adapt_file_list(base_url: &str, core_type: &str, body: &AkiraFileList) -> Result<Vec<CatalogEntry>> {
    body.list
        .iter()
        .map(|file| -> Result<CatalogEntry> {
            let (stem, format) = split_filename(file);
            let url = join_url(base_url, &[core_type, file.as_str()])?;
            Ok(CatalogEntry::new(file, url, stem, format)?)
        })
        .collect()
}

#[async_trait::async_trait]
impl CatalogSource for AkiraSource {
    fn id(&self) -> SourceId {
        SourceId::Akira
    }

    async fn fetch(&self, level: usize, parents: &[String]) -> SourceResult {
        let result = match level {
            0 => self.fetch_types().await,
            _ => match require_key(parents, 0, "type") {
                Ok(core_type) => self.fetch_files(core_type).await,
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

    fn source(server: &mockito::Server) -> AkiraSource {
        let client = CatalogClient::new(Duration::from_secs(5)).unwrap();
        AkiraSource::new(client, server.url())
    }

    #[tokio::test]
    async fn test_types_and_files() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/types")
            .with_status(200)
            .with_body(r#"["Paper", "Purpur"]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/types/Purpur")
            .with_status(200)
            .with_body(r#"{"name": "Purpur", "list": ["purpur-1.20.1-2062.jar"]}"#)
            .create_async()
            .await;

        let src = source(&server);
        let types = src.fetch(0, &[]).await;
        assert_eq!(types.entries()[1].key(), "Purpur");

        let files = src.fetch(1, &["Purpur".to_string()]).await;
        let entry = &files.entries()[0];
        assert_eq!(entry.disk_name(), "purpur-1.20.1-2062.jar");
        assert_eq!(entry.url(), format!("{}/Purpur/purpur-1.20.1-2062.jar", server.url()));
    }

    #[test]
    fn test_file_names_are_encoded_as_one_segment() {
        let body = AkiraFileList {
            name: "Paper".to_string(),
            list: vec!["paper build #12.jar".to_string()],
        };
        let entries = adapt_file_list("https://mirror.example", "Paper", &body).unwrap();
        let entry = &entries[0];
        assert_eq!(entry.url(), "https://mirror.example/Paper/paper%20build%20%2312.jar");
        assert_eq!(entry.disk_name(), "paper build #12.jar");

        let parsed = url::Url::parse(entry.url()).unwrap();
        assert_eq!(parsed.fragment(), None);
        assert_eq!(parsed.path_segments().unwrap().last(), Some("paper%20build%20%2312.jar"));
    }

    #[tokio::test]
    async fn test_wrong_shape_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/types")
            .with_status(200)
            .with_body(r#"{"types": ["Paper"]}"#)
            .create_async()
            .await;

        assert!(matches!(
            source(&server).fetch(0, &[]).await,
            SourceResult::ParseError(_)
        ));
    }
}
