use chrono::NaiveDateTime;
use tracing::info;

use super::client::{ApiError, CatalogClient, Result};
use super::models::{FastMirrorBuildPage, FastMirrorCore, FastMirrorEnvelope};
use super::source::{require_key, CatalogSource};
use crate::domain::{CatalogEntry, SourceId, SourceResult};
use crate::utils::join_url;

const BUILD_PAGE_LIMIT: u32 = 25;

/// Presentable label for a FastMirror tag code.
pub fn tag_label(tag: &str) -> Result<&'static str> {
    match tag {
        "vanilla" => Ok("Vanilla"),
        "pure" => Ok("Plugin"),
        "mod" => Ok("Mod"),
        "hybrid" => Ok("Hybrid"),
        "bedrock" => Ok("Bedrock"),
        "proxy" => Ok("Proxy"),
        other => Err(ApiError::UnknownTag(other.to_string())),
    }
}

/// Tiered source: core type → Minecraft version → build.
pub struct FastMirrorSource {
    client: CatalogClient,
    base_url: String,
}

impl FastMirrorSource {
    pub fn new(client: CatalogClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Level 0: every core the mirror hosts.
    pub async fn fetch_types(&self) -> Result<Vec<CatalogEntry>> {
        let url = join_url(&self.base_url, &["api", "v3"])?;
        let body: FastMirrorEnvelope<Vec<FastMirrorCore>> = self.client.get_json(&url).await?;
        let entries = adapt_cores(&self.base_url, &body.data)?;
        info!(count = entries.len(), "FastMirror core list loaded");
        Ok(entries)
    }

    /// Level 1: Minecraft versions of one core.
    pub async fn fetch_versions(&self, name: &str) -> Result<Vec<CatalogEntry>> {
        let url = join_url(&self.base_url, &["api", "v3", name])?;
        let body: FastMirrorEnvelope<FastMirrorCore> = self.client.get_json(&url).await?;
        version_entries(&self.base_url, name, &body.data.mc_versions)
    }

    /// Level 2: builds of one core for one Minecraft version, newest first.
    pub async fn fetch_builds(&self, name: &str, mc_version: &str) -> Result<Vec<CatalogEntry>> {
        let url = format!(
            "{}?offset=0&limit={}",
            join_url(&self.base_url, &["api", "v3", name, mc_version])?,
            BUILD_PAGE_LIMIT
        );
        let body: FastMirrorEnvelope<FastMirrorBuildPage> = self.client.get_json(&url).await?;
        adapt_builds(&self.base_url, name, mc_version, body.data)
    }
}

pub fn adapt_cores(base_url: &str, cores: &[FastMirrorCore]) -> Result<Vec<CatalogEntry>> {
    cores
        .iter()
        .map(|core| -> Result<CatalogEntry> {
            let label = tag_label(&core.tag)?;
            let url = join_url(base_url, &["api", "v3", core.name.as_str()])?;
            Ok(CatalogEntry::new(&core.name, url, &core.name, "")?.with_label(label))
        })
        .collect()
}

/// Entries for the version level of `name`, in upstream order.
pub fn version_entries(base_url: &str, name: &str, mc_versions: &[String]) -> Result<Vec<CatalogEntry>> {
    mc_versions
        .iter()
        .map(|version| -> Result<CatalogEntry> {
            let url = join_url(base_url, &["api", "v3", name, version.as_str()])?;
            Ok(CatalogEntry::new(version, url, format!("{}-{}", name, version), "")?)
        })
        .collect()
}

pub fn adapt_builds(
    base_url: &str,
    name: &str,
    mc_version: &str,
    page: FastMirrorBuildPage,
) -> Result<Vec<CatalogEntry>> {
    let mut builds = page.builds;
    // Unparseable timestamps sort last; the sort is stable for equal times.
    builds.sort_by(|a, b| parse_time(&b.update_time).cmp(&parse_time(&a.update_time)));

    builds
        .iter()
        .map(|build| -> Result<CatalogEntry> {
            let url = join_url(
                base_url,
                &["download", name, mc_version, build.core_version.as_str()],
            )?;
            let filename = format!("{}-{}-{}", name, mc_version, build.core_version);
            Ok(CatalogEntry::new(&build.core_version, url, filename, "jar")?
                .with_label(build.update_time.replace('T', " ")))
        })
        .collect()
}

fn parse_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").ok()
}

#[async_trait::async_trait]
impl CatalogSource for FastMirrorSource {
    fn id(&self) -> SourceId {
        SourceId::FastMirror
    }

    async fn fetch(&self, level: usize, parents: &[String]) -> SourceResult {
        let result = match level {
            0 => self.fetch_types().await,
            1 => match require_key(parents, 0, "type") {
                Ok(name) => self.fetch_versions(name).await,
                Err(e) => Err(e),
            },
            _ => match (
                require_key(parents, 0, "type"),
                require_key(parents, 1, "mcVersion"),
            ) {
                (Ok(name), Ok(version)) => self.fetch_builds(name, version).await,
                (Err(e), _) | (_, Err(e)) => Err(e),
            },
        };

        match result {
            Ok(entries) => SourceResult::from_entries(entries),
            Err(e) => e.into(),
        }
    }
}
