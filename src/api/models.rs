use serde::{Deserialize, Serialize};

/// Body of an MCSL `<Category>DownloadInfo.json` document
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McslDownloadList {
    #[serde(rename = "MCSLDownloadList")]
    pub items: Vec<McslItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McslItem {
    pub name: String,
    pub url: String,
    pub format: String,
    pub filename: String,
}

/// FastMirror wraps every payload in `{"data": ...}`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FastMirrorEnvelope<T> {
    pub data: T,
}

/// One core in the FastMirror core list (`/api/v3`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FastMirrorCore {
    pub name: String,
    pub tag: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub recommend: bool,
    #[serde(default)]
    pub mc_versions: Vec<String>,
}

/// Page of builds for one core and Minecraft version (`/api/v3/{name}/{mc}`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FastMirrorBuildPage {
    pub builds: Vec<FastMirrorBuild>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FastMirrorBuild {
    pub name: String,
    pub mc_version: String,
    pub core_version: String,
    pub update_time: String,
    #[serde(default)]
    pub sha1: String,
}

/// Core type in the Polars mirror
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolarsCoreType {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PolarsCoreFile {
    pub name: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

/// File list for one Akira Cloud type
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AkiraFileList {
    pub name: String,
    pub list: Vec<String>,
}

/// Base URLs of every catalog source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub mcsl_base: String,
    pub fastmirror_base: String,
    pub polars_base: String,
    pub akira_base: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            mcsl_base: "https://api.mcsl.com.cn/DownloadAPI".to_string(),
            fastmirror_base: "https://download.fastmirror.net".to_string(),
            polars_base: "https://mirror.polars.cc".to_string(),
            akira_base: "https://mirror.akiracloud.net".to_string(),
        }
    }
}
