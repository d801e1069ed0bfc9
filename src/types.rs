use crate::path_update::PathUpdateReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_REPO: &str = "kokofixcomputers/Commitify";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallerSettings {
    #[serde(default = "default_repo")]
    pub repo: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_repo() -> String {
    DEFAULT_REPO.to_string()
}
fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            repo: default_repo(),
            api_url: default_api_url(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Release object as returned by the GitHub releases API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub download_url: String,
}

impl Asset {
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            download_url: download_url.into(),
        }
    }
}

impl From<GitHubAsset> for Asset {
    fn from(asset: GitHubAsset) -> Self {
        Self::new(asset.name, asset.browser_download_url)
    }
}

/// Tags in the order the release directory returned them, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseList {
    pub tags: Vec<String>,
    pub latest: Option<String>,
}

impl ReleaseList {
    pub fn from_releases(releases: Vec<GitHubRelease>) -> Self {
        let tags: Vec<String> = releases.into_iter().map(|r| r.tag_name).collect();
        let latest = tags.first().cloned();
        Self { tags, latest }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallAction {
    Installed,
    Updated,
}

impl fmt::Display for InstallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallAction::Installed => write!(f, "installed"),
            InstallAction::Updated => write!(f, "updated"),
        }
    }
}

#[derive(Debug)]
pub struct InstallOutcome {
    pub action: InstallAction,
    pub tag: String,
    pub asset: Asset,
    pub binary_path: PathBuf,
    pub bytes_written: u64,
    pub path_update: PathUpdateReport,
}
