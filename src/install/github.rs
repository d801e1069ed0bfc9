//! GitHub releases API client
//!
//! Lists the published release tags of the Commitify repository, fetches the
//! asset list of one release, and streams an asset to disk.

use crate::download::stream_to_file;
use crate::types::{Asset, GitHubRelease, InstallerSettings, ReleaseList};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

const USER_AGENT: &str = concat!("commitify-installer/", env!("CARGO_PKG_VERSION"));

/// Failure to talk to the release directory.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("Invalid API URL '{url}': {reason}")]
    InvalidApiUrl { url: String, reason: String },
    #[error("Release tag '{tag}' not found in {repo}")]
    TagNotFound { repo: String, tag: String },
    #[error("Request to {url} failed: {status}")]
    RequestFailed { url: String, status: StatusCode },
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The three calls the installer makes against a release directory.
pub trait ReleaseSource: Send + Sync {
    fn list_releases(&self) -> impl Future<Output = Result<ReleaseList, ReleaseError>> + Send;

    fn get_release(
        &self,
        tag: &str,
    ) -> impl Future<Output = Result<Vec<Asset>, ReleaseError>> + Send;

    /// Streams the asset content into `out`, returning the bytes written.
    fn download(
        &self,
        asset: &Asset,
        out: &mut File,
    ) -> impl Future<Output = Result<u64, ReleaseError>> + Send;
}

#[derive(Debug, Clone)]
pub struct GitHubReleases {
    client: reqwest::Client,
    api_url: Url,
    repo: String,
    timeout: Duration,
}

impl GitHubReleases {
    pub fn new(settings: &InstallerSettings) -> Result<Self, ReleaseError> {
        let invalid = |reason: String| ReleaseError::InvalidApiUrl {
            url: settings.api_url.clone(),
            reason,
        };
        let api_url = Url::parse(&settings.api_url).map_err(|e| invalid(e.to_string()))?;
        if api_url.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if let Ok(value) = HeaderValue::from_str(&format!("token {}", token)) {
                headers.insert(AUTHORIZATION, value);
                tracing::debug!("Using GITHUB_TOKEN");
            }
        }

        let timeout = Duration::from_secs(settings.http_timeout_secs);
        // Downloads are only bounded by the connect timeout; API calls by the full one
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_url,
            repo: settings.repo.clone(),
            timeout,
        })
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// `{api}/repos/{owner}/{name}/` followed by `segments`, each one
    /// percent-encoded.
    fn repo_endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        // `new` rejects URLs that cannot be a base, so the path is writable
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push("repos")
                .extend(self.repo.split('/'))
                .extend(segments);
        }
        url
    }

    pub fn releases_url(&self) -> String {
        let mut url = self.repo_endpoint(&["releases"]);
        url.set_query(Some("per_page=100"));
        url.into()
    }

    pub fn release_url(&self, tag: &str) -> String {
        self.repo_endpoint(&["releases", "tags", tag]).into()
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        tag: Option<&str>,
    ) -> Result<T, ReleaseError> {
        tracing::debug!("Fetching {}", url);
        let response = self.client.get(url).timeout(self.timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            if let (StatusCode::NOT_FOUND, Some(tag)) = (status, tag) {
                return Err(ReleaseError::TagNotFound {
                    repo: self.repo.clone(),
                    tag: tag.to_string(),
                });
            }
            return Err(ReleaseError::RequestFailed {
                url: url.to_string(),
                status,
            });
        }

        Ok(response.json().await?)
    }

    pub async fn list_releases(&self) -> Result<ReleaseList, ReleaseError> {
        let releases: Vec<GitHubRelease> = self.get_json(&self.releases_url(), None).await?;
        let list = ReleaseList::from_releases(releases);
        tracing::info!("Found {} releases of {}", list.tags.len(), self.repo);
        Ok(list)
    }

    pub async fn get_release(&self, tag: &str) -> Result<Vec<Asset>, ReleaseError> {
        let release: GitHubRelease = self.get_json(&self.release_url(tag), Some(tag)).await?;
        Ok(release.assets.into_iter().map(Asset::from).collect())
    }

    pub async fn download(&self, asset: &Asset, out: &mut File) -> Result<u64, ReleaseError> {
        tracing::info!("Downloading {}...", asset.name);
        let response = self.client.get(&asset.download_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReleaseError::RequestFailed {
                url: asset.download_url.clone(),
                status,
            });
        }

        stream_to_file(response, out, &asset.name).await
    }
}

impl ReleaseSource for GitHubReleases {
    async fn list_releases(&self) -> Result<ReleaseList, ReleaseError> {
        GitHubReleases::list_releases(self).await
    }

    async fn get_release(&self, tag: &str) -> Result<Vec<Asset>, ReleaseError> {
        GitHubReleases::get_release(self, tag).await
    }

    async fn download(&self, asset: &Asset, out: &mut File) -> Result<u64, ReleaseError> {
        GitHubReleases::download(self, asset, out).await
    }
}

/// Fetches the release list on a background task. The receiver yields
/// exactly one result.
pub fn spawn_release_listing<S>(source: S) -> oneshot::Receiver<Result<ReleaseList, ReleaseError>>
where
    S: ReleaseSource + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = source.list_releases().await;
        if tx.send(result).is_err() {
            tracing::debug!("Release listing finished after the receiver was dropped");
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Read, Seek, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    const RELEASE_PATH: &str = "/repos/kokofixcomputers/Commitify/releases";

    fn client(api_url: &str) -> GitHubReleases {
        let settings = InstallerSettings {
            api_url: api_url.to_string(),
            ..InstallerSettings::default()
        };
        GitHubReleases::new(&settings).unwrap()
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    fn read_request_path(stream: &TcpStream) -> String {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                break;
            }
        }
        request_line
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
            .to_string()
    }

    /// Serves raw HTTP replies keyed by request path (query included) on a
    /// loopback port, one connection at a time. Unknown paths get a 404.
    /// `routes` receives the server's base URL so payloads can link back to it.
    fn serve(routes: impl FnOnce(&str) -> Vec<(String, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let routes: HashMap<String, String> = routes(&base).into_iter().collect();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let path = read_request_path(&stream);
                let reply = routes
                    .get(&path)
                    .cloned()
                    .unwrap_or_else(|| response("404 Not Found", ""));
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        base
    }

    fn route(path: &str, reply: String) -> (String, String) {
        (path.to_string(), reply)
    }

    #[test]
    fn test_release_urls() {
        let gh = client("https://api.github.com/");
        assert_eq!(gh.repo(), "kokofixcomputers/Commitify");
        assert_eq!(
            gh.releases_url(),
            "https://api.github.com/repos/kokofixcomputers/Commitify/releases?per_page=100"
        );
        assert_eq!(
            gh.release_url("v1.2.0"),
            "https://api.github.com/repos/kokofixcomputers/Commitify/releases/tags/v1.2.0"
        );
    }

    #[test]
    fn test_release_url_encodes_tag() {
        let gh = client("https://api.github.com");
        assert_eq!(
            gh.release_url("nightly/v1.0#2 rc?"),
            "https://api.github.com/repos/kokofixcomputers/Commitify/releases/tags/nightly%2Fv1.0%232%20rc%3F"
        );

        let enterprise = client("https://ghe.example.com/api/v3/");
        assert_eq!(
            enterprise.release_url("v1.0.0"),
            "https://ghe.example.com/api/v3/repos/kokofixcomputers/Commitify/releases/tags/v1.0.0"
        );
    }

    #[test]
    fn test_invalid_api_url_is_rejected() {
        for api_url in ["not a url", "mailto:someone@example.com"] {
            let settings = InstallerSettings {
                api_url: api_url.to_string(),
                ..InstallerSettings::default()
            };
            let err = GitHubReleases::new(&settings).unwrap_err();
            assert!(matches!(err, ReleaseError::InvalidApiUrl { .. }), "{}", api_url);
        }
    }

    #[test]
    fn test_release_list_from_api_payload() {
        let payload = r#"[
            {"tag_name": "v1.1.0", "assets": [
                {"name": "commitify-linux", "browser_download_url": "https://dl/linux", "size": 10}
            ], "draft": false},
            {"tag_name": "v1.0.0", "assets": []}
        ]"#;
        let releases: Vec<GitHubRelease> = serde_json::from_str(payload).unwrap();

        let list = ReleaseList::from_releases(releases);

        assert_eq!(list.tags, vec!["v1.1.0", "v1.0.0"]);
        assert_eq!(list.latest.as_deref(), Some("v1.1.0"));
        assert_eq!(ReleaseList::from_releases(vec![]).latest, None);
    }

    #[test]
    fn test_assets_from_release_payload() {
        let payload = r#"{"tag_name": "v1.1.0", "assets": [
            {"name": "commitify-macos", "browser_download_url": "https://dl/macos"},
            {"name": "commitify-linux", "browser_download_url": "https://dl/linux"}
        ]}"#;
        let release: GitHubRelease = serde_json::from_str(payload).unwrap();
        let assets: Vec<Asset> = release.assets.into_iter().map(Asset::from).collect();

        assert_eq!(
            assets,
            vec![
                Asset::new("commitify-macos", "https://dl/macos"),
                Asset::new("commitify-linux", "https://dl/linux"),
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_a_network_error() {
        // Nothing listens on the discard port of the loopback address
        let gh = client("http://127.0.0.1:9");

        let err = gh.get_release("v1.0.0").await.unwrap_err();
        assert!(matches!(err, ReleaseError::Transport(_)));

        let rx = spawn_release_listing(gh);
        let result = rx.await.unwrap();
        assert!(matches!(result, Err(ReleaseError::Transport(_))));
    }

    #[tokio::test]
    async fn test_list_releases_from_server() {
        let base = serve(|_| {
            vec![route(
                &format!("{}?per_page=100", RELEASE_PATH),
                response(
                    "200 OK",
                    r#"[{"tag_name": "v1.1.0", "assets": []}, {"tag_name": "v1.0.0"}]"#,
                ),
            )]
        });

        let list = client(&base).list_releases().await.unwrap();

        assert_eq!(list.tags, vec!["v1.1.0", "v1.0.0"]);
        assert_eq!(list.latest.as_deref(), Some("v1.1.0"));
    }

    #[tokio::test]
    async fn test_missing_tag_is_tag_not_found() {
        let base = serve(|_| Vec::new());

        let err = client(&base).get_release("x").await.unwrap_err();

        match err {
            ReleaseError::TagNotFound { repo, tag } => {
                assert_eq!(repo, "kokofixcomputers/Commitify");
                assert_eq!(tag, "x");
            }
            other => panic!("expected TagNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_request_failed() {
        let base = serve(|_| {
            vec![
                route(
                    &format!("{}?per_page=100", RELEASE_PATH),
                    response("500 Internal Server Error", ""),
                ),
                route(
                    &format!("{}/tags/v1.0.0", RELEASE_PATH),
                    response("503 Service Unavailable", ""),
                ),
            ]
        });
        let gh = client(&base);

        match gh.list_releases().await.unwrap_err() {
            ReleaseError::RequestFailed { url, status } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(url, gh.releases_url());
            }
            other => panic!("expected RequestFailed, got {:?}", other),
        }

        // Only a 404 means the tag is unknown
        let err = gh.get_release("v1.0.0").await.unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::RequestFailed { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }

    #[tokio::test]
    async fn test_download_streams_body_into_file() {
        let base = serve(|_| vec![route("/dl/commitify-linux", response("200 OK", "#!/bin/sh\n"))]);
        let asset = Asset::new("commitify-linux", format!("{}/dl/commitify-linux", base));
        let mut out = tempfile::tempfile().unwrap();

        let written = client(&base).download(&asset, &mut out).await.unwrap();

        let mut content = String::new();
        out.rewind().unwrap();
        out.read_to_string(&mut content).unwrap();
        assert_eq!(written, 10);
        assert_eq!(content, "#!/bin/sh\n");
    }

    #[tokio::test]
    async fn test_missing_asset_is_request_failed() {
        let base = serve(|_| Vec::new());
        let asset = Asset::new("commitify-linux", format!("{}/dl/commitify-linux", base));
        let mut out = tempfile::tempfile().unwrap();

        let err = client(&base).download(&asset, &mut out).await.unwrap_err();

        match err {
            ReleaseError::RequestFailed { url, status } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(url, asset.download_url);
            }
            other => panic!("expected RequestFailed, got {:?}", other),
        }
        assert_eq!(out.metadata().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_truncated_download_is_an_error() {
        let truncated =
            "HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\n0123456789".to_string();
        let base = serve(|_| vec![route("/dl/commitify-linux", truncated)]);
        let asset = Asset::new("commitify-linux", format!("{}/dl/commitify-linux", base));
        let mut out = tempfile::tempfile().unwrap();

        let err = client(&base).download(&asset, &mut out).await.unwrap_err();

        assert!(
            matches!(err, ReleaseError::Transport(_) | ReleaseError::Io(_)),
            "unexpected error: {:?}",
            err
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_install_from_server_keeps_previous_binary_on_failure() {
        use crate::install::{InstallError, Installer};
        use crate::platform::LinuxPolicy;
        use crate::types::InstallAction;

        const SCRIPT: &str = "#!/bin/sh\necho hi\n";
        let base = serve(|base| {
            let release = |tag: &str, file: &str| {
                let body = format!(
                    r#"{{"tag_name": "{}", "assets": [
                        {{"name": "commitify-macos", "browser_download_url": "{}/dl/macos"}},
                        {{"name": "commitify-linux", "browser_download_url": "{}/dl/{}"}}
                    ]}}"#,
                    tag, base, base, file
                );
                route(&format!("{}/tags/{}", RELEASE_PATH, tag), response("200 OK", &body))
            };
            vec![
                release("v1", "linux-v1"),
                release("v2", "linux-v2"),
                release("v3", "linux-v3"),
                route("/dl/linux-v1", response("200 OK", SCRIPT)),
                route(
                    "/dl/linux-v2",
                    "HTTP/1.1 200 OK\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n#!/bin/sh\n"
                        .to_string(),
                ),
            ]
        });
        let home = tempfile::tempdir().unwrap();
        let installer = Installer::new(client(&base), Box::new(LinuxPolicy), home.path());

        let outcome = installer.install_or_update("v1").await.unwrap();
        assert_eq!(outcome.action, InstallAction::Installed);
        assert_eq!(outcome.asset.name, "commitify-linux");
        assert_eq!(outcome.bytes_written, SCRIPT.len() as u64);
        assert!(installer.is_installed());

        let truncated = installer.install_or_update("v2").await.unwrap_err();
        assert!(matches!(truncated, InstallError::Download { .. }), "{:?}", truncated);

        let missing_asset = installer.install_or_update("v3").await.unwrap_err();
        assert!(matches!(
            missing_asset,
            InstallError::Download {
                source: ReleaseError::RequestFailed { status, .. },
                ..
            } if status == StatusCode::NOT_FOUND
        ));

        let unknown_tag = installer.install_or_update("v9").await.unwrap_err();
        assert!(matches!(
            unknown_tag,
            InstallError::Network { source: ReleaseError::TagNotFound { .. }, .. }
        ));

        assert_eq!(std::fs::read_to_string(installer.binary_path()).unwrap(), SCRIPT);
        assert!(installer.is_installed());
        let entries: Vec<_> = std::fs::read_dir(installer.install_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["commitify"]);
    }
}
