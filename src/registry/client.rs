//! Remote repository client
//!
//! Fetches repository and container registry indexes over HTTP, or reads
//! them from a local mirror directory, with retry and exponential backoff.

use std::path::Path;
use std::time::Duration;

use crate::config::defaults;
use crate::core::config::RepositoryConfig;
use crate::core::repository::{RepoKind, Repository, RepositoryIndex};
use crate::error::RepositoryError;
use crate::infra::filesystem;
use crate::registry::cache::SnapshotCache;

/// Client for remote binary sources
#[derive(Debug, Clone)]
pub struct RepositoryClient {
    /// HTTP client
    client: reqwest::Client,
    /// Maximum attempts per fetch
    max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds)
    base_delay_ms: u64,
}

impl RepositoryClient {
    /// Create a new client with default retry settings
    pub fn new() -> Self {
        Self::with_config(defaults::MAX_FETCH_RETRIES, 500)
    }

    /// Create a client with custom retry settings
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .connect_timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            max_retries: max_retries.max(1),
            base_delay_ms,
        }
    }

    /// Index file name served by a source of `kind`
    pub fn index_file(kind: RepoKind) -> &'static str {
        match kind {
            RepoKind::RemoteRegistry => defaults::REGISTRY_INDEX_REMOTE,
            RepoKind::RemoteRepo | RepoKind::Local => defaults::REPO_INDEX_REMOTE,
        }
    }

    /// Fetch the index of one configured source
    pub async fn fetch(&self, config: &RepositoryConfig) -> Result<RepositoryIndex, RepositoryError> {
        let file = Self::index_file(config.kind);
        if let Some(url) = &config.url {
            let url = format!("{}/{}", url.trim_end_matches('/'), file);
            return self.fetch_url(&url).await;
        }
        if let Some(path) = &config.path {
            return read_index(&path.join(file));
        }
        Err(RepositoryError::NoLocation {
            name: config.name.clone(),
        })
    }

    /// Fetch and parse an index, retrying transient failures
    pub async fn fetch_url(&self, url: &str) -> Result<RepositoryIndex, RepositoryError> {
        let mut attempts = 0;
        let mut delay_ms = self.base_delay_ms;

        loop {
            attempts += 1;
            match self.fetch_once(url).await {
                Ok(index) => return Ok(index),
                // Malformed content will not get better by retrying
                Err(e @ RepositoryError::InvalidIndex { .. }) => return Err(e),
                Err(e) if attempts >= self.max_retries => return Err(e),
                Err(e) => {
                    tracing::debug!("Fetch of {} failed (attempt {}): {}", url, attempts, e);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms * 2).min(30_000);
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<RepositoryIndex, RepositoryError> {
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| RepositoryError::NetworkError {
                    url: url.to_string(),
                    error: e.to_string(),
                })?;

        if !response.status().is_success() {
            return Err(RepositoryError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RepositoryError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|e| RepositoryError::InvalidIndex {
            source_name: url.to_string(),
            error: e.to_string(),
        })
    }

    /// Load every configured source, in order
    ///
    /// A source that cannot be fetched falls back to its cached snapshot,
    /// or contributes nothing. Fetch failures never abort the run.
    pub async fn load_all(
        &self,
        configs: &[RepositoryConfig],
        cache: &SnapshotCache,
    ) -> Vec<Repository> {
        let mut repos = Vec::with_capacity(configs.len());
        for config in configs {
            let index = match self.fetch(config).await {
                Ok(index) => {
                    tracing::info!(
                        "Fetched {} entries from {}",
                        index.binaries.len(),
                        config.name
                    );
                    if let Err(e) = cache.store(&config.name, &index) {
                        tracing::warn!("Cannot cache snapshot of {}: {}", config.name, e);
                    }
                    index
                }
                Err(e) => match cache.load(&config.name) {
                    Some(index) => {
                        tracing::warn!(
                            "Repository {} unavailable ({}), using cached snapshot",
                            config.name,
                            e
                        );
                        index
                    }
                    None => {
                        tracing::warn!(
                            "Repository {} unavailable ({}), no snapshot cached",
                            config.name,
                            e
                        );
                        RepositoryIndex::default()
                    }
                },
            };

            let mut repo = Repository::new(&config.name, cache.path(&config.name), config.kind)
                .with_index(index);
            if let Some(url) = &config.url {
                repo = repo.with_url(url.clone());
            }
            repos.push(repo);
        }
        repos
    }
}

impl Default for RepositoryClient {
    fn default() -> Self {
        Self::new()
    }
}

fn read_index(path: &Path) -> Result<RepositoryIndex, RepositoryError> {
    let content = filesystem::read_file(path)?;
    serde_json::from_str(&content).map_err(|e| RepositoryError::InvalidIndex {
        source_name: path.display().to_string(),
        error: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const INDEX: &str = r#"{"binaries":[{"name":"libc","version":"2.38","package":"glibc"}]}"#;

    fn remote(name: &str, kind: RepoKind, url: &str) -> RepositoryConfig {
        RepositoryConfig {
            name: name.to_string(),
            kind,
            url: Some(url.to_string()),
            path: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_repo_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/base/index.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .mount(&server)
            .await;

        let client = RepositoryClient::with_config(1, 0);
        let config = remote("base", RepoKind::RemoteRepo, &format!("{}/base/", server.uri()));
        let index = client.fetch(&config).await.unwrap();

        assert_eq!(index.binaries.len(), 1);
        assert_eq!(index.binaries[0].package, "glibc");
    }

    #[tokio::test]
    async fn test_registry_uses_containers_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"containers":[{"name":"base-image","version":"1","package":"base-image"}]}"#,
            ))
            .mount(&server)
            .await;

        let client = RepositoryClient::with_config(1, 0);
        let config = remote("images", RepoKind::RemoteRegistry, &server.uri());
        let index = client.fetch(&config).await.unwrap();

        assert_eq!(index.binaries[0].name, "base-image");
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .mount(&server)
            .await;

        let client = RepositoryClient::with_config(3, 1);
        let index = client
            .fetch_url(&format!("{}/index.json", server.uri()))
            .await
            .unwrap();

        assert_eq!(index.binaries.len(), 1);
    }

    #[tokio::test]
    async fn test_http_error_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = RepositoryClient::with_config(2, 1);
        let err = client
            .fetch_url(&format!("{}/index.json", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let cache = SnapshotCache::new(temp.path().to_path_buf());
        let client = RepositoryClient::with_config(1, 0);
        let configs = vec![remote("base", RepoKind::RemoteRepo, &server.uri())];

        let first = client.load_all(&configs, &cache).await;
        assert_eq!(first[0].lookup("libc").len(), 1);

        let second = client.load_all(&configs, &cache).await;
        assert_eq!(second[0].lookup("libc").len(), 1);
        assert_eq!(second[0].url.as_deref(), Some(server.uri().as_str()));
    }

    #[tokio::test]
    async fn test_unreachable_source_without_snapshot_is_empty() {
        let temp = TempDir::new().unwrap();
        let cache = SnapshotCache::new(temp.path().to_path_buf());
        let client = RepositoryClient::with_config(1, 0);
        let configs = vec![
            remote("gone", RepoKind::RemoteRepo, "http://127.0.0.1:9"),
            RepositoryConfig {
                name: "nowhere".to_string(),
                kind: RepoKind::RemoteRepo,
                url: None,
                path: None,
            },
        ];

        let repos = client.load_all(&configs, &cache).await;

        assert_eq!(repos.len(), 2);
        assert!(repos.iter().all(Repository::is_empty));
    }

    #[tokio::test]
    async fn test_local_mirror_path() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("index.json"), INDEX).unwrap();
        let config = RepositoryConfig {
            name: "mirror".to_string(),
            kind: RepoKind::RemoteRepo,
            url: None,
            path: Some(temp.path().to_path_buf()),
        };

        let index = RepositoryClient::new().fetch(&config).await.unwrap();
        assert_eq!(index.binaries.len(), 1);
    }
}
