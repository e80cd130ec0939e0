use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;

use crate::assets::{ReleaseAsset, find_asset, lenient_assets};
use crate::channel::Channel;
use crate::error::ManifestError;
use crate::manifest::{CanonicalManifest, Normalizer, RawManifest, lenient_string};
use crate::source::ManifestSource;

pub const USER_AGENT: &str = "BomanaUpdateService/1.0";
pub const ACCEPT: &str = "application/vnd.github+json, application/json, */*";
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(8);
pub const MIN_HTTP_TIMEOUT: Duration = Duration::from_secs(2);

/// Fetches a JSON document.
///
/// `context` names the request in error messages.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn get_json(&self, url: &str, context: &'static str) -> Result<Value, ManifestError>;
}

/// [`JsonFetcher`] backed by a shared `reqwest` client.
pub struct HttpFetcher {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpFetcher {
    /// Build a fetcher whose requests time out after `timeout` (at least [`MIN_HTTP_TIMEOUT`]).
    ///
    /// # Errors
    /// Returns [`ManifestError::Configuration`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration, token: Option<String>) -> Result<Self, ManifestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout.max(MIN_HTTP_TIMEOUT))
            .build()
            .map_err(|error| {
                ManifestError::Configuration(format!("failed to build HTTP client: {error}"))
            })?;
        Ok(Self {
            client,
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }
}

#[async_trait]
impl JsonFetcher for HttpFetcher {
    async fn get_json(&self, url: &str, context: &'static str) -> Result<Value, ManifestError> {
        let mut request = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, ACCEPT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| ManifestError::transport(context, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ManifestError::Upstream {
                context,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| ManifestError::transport(context, error))?;
        parse_body(&body, context)
    }
}

fn parse_body(body: &[u8], context: &'static str) -> Result<Value, ManifestError> {
    if body.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(body).map_err(|error| ManifestError::remote_parse(context, error))
}

#[derive(Debug, Default, Deserialize)]
struct GitHubRelease {
    #[serde(default, deserialize_with = "lenient_string")]
    tag_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_assets")]
    assets: Vec<ReleaseAsset>,
}

impl GitHubRelease {
    fn from_value(value: Value) -> Result<Self, ManifestError> {
        if !value.is_object() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
            .map_err(|error| ManifestError::remote_parse("github release api", error))
    }

    fn tag(&self) -> &str {
        self.tag_name.as_deref().unwrap_or("latest")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProject {
    pub api_base: String,
    pub owner: String,
    pub repo: String,
}

impl RemoteProject {
    #[must_use]
    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

/// Loads a channel's manifest from the assets of the project's latest release.
pub struct RemoteSource {
    fetcher: Arc<dyn JsonFetcher>,
    project: RemoteProject,
    source_name: String,
    normalizer: Normalizer,
}

impl RemoteSource {
    pub fn new(
        fetcher: Arc<dyn JsonFetcher>,
        project: RemoteProject,
        source_name: impl Into<String>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            fetcher,
            project,
            source_name: source_name.into(),
            normalizer,
        }
    }
}

#[async_trait]
impl ManifestSource for RemoteSource {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn load(&self, channel: Channel) -> Result<CanonicalManifest, ManifestError> {
        let release_url = self.project.latest_release_url();
        let release = self
            .fetcher
            .get_json(&release_url, "github release api")
            .await?;
        let release = GitHubRelease::from_value(release)?;
        let assets = release.assets.as_slice();

        let manifest_name = channel.manifest_file_name();
        let Some(manifest_asset) = find_asset(assets, &manifest_name) else {
            return Err(ManifestError::NotFound(format!(
                "github latest release missing {manifest_name}"
            )));
        };
        let manifest_url = manifest_asset.download_url.trim();
        if manifest_url.is_empty() {
            return Err(ManifestError::NotFound(format!(
                "github manifest url invalid: {manifest_name}"
            )));
        }

        debug!(
            "Fetching {manifest_name} from release {} of {}/{}",
            release.tag(),
            self.project.owner,
            self.project.repo
        );
        let doc = self
            .fetcher
            .get_json(manifest_url, "github manifest")
            .await?;
        let doc = RawManifest::from_value(doc)
            .map_err(|error| ManifestError::remote_parse("github manifest", error))?;

        let label = format!("{} (GitHub:{})", self.source_name, release.tag());
        self.normalizer.normalize(&doc, &label, Some(assets))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::{HttpFetcher, JsonFetcher, MIN_HTTP_TIMEOUT, RemoteProject, RemoteSource, parse_body};
    use crate::channel::Channel;
    use crate::error::{ManifestError, Origin};
    use crate::manifest::{Normalizer, ServingMode};
    use crate::source::ManifestSource;

    pub(crate) const RELEASE_URL: &str = "https://api.example/repos/owner/app/releases/latest";

    /// Serves canned responses by URL and records every request.
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        responses: HashMap<String, Result<Value, ManifestError>>,
        requests: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub(crate) fn respond(mut self, url: &str, response: Result<Value, ManifestError>) -> Self {
            self.responses.insert(url.to_string(), response);
            self
        }

        /// A latest release with manifests for `channels` and one package asset.
        pub(crate) fn with_release(self, tag: &str, channels: &[Channel]) -> Self {
            let mut assets: Vec<Value> = channels
                .iter()
                .map(|channel| {
                    json!({
                        "name": channel.manifest_file_name(),
                        "browser_download_url": format!("https://dl.example/{}", channel.manifest_file_name()),
                    })
                })
                .collect();
            assets.push(json!({
                "name": "Bomana-2.4.0.zip",
                "browser_download_url": "https://dl.example/Bomana-2.4.0.zip",
            }));

            let mut fetcher = self.respond(
                RELEASE_URL,
                Ok(json!({ "tag_name": tag, "assets": assets })),
            );
            for channel in channels {
                fetcher = fetcher.respond(
                    &format!("https://dl.example/{}", channel.manifest_file_name()),
                    Ok(json!({ "app_version": "2.4.0", "package_asset": "bomana-2.4.0.zip" })),
                );
            }
            fetcher
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests
                .lock()
                .expect("request log should not be poisoned")
                .clone()
        }
    }

    #[async_trait]
    impl JsonFetcher for FakeFetcher {
        async fn get_json(&self, url: &str, context: &'static str) -> Result<Value, ManifestError> {
            self.requests
                .lock()
                .expect("request log should not be poisoned")
                .push(url.to_string());
            self.responses.get(url).cloned().unwrap_or(Err(ManifestError::Upstream {
                context,
                status: 404,
            }))
        }
    }

    pub(crate) fn project() -> RemoteProject {
        RemoteProject {
            api_base: "https://api.example/".to_string(),
            owner: "owner".to_string(),
            repo: "app".to_string(),
        }
    }

    fn source(fetcher: Arc<FakeFetcher>) -> RemoteSource {
        RemoteSource::new(
            fetcher,
            project(),
            "TencentCloud",
            Normalizer::new(ServingMode::StatsOnly),
        )
    }

    /// Read a request head and return its headers with lowercased names.
    async fn read_request_headers(stream: &mut TcpStream) -> HashMap<String, String> {
        let mut head: Vec<u8> = Vec::new();
        let mut buf = [0_u8; 1024];
        while !head.windows(4).any(|window| window == b"\r\n\r\n") {
            let read = stream
                .read(&mut buf)
                .await
                .expect("request should be readable");
            if read == 0 {
                break;
            }
            head.extend_from_slice(&buf[..read]);
        }

        String::from_utf8_lossy(&head)
            .lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_string()))
            .collect()
    }

    /// Answer one request with `status` and `body`, returning the URL to hit
    /// and the headers the client sent.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<HashMap<String, String>>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("client should connect");
            let headers = read_request_headers(&mut stream).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream
                .write_all(response.as_bytes())
                .await
                .expect("response should be written");
            let _ = stream.shutdown().await;
            headers
        });

        (format!("http://{addr}/repos/owner/app/releases/latest"), server)
    }

    #[tokio::test]
    async fn http_fetcher_sends_service_headers_and_bearer_token() {
        let (url, server) = serve_once("200 OK", r#"{"tag_name":"v2.4.0"}"#).await;
        let fetcher = HttpFetcher::new(MIN_HTTP_TIMEOUT, Some("tok".to_string()))
            .expect("client should build");

        let body = fetcher
            .get_json(&url, "github release api")
            .await
            .expect("release should be fetched");
        let headers = server.await.expect("server task should finish");

        assert_eq!(body, json!({ "tag_name": "v2.4.0" }));
        assert_eq!(headers["user-agent"], "BomanaUpdateService/1.0");
        assert_eq!(
            headers["accept"],
            "application/vnd.github+json, application/json, */*"
        );
        assert_eq!(headers["authorization"], "Bearer tok");
    }

    #[tokio::test]
    async fn http_fetcher_omits_authorization_without_token() {
        let (url, server) = serve_once("200 OK", "").await;
        let fetcher = HttpFetcher::new(MIN_HTTP_TIMEOUT, Some("  ".to_string()))
            .expect("client should build");

        let body = fetcher
            .get_json(&url, "github manifest")
            .await
            .expect("empty body should be accepted");
        let headers = server.await.expect("server task should finish");

        assert_eq!(body, json!({}));
        assert!(!headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn http_fetcher_maps_error_status_to_upstream() {
        let (url, server) = serve_once("403 Forbidden", r#"{"message":"rate limited"}"#).await;
        let fetcher = HttpFetcher::new(MIN_HTTP_TIMEOUT, None).expect("client should build");

        let result = fetcher.get_json(&url, "github release api").await;
        server.await.expect("server task should finish");

        assert_eq!(
            result,
            Err(ManifestError::Upstream {
                context: "github release api",
                status: 403
            })
        );
    }

    #[tokio::test]
    async fn http_fetcher_gives_up_on_a_silent_server_after_the_timeout_floor() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener should have an address");
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("client should connect");
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });
        let fetcher =
            HttpFetcher::new(Duration::from_millis(100), None).expect("client should build");

        let started = Instant::now();
        let result = fetcher
            .get_json(&format!("http://{addr}/manifest_Lite.json"), "github manifest")
            .await;
        let elapsed = started.elapsed();

        assert!(
            matches!(
                result,
                Err(ManifestError::Transport {
                    context: "github manifest",
                    ..
                })
            ),
            "unexpected result: {result:?}"
        );
        assert!(elapsed >= MIN_HTTP_TIMEOUT - Duration::from_millis(100), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(10), "{elapsed:?}");
    }

    #[test]
    fn latest_release_url_trims_trailing_slash() {
        assert_eq!(project().latest_release_url(), RELEASE_URL);
    }

    #[tokio::test]
    async fn resolves_manifest_and_package_asset_from_latest_release() {
        let fetcher = Arc::new(FakeFetcher::default().with_release("v2.4.0", &[Channel::Standard]));

        let manifest = source(fetcher.clone())
            .load(Channel::Standard)
            .await
            .expect("remote manifest should load");

        assert_eq!(manifest.app_version(), "2.4.0");
        assert_eq!(manifest.package_url(), "https://dl.example/Bomana-2.4.0.zip");
        assert_eq!(manifest.source_name(), "TencentCloud (GitHub:v2.4.0)");
        assert_eq!(
            fetcher.requests(),
            vec![
                RELEASE_URL.to_string(),
                "https://dl.example/manifest_Standard.json".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn missing_manifest_asset_is_not_found() {
        let fetcher = Arc::new(FakeFetcher::default().with_release("v2.4.0", &[Channel::Lite]));

        let result = source(fetcher.clone()).load(Channel::Enhanced).await;

        assert_eq!(
            result,
            Err(ManifestError::NotFound(
                "github latest release missing manifest_Enhanced.json".to_string()
            ))
        );
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[tokio::test]
    async fn release_errors_propagate_unchanged() {
        let timeout = ManifestError::transport("github release api", "operation timed out");
        let fetcher = Arc::new(FakeFetcher::default().respond(RELEASE_URL, Err(timeout.clone())));

        let result = source(fetcher).load(Channel::Lite).await;

        assert_eq!(result, Err(timeout));
    }

    #[tokio::test]
    async fn non_object_release_has_no_assets_and_untagged_release_is_latest() {
        let fetcher = Arc::new(FakeFetcher::default().respond(RELEASE_URL, Ok(json!([1, 2]))));
        let result = source(fetcher).load(Channel::Lite).await;
        assert!(matches!(result, Err(ManifestError::NotFound(_))));

        let fetcher = Arc::new(
            FakeFetcher::default()
                .respond(
                    RELEASE_URL,
                    Ok(json!({
                        "assets": [{"name": "MANIFEST_LITE.JSON", "browser_download_url": "https://dl.example/m"}]
                    })),
                )
                .respond(
                    "https://dl.example/m",
                    Ok(json!({"app_version": "1.0.0", "package_url": "https://cdn.example/p.zip"})),
                ),
        );
        let manifest = source(fetcher)
            .load(Channel::Lite)
            .await
            .expect("case-insensitive asset match should load");
        assert_eq!(manifest.source_name(), "TencentCloud (GitHub:latest)");
    }

    #[tokio::test]
    async fn malformed_assets_and_numeric_tag_do_not_fail_the_release() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .respond(
                    RELEASE_URL,
                    Ok(json!({
                        "tag_name": 7,
                        "assets": [
                            {"name": null, "browser_download_url": "https://dl.example/x"},
                            "not-an-asset",
                            {"name": "manifest_Standard.json", "browser_download_url": "https://dl.example/m"}
                        ]
                    })),
                )
                .respond(
                    "https://dl.example/m",
                    Ok(json!({"app_version": "2.4.0", "package_url": "https://cdn.example/p.zip"})),
                ),
        );

        let manifest = source(fetcher)
            .load(Channel::Standard)
            .await
            .expect("well-formed manifest asset should still load");

        assert_eq!(manifest.source_name(), "TencentCloud (GitHub:7)");
    }

    #[tokio::test]
    async fn non_array_assets_mean_no_manifest() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .respond(RELEASE_URL, Ok(json!({"tag_name": "v1", "assets": null}))),
        );

        let result = source(fetcher).load(Channel::Standard).await;

        assert_eq!(
            result,
            Err(ManifestError::NotFound(
                "github latest release missing manifest_Standard.json".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn non_object_manifest_is_a_remote_parse_error() {
        let fetcher = Arc::new(
            FakeFetcher::default()
                .respond(
                    RELEASE_URL,
                    Ok(json!({
                        "tag_name": "v1",
                        "assets": [{"name": "manifest_Lite.json", "browser_download_url": "https://dl.example/m"}]
                    })),
                )
                .respond("https://dl.example/m", Ok(json!("2.4.0"))),
        );

        let result = source(fetcher).load(Channel::Lite).await;

        assert!(matches!(
            result,
            Err(ManifestError::Parse {
                origin: Origin::Remote,
                context: "github manifest",
                ..
            })
        ));
    }

    #[test]
    fn empty_body_is_an_empty_object_and_garbage_is_a_parse_error() {
        assert_eq!(
            parse_body(b"", "github manifest").expect("empty body should parse"),
            json!({})
        );
        assert!(matches!(
            parse_body(b"<html>", "github manifest"),
            Err(ManifestError::Parse {
                origin: Origin::Remote,
                ..
            })
        ));
    }
}
