//! HTTP fetching with timeouts and bounded exponential backoff.

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use lode_core::config::NetworkConfig;
use lode_util::errors::{LodeError, LodeResult};

/// Build a shared reqwest client for registry requests.
pub fn build_client(network: &NetworkConfig) -> LodeResult<Client> {
    Client::builder()
        .timeout(network.timeout())
        .user_agent(concat!("lode/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LodeError::Generic {
            message: format!("Failed to create HTTP client: {e}"),
        })
}

/// What a request is for; used to attribute failures to a package.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub package: &'a str,
    pub version: Option<&'a str>,
}

impl Subject<'_> {
    fn error(&self, message: String, retryable: bool) -> LodeError {
        LodeError::SourceFetch {
            package: self.package.to_string(),
            version: self.version.map(str::to_string),
            message,
            retryable,
        }
    }
}

/// A client plus the retry budget from `[network]`.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    network: NetworkConfig,
    show_progress: bool,
}

impl Downloader {
    pub fn new(network: NetworkConfig) -> LodeResult<Self> {
        Ok(Self {
            client: build_client(&network)?,
            network,
            show_progress: false,
        })
    }

    /// Show a byte progress bar for large downloads.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// GET `url`, retrying transient failures.
    ///
    /// Returns `Ok(None)` for 404. Server errors, 429, timeouts and
    /// connection failures are retried with backoff until the attempt
    /// budget runs out; other client errors fail immediately.
    pub async fn get_bytes(&self, url: &str, subject: Subject<'_>) -> LodeResult<Option<Vec<u8>>> {
        let attempts = self.network.retries.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.network.backoff(attempt - 1);
                tracing::warn!(
                    "retrying {url} in {}ms (attempt {attempt}/{attempts})",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.try_once(url, subject).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }

        let reason = last_err.map(|e| e.to_string()).unwrap_or_default();
        Err(subject.error(
            format!("gave up after {attempts} attempts for {url}: {reason}"),
            true,
        ))
    }

    async fn try_once(&self, url: &str, subject: Subject<'_>) -> LodeResult<Option<Vec<u8>>> {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                return Err(subject.error(format!("request to {url} failed: {e}"), retryable));
            }
        };

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(subject.error(format!("HTTP {status} from {url}"), true));
        }
        if !status.is_success() {
            return Err(subject.error(format!("HTTP {status} fetching {url}"), false));
        }

        let total = resp.content_length().unwrap_or(0);
        let pb = (self.show_progress && total > 100_000).then(|| {
            let pb = ProgressBar::new(total);
            if let Ok(style) =
                ProgressStyle::with_template("  {msg} {bar:30.cyan/dim} {bytes}/{total_bytes}")
            {
                pb.set_style(style.progress_chars("##-"));
            }
            pb.set_message(subject.package.to_string());
            pb
        });

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| subject.error(format!("failed to read {url}: {e}"), true))?;

        if let Some(pb) = pb {
            pb.set_position(bytes.len() as u64);
            pb.finish_and_clear();
        }
        Ok(Some(bytes.to_vec()))
    }

    /// GET and decode a JSON document. `Ok(None)` for 404.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        subject: Subject<'_>,
    ) -> LodeResult<Option<T>> {
        match self.get_bytes(url, subject).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| subject.error(format!("malformed response from {url}: {e}"), false)),
            None => Ok(None),
        }
    }
}
