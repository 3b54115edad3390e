use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::RelayError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    timeout: Duration,
    use_env_proxy: bool,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, RelayError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout);

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| RelayError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| RelayError::Internal(format!("Failed to build HTTP client: {err}")))
}

/// Pooled HTTP client for the upstream provider.
///
/// One attempt per call. A streamed prompt cannot be replayed once the first
/// delta reached the client, so retrying is left to the caller.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the transport from server pool settings and an optional
    /// upstream proxy.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the proxy URL is rejected and
    /// [`RelayError::Internal`] when the TLS backend cannot initialize.
    pub fn new(config: &ServerConfig, proxy_url: Option<&str>) -> Result<Self, RelayError> {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };
        let client = build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            Duration::from_secs(config.timeout),
            config.http_use_env_proxy,
            proxy_url,
        )?;
        Ok(Self { client })
    }

    /// POST a JSON body and return the response once headers arrive.
    ///
    /// Non-2xx statuses are returned as-is; the caller decides how to read
    /// the body.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Timeout`] when the client-level timeout fires and
    /// [`RelayError::Transport`] for connect or protocol failures.
    pub async fn post_json(
        &self,
        url: &str,
        headers: http::HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, RelayError> {
        self.client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|err| transport_error(&err))
    }
}

/// Classify a reqwest failure.
pub(crate) fn transport_error(err: &reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::Timeout(err.to_string())
    } else {
        RelayError::Transport(err.to_string())
    }
}
