//! HTTP pipeline for the Azure Table service.
//!
//! This module provides [`TablesPipeline`], the transport shared by every
//! table and entity client. The pipeline signs requests, adds the standard
//! protocol headers, retries transient failures, and turns error responses
//! into [`TablesError`] values.
//!
//! # Examples
//!
//! ## Using a connection string
//! ```rust,no_run
//! use azure_data_tables_core::client::TablesPipeline;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = TablesPipeline::builder()
//!     .connection_string("AccountName=myaccount;AccountKey=a2V5")
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Using an endpoint and a SAS token
//! ```rust,no_run
//! use azure_data_tables_core::client::TablesPipeline;
//! use azure_data_tables_core::auth::TablesCredential;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = TablesPipeline::builder()
//!     .endpoint("https://myaccount.table.core.windows.net")
//!     .credential(TablesCredential::sas("sv=2019-02-02&sig=..."))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::auth::TablesCredential;
use crate::connection_string::ConnectionString;
use crate::error::{TablesError, TablesResult};
use crate::models::{headers, MetadataLevel, DATA_SERVICE_VERSION, DEFAULT_API_VERSION};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client as HttpClient, Method};
use url::Url;

use std::time::Duration;

/// Default connection timeout (10 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read/response timeout (60 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Characters left unescaped in keys, table names, and query values.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a path or query component.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// Decode a percent-encoded component. Invalid UTF-8 is replaced, not rejected.
pub fn decode_component(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Exponential backoff for `attempt`, scaled by `jitter`. Saturates at
/// `Duration::MAX`.
fn backoff_for(initial: Duration, attempt: u32, jitter: f64) -> Duration {
    let base = initial.saturating_mul(2_u32.checked_pow(attempt).unwrap_or(u32::MAX));
    Duration::try_from_secs_f64(base.as_secs_f64() * jitter).unwrap_or(Duration::MAX)
}

/// Determines if an HTTP status code represents a retriable error.
///
/// Retriable errors are transient server-side issues that may succeed on retry:
/// - 408 Request Timeout
/// - 429 Too Many Requests (throttling)
/// - 500 Internal Server Error
/// - 502 Bad Gateway
/// - 503 Service Unavailable
/// - 504 Gateway Timeout
#[inline]
pub fn is_retriable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Configuration for automatic retry behavior on transient errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the initial request).
    pub max_retries: u32,
    /// Initial backoff duration before the first retry.
    /// Subsequent retries use exponential backoff (2^attempt * initial_backoff).
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

/// A single Table service request, before signing.
///
/// Built by the table and entity clients and executed by [`TablesPipeline::send`].
#[derive(Debug, Clone)]
pub struct TablesRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
    accept: MetadataLevel,
    timeout: Option<Duration>,
}

impl TablesRequest {
    /// Create a request for `path`, relative to the service endpoint.
    ///
    /// `path` must already be percent-encoded (see [`encode_component`]).
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            accept: MetadataLevel::Minimal,
            timeout: None,
        }
    }

    /// A `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// A `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// A `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// A `MERGE` request (the OData partial-update verb).
    pub fn merge(path: impl Into<String>) -> Self {
        // "MERGE" is a valid token, so this cannot fail.
        let method = Method::from_bytes(b"MERGE").unwrap_or(Method::PATCH);
        Self::new(method, path)
    }

    /// Add a query parameter. The value is percent-encoded when sent.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a query parameter when the value is present.
    pub fn query_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    /// Add a request header.
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Set a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the OData metadata level requested in the `Accept` header.
    pub fn accept(mut self, level: MetadataLevel) -> Self {
        self.accept = level;
        self
    }

    /// Bound this request's round trip.
    ///
    /// The timeout is also sent to the service as the `timeout` query
    /// parameter, rounded up to whole seconds.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The relative, encoded request path.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// The HTTP pipeline for the Azure Table service.
///
/// The pipeline is cheaply cloneable and can be shared across threads; all
/// clients built from it share one connection pool.
#[derive(Debug, Clone)]
pub struct TablesPipeline {
    pub(crate) http: HttpClient,
    pub(crate) endpoint: Url,
    pub(crate) credential: TablesCredential,
    pub(crate) api_version: String,
    pub(crate) retry_policy: RetryPolicy,
}

/// Builder for constructing a [`TablesPipeline`].
///
/// Use [`TablesPipeline::builder()`] to create a new builder.
#[derive(Debug, Default)]
pub struct TablesPipelineBuilder {
    endpoint: Option<String>,
    credential: Option<TablesCredential>,
    connection_string: Option<String>,
    api_version: Option<String>,
    http_client: Option<HttpClient>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
}

impl TablesPipeline {
    /// Create a new builder for configuring a `TablesPipeline`.
    pub fn builder() -> TablesPipelineBuilder {
        TablesPipelineBuilder::default()
    }

    /// Get the service endpoint URL. Always ends with `/`.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Get the service version sent in `x-ms-version`.
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Get the retry policy configuration.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Build a full URL for a relative, encoded path.
    ///
    /// A leading `/` is ignored so that endpoints carrying a path (such as the
    /// storage emulator's `/devstoreaccount1`) keep it.
    pub fn url(&self, path: &str) -> TablesResult<Url> {
        self.endpoint
            .join(path.trim_start_matches('/'))
            .map_err(|e| TablesError::invalid_endpoint_with_source("failed to construct URL", e))
    }

    fn request_url(&self, request: &TablesRequest) -> TablesResult<Url> {
        let mut url = self.url(&request.path)?;

        let mut pairs: Vec<String> = request
            .query
            .iter()
            .map(|(k, v)| format!("{k}={}", encode_component(v)))
            .collect();
        if let Some(timeout) = request.timeout {
            let seconds = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
            pairs.push(format!("timeout={}", seconds.max(1)));
        }
        if !pairs.is_empty() {
            url.set_query(Some(&pairs.join("&")));
        }

        self.credential.apply_sas(&mut url);
        Ok(url)
    }

    /// Send a request with automatic retry on transient errors.
    ///
    /// Adds `x-ms-version`, `x-ms-date`, `DataServiceVersion`, `Accept`,
    /// `x-ms-client-request-id`, and authorization to every attempt.
    /// Retries on retriable HTTP errors (408, 429, 500, 502, 503, 504) with
    /// jittered exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails, the request fails at the transport
    /// level, or the service returns a non-retriable error (or a retriable
    /// one after all retries). Service errors come back as
    /// [`TablesError::Api`] or [`TablesError::Http`]; classifying them into
    /// entity and table conditions is up to the caller, which knows the target.
    pub async fn send(&self, request: &TablesRequest) -> TablesResult<reqwest::Response> {
        let url = self.request_url(request)?;

        for attempt in 0..=self.retry_policy.max_retries {
            let date = chrono::Utc::now()
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string();

            let mut builder = self
                .http
                .request(request.method.clone(), url.clone())
                .header(headers::X_MS_VERSION, &self.api_version)
                .header(headers::X_MS_DATE, &date)
                .header(headers::DATA_SERVICE_VERSION, DATA_SERVICE_VERSION)
                .header(reqwest::header::ACCEPT, request.accept.accept())
                .header(
                    headers::X_MS_CLIENT_REQUEST_ID,
                    uuid::Uuid::new_v4().to_string(),
                );

            if let Some(authorization) = self.credential.authorization_header(&url, &date)? {
                builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
            }
            for (name, value) in &request.headers {
                builder = builder.header(*name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            tracing::trace!(
                method = %request.method,
                path = %url.path(),
                attempt,
                "sending request"
            );
            let response = builder.send().await?;
            let status = response.status().as_u16();

            if response.status().is_success() {
                return Ok(response);
            }

            if !is_retriable_status(status) || attempt == self.retry_policy.max_retries {
                return Self::check_response(response).await;
            }

            // Jitter factor in [0.75, 1.25].
            let jitter = 0.75 + fastrand::f64() * 0.5;
            let backoff = backoff_for(self.retry_policy.initial_backoff, attempt, jitter);
            tracing::debug!(status, attempt, ?backoff, "retriable status, backing off");
            tokio::time::sleep(backoff).await;
        }

        unreachable!("retry loop should return before reaching here")
    }

    /// Maximum length for error messages to prevent sensitive data leaks.
    const MAX_ERROR_MESSAGE_LEN: usize = 1000;

    /// Redact credentials that a service or proxy may echo back in an error body:
    /// bearer tokens, Shared Key signatures, and SAS `sig` values.
    pub(crate) fn sanitize_error_message(msg: &str) -> String {
        const MARKERS: [&str; 4] = ["Bearer ", "SharedKeyLite ", "SharedKey ", "sig="];
        const REDACTED: &str = "[REDACTED]";

        let mut result = msg.to_string();
        for marker in MARKERS {
            let mut search_start = 0;
            while let Some(relative_pos) = result[search_start..].find(marker) {
                let secret_start = search_start + relative_pos + marker.len();
                if result[secret_start..].starts_with(REDACTED) {
                    search_start = secret_start + REDACTED.len();
                    continue;
                }

                let secret_end = result[secret_start..]
                    .find(|c: char| {
                        c.is_whitespace() || matches!(c, '"' | '\'' | ',' | '&' | '<')
                    })
                    .map(|pos| secret_start + pos)
                    .unwrap_or(result.len());

                if secret_end > secret_start {
                    result.replace_range(secret_start..secret_end, REDACTED);
                    search_start = secret_start + REDACTED.len();
                } else {
                    search_start = secret_start;
                }
                if search_start >= result.len() {
                    break;
                }
            }
        }

        result
    }

    /// Truncate a message if it exceeds the maximum length.
    /// Sanitizes before truncating.
    pub(crate) fn truncate_message(msg: &str) -> String {
        let sanitized = Self::sanitize_error_message(msg);

        if sanitized.len() > Self::MAX_ERROR_MESSAGE_LEN {
            let mut cut = Self::MAX_ERROR_MESSAGE_LEN;
            while !sanitized.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}... (truncated)", &sanitized[..cut])
        } else {
            sanitized
        }
    }

    /// Check the response status and return an error if not successful.
    async fn check_response(response: reqwest::Response) -> TablesResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if let Some((code, message)) = parse_service_error(&body) {
            return Err(TablesError::Api {
                status,
                code,
                message: Self::truncate_message(message.as_deref().unwrap_or(&body)),
            });
        }

        Err(TablesError::http(status, Self::truncate_message(&body)))
    }
}

/// Extract `(code, message)` from a Table service error body.
///
/// Understands `{"odata.error": {"code": .., "message": {"value": ..}}}` as
/// well as the plain `{"error": {"code": .., "message": ..}}` shape.
fn parse_service_error(body: &str) -> Option<(String, Option<String>)> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("odata.error").or_else(|| value.get("error"))?;

    let code = error
        .get("code")
        .and_then(|c| c.as_str())
        .unwrap_or("unknown")
        .to_string();
    let message = error.get("message").and_then(|m| {
        m.as_str()
            .or_else(|| m.get("value").and_then(|v| v.as_str()))
            .map(str::to_string)
    });

    Some((code, message))
}

impl TablesPipelineBuilder {
    /// Set the Table service endpoint URL.
    ///
    /// For example `https://<account>.table.core.windows.net`.
    ///
    /// If neither an endpoint nor a connection string is set, the builder
    /// checks `AZURE_TABLES_ENDPOINT`, then `AZURE_TABLES_CONNECTION_STRING`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the credential to use for authentication.
    ///
    /// If not set, the credential comes from the connection string, or from
    /// [`TablesCredential::from_env()`].
    pub fn credential(mut self, credential: TablesCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Configure endpoint and credential from a storage connection string.
    ///
    /// An explicit [`endpoint`](Self::endpoint) or
    /// [`credential`](Self::credential) overrides the corresponding part.
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// Set the service version.
    ///
    /// Defaults to [`DEFAULT_API_VERSION`] (`2019-02-02`).
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Set a custom HTTP client.
    ///
    /// **Note:** If you provide a custom HTTP client, timeout configuration
    /// via [`connect_timeout`](Self::connect_timeout) and
    /// [`read_timeout`](Self::read_timeout) is ignored.
    pub fn http_client(mut self, client: HttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout, covering the whole request/response cycle.
    ///
    /// Per-operation timeouts set on a request take precedence.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the retry policy for transient errors.
    ///
    /// Defaults to 3 retries with 500ms initial backoff.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the `TablesPipeline`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No endpoint is available from the builder, connection string, or environment
    /// - The endpoint URL or connection string is invalid
    /// - No credential is available
    /// - The HTTP client cannot be constructed
    pub fn build(self) -> TablesResult<TablesPipeline> {
        let http = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .connect_timeout(self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
                .timeout(self.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT))
                .build()?,
        };

        let connection_string = match self.connection_string {
            Some(cs) => Some(ConnectionString::parse(&cs)?),
            None if self.endpoint.is_none() => std::env::var("AZURE_TABLES_CONNECTION_STRING")
                .ok()
                .filter(|cs| !cs.is_empty())
                .filter(|_| std::env::var("AZURE_TABLES_ENDPOINT").is_err())
                .map(|cs| ConnectionString::parse(&cs))
                .transpose()?,
            None => None,
        };

        let mut endpoint = match (self.endpoint, &connection_string) {
            (Some(endpoint), _) => Url::parse(&endpoint)
                .map_err(|e| TablesError::invalid_endpoint_with_source("invalid endpoint URL", e))?,
            (None, Some(cs)) => cs.table_endpoint().clone(),
            (None, None) => {
                let endpoint = std::env::var("AZURE_TABLES_ENDPOINT").map_err(|_| {
                    TablesError::MissingConfig(
                        "endpoint is required. Set it via builder, a connection string, \
                         or the AZURE_TABLES_ENDPOINT env var."
                            .into(),
                    )
                })?;
                Url::parse(&endpoint).map_err(|e| {
                    TablesError::invalid_endpoint_with_source("invalid endpoint URL", e)
                })?
            }
        };
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        let credential = match (self.credential, &connection_string) {
            (Some(credential), _) => credential,
            (None, Some(cs)) => cs.credential()?,
            (None, None) => TablesCredential::from_env()?,
        };

        Ok(TablesPipeline {
            http,
            endpoint,
            credential,
            api_version: self
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            retry_policy: self.retry_policy.unwrap_or_default(),
        })
    }
}
