//! Helpers for testing crates built on the pipeline against a mock server.

use crate::auth::TablesCredential;
use crate::client::{RetryPolicy, TablesPipeline};
use std::time::Duration;
use wiremock::MockServer;

/// Bearer token sent by pipelines from [`mock_pipeline`]. Not a real token.
pub const TEST_TOKEN: &str = "test-token";

/// Build a pipeline pointed at `server` with a bearer credential and a fast retry policy.
pub fn mock_pipeline(server: &MockServer) -> TablesPipeline {
    mock_pipeline_at(&server.uri())
}

/// Build a pipeline pointed at an arbitrary base URL, such as a mock server
/// URI with an account path appended.
pub fn mock_pipeline_at(endpoint: &str) -> TablesPipeline {
    TablesPipeline {
        http: reqwest::Client::new(),
        endpoint: normalize(endpoint),
        credential: TablesCredential::token(TEST_TOKEN),
        api_version: crate::models::DEFAULT_API_VERSION.to_string(),
        retry_policy: RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(5),
        },
    }
}

fn normalize(endpoint: &str) -> url::Url {
    let with_slash = if endpoint.ends_with('/') {
        endpoint.to_string()
    } else {
        format!("{endpoint}/")
    };
    match url::Url::parse(&with_slash) {
        Ok(url) => url,
        Err(e) => panic!("mock endpoint {endpoint} is not a URL: {e}"),
    }
}
