//! Sluice Callback Client
//!
//! HTTP client used from inside a running script to call back into the
//! orchestrator: lock administration and triggering other pipelines.
//! Every request carries the execution's communication token.
//!
//! # Example
//!
//! ```no_run
//! use sluice_client::{CallbackClient, LockMode};
//! use sluice_core::dto::lock::LockPayload;
//!
//! #[tokio::main]
//! async fn main() -> sluice_client::Result<()> {
//!     let client = CallbackClient::from_env()?;
//!
//!     client
//!         .with_lock("deploy-target", LockMode::Exit, LockPayload::default(), || async {
//!             println!("resource is ours");
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod error;
mod execution;
mod locks;
#[cfg(test)]
mod mock;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use execution::TriggeredExecution;
pub use locks::LockMode;

use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

/// Environment variable holding the orchestrator base URL
pub const MASTER_BASE_URL: &str = "MASTER_BASE_URL";
/// Environment variable holding the execution's token
pub const COMMUNICATION_TOKEN: &str = "COMMUNICATION_TOKEN";
/// Environment variable holding the running pipeline's id
pub const PIPELINE_ID: &str = "PIPELINE_ID";

/// HTTP client for the orchestrator callback API
///
/// Bound to one running execution: the pipeline it belongs to and the token
/// it was issued.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// Communication token of the running execution
    token: String,
    /// Pipeline the running execution belongs to
    pipeline_id: String,
    /// HTTP client instance
    client: Client,
}

impl CallbackClient {
    /// Create a new callback client
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        pipeline_id: impl Into<String>,
    ) -> Self {
        Self::with_client(base_url, token, pipeline_id, Client::new())
    }

    /// Create a new callback client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        base_url: impl Into<String>,
        token: impl Into<String>,
        pipeline_id: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            pipeline_id: pipeline_id.into(),
            client,
        }
    }

    /// Create a client from the environment the orchestrator gives a script
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ClientError::MissingEnv(name))
        };

        Ok(Self::new(
            required(MASTER_BASE_URL)?,
            required(COMMUNICATION_TOKEN)?,
            required(PIPELINE_ID)?,
        ))
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the id of the pipeline this client acts for
    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Callback URL of `segments` under this pipeline's API
    ///
    /// Each segment is percent-encoded, so ids may contain `/`, `?` or `#`.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(format!("{}: cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["pipeline", self.pipeline_id.as_str(), "api"])
            .extend(segments);

        Ok(url)
    }

    fn request(&self, method: reqwest::Method, segments: &[&str]) -> Result<reqwest::RequestBuilder> {
        Ok(self
            .client
            .request(method, self.url(segments)?)
            .header("Token", &self.token))
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Fails with `ApiError` on a non-success status
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        self.check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = CallbackClient::new("http://localhost:8080/", "tok", "deploy");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.url(&["lock", "global"]).unwrap().as_str(),
            "http://localhost:8080/pipeline/deploy/api/lock/global"
        );
    }

    #[test]
    fn test_url_encodes_each_segment() {
        let client = CallbackClient::new("http://localhost:8080/sluice", "tok", "deploy");
        assert_eq!(
            client.url(&["lock", "release/v1?x#y"]).unwrap().as_str(),
            "http://localhost:8080/sluice/pipeline/deploy/api/lock/release%2Fv1%3Fx%23y"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let client = CallbackClient::new("not a url", "tok", "deploy");
        let err = client.url(&["lock", "global"]).unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }

    #[test]
    fn test_from_environment() {
        let client = CallbackClient::from_lookup(lookup(&[
            (MASTER_BASE_URL, "http://sluice:8080"),
            (COMMUNICATION_TOKEN, "tok"),
            (PIPELINE_ID, "deploy"),
        ]))
        .unwrap();

        assert_eq!(client.base_url(), "http://sluice:8080");
        assert_eq!(client.pipeline_id(), "deploy");
    }

    #[test]
    fn test_from_environment_requires_every_variable() {
        let err = CallbackClient::from_lookup(lookup(&[
            (MASTER_BASE_URL, "http://sluice:8080"),
            (COMMUNICATION_TOKEN, ""),
            (PIPELINE_ID, "deploy"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ClientError::MissingEnv(COMMUNICATION_TOKEN)));
    }
}
