//! Pipeline-to-pipeline triggers

use crate::CallbackClient;
use crate::error::Result;
use reqwest::Method;
use reqwest::header::HeaderMap;

/// Outcome of a pipeline run triggered from a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggeredExecution {
    pub execution_number: Option<i64>,
    /// `success` or `failure`
    pub status: Option<String>,
    pub log: String,
}

impl TriggeredExecution {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }
}

impl CallbackClient {
    /// Run another pipeline and wait for its log
    ///
    /// The orchestrator checks this client's token against its own pipeline
    /// and runs `pipeline_id` with `payload`.
    pub async fn execute_pipeline(
        &self,
        pipeline_id: &str,
        payload: impl Into<String>,
    ) -> Result<TriggeredExecution> {
        let response = self
            .request(Method::POST, &["execute-other"])?
            .query(&[("pipeline_id", pipeline_id)])
            .body(payload.into())
            .send()
            .await?;

        let response = self.check_status(response).await?;
        let headers = response.headers().clone();
        let log = response.text().await?;

        Ok(TriggeredExecution {
            execution_number: header(&headers, "x-execution-number").and_then(|v| v.parse().ok()),
            status: header(&headers, "x-execution-status"),
            log,
        })
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock;

    #[tokio::test]
    async fn test_execute_pipeline() {
        let (url, _) = mock::start().await;
        let client = CallbackClient::new(url, mock::TOKEN, "deploy");

        let execution = client.execute_pipeline("build", "ref=main").await.unwrap();

        assert_eq!(execution.execution_number, Some(7));
        assert!(execution.is_success());
        assert_eq!(execution.log, "ran build: ref=main");
    }

    #[tokio::test]
    async fn test_execute_locked_pipeline() {
        let (url, _) = mock::start().await;
        let client = CallbackClient::new(url, mock::TOKEN, "deploy");

        let err = client.execute_pipeline("locked", "").await.unwrap_err();
        assert!(err.is_locked());
        assert_eq!(
            err.to_string(),
            "API error (status 423): Pipeline 'locked' is locked"
        );
    }
}
