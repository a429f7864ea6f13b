use futures::future::BoxFuture;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ConfigurationId, ScriptDocument};
use crate::error::{CoordinatorError, Result};

/// The coordinator's view of one remote driver. Every call is a synchronous
/// request/response; a driver handles one at a time.
pub trait DriverClient: Send + Sync {
    fn name(&self) -> &str;

    /// Hands the script over and lets the driver do its setup.
    fn prepare_script<'a>(
        &'a self,
        configuration: ConfigurationId,
        script: &'a ScriptDocument,
    ) -> BoxFuture<'a, Result<()>>;

    /// Starts the prepared script. Returns once the driver has accepted it,
    /// not when it finishes; completion arrives through results reporting.
    fn execute_prepared(&self, configuration: ConfigurationId) -> BoxFuture<'_, Result<()>>;

    fn shut_down(&self) -> BoxFuture<'_, Result<()>>;
}

#[derive(Serialize)]
struct PrepareBody<'a> {
    configuration: ConfigurationId,
    script: &'a ScriptDocument,
}

#[derive(Serialize)]
struct ExecuteBody {
    configuration: ConfigurationId,
}

/// Reaches a driver over HTTP at the callback URL it registered with.
pub struct HttpDriverClient {
    name: String,
    base: Url,
    http: reqwest::Client,
}

impl HttpDriverClient {
    pub fn new(name: impl Into<String>, callback: &str, timeout: Duration) -> Result<Self> {
        let name = name.into();
        let mut base = Url::parse(callback).map_err(|e| {
            CoordinatorError::invalid(format!("bad callback URL '{}': {}", callback, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(CoordinatorError::invalid(format!(
                "callback URL '{}' must be http or https",
                callback
            )));
        }
        // Url::join drops the last segment unless the path ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoordinatorError::Transport(e.to_string()))?;

        Ok(Self { name, base, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| CoordinatorError::invalid(format!("bad driver path '{}': {}", path, e)))
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<()> {
        let url = self.endpoint(path)?;
        debug!("POST {} -> {}", url, self.name);
        let resp = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.dispatch_error(format!("{} unreachable: {}", url, e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let text = resp.text().await.unwrap_or_default();
        Err(self.dispatch_error(format!("{} returned {}: {}", url, status, text.trim())))
    }

    fn dispatch_error(&self, message: String) -> CoordinatorError {
        CoordinatorError::Dispatch {
            client: self.name.clone(),
            message,
        }
    }
}

impl DriverClient for HttpDriverClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare_script<'a>(
        &'a self,
        configuration: ConfigurationId,
        script: &'a ScriptDocument,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.post(
                "script/prepare",
                &PrepareBody {
                    configuration,
                    script,
                },
            )
            .await
        })
    }

    fn execute_prepared(&self, configuration: ConfigurationId) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.post("script/execute", &ExecuteBody { configuration })
                .await
        })
    }

    fn shut_down(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.post("shutdown", &serde_json::json!({})).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client =
            HttpDriverClient::new("d1", "http://10.0.0.5:7000/driver", Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            client.endpoint("script/prepare").unwrap().as_str(),
            "http://10.0.0.5:7000/driver/script/prepare"
        );
    }

    #[test]
    fn test_rejects_bad_callback() {
        assert!(HttpDriverClient::new("d1", "not a url", Duration::from_secs(1)).is_err());
        assert!(HttpDriverClient::new("d1", "ftp://host/", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_driver_is_dispatch_error() {
        // Port 9 (discard) on localhost is not expected to be listening.
        let client =
            HttpDriverClient::new("d1", "http://127.0.0.1:9/", Duration::from_millis(500))
                .unwrap();
        let err = client.shut_down().await.unwrap_err();
        match err {
            CoordinatorError::Dispatch { client, .. } => assert_eq!(client, "d1"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
