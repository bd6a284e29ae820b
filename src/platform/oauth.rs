//! OAuth device-flow endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::device_auth::DeviceAuthEndpoint;
use crate::error::{PairError, PairResult};

/// Grant type for device-code token requests (RFC 8628).
pub const DEVICE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

pub struct GithubDeviceAuth {
    http: Client,
    login_url: String,
}

impl std::fmt::Debug for GithubDeviceAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubDeviceAuth")
            .field("login_url", &self.login_url)
            .finish_non_exhaustive()
    }
}

impl GithubDeviceAuth {
    pub fn new(login_url: &str, timeout: Duration) -> PairResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            login_url: login_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_form(&self, path: &str, params: &[(&str, &str)]) -> PairResult<Value> {
        let url = format!("{}/{}", self.login_url, path);
        debug!(url = %url, "POST");
        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Authorization endpoint returned {}: {}", status, body);
            return Err(PairError::Platform {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl DeviceAuthEndpoint for GithubDeviceAuth {
    async fn request_code(&self, client_id: &str, scope: &str) -> PairResult<Value> {
        self.post_form("login/device/code", &[("client_id", client_id), ("scope", scope)])
            .await
    }

    async fn poll_token(&self, client_id: &str, device_code: &str) -> PairResult<Value> {
        self.post_form(
            "login/oauth/access_token",
            &[
                ("client_id", client_id),
                ("device_code", device_code),
                ("grant_type", DEVICE_GRANT_TYPE),
            ],
        )
        .await
    }
}
