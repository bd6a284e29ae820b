//! Hosting-platform clients.
//!
//! Everything here is plumbing around the pairing core: thin reqwest
//! wrappers over the REST and GraphQL APIs that implement the collaborator
//! traits the core depends on.

pub mod installation;
pub mod oauth;
pub mod projects;
pub mod secrets;

pub use installation::GithubInstallations;
pub use oauth::GithubDeviceAuth;
pub use projects::GithubProjects;
pub use secrets::{GithubSecrets, PlatformSecrets};

use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::{PairError, PairResult};

const USER_AGENT: &str = concat!("devicepass/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// Authenticated client for the platform REST and GraphQL APIs.
#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    api_url: String,
    token: String,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

impl GithubClient {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> PairResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> PairResult<T> {
        debug!(path, "GET");
        let response = self.request(reqwest::Method::GET, path).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// GET that maps 404 to `None`.
    pub async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> PairResult<Option<T>> {
        debug!(path, "GET");
        let response = self.request(reqwest::Method::GET, path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response).await?.json().await?))
    }

    pub async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> PairResult<()> {
        debug!(path, "PUT");
        let response = self.request(reqwest::Method::PUT, path).json(body).send().await?;
        check(response).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &str) -> PairResult<()> {
        debug!(path, "DELETE");
        let response = self.request(reqwest::Method::DELETE, path).send().await?;
        check(response).await?;
        Ok(())
    }

    pub async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value) -> PairResult<T> {
        let response = self
            .request(reqwest::Method::POST, "graphql")
            .json(&GraphqlRequest { query, variables })
            .send()
            .await?;
        let body: GraphqlResponse<T> = check(response).await?.json().await?;
        if let Some(first) = body.errors.first() {
            error!("GraphQL request failed: {}", first.message);
            return Err(PairError::Platform {
                status: StatusCode::OK.as_u16(),
                message: first.message.clone(),
            });
        }
        body.data.ok_or_else(|| PairError::Platform {
            status: StatusCode::OK.as_u16(),
            message: "GraphQL response without data".to_string(),
        })
    }
}

async fn check(response: Response) -> PairResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    error!("Platform request failed with status {}: {}", status, message);
    Err(PairError::Platform {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joining() {
        let client = GithubClient::new("https://api.github.com/", "t", Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint("/repos/a/b"), "https://api.github.com/repos/a/b");
        assert_eq!(client.endpoint("graphql"), "https://api.github.com/graphql");
    }

    #[test]
    fn test_debug_hides_token() {
        let client = GithubClient::new("https://api.github.com", "ghp_secret", Duration::from_secs(5)).unwrap();
        assert!(!format!("{client:?}").contains("ghp_secret"));
    }
}
