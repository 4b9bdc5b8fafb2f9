// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

const USER_AGENT: &str = concat!("castsync/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP Basic credentials attached to sync-server requests
#[derive(Debug, Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// A response reduced to the parts the engine cares about
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
}

/// HTTP client abstraction for testability
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET with optional basic auth, returning status and body
    async fn get(&self, url: &str, auth: Option<&BasicAuth>)
    -> Result<HttpResponse, reqwest::Error>;

    /// POST a JSON body with optional basic auth, returning status and body
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        auth: Option<&BasicAuth>,
    ) -> Result<HttpResponse, reqwest::Error>;
}

/// Default HTTP client implementation using reqwest
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Create a new ReqwestClient with default settings
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for ReqwestClient {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_auth(req: reqwest::RequestBuilder, auth: Option<&BasicAuth>) -> reqwest::RequestBuilder {
    match auth {
        Some(auth) => req.basic_auth(&auth.username, Some(&auth.password)),
        None => req,
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(
        &self,
        url: &str,
        auth: Option<&BasicAuth>,
    ) -> Result<HttpResponse, reqwest::Error> {
        let response = apply_auth(self.client.get(url), auth).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpResponse { status, body })
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
        auth: Option<&BasicAuth>,
    ) -> Result<HttpResponse, reqwest::Error> {
        let response = apply_auth(self.client.post(url).json(body), auth)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reqwest_client_can_be_created() {
        let _client = ReqwestClient::new();
        let _client_default = ReqwestClient::default();
    }

    #[test]
    fn reqwest_client_can_be_cloned() {
        let client = ReqwestClient::new();
        let _cloned = client.clone();
    }
}
