// src/services/gateway.rs
//
// All outbound REST traffic goes through here: bearer-token injection,
// fixed request timeout, bounded retry on timeout, and one transparent
// refresh-and-retry when the server answers 401.

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::errors::{SwiftaidError, SwiftaidResult};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    /// Extra attempts after a timeout. Non-timeout errors are never
    /// retried; the timeout itself is the only backoff.
    pub max_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_secs(15),
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

pub struct RequestGateway {
    client: reqwest::Client,
    config: GatewayConfig,
    tokens: RwLock<AuthTokens>,
}

impl RequestGateway {
    pub fn new(config: GatewayConfig, tokens: AuthTokens) -> SwiftaidResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            config,
            tokens: RwLock::new(tokens),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> SwiftaidResult<T> {
        self.request(Method::GET, path, None).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> SwiftaidResult<T> {
        self.request(Method::PATCH, path, body).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> SwiftaidResult<T> {
        self.request(Method::PUT, path, body).await
    }

    /// Issue a request and ignore the response body.
    pub async fn put_unit(&self, path: &str, body: Option<serde_json::Value>) -> SwiftaidResult<()> {
        self.dispatch(Method::PUT, path, body.as_ref()).await?;
        Ok(())
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> SwiftaidResult<T> {
        let text = self.dispatch(method, path, body.as_ref()).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Run the retry/refresh loop for one logical request.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> SwiftaidResult<String> {
        let mut timeouts: u32 = 0;
        let mut refreshed = false;

        loop {
            match self.execute_once(method.clone(), path, body).await {
                Ok(text) => return Ok(text),
                Err(SwiftaidError::Unauthorized(_)) if !refreshed => {
                    refreshed = true;
                    tracing::info!("Access token rejected for {} {}, refreshing", method, path);
                    self.refresh_access_token().await?;
                }
                // A 401 on the refreshed token means the session is gone.
                Err(SwiftaidError::Unauthorized(_)) => return Err(SwiftaidError::AuthExpired),
                Err(SwiftaidError::Timeout) if timeouts < self.config.max_retries => {
                    timeouts += 1;
                    tracing::warn!(
                        "{} {} timed out, retry {}/{}",
                        method,
                        path,
                        timeouts,
                        self.config.max_retries
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> SwiftaidResult<String> {
        let token = self.tokens.read().await.access_token.clone();
        let mut request = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(SwiftaidError::unauthorized(path.to_string()));
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(SwiftaidError::api_status(status.as_u16(), text));
        }
        Ok(text)
    }

    /// Exchange the refresh token for a new access token. Any failure here
    /// means the session is gone and the caller must force a re-login.
    async fn refresh_access_token(&self) -> SwiftaidResult<()> {
        let refresh_token = self.tokens.read().await.refresh_token.clone();

        let response = self
            .client
            .post(self.url("/auth/refresh"))
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .map_err(|_| SwiftaidError::AuthExpired)?;

        if !response.status().is_success() {
            tracing::warn!("Token refresh rejected with {}", response.status());
            return Err(SwiftaidError::AuthExpired);
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|_| SwiftaidError::AuthExpired)?;

        self.tokens.write().await.access_token = parsed.access_token;
        tracing::debug!("Access token refreshed");
        Ok(())
    }

    /// Current access token, for collaborators that authenticate out of
    /// band (the realtime channel).
    pub async fn access_token(&self) -> String {
        self.tokens.read().await.access_token.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_url_joining_strips_trailing_slash() {
        let gateway = RequestGateway::new(
            GatewayConfig {
                base_url: "https://api.example.com/".to_string(),
                ..Default::default()
            },
            AuthTokens {
                access_token: "a".into(),
                refresh_token: "r".into(),
            },
        )
        .unwrap();
        assert_eq!(
            gateway.url("/ride/driverrides"),
            "https://api.example.com/ride/driverrides"
        );
    }

    #[test]
    fn test_refresh_response_parses_camel_case() {
        let parsed: RefreshResponse =
            serde_json::from_str(r#"{"accessToken":"fresh"}"#).unwrap();
        assert_eq!(parsed.access_token, "fresh");
    }

    #[tokio::test]
    async fn test_access_token_accessor() {
        let gateway = RequestGateway::new(
            GatewayConfig::default(),
            AuthTokens {
                access_token: "tok-1".into(),
                refresh_token: "r".into(),
            },
        )
        .unwrap();
        assert_eq!(gateway.access_token().await, "tok-1");
    }
}
