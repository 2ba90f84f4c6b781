//! HTTP transport for OpenAI-compatible endpoints.
//!
//! `Transport` wraps a `reqwest::Client` with pre-built headers and the
//! base URL, and maps every transport or status failure onto
//! [`ProviderError`].

use crate::wire::{self, ModelList};
use compact_str::CompactString;
use qcore::{ProviderConfig, ProviderError, RateLimitOrigin, Result};
use reqwest::{
    Client, Response, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// Shared HTTP client bound to one provider config.
#[derive(Clone)]
pub struct Transport {
    provider: CompactString,
    client: Client,
    base: String,
    timeout: Duration,
}

impl Transport {
    /// Build a client for `base` with bearer auth when a credential is set.
    pub fn new(provider: &str, base: &str, config: &ProviderConfig) -> Result<Self> {
        let invalid = |e: &dyn std::fmt::Display| {
            ProviderError::invalid_config(provider, format!("invalid header value: {e}"))
        };
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(credential) = &config.credential {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
                .map_err(|e| invalid(&e))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        if let Some(organization) = &config.organization {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(organization).map_err(|e| invalid(&e))?,
            );
        }
        if let Some(project) = &config.project {
            headers.insert(
                "OpenAI-Project",
                HeaderValue::from_str(project).map_err(|e| invalid(&e))?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Connection {
                provider: provider.into(),
                message: format!("failed to build http client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            provider: provider.into(),
            client,
            base: base.trim_end_matches('/').to_owned(),
            timeout: config.timeout,
        })
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// POST `body` to `path`, returning the raw response once it is 2xx.
    pub async fn post(&self, path: &str, body: &impl Serialize) -> Result<Response> {
        if tracing::enabled!(tracing::Level::TRACE) {
            if let Ok(body) = serde_json::to_string(body) {
                tracing::trace!("{}: request {path}: {body}", self.provider);
            }
        }
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.check(response).await
    }

    /// POST `body` to `path` and decode the JSON response.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let response = self.post(path, body).await?;
        self.decode(response).await
    }

    /// `GET /models`.
    pub async fn models(&self) -> Result<ModelList> {
        let response = self
            .client
            .get(self.url("/models"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = self.check(response).await?;
        self.decode(response).await
    }

    /// Map a failure that happened mid-stream.
    pub fn stream_error(&self, error: reqwest::Error) -> ProviderError {
        self.transport_error(error)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.unwrap_or_default();
        Err(status_error(
            &self.provider,
            status,
            retry_after.as_deref(),
            &body,
        ))
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&text).map_err(|e| ProviderError::Api {
            provider: self.provider.clone(),
            status: Some(status),
            message: format!("malformed response body: {e}"),
            source: Some(Box::new(e)),
        })
    }

    fn transport_error(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            return ProviderError::Timeout {
                provider: self.provider.clone(),
                timeout: self.timeout,
            };
        }
        let message = if error.is_connect() {
            format!("cannot connect to {}", self.base)
        } else {
            error.to_string()
        };
        ProviderError::Connection {
            provider: self.provider.clone(),
            message,
            source: Some(Box::new(error)),
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("provider", &self.provider)
            .field("base", &self.base)
            .finish()
    }
}

/// Map a non-2xx status onto the error taxonomy.
///
/// 429 becomes a vendor rate limit carrying `Retry-After` (whole seconds);
/// everything else is an API error with the vendor's message.
pub fn status_error(
    provider: &str,
    status: StatusCode,
    retry_after: Option<&str>,
    body: &str,
) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ProviderError::RateLimited {
            provider: provider.into(),
            origin: RateLimitOrigin::Vendor,
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        };
    }
    ProviderError::Api {
        provider: provider.into(),
        status: Some(status.as_u16()),
        message: wire::error_message(body),
        source: None,
    }
}
