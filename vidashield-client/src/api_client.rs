//! REST client for the VidaShield API.
//!
//! Reads go through the shared [`RequestCache`]; writes go straight to the
//! network and invalidate the listings they affect.

use crate::auth::{ProviderSession, TokenProvider};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::key::ResourceKey;
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use vidashield_cache::{
    Clock, FetchError, FetchRead, FetchResult, RequestCache, RequestOptions, SystemClock,
    TransportError,
};

/// Error body shapes the backend uses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
    msg: Option<String>,
}

pub struct RestClient<C = SystemClock> {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    cache: RequestCache<Value, C>,
}

impl RestClient<SystemClock> {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, ClientError> {
        let session = Arc::new(ProviderSession(Arc::clone(&tokens)));
        let cache = RequestCache::new(session, SystemClock, config.cache_config());
        Self::with_cache(config, tokens, cache)
    }
}

impl<C: Clock> RestClient<C> {
    /// Build a client around an existing cache, e.g. one on a manual clock.
    ///
    /// The cache should be gated by the same provider as `tokens`.
    pub fn with_cache(
        config: &ClientConfig,
        tokens: Arc<dyn TokenProvider>,
        cache: RequestCache<Value, C>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tokens,
            cache,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cache(&self) -> &RequestCache<Value, C> {
        &self.cache
    }

    pub fn tokens(&self) -> &Arc<dyn TokenProvider> {
        &self.tokens
    }

    /// Cached, coalesced GET decoded into `T`.
    ///
    /// The raw JSON is what gets cached, so two call sites may read the same
    /// key into different shapes. A payload that does not fit `T` fails with
    /// [`TransportError::Decode`].
    pub async fn get_json<T>(
        &self,
        key: &ResourceKey,
        options: RequestOptions<T>,
    ) -> FetchResult<FetchRead<T>>
    where
        T: DeserializeOwned + Serialize,
    {
        let options = options
            .try_map_fallback(serde_json::to_value)
            .map_err(decode_error)?;
        let url = key.url(&self.base_url);
        let http = self.http.clone();
        let tokens = Arc::clone(&self.tokens);

        let read = self
            .cache
            .request(
                key.cache_key(),
                move || async move {
                    let token = tokens.access_token().await?;
                    let response = http
                        .get(&url)
                        .bearer_auth(token.expose_secret())
                        .send()
                        .await
                        .map_err(connection_error)?;
                    read_json(response).await
                },
                options,
            )
            .await?;

        read.try_map(|value| serde_json::from_value(value).map_err(decode_error))
    }

    /// Uncached POST/PUT/PATCH/DELETE.
    ///
    /// Mutations are never coalesced: two writes with different bodies to
    /// the same path are different requests. On success every cached entry
    /// whose key starts with `invalidates` is dropped.
    pub async fn send_json<T, B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        invalidates: &str,
    ) -> FetchResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        if !self.tokens.is_authenticated() {
            tracing::warn!(%method, path, "Mutation attempted without an authenticated session");
            return Err(FetchError::unauthenticated(format!(
                "no active session for {method} {path}"
            )));
        }
        let token = self.tokens.access_token().await?;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(token.expose_secret());
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(connection_error)?;
        let value = read_json(response).await?;

        let removed = self.cache.invalidate_prefix(invalidates);
        tracing::debug!(%method, path, removed, "Mutation succeeded");

        serde_json::from_value(value).map_err(decode_error)
    }
}

async fn read_json(response: reqwest::Response) -> FetchResult<Value> {
    let status = response.status();
    if status.is_success() {
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let bytes = response.bytes().await.map_err(connection_error)?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        return serde_json::from_slice(&bytes).map_err(decode_error);
    }

    let text = response.text().await.unwrap_or_default();
    Err(status_error(status, &text).into())
}

fn status_error(status: StatusCode, body: &str) -> TransportError {
    if status == StatusCode::UNAUTHORIZED {
        return TransportError::status(status.as_u16(), "Unauthorized. Please sign in again.");
    }
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|api_error| api_error.error.or(api_error.message).or(api_error.msg))
        .unwrap_or_else(|| {
            let text = body.trim();
            if text.is_empty() {
                status.canonical_reason().unwrap_or("Unknown error").to_string()
            } else {
                text.to_string()
            }
        });
    TransportError::status(status.as_u16(), message)
}

fn connection_error(err: reqwest::Error) -> FetchError {
    TransportError::connection(err.to_string()).into()
}

fn decode_error(err: serde_json::Error) -> FetchError {
    TransportError::decode(err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_prefers_api_error_fields() {
        let err = status_error(StatusCode::NOT_FOUND, r#"{"error":"User not found"}"#);
        assert_eq!(err, TransportError::status(404, "User not found"));

        let err = status_error(StatusCode::BAD_REQUEST, r#"{"msg":"Invalid status"}"#);
        assert_eq!(err, TransportError::status(400, "Invalid status"));
    }

    #[test]
    fn test_status_error_falls_back_to_text_or_reason() {
        let err = status_error(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err, TransportError::status(502, "upstream down"));

        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(err, TransportError::status(503, "Service Unavailable"));
    }

    #[test]
    fn test_unauthorized_asks_to_sign_in_again() {
        let err = status_error(StatusCode::UNAUTHORIZED, r#"{"error":"jwt expired"}"#);
        assert_eq!(
            err,
            TransportError::status(401, "Unauthorized. Please sign in again.")
        );
    }
}
