//! Bearer token validation against the REST API, through the cache.

use crate::cache::TokenValidationCache;
use postdeck_core::ValidationResult;
use reqwest::{StatusCode, Url};
use std::sync::Arc;

/// Validates tokens with `POST {api_base}/auth/validate/`.
///
/// Backend verdicts are cached for the cache's full TTL whether or not the
/// token was accepted. Requests that fail outright are cached for the short
/// failure TTL so a dead backend is not hammered.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    http: reqwest::Client,
    endpoint: Url,
    cache: Arc<TokenValidationCache>,
}

impl TokenValidator {
    pub fn new(api_base: &str, cache: Arc<TokenValidationCache>) -> Result<Self, ValidateError> {
        let endpoint = validate_endpoint(api_base)?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
            cache,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn cache(&self) -> &Arc<TokenValidationCache> {
        &self.cache
    }

    /// Validate `token`, answering from the cache when possible.
    pub async fn validate(&self, token: &str) -> ValidationResult {
        if let Some(hit) = self.cache.get(token) {
            tracing::debug!("Token validation cache hit");
            return hit;
        }

        match self.fetch(token).await {
            Ok(result) => {
                tracing::debug!("Token validated: valid={}", result.is_valid);
                self.cache.insert(token, result.clone());
                result
            }
            Err(e) => {
                tracing::warn!("Token validation failed: {}", e);
                let result = ValidationResult::invalid(e.to_string());
                self.cache.insert_failure(token, result.clone());
                result
            }
        }
    }

    /// Drop every cached verdict.
    pub fn logout(&self) {
        self.cache.clear();
        tracing::info!("Cleared token validation cache");
    }

    async fn fetch(&self, token: &str) -> Result<ValidationResult, ValidateError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(response
                .json()
                .await
                .unwrap_or_else(|_| ValidationResult::invalid("unauthorized"))),
            status => Err(ValidateError::Status(status.as_u16())),
        }
    }
}

fn validate_endpoint(api_base: &str) -> Result<Url, ValidateError> {
    let invalid = |e: String| ValidateError::InvalidUrl(api_base.to_string(), e);
    let mut base = Url::parse(api_base).map_err(|e| invalid(e.to_string()))?;
    if base.cannot_be_a_base() {
        return Err(invalid("not a base url".to_string()));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("auth/validate/").map_err(|e| invalid(e.to_string()))
}

/// Error talking to the validation endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    #[error("invalid api base {0:?}: {1}")]
    InvalidUrl(String, String),
    #[error("validation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("validation endpoint returned {0}")]
    Status(u16),
}
