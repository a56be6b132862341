//! Resilient request executor
//!
//! Wraps every API call with refresh-and-retry for the single case of an
//! expired access token:
//! 1. Send the request with the current access token
//! 2. On `ExpiredToken`, refresh once and retry once, whatever the refresh
//!    outcome
//! 3. An `ExpiredToken` on the retry, or `InvalidToken` on any attempt,
//!    propagates to the caller
//! 4. Transient, remote and malformed outcomes are logged and reported as
//!    `Ok(None)`

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ecobee_auth::Endpoints;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use transport::{HttpRequest, Method, Transport};

use crate::classify::{Classification, StatusCodeMap, classify, vendor_code, vendor_message};
use crate::error::{Error, Result};

const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

/// Immutable description of one API call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Auth endpoints are unversioned and carry no bearer header.
    pub is_auth_endpoint: bool,
    /// Human-readable action for log records, e.g. "set hold temp".
    pub action: String,
}

impl RequestDescriptor {
    pub fn get(endpoint: &str, action: &str) -> Self {
        Self::new(Method::Get, endpoint, action)
    }

    pub fn post(endpoint: &str, action: &str) -> Self {
        Self::new(Method::Post, endpoint, action)
    }

    fn new(method: Method, endpoint: &str, action: &str) -> Self {
        Self {
            method,
            endpoint: endpoint.to_string(),
            params: Vec::new(),
            body: None,
            is_auth_endpoint: false,
            action: action.to_string(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn auth_endpoint(mut self) -> Self {
        self.is_auth_endpoint = true;
        self
    }

    /// Resolve into an HTTP request carrying `access_token`.
    pub fn to_http(&self, endpoints: &Endpoints, access_token: &str) -> HttpRequest {
        let url = if self.is_auth_endpoint {
            endpoints.auth_url(&self.endpoint)
        } else {
            endpoints.api_url(&self.endpoint)
        };

        let mut request = HttpRequest::new(self.method, url);
        for (name, value) in &self.params {
            request = request.query(name, value.as_str());
        }
        if !self.is_auth_endpoint {
            request = request
                .header("Content-Type", JSON_CONTENT_TYPE)
                .header("Authorization", format!("Bearer {access_token}"));
        }
        if let Some(body) = &self.body {
            request = request.json(body.clone());
        }
        request
    }
}

/// Supplies the bearer token and renews it on demand.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> &str;

    /// Attempt one token refresh. `false` leaves the current token in place.
    fn refresh(&mut self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// Sends API requests and applies the refresh-and-retry policy.
pub struct Executor {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    codes: StatusCodeMap,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints, codes: StatusCodeMap) -> Self {
        Self {
            transport,
            endpoints,
            codes,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// One HTTP attempt, classified. Never retries.
    pub async fn attempt(&self, request: &RequestDescriptor, access_token: &str) -> Classification {
        let http = request.to_http(&self.endpoints, access_token);
        debug!(
            action = %request.action,
            method = request.method.as_str(),
            url = %http.url,
            params = ?request.params,
            body = ?request.body,
            "sending API request"
        );

        let result = self.transport.send(&http).await;
        if let Ok(response) = &result {
            debug!(status = response.status, body = %response.body, "API response");
        }

        let classification = classify(result, request.is_auth_endpoint, &self.codes);
        metrics::counter!("ecobee_requests_total", "outcome" => classification.outcome())
            .increment(1);
        classification
    }

    /// Execute with at most one refresh and one retry.
    ///
    /// Returns the JSON payload on success, `Ok(None)` for handled failures,
    /// and `Err` only for `ExpiredToken` after the retry or `InvalidToken`.
    pub async fn execute(
        &self,
        request: &RequestDescriptor,
        tokens: &mut dyn TokenSource,
    ) -> Result<Option<Value>> {
        let token = tokens.access_token().to_string();
        let mut outcome = self.attempt(request, &token).await;

        if outcome == Classification::ExpiredToken {
            info!(action = %request.action, "access token expired, refreshing");
            if !tokens.refresh().await {
                warn!(action = %request.action, "token refresh failed, retrying with current token");
            }
            let token = tokens.access_token().to_string();
            outcome = self.attempt(request, &token).await;
        }

        match outcome {
            Classification::Success(payload) => Ok(Some(payload)),
            Classification::ExpiredToken => {
                warn!(action = %request.action, "access token still expired after refresh");
                Err(Error::ExpiredToken)
            }
            Classification::InvalidToken => {
                warn!(action = %request.action, "ecobee tokens invalid; re-authentication required");
                Err(Error::InvalidToken)
            }
            Classification::TransientFailure(reason) => {
                error!(action = %request.action, error = %reason, "connection to ecobee failed");
                Ok(None)
            }
            Classification::RemoteError { status: 429, .. } => {
                error!(
                    action = %request.action,
                    "ecobee API rate limit exceeded; reduce the request rate and try again later"
                );
                Ok(None)
            }
            Classification::RemoteError { status, payload } => {
                error!(
                    action = %request.action,
                    status,
                    code = ?vendor_code(&payload),
                    message = vendor_message(&payload).unwrap_or("Unknown error"),
                    "error from ecobee"
                );
                Ok(None)
            }
            Classification::MalformedResponse(reason) => {
                warn!(action = %request.action, error = %reason, "unexpected response from ecobee");
                Ok(None)
            }
        }
    }
}
