//! PIN grant and token refresh
//!
//! Handles the three interactions with ecobee's unversioned auth endpoints:
//! 1. `GET authorize` with `response_type=ecobeePin` issues a PIN and an
//!    authorization code
//! 2. `POST token` with `grant_type=ecobeePin` exchanges the code once the
//!    user has entered the PIN on the ecobee portal
//! 3. `POST token` with `grant_type=refresh_token` renews the token pair
//!
//! All parameters travel in the query string. No bearer header is sent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use transport::{HttpRequest, Transport};

use crate::constants::{
    ENDPOINT_AUTHORIZE, ENDPOINT_TOKEN, Endpoints, INVALID_GRANT, PIN_GRANT, PIN_SCOPE,
    REFRESH_GRANT,
};
use crate::error::{Error, Result};

/// Response of the PIN request.
#[derive(Debug, Clone, Deserialize)]
pub struct PinGrant {
    /// Authorization code to exchange once the PIN is authorized.
    pub code: String,
    #[serde(rename = "ecobeePin")]
    pub pin: String,
    /// Minutes until the PIN expires.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Minimum seconds between token polls.
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Response from the token endpoint for both grants.
///
/// `refresh_token` is optional: a refresh response that omits it leaves the
/// stored one in place.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// True for the auth endpoint's "code or refresh token rejected" answer.
pub fn is_invalid_grant(status: u16, payload: &Value) -> bool {
    status == 400 && payload.get("error").and_then(Value::as_str) == Some(INVALID_GRANT)
}

/// Request a PIN for out-of-band authorization on the ecobee portal.
pub async fn request_pin(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    api_key: &str,
) -> Result<PinGrant> {
    let request = HttpRequest::get(endpoints.auth_url(ENDPOINT_AUTHORIZE))
        .query("response_type", PIN_GRANT)
        .query("client_id", api_key)
        .query("scope", PIN_SCOPE);

    let payload = send(transport, &request, "request pin").await?;
    let grant: PinGrant = serde_json::from_value(payload)
        .map_err(|e| Error::MalformedResponse(format!("PIN response: {e}")))?;
    if grant.code.is_empty() || grant.pin.is_empty() {
        return Err(Error::MalformedResponse(
            "PIN response has an empty code or PIN".into(),
        ));
    }
    Ok(grant)
}

/// Exchange an authorization code for tokens.
///
/// Fails with `TokenExchange` until the user has authorized the PIN, so the
/// caller is expected to retry.
pub async fn exchange_pin(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    api_key: &str,
    code: &str,
) -> Result<TokenResponse> {
    let request = HttpRequest::post(endpoints.auth_url(ENDPOINT_TOKEN))
        .query("grant_type", PIN_GRANT)
        .query("code", code)
        .query("client_id", api_key);

    let payload = send(transport, &request, "request tokens").await?;
    parse_tokens(payload)
}

/// Renew the token pair with a refresh token.
pub async fn refresh_token(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    api_key: &str,
    refresh: &str,
) -> Result<TokenResponse> {
    let request = HttpRequest::post(endpoints.auth_url(ENDPOINT_TOKEN))
        .query("grant_type", REFRESH_GRANT)
        .query("refresh_token", refresh)
        .query("client_id", api_key);

    let payload = send(transport, &request, "refresh tokens").await?;
    parse_tokens(payload)
}

fn parse_tokens(payload: Value) -> Result<TokenResponse> {
    let tokens: TokenResponse = serde_json::from_value(payload)
        .map_err(|e| Error::MalformedResponse(format!("token response: {e}")))?;
    if tokens.access_token.is_empty() {
        return Err(Error::MalformedResponse(
            "token response has an empty access_token".into(),
        ));
    }
    Ok(tokens)
}

/// Send an auth-endpoint request and return the JSON payload of a success.
async fn send(transport: &dyn Transport, request: &HttpRequest, action: &str) -> Result<Value> {
    debug!(url = %request.url, action, "sending auth request");
    let response = transport
        .send(request)
        .await
        .map_err(|e| Error::Http(format!("{action}: {e}")))?;

    let payload = response.parse_json();
    if !response.is_success() {
        let payload = payload.unwrap_or(Value::Null);
        if is_invalid_grant(response.status, &payload) {
            return Err(Error::InvalidGrant(format!(
                "{action}: ecobee tokens invalid; re-authentication required"
            )));
        }
        return Err(Error::TokenExchange(format!(
            "{action}: auth endpoint returned {}: {}",
            response.status, response.body
        )));
    }

    payload.ok_or_else(|| Error::MalformedResponse(format!("{action}: body is not JSON")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use transport::{HttpResponse, Method, ScriptedTransport, TransportError};

    fn endpoints() -> Endpoints {
        Endpoints::single_host("https://ecobee.test")
    }

    #[tokio::test]
    async fn request_pin_sends_pin_parameters() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"ecobeePin": "ABCD-EF", "code": "auth-code", "scope": "smartWrite", "expires_in": 9, "interval": 30}),
        );

        let grant = request_pin(&transport, &endpoints(), "K1").await.unwrap();
        assert_eq!(grant.pin, "ABCD-EF");
        assert_eq!(grant.code, "auth-code");
        assert_eq!(grant.interval, Some(30));

        let sent = &transport.requests()[0];
        assert_eq!(sent.url, "https://ecobee.test/authorize");
        assert_eq!(sent.query_value("response_type"), Some("ecobeePin"));
        assert_eq!(sent.query_value("client_id"), Some("K1"));
        assert_eq!(sent.query_value("scope"), Some("smartWrite"));
        assert!(sent.header_value("authorization").is_none());
    }

    #[tokio::test]
    async fn request_pin_rejects_missing_fields() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"ecobeePin": "ABCD"}));

        let err = request_pin(&transport, &endpoints(), "K1").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn request_pin_rejects_empty_fields() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"ecobeePin": "", "code": ""}));

        let err = request_pin(&transport, &endpoints(), "K1").await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn exchange_pin_posts_code() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            200,
            json!({"access_token": "A1", "refresh_token": "R1", "expires_in": 3599, "token_type": "Bearer", "scope": "smartWrite"}),
        );

        let tokens = exchange_pin(&transport, &endpoints(), "K1", "auth-code")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "A1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("R1"));

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.url, "https://ecobee.test/token");
        assert_eq!(sent.query_value("grant_type"), Some("ecobeePin"));
        assert_eq!(sent.query_value("code"), Some("auth-code"));
    }

    #[tokio::test]
    async fn exchange_before_authorization_is_a_token_exchange_error() {
        let transport = ScriptedTransport::new();
        transport.push_json(
            401,
            json!({"error": "authorization_pending", "error_description": "Waiting for user to authorize application."}),
        );

        let err = exchange_pin(&transport, &endpoints(), "K1", "auth-code")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_with_invalid_grant() {
        let transport = ScriptedTransport::new();
        transport.push_json(400, json!({"error": "invalid_grant"}));

        let err = refresh_token(&transport, &endpoints(), "K1", "R1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidGrant(_)), "got: {err:?}");

        let sent = &transport.requests()[0];
        assert_eq!(sent.query_value("grant_type"), Some("refresh_token"));
        assert_eq!(sent.query_value("refresh_token"), Some("R1"));
    }

    #[tokio::test]
    async fn refresh_without_new_refresh_token() {
        let transport = ScriptedTransport::new();
        transport.push_json(200, json!({"access_token": "A2"}));

        let tokens = refresh_token(&transport, &endpoints(), "K1", "R1")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "A2");
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn transport_failure_is_http_error() {
        let transport = ScriptedTransport::new();
        transport.push_error(TransportError::Timeout("30s".into()));

        let err = refresh_token(&transport, &endpoints(), "K1", "R1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(200, "<html>maintenance</html>"));

        let err = refresh_token(&transport, &endpoints(), "K1", "R1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)), "got: {err:?}");
    }

    #[test]
    fn invalid_grant_detection() {
        assert!(is_invalid_grant(400, &json!({"error": "invalid_grant"})));
        assert!(!is_invalid_grant(401, &json!({"error": "invalid_grant"})));
        assert!(!is_invalid_grant(400, &json!({"error": "invalid_client"})));
        assert!(!is_invalid_grant(400, &Value::Null));
    }
}
