//! Response classification for ecobee API calls
//!
//! Every HTTP outcome maps to exactly one `Classification`. Token problems are
//! reported by the API as an error status carrying a vendor code in
//! `status.code`; which codes mean "expired" and which mean "invalid" is
//! configurable through `StatusCodeMap`. Auth endpoints report a rejected
//! grant as 400 `invalid_grant` instead.

use serde::Deserialize;
use serde_json::Value;
use transport::HttpResponse;

/// Outcome of one HTTP attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Success(Value),
    /// Access token aged out; refresh-and-retry applies.
    ExpiredToken,
    /// Tokens rejected outright; re-authorization required.
    InvalidToken,
    /// Timeout or connection failure. Never a token problem.
    TransientFailure(String),
    RemoteError { status: u16, payload: Value },
    /// 2xx without a JSON body.
    MalformedResponse(String),
}

impl Classification {
    /// Label for the `outcome` metric and log field.
    pub fn outcome(&self) -> &'static str {
        match self {
            Classification::Success(_) => "success",
            Classification::ExpiredToken => "expired_token",
            Classification::InvalidToken => "invalid_token",
            Classification::TransientFailure(_) => "transient",
            Classification::RemoteError { .. } => "remote_error",
            Classification::MalformedResponse(_) => "malformed",
        }
    }
}

/// Vendor `status.code` values that signal token errors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StatusCodeMap {
    pub expired: Vec<i64>,
    pub invalid: Vec<i64>,
}

impl Default for StatusCodeMap {
    fn default() -> Self {
        Self {
            expired: vec![14],
            invalid: vec![1, 16],
        }
    }
}

impl StatusCodeMap {
    /// A code may not be both expired and invalid.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(code) = self.expired.iter().find(|c| self.invalid.contains(c)) {
            return Err(format!(
                "status code {code} is listed as both expired and invalid"
            ));
        }
        Ok(())
    }

    fn token_error(&self, code: i64) -> Option<Classification> {
        if self.invalid.contains(&code) {
            Some(Classification::InvalidToken)
        } else if self.expired.contains(&code) {
            Some(Classification::ExpiredToken)
        } else {
            None
        }
    }
}

/// Vendor status code from an error payload, if present.
pub fn vendor_code(payload: &Value) -> Option<i64> {
    payload.get("status")?.get("code")?.as_i64()
}

/// Vendor status message from an error payload, if present.
pub fn vendor_message(payload: &Value) -> Option<&str> {
    payload.get("status")?.get("message")?.as_str()
}

/// Classify the result of one HTTP attempt.
pub fn classify(
    result: transport::Result<HttpResponse>,
    is_auth_endpoint: bool,
    codes: &StatusCodeMap,
) -> Classification {
    let response = match result {
        Ok(response) => response,
        Err(e) => return Classification::TransientFailure(e.to_string()),
    };

    let payload = response.parse_json();
    if response.is_success() {
        return match payload {
            Some(payload) => Classification::Success(payload),
            None => Classification::MalformedResponse(format!(
                "status {} with a non-JSON body",
                response.status
            )),
        };
    }

    let payload = payload.unwrap_or(Value::Null);
    if is_auth_endpoint {
        if ecobee_auth::token::is_invalid_grant(response.status, &payload) {
            return Classification::InvalidToken;
        }
    } else if let Some(kind) = vendor_code(&payload).and_then(|code| codes.token_error(code)) {
        return kind;
    }

    Classification::RemoteError {
        status: response.status,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use transport::TransportError;

    fn api(status: u16, body: Value) -> Classification {
        classify(
            Ok(HttpResponse::with_json(status, &body)),
            false,
            &StatusCodeMap::default(),
        )
    }

    #[test]
    fn success_with_json() {
        let result = api(200, json!({"thermostatList": []}));
        assert_eq!(result, Classification::Success(json!({"thermostatList": []})));
    }

    #[test]
    fn success_without_json_is_malformed() {
        let result = classify(
            Ok(HttpResponse::new(200, "<html>")),
            false,
            &StatusCodeMap::default(),
        );
        assert!(matches!(result, Classification::MalformedResponse(_)));
    }

    #[test]
    fn vendor_code_14_is_expired() {
        let result = api(500, json!({"status": {"code": 14, "message": "Authentication token has expired."}}));
        assert_eq!(result, Classification::ExpiredToken);
    }

    #[test]
    fn vendor_codes_1_and_16_are_invalid() {
        assert_eq!(api(500, json!({"status": {"code": 1}})), Classification::InvalidToken);
        assert_eq!(api(500, json!({"status": {"code": 16}})), Classification::InvalidToken);
    }

    #[test]
    fn vendor_code_on_other_error_status() {
        assert_eq!(api(401, json!({"status": {"code": 14}})), Classification::ExpiredToken);
    }

    #[test]
    fn unknown_vendor_code_is_remote_error() {
        let result = api(500, json!({"status": {"code": 3, "message": "Processing error."}}));
        assert!(matches!(result, Classification::RemoteError { status: 500, .. }));
    }

    #[test]
    fn rate_limit_is_remote_error() {
        let result = classify(
            Ok(HttpResponse::new(429, "Too Many Requests")),
            false,
            &StatusCodeMap::default(),
        );
        assert_eq!(
            result,
            Classification::RemoteError {
                status: 429,
                payload: Value::Null
            }
        );
    }

    #[test]
    fn timeout_is_transient() {
        let result = classify(
            Err(TransportError::Timeout("30s".into())),
            false,
            &StatusCodeMap::default(),
        );
        assert!(matches!(result, Classification::TransientFailure(_)));
        assert_eq!(result.outcome(), "transient");
    }

    #[test]
    fn auth_endpoint_invalid_grant() {
        let codes = StatusCodeMap::default();
        let invalid = classify(
            Ok(HttpResponse::with_json(400, &json!({"error": "invalid_grant"}))),
            true,
            &codes,
        );
        assert_eq!(invalid, Classification::InvalidToken);

        // Vendor codes only apply to API endpoints.
        let other = classify(
            Ok(HttpResponse::with_json(500, &json!({"status": {"code": 14}}))),
            true,
            &codes,
        );
        assert!(matches!(other, Classification::RemoteError { .. }));
    }

    #[test]
    fn custom_code_map() {
        let codes = StatusCodeMap {
            expired: vec![14, 15],
            invalid: vec![16],
        };
        let result = classify(
            Ok(HttpResponse::with_json(500, &json!({"status": {"code": 15}}))),
            false,
            &codes,
        );
        assert_eq!(result, Classification::ExpiredToken);

        let result = classify(
            Ok(HttpResponse::with_json(500, &json!({"status": {"code": 1}}))),
            false,
            &codes,
        );
        assert!(matches!(result, Classification::RemoteError { .. }));
    }

    #[test]
    fn overlapping_code_map_is_rejected() {
        let codes = StatusCodeMap {
            expired: vec![14],
            invalid: vec![14],
        };
        assert!(codes.validate().unwrap_err().contains("14"));
        assert!(StatusCodeMap::default().validate().is_ok());
    }

    #[test]
    fn code_map_from_toml_defaults_missing_lists() {
        let codes: StatusCodeMap = toml::from_str("expired = [14, 15]").unwrap();
        assert_eq!(codes.expired, vec![14, 15]);
        assert_eq!(codes.invalid, vec![1, 16]);
    }
}
