//! ecobee endpoint and OAuth client constants
//!
//! The PIN grant uses the developer API key as `client_id`. The web login
//! flow reuses the public client of ecobee's consumer portal; none of the
//! values below are secrets.

/// Host serving `authorize`, `token` and the versioned API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.ecobee.com";

/// Host serving the consumer portal login (Auth0 universal login).
pub const DEFAULT_WEB_AUTH_BASE_URL: &str = "https://auth.ecobee.com";

pub const API_VERSION: &str = "1";

pub const ENDPOINT_AUTHORIZE: &str = "authorize";
pub const ENDPOINT_TOKEN: &str = "token";
pub const ENDPOINT_THERMOSTAT: &str = "thermostat";

/// `response_type` and `grant_type` of the PIN flow.
pub const PIN_GRANT: &str = "ecobeePin";

/// Scope requested for PIN authorization.
pub const PIN_SCOPE: &str = "smartWrite";

pub const REFRESH_GRANT: &str = "refresh_token";

/// OAuth error code for a rejected code or refresh token.
pub const INVALID_GRANT: &str = "invalid_grant";

/// Public client ID of the ecobee consumer portal.
pub const WEB_CLIENT_ID: &str = "183eORFPlXyz9BbDZwqexHPBQoVjgadh";

pub const WEB_REDIRECT_URI: &str = "https://www.ecobee.com/home/authCallback";

pub const WEB_AUDIENCE: &str = "https://prod.ecobee.com/api/v1";

pub const WEB_SCOPES: &str = "openid smartWrite piiWrite piiRead smartRead deleteGrants";

/// Session cookie set by a successful web login.
pub const SESSION_COOKIE: &str = "auth0";

/// Base URLs for every remote the client talks to.
///
/// Production uses `Endpoints::default()`. Tests and proxies override the
/// hosts; paths and the API version are fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth_base: String,
    pub api_base: String,
    pub web_auth_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_base: DEFAULT_API_BASE_URL.into(),
            api_base: DEFAULT_API_BASE_URL.into(),
            web_auth_base: DEFAULT_WEB_AUTH_BASE_URL.into(),
        }
    }
}

impl Endpoints {
    /// Every host set to `base`. Convenient for tests and local mocks.
    pub fn single_host(base: &str) -> Self {
        Self {
            auth_base: base.into(),
            api_base: base.into(),
            web_auth_base: base.into(),
        }
    }

    /// Unversioned URL, e.g. `https://api.ecobee.com/token`.
    pub fn auth_url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.auth_base.trim_end_matches('/'))
    }

    /// Versioned URL, e.g. `https://api.ecobee.com/1/thermostat`.
    pub fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{API_VERSION}/{endpoint}",
            self.api_base.trim_end_matches('/')
        )
    }

    pub fn web_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.web_auth_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
