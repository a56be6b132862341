//! Error types for ecobee authorization and credential storage

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The token endpoint answered 400 `invalid_grant`: the authorization
    /// code or refresh token is no longer accepted.
    #[error("grant rejected: {0}")]
    InvalidGrant(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("web login failed: {0}")]
    Login(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;
