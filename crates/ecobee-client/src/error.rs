//! Error types for ecobee client operations

/// Failures that cross the client boundary.
///
/// Only the two token kinds are raised by the request path; remote and
/// transport failures are logged and reported as an absent result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The access token is still rejected as expired after one refresh.
    #[error("ecobee access token expired; token refresh required")]
    ExpiredToken,

    /// The tokens are no longer accepted; a new PIN or login is required.
    #[error("ecobee tokens invalid; re-authentication required")]
    InvalidToken,

    /// New tokens could not be persisted. In-memory credentials are unchanged.
    #[error("credential store error: {0}")]
    Store(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no thermostat at index {0}; call get_thermostats() first")]
    UnknownThermostat(usize),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
