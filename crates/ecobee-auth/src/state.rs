//! Authorization lifecycle
//!
//! The lifecycle is a pure transition function over four states. Events are
//! emitted by the session after each step succeeds; failures emit nothing, so
//! a rejected grant or a failed save leaves the state where it was.
//!
//! `AuthorizationGranted` covers the window between the token endpoint issuing
//! tokens and the credential store confirming they are durable. A session only
//! reports `Authorized` once the new tokens would survive a restart.

use std::fmt;

use crate::credentials::Credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthorized,
    PinRequested,
    AuthorizationGranted,
    Authorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    /// A PIN and authorization code were issued.
    PinIssued,
    /// The token endpoint (or web login) returned a usable access token.
    TokensIssued,
    /// The tokens were written to the credential store.
    TokensPersisted,
}

impl AuthState {
    /// Infer the state from stored credentials at startup.
    pub fn from_credentials(credentials: &Credentials) -> Self {
        if !credentials.access_token.is_empty() {
            AuthState::Authorized
        } else if !credentials.authorization_code.is_empty() {
            AuthState::PinRequested
        } else {
            AuthState::Unauthorized
        }
    }

    /// Apply an event. Events that do not apply in the current state are
    /// ignored.
    pub fn on(self, event: AuthEvent) -> Self {
        match (self, event) {
            // A new PIN does not revoke tokens that are already working.
            (AuthState::Authorized, AuthEvent::PinIssued) => AuthState::Authorized,
            (_, AuthEvent::PinIssued) => AuthState::PinRequested,
            (_, AuthEvent::TokensIssued) => AuthState::AuthorizationGranted,
            (AuthState::AuthorizationGranted, AuthEvent::TokensPersisted) => {
                AuthState::Authorized
            }
            (state, AuthEvent::TokensPersisted) => state,
        }
    }

    pub fn is_authorized(self) -> bool {
        self == AuthState::Authorized
    }

    pub fn label(self) -> &'static str {
        match self {
            AuthState::Unauthorized => "unauthorized",
            AuthState::PinRequested => "pin_requested",
            AuthState::AuthorizationGranted => "authorization_granted",
            AuthState::Authorized => "authorized",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_flow_reaches_authorized() {
        let state = AuthState::Unauthorized
            .on(AuthEvent::PinIssued)
            .on(AuthEvent::TokensIssued)
            .on(AuthEvent::TokensPersisted);
        assert_eq!(state, AuthState::Authorized);
    }

    #[test]
    fn issued_tokens_are_not_authorized_until_persisted() {
        let state = AuthState::PinRequested.on(AuthEvent::TokensIssued);
        assert_eq!(state, AuthState::AuthorizationGranted);
        assert!(!state.is_authorized());
    }

    #[test]
    fn refresh_passes_through_granted() {
        let state = AuthState::Authorized.on(AuthEvent::TokensIssued);
        assert_eq!(state, AuthState::AuthorizationGranted);
        assert_eq!(state.on(AuthEvent::TokensPersisted), AuthState::Authorized);
    }

    #[test]
    fn new_pin_keeps_existing_authorization() {
        assert_eq!(
            AuthState::Authorized.on(AuthEvent::PinIssued),
            AuthState::Authorized
        );
        assert_eq!(
            AuthState::PinRequested.on(AuthEvent::PinIssued),
            AuthState::PinRequested
        );
        assert_eq!(
            AuthState::AuthorizationGranted.on(AuthEvent::PinIssued),
            AuthState::PinRequested
        );
    }

    #[test]
    fn persisted_without_grant_is_ignored() {
        assert_eq!(
            AuthState::Unauthorized.on(AuthEvent::TokensPersisted),
            AuthState::Unauthorized
        );
        assert_eq!(
            AuthState::PinRequested.on(AuthEvent::TokensPersisted),
            AuthState::PinRequested
        );
    }

    #[test]
    fn state_from_credentials() {
        let mut credentials = Credentials::with_api_key("K1");
        assert_eq!(
            AuthState::from_credentials(&credentials),
            AuthState::Unauthorized
        );

        credentials.authorization_code = "code".into();
        assert_eq!(
            AuthState::from_credentials(&credentials),
            AuthState::PinRequested
        );

        credentials.access_token = "A1".into();
        assert_eq!(
            AuthState::from_credentials(&credentials),
            AuthState::Authorized
        );
    }

    #[test]
    fn labels() {
        assert_eq!(AuthState::AuthorizationGranted.to_string(), "authorization_granted");
        assert_eq!(AuthState::Authorized.label(), "authorized");
    }
}
