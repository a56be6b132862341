//! Credential lifecycle
//!
//! `Session` owns the single in-memory `Credentials` record and drives it
//! through acquisition (PIN grant or web login) and refresh. Token mutations
//! are fail-closed: a candidate snapshot is persisted first and only swapped
//! into memory once the store confirms the write.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ecobee_auth::{
    AuthEvent, AuthState, CredentialStore, Credentials, Endpoints, WebLogin, token, web,
};
use tracing::{debug, error, info, warn};
use transport::Transport;

use crate::error::{Error, Result};
use crate::executor::TokenSource;

/// What `authenticate()` achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// A usable access token is held and persisted.
    Authorized,
    /// The user must enter this PIN on the ecobee portal, then call
    /// `request_tokens()`.
    AwaitingPin(String),
    Failed,
}

pub struct Session {
    credentials: Credentials,
    state: AuthState,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
}

fn record_refresh(success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!("ecobee_token_refresh_total", "result" => result).increment(1);
}

impl Session {
    pub fn new(
        credentials: Credentials,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        endpoints: Endpoints,
    ) -> Self {
        let state = AuthState::from_credentials(&credentials);
        info!(state = %state, "session initialized");
        Self {
            credentials,
            state,
            store,
            transport,
            endpoints,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// PIN awaiting authorization on the ecobee portal.
    pub fn pin(&self) -> Option<&str> {
        (!self.credentials.pin.is_empty()).then_some(self.credentials.pin.as_str())
    }

    /// Set web-login credentials in memory. They are persisted with the next
    /// token mutation.
    pub fn set_web_login(&mut self, username: String, password: String) {
        self.credentials.username = Some(username);
        self.credentials.password = Some(password);
    }

    /// Request a PIN and authorization code.
    ///
    /// Returns `false` when the request fails or the response is malformed;
    /// credentials are then unchanged.
    pub async fn request_pin(&mut self) -> bool {
        if self.credentials.api_key.is_empty() {
            warn!("cannot request a PIN without an API key");
            return false;
        }

        let grant = match token::request_pin(
            self.transport.as_ref(),
            &self.endpoints,
            &self.credentials.api_key,
        )
        .await
        {
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "PIN request failed");
                return false;
            }
        };

        self.credentials.authorization_code = grant.code;
        self.credentials.pin = grant.pin;
        self.state = self.state.on(AuthEvent::PinIssued);

        // The PIN can be re-requested, so a failed save is not fatal here.
        if let Err(e) = self.store.save(&self.credentials).await {
            warn!(error = %e, "failed to persist authorization code");
        }

        info!(
            pin = %self.credentials.pin,
            expires_in_minutes = ?grant.expires_in,
            "PIN issued; authorize it under My Apps on the ecobee portal"
        );
        true
    }

    /// Exchange the authorization code for tokens.
    ///
    /// `Ok(false)` is routine until the user has authorized the PIN. `Err`
    /// means tokens were issued but could not be persisted.
    pub async fn request_tokens(&mut self) -> Result<bool> {
        if self.credentials.authorization_code.is_empty() {
            warn!("no authorization code; request a PIN first");
            return Ok(false);
        }

        let tokens = match token::exchange_pin(
            self.transport.as_ref(),
            &self.endpoints,
            &self.credentials.api_key,
            &self.credentials.authorization_code,
        )
        .await
        {
            Ok(tokens) => tokens,
            Err(ecobee_auth::Error::TokenExchange(reason)) => {
                info!(reason = %reason, "authorization not granted yet");
                return Ok(false);
            }
            Err(e) => {
                warn!(error = %e, "token request failed");
                return Ok(false);
            }
        };

        let mut candidate = self.credentials.clone();
        candidate.apply_tokens(tokens);
        candidate.pin.clear();
        self.commit(candidate).await?;
        Ok(true)
    }

    /// Renew the access token.
    ///
    /// Accounts with web-login credentials re-run the web flow; others use
    /// the refresh grant. On failure the current tokens stay in place.
    pub async fn refresh_tokens(&mut self) -> Result<bool> {
        let result = if self.credentials.has_secondary() {
            self.refresh_via_web().await
        } else {
            self.refresh_via_grant().await
        };
        record_refresh(matches!(result, Ok(true)));
        result
    }

    async fn refresh_via_grant(&mut self) -> Result<bool> {
        if self.credentials.refresh_token.is_empty() {
            warn!("no refresh token; full authorization required");
            return Ok(false);
        }

        match token::refresh_token(
            self.transport.as_ref(),
            &self.endpoints,
            &self.credentials.api_key,
            &self.credentials.refresh_token,
        )
        .await
        {
            Ok(tokens) => {
                let mut candidate = self.credentials.clone();
                candidate.apply_tokens(tokens);
                self.commit(candidate).await?;
                info!("token refresh succeeded");
                Ok(true)
            }
            Err(e @ ecobee_auth::Error::InvalidGrant(_)) => {
                error!(error = %e, "refresh token rejected");
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                Ok(false)
            }
        }
    }

    /// Try the stored session cookie first, then a full login.
    async fn refresh_via_web(&mut self) -> Result<bool> {
        if let Some(session_token) = self
            .credentials
            .secondary_token
            .clone()
            .filter(|t| !t.is_empty())
        {
            match web::exchange_session(self.transport.as_ref(), &self.endpoints, &session_token)
                .await
            {
                Ok(tokens) => {
                    let mut candidate = self.credentials.clone();
                    candidate.apply_tokens(tokens);
                    self.commit(candidate).await?;
                    info!("session token exchange succeeded");
                    return Ok(true);
                }
                Err(e) => debug!(error = %e, "session token rejected, logging in again"),
            }
        }
        self.login().await
    }

    /// Full username/password login through the web flow.
    pub async fn login(&mut self) -> Result<bool> {
        if !self.credentials.has_web_login() {
            warn!("web login requires both a username and a password");
            return Ok(false);
        }
        let username = self.credentials.username.clone().unwrap_or_default();
        let password = self.credentials.password.clone().unwrap_or_default();

        match web::login(self.transport.as_ref(), &self.endpoints, &username, &password).await {
            Ok(WebLogin {
                session_token,
                tokens,
            }) => {
                let mut candidate = self.credentials.clone();
                candidate.apply_tokens(tokens);
                candidate.secondary_token = Some(session_token);
                self.commit(candidate).await?;
                info!(username = %username, "web login succeeded");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, username = %username, "web login failed");
                Ok(false)
            }
        }
    }

    /// Pick the authorization path that applies to the stored credentials.
    pub async fn authenticate(&mut self) -> Result<AuthOutcome> {
        if self.state.is_authorized() {
            return Ok(AuthOutcome::Authorized);
        }

        if self.credentials.has_secondary() || !self.credentials.refresh_token.is_empty() {
            return Ok(if self.refresh_tokens().await? {
                AuthOutcome::Authorized
            } else {
                AuthOutcome::Failed
            });
        }

        if !self.credentials.authorization_code.is_empty() {
            if self.request_tokens().await? {
                return Ok(AuthOutcome::Authorized);
            }
            if let Some(pin) = self.pin() {
                return Ok(AuthOutcome::AwaitingPin(pin.to_string()));
            }
        }

        if self.request_pin().await {
            let pin = self.credentials.pin.clone();
            return Ok(AuthOutcome::AwaitingPin(pin));
        }
        Ok(AuthOutcome::Failed)
    }

    /// Persist `candidate`, then make it current.
    ///
    /// On a save failure memory and state are left as they were.
    async fn commit(&mut self, candidate: Credentials) -> Result<()> {
        let previous = self.state;
        self.state = previous.on(AuthEvent::TokensIssued);
        debug!(state = %self.state, "tokens issued, persisting");

        if let Err(e) = self.store.save(&candidate).await {
            self.state = previous;
            error!(error = %e, "failed to persist tokens; keeping previous credentials");
            return Err(Error::Store(e.to_string()));
        }

        self.credentials = candidate;
        self.state = self.state.on(AuthEvent::TokensPersisted);
        info!(state = %self.state, "tokens persisted");
        Ok(())
    }
}

impl TokenSource for Session {
    fn access_token(&self) -> &str {
        &self.credentials.access_token
    }

    fn refresh(&mut self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            match self.refresh_tokens().await {
                Ok(refreshed) => refreshed,
                Err(e) => {
                    warn!(error = %e, "refreshed tokens could not be persisted");
                    false
                }
            }
        })
    }
}
