//! ecobee authorization library
//!
//! Provides the PIN grant, token refresh, the web login flow and credential
//! storage for the ecobee client. The crate knows nothing about thermostat
//! requests; it can be tested and used on its own.
//!
//! Credential flow:
//! 1. `token::request_pin()` issues a PIN and authorization code
//! 2. The user enters the PIN on the ecobee portal
//! 3. `token::exchange_pin()` trades the code for an access/refresh pair
//! 4. The pair is saved via `credentials::CredentialStore::save()`
//! 5. `token::refresh_token()` renews the pair when the API reports expiry
//!
//! Accounts with a username and password use `web::login()` and
//! `web::exchange_session()` instead of steps 1-3 and 5.

pub mod constants;
pub mod credentials;
pub mod error;
pub mod state;
pub mod token;
pub mod web;

pub use constants::*;
pub use credentials::{CredentialStore, Credentials, JsonFileStore, MemoryStore};
pub use error::{Error, Result};
pub use state::{AuthEvent, AuthState};
pub use token::{PinGrant, TokenResponse, exchange_pin, refresh_token, request_pin};
pub use web::{WebLogin, exchange_session, login};
