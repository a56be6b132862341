//! ecobee thermostat client
//!
//! Wraps every API call with transparent token refresh and retry, and keeps
//! the credential lifecycle (PIN grant, web login, refresh, persistence) in a
//! single `Session` owned by the `Ecobee` client context.
//!
//! Request lifecycle:
//! 1. A command builds a typed body and a `RequestDescriptor`
//! 2. `Executor` sends it with the current bearer token and classifies the
//!    response
//! 3. An expired token triggers one `Session` refresh and one retry
//! 4. Refreshed tokens are persisted before they replace the old ones
//! 5. Invalid tokens propagate so the caller can re-run authorization

pub mod classify;
pub mod client;
pub mod commands;
pub mod error;
pub mod executor;
pub mod session;

pub use classify::{Classification, StatusCodeMap, classify};
pub use client::{Ecobee, Settings};
pub use commands::{FanMode, HoldType, HvacMode, Vacation, model_name};
pub use error::{Error, Result};
pub use executor::{Executor, RequestDescriptor, TokenSource};
pub use session::{AuthOutcome, Session};
