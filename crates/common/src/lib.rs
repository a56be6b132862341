//! Shared types for the ecobee client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
