//! Client error types.
//!
//! The real-time subsystem's runtime contract is no-throw: transport
//! failures surface as status flips and logged events, never as errors.
//! Errors only arise while constructing the client from configuration.

use thiserror::Error;

/// Client-level errors.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
