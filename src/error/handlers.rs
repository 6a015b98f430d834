//! Error handlers
//!
//! Provides error reporting helpers.

use crate::error::types::{ClientError, ProtocolError};
use log::{error, warn};

/// Log a client error at a level matching its severity.
///
/// A server refusing a command is routine and logged as a warning; transport
/// and resource failures are logged as errors.
pub fn log_error(operation: &str, err: &ClientError) {
    match err {
        ClientError::Protocol(ProtocolError::UnexpectedReply { .. }) => {
            warn!("{} rejected: {}", operation, err)
        }
        _ => error!("{} failed: {}", operation, err),
    }
}
