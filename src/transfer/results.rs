//! Transfer result types
//!
//! Defines result structures returned by data channel negotiation.

use crate::protocol::Command;
use crate::transfer::DataEndpoint;

/// Endpoint produced by an acknowledged PASV or PORT exchange
#[derive(Debug, Clone)]
pub struct NegotiationResult {
    pub endpoint: DataEndpoint,
    /// The command that was acknowledged
    pub command: Command,
    /// The acknowledging reply line, as received
    pub reply: String,
}
