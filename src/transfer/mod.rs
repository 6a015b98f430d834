//! Transfer module for the FTP client
//!
//! Handles data channel negotiation in passive and active modes and the
//! types describing the negotiated endpoint.

pub mod data_channel;
pub mod modes;
pub mod results;

// Re-export key types
pub use data_channel::DataChannelManager;
pub use modes::{ConnectionMode, DataEndpoint, TransferType};
pub use results::NegotiationResult;
