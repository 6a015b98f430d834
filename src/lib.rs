//! RAX FTP client core
//!
//! Control-channel engine of an FTP client: sends commands over one
//! persistent connection, parses status replies and negotiates the data
//! channel in passive or active mode.

pub mod client;
pub mod config;
pub mod control;
pub mod error;
pub mod protocol;
pub mod transfer;
pub mod utils;

pub use client::ClientSession;
pub use config::ClientConfig;
pub use error::{ClientError, ConnectionError, ProtocolError, TransferError};
pub use transfer::{ConnectionMode, DataEndpoint, TransferType};
