//! Control connection management
//!
//! Handles the persistent command connection to the FTP server.

pub mod channel;

pub use channel::ControlChannel;
