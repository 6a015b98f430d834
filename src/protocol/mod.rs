//! FTP Protocol implementation
//!
//! Handles command rendering and response parsing on the control connection.

pub mod commands;
pub mod parser;
pub mod responses;

pub use commands::Command;
pub use parser::parse_passive_address;
pub use responses::{has_status, status_code};
