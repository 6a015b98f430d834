//! Client session system
//!
//! Handles session state and the public FTP client operations.

pub mod session;
pub mod state;

pub use session::ClientSession;
pub use state::{SessionState, StateChange};
