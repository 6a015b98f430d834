//! Utility functions
//!
//! Provides logging setup.

pub mod logging;

pub use logging::{setup_logging, setup_test_logging};
