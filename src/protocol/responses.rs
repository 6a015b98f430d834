//! FTP Response handling
//!
//! Reply codes are compared by prefix against the raw response line.

/// Standard FTP reply codes recognized by the client
pub const COMMAND_OK: &str = "200";
pub const CLOSING_CONTROL: &str = "221";
pub const ENTERING_PASSIVE: &str = "227";
pub const LOGGED_IN: &str = "230";
pub const PASSWORD_REQUIRED: &str = "331";

/// Returns the three-character status prefix of a response line.
pub fn status_code(line: &str) -> Option<&str> {
    line.get(..3)
}

/// True when the response line starts with the given code.
pub fn has_status(line: &str, code: &str) -> bool {
    line.starts_with(code)
}
