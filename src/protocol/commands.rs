//! FTP commands
//!
//! Typed representation of every command the client sends over the control
//! connection, rendered to its exact wire form (without the CRLF).

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::ProtocolError;
use crate::transfer::TransferType;

/// Represents an FTP command issued by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    User(String),
    Pass(String),
    Quit,
    Pasv,
    Port { host: Ipv4Addr, p1: u8, p2: u8 },
    Type(TransferType),
    Noop,
}

impl Command {
    /// The command verb, used for diagnostics and error messages.
    pub fn verb(&self) -> &'static str {
        match self {
            Command::User(_) => "USER",
            Command::Pass(_) => "PASS",
            Command::Quit => "QUIT",
            Command::Pasv => "PASV",
            Command::Port { .. } => "PORT",
            Command::Type(_) => "TYPE",
            Command::Noop => "NOOP",
        }
    }

    /// Error for a reply that does not carry the expected status code.
    pub fn rejected(&self, reply: String) -> ProtocolError {
        ProtocolError::UnexpectedReply {
            command: self.verb().to_string(),
            reply,
        }
    }

    /// Wire form with secrets masked, safe to log.
    pub fn redacted(&self) -> String {
        match self {
            Command::Pass(_) => "PASS ****".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::User(name) => write!(f, "USER {}", name),
            Command::Pass(password) => write!(f, "PASS {}", password),
            Command::Quit => f.write_str("QUIT"),
            Command::Pasv => f.write_str("PASV"),
            Command::Port { host, p1, p2 } => {
                let [h1, h2, h3, h4] = host.octets();
                write!(f, "PORT {},{},{},{},{},{}", h1, h2, h3, h4, p1, p2)
            }
            Command::Type(transfer_type) => write!(f, "TYPE {}", transfer_type.code()),
            Command::Noop => f.write_str("NOOP"),
        }
    }
}
