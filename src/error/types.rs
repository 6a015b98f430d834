//! Error types
//!
//! Defines domain-specific error types for each module of the FTP client.

use std::fmt;
use std::io;
use std::net::IpAddr;

/// Errors raised while establishing the control connection
#[derive(Debug)]
pub enum ConnectionError {
    Resolve(String, io::Error),
    NoAddress(String),
    Connect(String, io::Error),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Resolve(target, e) => {
                write!(f, "Failed to resolve {}: {}", target, e)
            }
            ConnectionError::NoAddress(target) => {
                write!(f, "No usable address found for {}", target)
            }
            ConnectionError::Connect(target, e) => {
                write!(f, "Unable to connect to server {}: {}", target, e)
            }
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionError::Resolve(_, e) | ConnectionError::Connect(_, e) => Some(e),
            ConnectionError::NoAddress(_) => None,
        }
    }
}

/// Malformed or unexpected content on the control connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    ConnectionClosed,
    UnexpectedReply { command: String, reply: String },
    MalformedPassiveAddress(String),
    ResponseTooLong(usize),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::ConnectionClosed => write!(f, "Control connection closed by server"),
            ProtocolError::UnexpectedReply { command, reply } => {
                write!(f, "Illegal response to command '{}': {}", command, reply)
            }
            ProtocolError::MalformedPassiveAddress(line) => {
                write!(f, "Malformed passive address in response: {}", line)
            }
            ProtocolError::ResponseTooLong(limit) => {
                write!(f, "Response line exceeds {} bytes", limit)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Data channel negotiation errors
#[derive(Debug)]
pub enum TransferError {
    NoAvailablePort,
    ListenerFailed(io::Error),
    UnsupportedLocalAddress(IpAddr),
    NotNegotiated,
    DataConnectionFailed(String, io::Error),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::NoAvailablePort => write!(f, "No available port for data connection"),
            TransferError::ListenerFailed(e) => write!(f, "Failed to manage data listener: {}", e),
            TransferError::UnsupportedLocalAddress(ip) => {
                write!(f, "Local address {} cannot be advertised with PORT", ip)
            }
            TransferError::NotNegotiated => write!(f, "Data channel not negotiated"),
            TransferError::DataConnectionFailed(target, e) => {
                write!(f, "Data connection to {} failed: {}", target, e)
            }
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::ListenerFailed(e) | TransferError::DataConnectionFailed(_, e) => {
                Some(e)
            }
            _ => None,
        }
    }
}

/// General client error surfaced by every session operation except login
#[derive(Debug)]
pub enum ClientError {
    Connection(ConnectionError),
    Protocol(ProtocolError),
    Transfer(TransferError),
    Io(io::Error),
}

impl ClientError {
    /// True when the error means the server answered with something other
    /// than the expected status code.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            ClientError::Protocol(ProtocolError::UnexpectedReply { .. })
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Connection(e) => write!(f, "Connection error: {}", e),
            ClientError::Protocol(e) => write!(f, "Protocol error: {}", e),
            ClientError::Transfer(e) => write!(f, "Transfer error: {}", e),
            ClientError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Connection(e) => Some(e),
            ClientError::Protocol(e) => Some(e),
            ClientError::Transfer(e) => Some(e),
            ClientError::Io(e) => Some(e),
        }
    }
}

impl From<ConnectionError> for ClientError {
    fn from(error: ConnectionError) -> Self {
        ClientError::Connection(error)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(error: ProtocolError) -> Self {
        ClientError::Protocol(error)
    }
}

impl From<TransferError> for ClientError {
    fn from(error: TransferError) -> Self {
        ClientError::Transfer(error)
    }
}

impl From<io::Error> for ClientError {
    fn from(error: io::Error) -> Self {
        ClientError::Io(error)
    }
}
