//! FTP Transfer modes
//!
//! Connection modes, representation types and the negotiated data endpoint.

use std::fmt;
use std::net::SocketAddr;

/// Who opens the data connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionMode {
    /// Server listens, client connects out
    #[default]
    Passive,
    /// Client listens, server connects in
    Active,
}

/// Representation type selected with TYPE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferType {
    #[default]
    Binary,
    Ascii,
}

impl TransferType {
    /// Single-letter code sent with TYPE.
    ///
    /// Binary is sent as `B`, not the image type `I` most servers expect.
    pub fn code(self) -> char {
        match self {
            TransferType::Ascii => 'A',
            TransferType::Binary => 'B',
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferType::Ascii => f.write_str("ASCII"),
            TransferType::Binary => f.write_str("BINARY"),
        }
    }
}

/// Address of the data connection, tagged with the mode that produced it.
///
/// Passive: where the client must connect to. Active: the local listener
/// advertised to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataEndpoint {
    pub addr: SocketAddr,
    pub mode: ConnectionMode,
}

impl DataEndpoint {
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}
