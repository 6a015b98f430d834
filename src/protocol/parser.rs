//! PASV reply parsing
//!
//! Tokenizes the `(h1,h2,h3,h4,p1,p2)` tuple carried by a 227 reply.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::ProtocolError;
use crate::protocol::responses::{ENTERING_PASSIVE, has_status};

const TUPLE_LEN: usize = 6;

/// Extracts the data endpoint advertised in a `227` reply.
///
/// The tuple must be exactly six comma separated decimal octets (0-255)
/// enclosed in parentheses. Host is `h1.h2.h3.h4`, port is `p1 * 256 + p2`.
pub fn parse_passive_address(line: &str) -> Result<SocketAddrV4, ProtocolError> {
    let malformed = || ProtocolError::MalformedPassiveAddress(line.to_string());

    if !has_status(line, ENTERING_PASSIVE) {
        return Err(malformed());
    }

    let body = &line[ENTERING_PASSIVE.len()..];
    let open = body.find('(').ok_or_else(malformed)?;
    let rest = &body[open + 1..];
    let close = rest.find(')').ok_or_else(malformed)?;

    let mut octets = [0u8; TUPLE_LEN];
    let mut count = 0;
    for token in rest[..close].split(',') {
        if count == TUPLE_LEN {
            return Err(malformed());
        }
        octets[count] = parse_octet(token).ok_or_else(malformed)?;
        count += 1;
    }
    if count != TUPLE_LEN {
        return Err(malformed());
    }

    let [h1, h2, h3, h4, p1, p2] = octets;
    let port = u16::from(p1) * 256 + u16::from(p2);
    Ok(SocketAddrV4::new(Ipv4Addr::new(h1, h2, h3, h4), port))
}

/// One to three ASCII digits with a value that fits in a byte.
fn parse_octet(token: &str) -> Option<u8> {
    if token.is_empty() || token.len() > 3 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
