//! Module `data_channel`
//!
//! Negotiates the secondary data connection. Passive mode records the
//! endpoint the server advertises; active mode binds a local listener on the
//! first free port pair and advertises it with PORT.

use log::{debug, error, info, trace, warn};
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ClientConfig;
use crate::control::ControlChannel;
use crate::error::{ClientError, TransferError};
use crate::protocol::responses::{COMMAND_OK, ENTERING_PASSIVE};
use crate::protocol::{Command, has_status, parse_passive_address};
use crate::transfer::{ConnectionMode, DataEndpoint, NegotiationResult};

/// Upper bound of each PORT octet searched in active mode
const MAX_PORT_OCTET: u8 = 255;
const INITIAL_ACCEPT_SLEEP_MS: u64 = 10;
const MAX_ACCEPT_SLEEP_MS: u64 = 500;

/// Holds the negotiated endpoint, the active-mode listener and the most
/// recently opened data stream of one session.
#[derive(Debug, Default)]
pub struct DataChannelManager {
    endpoint: Option<DataEndpoint>,
    listener: Option<TcpListener>,
    data_stream: Option<TcpStream>,
}

impl DataChannelManager {
    pub fn endpoint(&self) -> Option<DataEndpoint> {
        self.endpoint
    }

    /// Local address of the held listener, if any.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Sends PASV and records the advertised endpoint on a 227 reply.
    ///
    /// On any failure the previous endpoint is left untouched.
    pub fn negotiate_passive(
        &mut self,
        control: &mut ControlChannel,
    ) -> Result<NegotiationResult, ClientError> {
        let command = Command::Pasv;
        let reply = control.exchange(&command)?;
        if !has_status(&reply, ENTERING_PASSIVE) {
            return Err(command.rejected(reply).into());
        }

        let addr = parse_passive_address(&reply)?;
        self.close_listener();

        let endpoint = DataEndpoint {
            addr: SocketAddr::from(addr),
            mode: ConnectionMode::Passive,
        };
        self.endpoint = Some(endpoint);
        info!("Passive data endpoint set to {}", endpoint.addr);

        Ok(NegotiationResult {
            endpoint,
            command,
            reply,
        })
    }

    /// Binds a listener on the first free port pair and advertises it with PORT.
    ///
    /// If the server rejects PORT the new listener stays held but the endpoint
    /// is not selected; `close_listener` releases it.
    pub fn negotiate_active(
        &mut self,
        control: &mut ControlChannel,
        config: &ClientConfig,
    ) -> Result<NegotiationResult, ClientError> {
        let bind_ip: IpAddr = config.active_bind_address.parse().map_err(|_| {
            TransferError::ListenerFailed(io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid bind address {}", config.active_bind_address),
            ))
        })?;

        let (p1, p2, listener) =
            find_free_port(|port| TcpListener::bind(SocketAddr::new(bind_ip, port)))?;
        let port = port_from_pair(p1, p2);
        debug!("Bound active-mode listener on {}:{}", bind_ip, port);

        self.replace_listener(listener);

        let local_ip = match control.local_ip()? {
            IpAddr::V4(ip) => ip,
            other => return Err(TransferError::UnsupportedLocalAddress(other).into()),
        };

        let command = Command::Port {
            host: local_ip,
            p1,
            p2,
        };
        let reply = control.exchange(&command)?;
        if !has_status(&reply, COMMAND_OK) {
            warn!(
                "PORT rejected, listener on port {} left open until released",
                port
            );
            return Err(command.rejected(reply).into());
        }

        let endpoint = DataEndpoint {
            addr: SocketAddr::new(IpAddr::V4(local_ip), port),
            mode: ConnectionMode::Active,
        };
        self.endpoint = Some(endpoint);
        info!("Active data endpoint advertised as {}", endpoint.addr);

        Ok(NegotiationResult {
            endpoint,
            command,
            reply,
        })
    }

    /// Establishes the data connection for the current endpoint.
    ///
    /// Passive connects out; active accepts one connection on the listener,
    /// waiting at most the connect timeout when one is configured.
    pub fn open_data_stream(&mut self, config: &ClientConfig) -> Result<TcpStream, ClientError> {
        let endpoint = self.endpoint.ok_or(TransferError::NotNegotiated)?;

        let stream = match endpoint.mode {
            ConnectionMode::Passive => {
                let attempt = match config.connect_timeout() {
                    Some(timeout) => TcpStream::connect_timeout(&endpoint.addr, timeout),
                    None => TcpStream::connect(endpoint.addr),
                };
                attempt.map_err(|e| {
                    TransferError::DataConnectionFailed(endpoint.addr.to_string(), e)
                })?
            }
            ConnectionMode::Active => {
                let listener = self.listener.as_ref().ok_or(TransferError::NotNegotiated)?;
                accept_data_connection(listener, config.connect_timeout()).map_err(|e| {
                    TransferError::DataConnectionFailed(endpoint.addr.to_string(), e)
                })?
            }
        };

        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        let tracked = stream.try_clone()?;
        self.close_data_stream();
        self.data_stream = Some(tracked);
        info!("Data connection open in {:?} mode", endpoint.mode);

        Ok(stream)
    }

    /// Shuts down the tracked data stream. Best effort.
    pub fn close_data_stream(&mut self) {
        if let Some(stream) = self.data_stream.take() {
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                debug!("Data stream shutdown reported: {}", e);
            }
            info!("Data connection closed");
        }
    }

    /// Closes the active-mode listener, if any.
    pub fn close_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            match listener.local_addr() {
                Ok(addr) => info!("Closed data listener on {}", addr),
                Err(_) => info!("Closed data listener"),
            }
            // An active endpoint pointing at this listener is no longer usable.
            if matches!(self.endpoint, Some(e) if e.mode == ConnectionMode::Active) {
                self.endpoint = None;
            }
        }
    }

    fn replace_listener(&mut self, listener: TcpListener) {
        self.close_listener();
        self.listener = Some(listener);
    }
}

/// Walks the PORT octet pairs starting after (1, 1), p2 first, and returns
/// the first pair `bind` accepts.
pub(crate) fn find_free_port<T, F>(mut bind: F) -> Result<(u8, u8, T), TransferError>
where
    F: FnMut(u16) -> io::Result<T>,
{
    let (mut p1, mut p2) = (1u8, 1u8);
    loop {
        (p1, p2) = next_port_pair(p1, p2).ok_or_else(|| {
            error!("Active-mode port search exhausted");
            TransferError::NoAvailablePort
        })?;

        let port = port_from_pair(p1, p2);
        match bind(port) {
            Ok(bound) => return Ok((p1, p2, bound)),
            Err(e) => trace!("Port {} unavailable: {}", port, e),
        }
    }
}

fn next_port_pair(p1: u8, p2: u8) -> Option<(u8, u8)> {
    if p2 < MAX_PORT_OCTET {
        Some((p1, p2 + 1))
    } else if p1 < MAX_PORT_OCTET {
        Some((p1 + 1, 1))
    } else {
        None
    }
}

fn port_from_pair(p1: u8, p2: u8) -> u16 {
    u16::from(p1) * 256 + u16::from(p2)
}

/// Accepts one connection, polling with backoff until `timeout` when given.
fn accept_data_connection(
    listener: &TcpListener,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let Some(timeout) = timeout else {
        let (stream, peer) = listener.accept()?;
        debug!("Data connection accepted from {}", peer);
        return Ok(stream);
    };

    listener.set_nonblocking(true)?;
    let deadline = Instant::now() + timeout;
    let mut delay = INITIAL_ACCEPT_SLEEP_MS;

    let result = loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("Data connection accepted from {}", peer);
                break stream.set_nonblocking(false).map(|_| stream);
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    break Err(io::Error::new(
                        ErrorKind::TimedOut,
                        "timeout waiting for data connection",
                    ));
                }
                thread::sleep(Duration::from_millis(delay));
                delay = (delay * 2).min(MAX_ACCEPT_SLEEP_MS);
            }
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = listener.set_nonblocking(false) {
        warn!("Failed to restore blocking mode on data listener: {}", e);
    }
    result
}
