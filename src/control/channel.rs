//! Module `channel`
//!
//! Owns the persistent control connection: writes CRLF-terminated commands,
//! reads one response line per command and discards stale input so every
//! exchange starts at a clean response boundary.

use log::{debug, info, warn};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use crate::config::ClientConfig;
use crate::error::{ClientError, ConnectionError, ProtocolError};
use crate::protocol::Command;

const DRAIN_CHUNK: usize = 512;

/// The command connection of one client session.
///
/// The socket, the reader and the writer are held separately so they can be
/// released one by one when the session quits.
pub struct ControlChannel {
    peer: String,
    socket: Option<TcpStream>,
    reader: Option<BufReader<TcpStream>>,
    writer: Option<BufWriter<TcpStream>>,
    max_response_length: usize,
}

impl ControlChannel {
    /// Opens the control connection to `host:port`.
    ///
    /// Every resolved address is tried in turn with the configured connect
    /// timeout; the last failure is reported.
    pub fn connect(host: &str, port: u16, config: &ClientConfig) -> Result<Self, ConnectionError> {
        let peer = format!("{}:{}", host, port);
        let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(e) => return Err(ConnectionError::Resolve(peer, e)),
        };

        let mut last_error = None;
        for addr in &addrs {
            let attempt = match config.connect_timeout() {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    return match Self::from_stream(peer.clone(), stream, config) {
                        Ok(channel) => {
                            info!("Control connection established to {} ({})", peer, addr);
                            Ok(channel)
                        }
                        Err(e) => Err(ConnectionError::Connect(peer, e)),
                    };
                }
                Err(e) => {
                    debug!("Connect attempt to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(ConnectionError::Connect(peer, e)),
            None => Err(ConnectionError::NoAddress(peer)),
        }
    }

    /// Wraps an already connected stream, applying the configured timeouts.
    pub fn from_stream(peer: String, stream: TcpStream, config: &ClientConfig) -> io::Result<Self> {
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        let reader = BufReader::new(stream.try_clone()?);
        let writer = BufWriter::new(stream.try_clone()?);

        Ok(Self {
            peer,
            socket: Some(stream),
            reader: Some(reader),
            writer: Some(writer),
            max_response_length: config.max_response_length,
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// True until the socket has been shut down by a successful quit.
    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Local address of the control socket, the address the server sees us on.
    pub fn local_ip(&self) -> io::Result<IpAddr> {
        match &self.socket {
            Some(socket) => Ok(socket.local_addr()?.ip()),
            None => Err(not_connected()),
        }
    }

    /// Writes one command followed by CRLF and flushes it.
    pub fn send_command(&mut self, command: &Command) -> io::Result<()> {
        let writer = self.writer.as_mut().ok_or_else(not_connected)?;
        debug!("{} --> {}", self.peer, command.redacted());

        writer.write_all(command.to_string().as_bytes())?;
        writer.write_all(b"\r\n")?;
        writer.flush()
    }

    /// Blocks until one response line arrives and returns it without CRLF.
    ///
    /// End of stream means the server dropped the connection. A line longer
    /// than the configured limit is rejected; the rest of it is left for
    /// `drain_pending`.
    pub fn read_response_line(&mut self) -> Result<String, ClientError> {
        let limit = self.max_response_length;
        let reader = self.reader.as_mut().ok_or_else(not_connected)?;

        let mut buf = Vec::new();
        let read = reader.by_ref().take(limit as u64).read_until(b'\n', &mut buf)?;
        if read == 0 {
            return Err(ProtocolError::ConnectionClosed.into());
        }
        if !buf.ends_with(b"\n") && read == limit {
            warn!("{} sent a response line over {} bytes", self.peer, limit);
            return Err(ProtocolError::ResponseTooLong(limit).into());
        }

        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        debug!("{} <-- {}", self.peer, line);
        Ok(line)
    }

    /// Sends a command and reads the single line that answers it.
    pub fn exchange(&mut self, command: &Command) -> Result<String, ClientError> {
        self.send_command(command)?;
        self.read_response_line()
    }

    /// Discards whatever input is already waiting without blocking for more.
    pub fn drain_pending(&mut self) {
        let Some(reader) = self.reader.as_mut() else {
            return;
        };

        let mut discarded = reader.buffer().len();
        reader.consume(discarded);

        let stream = reader.get_mut();
        if let Err(e) = stream.set_nonblocking(true) {
            warn!("Failed to drain control connection {}: {}", self.peer, e);
            return;
        }

        let mut chunk = [0u8; DRAIN_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Error while draining control connection {}: {}", self.peer, e);
                    break;
                }
            }
        }

        if let Err(e) = stream.set_nonblocking(false) {
            warn!(
                "Failed to restore blocking mode on control connection {}: {}",
                self.peer, e
            );
        }

        if discarded > 0 {
            debug!("Discarded {} stale bytes from {}", discarded, self.peer);
        }
    }

    /// Shuts the control socket down. Best effort.
    pub fn shutdown(&mut self) {
        if let Some(socket) = self.socket.take() {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                debug!("Control socket shutdown for {} reported: {}", self.peer, e);
            }
            info!("Control connection to {} closed", self.peer);
        }
    }

    /// Releases the reader and then the writer. Best effort.
    pub fn release_streams(&mut self) {
        drop(self.reader.take());
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(ErrorKind::NotConnected, "control connection is closed")
}
