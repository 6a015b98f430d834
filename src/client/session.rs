//! Client session management
//!
//! `ClientSession` composes the control channel, the data channel manager
//! and the session state into the public operation set. Every operation
//! holds the session lock for its whole command/response exchange, drains
//! stale input before it starts and again on any failure.

use log::{info, warn};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::ClientConfig;
use crate::control::ControlChannel;
use crate::error::{ClientError, log_error};
use crate::protocol::responses::{CLOSING_CONTROL, COMMAND_OK, LOGGED_IN, PASSWORD_REQUIRED};
use crate::protocol::{Command, has_status, status_code};
use crate::transfer::{ConnectionMode, DataChannelManager, DataEndpoint, TransferType};

use super::state::{SessionState, StateChange};

/// Everything guarded by the session lock
struct SessionInner {
    control: ControlChannel,
    data: DataChannelManager,
    state: SessionState,
    username: Option<String>,
}

/// One FTP client session over a single control connection.
pub struct ClientSession {
    config: ClientConfig,
    inner: Mutex<SessionInner>,
}

impl ClientSession {
    /// Connects to `host:port` with the default configuration.
    pub fn connect(host: &str, port: u16) -> Result<Self, ClientError> {
        Self::connect_with_config(host, port, ClientConfig::default())
    }

    /// Connects to `host:port`. Failure here is fatal to the session.
    pub fn connect_with_config(
        host: &str,
        port: u16,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        let control = ControlChannel::connect(host, port, &config)?;

        Ok(Self {
            config,
            inner: Mutex::new(SessionInner {
                control,
                data: DataChannelManager::default(),
                state: SessionState::default(),
                username: None,
            }),
        })
    }

    /// Logs in with USER and, when the server asks for it, PASS.
    ///
    /// Never fails: any refusal or I/O problem yields `false`.
    pub fn login(&self, username: &str, password: &str) -> bool {
        let mut inner = self.lock();
        inner.username = Some(username.to_string());
        inner.control.drain_pending();

        match inner.try_login(username, password) {
            Ok(true) => {
                info!("User {} logged in to {}", username, inner.control.peer());
                true
            }
            Ok(false) => {
                inner.control.drain_pending();
                false
            }
            Err(e) => {
                log_error("LOGIN", &e);
                inner.control.drain_pending();
                false
            }
        }
    }

    /// Sends QUIT and, once the server answers 221, closes the control
    /// connection, the data connection, the reader and the writer in that
    /// order. Nothing is closed when QUIT is not acknowledged.
    pub fn quit(&self) -> Result<(), ClientError> {
        self.run("QUIT", |inner, _| {
            let command = Command::Quit;
            let reply = inner.control.exchange(&command)?;
            if !has_status(&reply, CLOSING_CONTROL) {
                return Err(command.rejected(reply).into());
            }

            inner.control.shutdown();
            inner.data.close_data_stream();
            inner.control.release_streams();
            inner.data.close_listener();

            if let Some(username) = inner.username.take() {
                info!("User {} quit", username);
            }
            Ok(())
        })
    }

    /// Enters passive mode and returns the endpoint advertised by the server.
    pub fn pasv(&self) -> Result<DataEndpoint, ClientError> {
        self.run("PASV", |inner, _| {
            let result = inner.data.negotiate_passive(&mut inner.control)?;
            inner.state.commit(
                StateChange::Mode(ConnectionMode::Passive),
                &result.command,
                &result.reply,
            )?;
            Ok(result.endpoint)
        })
    }

    /// Opens a local listener and advertises it with PORT.
    ///
    /// When PORT is rejected the listener stays open and the mode is not
    /// changed; call `release_listener` to free the port.
    pub fn port(&self) -> Result<DataEndpoint, ClientError> {
        self.run("PORT", |inner, config| {
            let result = inner.data.negotiate_active(&mut inner.control, config)?;
            inner.state.commit(
                StateChange::Mode(ConnectionMode::Active),
                &result.command,
                &result.reply,
            )?;
            Ok(result.endpoint)
        })
    }

    /// Selects the transfer type. The stored type changes only on 200.
    pub fn set_type(&self, transfer_type: TransferType) -> Result<(), ClientError> {
        self.run("TYPE", |inner, _| {
            let command = Command::Type(transfer_type);
            let reply = inner.control.exchange(&command)?;
            inner
                .state
                .commit(StateChange::Type(transfer_type), &command, &reply)?;
            info!("Transfer type set to {}", transfer_type);
            Ok(())
        })
    }

    /// Liveness check; never changes session state.
    pub fn noop(&self) -> Result<(), ClientError> {
        self.run("NOOP", |inner, _| {
            let command = Command::Noop;
            let reply = inner.control.exchange(&command)?;
            if !has_status(&reply, COMMAND_OK) {
                return Err(command.rejected(reply).into());
            }
            Ok(())
        })
    }

    /// Connects the data stream for the negotiated endpoint.
    pub fn open_data_stream(&self) -> Result<TcpStream, ClientError> {
        self.run("DATA", |inner, config| inner.data.open_data_stream(config))
    }

    /// Closes a listener left behind by a rejected PORT.
    pub fn release_listener(&self) {
        self.lock().data.close_listener();
    }

    pub fn mode(&self) -> ConnectionMode {
        self.lock().state.mode()
    }

    pub fn transfer_type(&self) -> TransferType {
        self.lock().state.transfer_type()
    }

    pub fn data_endpoint(&self) -> Option<DataEndpoint> {
        self.lock().data.endpoint()
    }

    /// Address of the active-mode listener currently held, if any.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.lock().data.listener_addr()
    }

    pub fn username(&self) -> Option<String> {
        self.lock().username.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().control.is_open()
    }

    // State is only committed after an acknowledged reply; a poisoned lock
    // still guards consistent data.
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run<T, F>(&self, operation: &str, f: F) -> Result<T, ClientError>
    where
        F: FnOnce(&mut SessionInner, &ClientConfig) -> Result<T, ClientError>,
    {
        let mut inner = self.lock();
        inner.control.drain_pending();

        let result = f(&mut *inner, &self.config);
        if let Err(e) = &result {
            inner.control.drain_pending();
            log_error(operation, e);
        }
        result
    }
}

impl SessionInner {
    fn try_login(&mut self, username: &str, password: &str) -> Result<bool, ClientError> {
        let reply = self.control.exchange(&Command::User(username.to_string()))?;
        if has_status(&reply, LOGGED_IN) {
            return Ok(true);
        }
        if !has_status(&reply, PASSWORD_REQUIRED) {
            warn!(
                "USER {} refused with {}",
                username,
                status_code(&reply).unwrap_or("no status")
            );
            return Ok(false);
        }

        let reply = self.control.exchange(&Command::Pass(password.to_string()))?;
        if has_status(&reply, LOGGED_IN) {
            return Ok(true);
        }

        warn!(
            "PASS for {} refused with {}",
            username,
            status_code(&reply).unwrap_or("no status")
        );
        Ok(false)
    }
}
