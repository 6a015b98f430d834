//! Module `state`
//!
//! Tracks the connection mode and transfer type of a session. Both change
//! only through `SessionState::commit`, which requires the reply line that
//! acknowledged the change.

use log::debug;

use crate::error::ProtocolError;
use crate::protocol::{Command, has_status};
use crate::protocol::responses::{COMMAND_OK, ENTERING_PASSIVE};
use crate::transfer::{ConnectionMode, TransferType};

/// A requested change to the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Mode(ConnectionMode),
    Type(TransferType),
}

impl StateChange {
    /// Reply code that acknowledges this change.
    pub fn expected_code(self) -> &'static str {
        match self {
            StateChange::Mode(ConnectionMode::Passive) => ENTERING_PASSIVE,
            StateChange::Mode(ConnectionMode::Active) => COMMAND_OK,
            StateChange::Type(_) => COMMAND_OK,
        }
    }
}

/// Last acknowledged mode and type of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    mode: ConnectionMode,
    transfer_type: TransferType,
}

impl SessionState {
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn transfer_type(&self) -> TransferType {
        self.transfer_type
    }

    /// Applies `change` if the reply to `command` carries its acknowledgment
    /// code.
    ///
    /// Any other reply leaves the state untouched.
    pub fn commit(
        &mut self,
        change: StateChange,
        command: &Command,
        reply: &str,
    ) -> Result<(), ProtocolError> {
        if !has_status(reply, change.expected_code()) {
            return Err(command.rejected(reply.to_string()));
        }

        match change {
            StateChange::Mode(mode) => self.mode = mode,
            StateChange::Type(transfer_type) => self.transfer_type = transfer_type,
        }
        debug!("Session state now {:?}", self);
        Ok(())
    }
}
