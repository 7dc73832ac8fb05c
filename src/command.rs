//! # Command Dispatcher
//!
//! Validates operator commands, encodes them and writes them to the dryer.
//!
//! Commands are fire-and-forget: a frame that reaches the port counts as
//! sent, and a failed write is reported once without retry.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{CommandError, TransportError};
use crate::protocol::codec::encode_command;
use crate::protocol::types::{Command, CustomCommand, Preset};
use crate::serial::{ConnectionState, Transport};

/// Sends preset and custom commands over the shared transport
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    transport: Arc<Transport>,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Select a preset on the dryer
    ///
    /// # Errors
    ///
    /// - `NotConnected` if the link is not open (nothing is written)
    /// - `Transport` if the write fails
    pub async fn send_preset(&self, preset: Preset) -> Result<(), CommandError> {
        self.dispatch(&Command::Preset(preset)).await
    }

    /// Send the enabled custom fields
    ///
    /// Every field is validated before anything is written; one bad value
    /// blocks the whole command.
    ///
    /// # Errors
    ///
    /// - `EmptySelection` if no field is enabled
    /// - `InvalidValue` if a field's text does not fit its type
    /// - `NotConnected` if the link is not open
    /// - `Transport` if the write fails
    pub async fn send_custom(&self, fields: &CustomCommand) -> Result<(), CommandError> {
        let fields = fields.validate()?;
        self.dispatch(&Command::Custom(fields)).await
    }

    async fn dispatch(&self, command: &Command) -> Result<(), CommandError> {
        if self.transport.state() != ConnectionState::Open {
            return Err(CommandError::NotConnected);
        }

        let frame = encode_command(command);
        match self.transport.write_line(&frame).await {
            Ok(()) => {
                info!("Sent: {}", String::from_utf8_lossy(&frame).trim_end());
                Ok(())
            }
            Err(TransportError::Closed) => Err(CommandError::NotConnected),
            Err(e) => {
                warn!("Command not sent: {}", e);
                Err(CommandError::Transport(e))
            }
        }
    }
}
