use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use skylink_net::InboundSource;
use tracing::{debug, trace, warn};

use crate::codec::{decode_args, Command, CommandHeader};
use crate::error::{CommandError, Result};
use crate::registry::CommandRegistry;

/// What happened to one inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Decoded and handled successfully.
    Handled(CommandHeader),
    /// Decoded, but the handler returned an error.
    HandlerFailed(CommandHeader),
    /// No handler registered for this command.
    Unknown(CommandHeader),
    /// Header or arguments could not be decoded.
    Malformed(Option<CommandHeader>),
}

/// Decodes inbound command payloads and invokes registered handlers.
///
/// Every failure is local to one payload: it is logged and the next payload
/// is processed normally.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<CommandRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Dispatch one payload.
    pub fn dispatch(&self, payload: &[u8]) -> DispatchOutcome {
        let (header, body) = match CommandHeader::parse(payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, "dropping malformed command");
                return DispatchOutcome::Malformed(None);
            }
        };

        let Some(entry) = self.registry.get(&header) else {
            debug!(
                command = %header,
                class_known = self.registry.has_class(header.feature, header.class),
                "no handler for command"
            );
            return DispatchOutcome::Unknown(header);
        };

        let args = match decode_args(body, entry.shape()) {
            Ok(args) => args,
            Err(err) => {
                warn!(command = %header, %err, "dropping malformed command");
                return DispatchOutcome::Malformed(Some(header));
            }
        };

        let command = Command { header, args };
        trace!(command = %header, args = command.args.len(), "dispatching command");
        match panic::catch_unwind(AssertUnwindSafe(|| entry.invoke(&command))) {
            Ok(Ok(())) => DispatchOutcome::Handled(header),
            Ok(Err(err)) => {
                warn!(command = %header, err = %err, "command handler failed");
                DispatchOutcome::HandlerFailed(header)
            }
            Err(_) => {
                warn!(command = %header, "command handler panicked");
                DispatchOutcome::HandlerFailed(header)
            }
        }
    }

    /// Dispatch every payload read from `source` on a dedicated thread until
    /// the channel closes.
    pub fn spawn(self, source: InboundSource) -> Result<JoinHandle<()>> {
        let name = format!("skylink-dispatch-{}", source.id());
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(channel = source.id(), "dispatch loop started");
                while let Some(payload) = source.recv() {
                    self.dispatch(&payload);
                }
                debug!(channel = source.id(), "dispatch loop stopped");
            })
            .map_err(|source| CommandError::Spawn { name, source })
    }
}
