use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::att::{ErrorCode, Handle, HandleRange};
use crate::host::ConnId;
use crate::uuid::Uuid;

use super::client::Link;
use super::correlator::Outcome;
use super::*;

/// Asynchronous GATT client event reported by the stack.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub enum Event<'a> {
    /// One attribute found by an in-flight discovery procedure.
    DiscoveryResult(Found),
    /// Completion of a discovery procedure. An `AttributeNotFound` status
    /// means that the procedure ended without further results.
    DiscoveryState {
        scope: Discovery,
        r: std::result::Result<(), ErrorCode>,
    },
    /// Completion of an attribute read.
    ReadResult {
        hdl: u16,
        r: std::result::Result<&'a [u8], ErrorCode>,
    },
    /// Completion of an attribute write (request or command).
    WriteResult {
        hdl: u16,
        r: std::result::Result<(), ErrorCode>,
    },
    /// Handle value notification or indication received from the peer.
    Notification {
        hdl: u16,
        val: &'a [u8],
        is_notify: bool,
    },
    /// The connection was terminated.
    Disconnect { conn: ConnId },
}

/// Discovery procedure, identified by the handle range it was started for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Discovery {
    Services,
    Characteristics(HandleRange),
    Descriptors(HandleRange),
}

impl From<Discovery> for Target {
    #[inline]
    fn from(d: Discovery) -> Self {
        match d {
            Discovery::Services => Self::Services,
            Discovery::Characteristics(r) => Self::Characteristics(r),
            Discovery::Descriptors(r) => Self::Descriptors(r),
        }
    }
}

/// Attribute found by a discovery procedure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Found {
    Service(ServiceDecl),
    Characteristic(CharDecl),
    Descriptor(DescDecl),
}

/// Primary service declaration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServiceDecl {
    pub uuid: Uuid,
    pub range: HandleRange,
}

/// Characteristic declaration ([Vol 3] Part G, Section 3.3.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CharDecl {
    /// Declaration handle.
    pub hdl: Handle,
    pub props: CharProps,
    pub val_hdl: Handle,
    pub uuid: Uuid,
}

/// Characteristic descriptor declaration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DescDecl {
    pub hdl: Handle,
    pub uuid: Uuid,
}

impl Client {
    /// Routes a stack event to the pending operation or characteristic that
    /// it belongs to. This must be called from the stack's event delivery
    /// context and never blocks. Events that do not match anything are
    /// logged and dropped.
    pub fn dispatch(&self, evt: Event<'_>) {
        if let Err(e) = self.route(evt) {
            warn!("Dropped {evt:?}: {e}");
        }
    }

    /// Routes an event, returning an error if it could not be delivered.
    pub(super) fn route(&self, evt: Event<'_>) -> Result<()> {
        trace!("{evt:?}");
        match evt {
            Event::DiscoveryResult(f) => self.event_link()?.cr.push(f),
            Event::DiscoveryState { scope, r } => {
                let out = match r {
                    Ok(()) | Err(ErrorCode::AttributeNotFound) => Outcome::Done(Value::new()),
                    Err(e) => Outcome::Failed(e),
                };
                self.event_link()?.cr.signal(Target::from(scope), out)
            }
            Event::ReadResult { hdl, r } => {
                let out = r.map_or_else(Outcome::Failed, |v| Outcome::Done(Value::from_slice(v)));
                (self.event_link()?.cr).signal(Target::Read(valid(hdl)?), out)
            }
            Event::WriteResult { hdl, r } => {
                let out = r.map_or_else(Outcome::Failed, |()| Outcome::Done(Value::new()));
                (self.event_link()?.cr).signal(Target::Write(valid(hdl)?), out)
            }
            Event::Notification {
                hdl,
                val,
                is_notify,
            } => {
                let hdl = valid(hdl)?;
                let c = (self.characteristic_by_value_handle(hdl))
                    .ok_or_else(|| Error::Protocol(format!("no characteristic at {hdl}")))?;
                c.deliver(val, is_notify);
                Ok(())
            }
            Event::Disconnect { conn } => {
                let link = self.event_link()?;
                if link.conn() != conn {
                    return Err(Error::Protocol(format!(
                        "disconnect for {conn:?} while connected as {:?}",
                        link.conn()
                    )));
                }
                debug!("Disconnected from {conn:?}");
                self.on_disconnect();
                Ok(())
            }
        }
    }

    /// Returns the current link, regardless of its state.
    fn event_link(&self) -> Result<Arc<Link>> {
        (self.current_link()).ok_or_else(|| Error::Protocol("no connection".to_owned()))
    }

    /// Returns the characteristic with the specified value handle.
    fn characteristic_by_value_handle(&self, hdl: Handle) -> Option<Arc<RemoteCharacteristic>> {
        (self.get_service_by_handle(hdl)).and_then(|s| s.characteristic_by_value_handle(hdl))
    }
}

/// Validates a raw handle received from the stack.
#[inline]
fn valid(hdl: u16) -> Result<Handle> {
    Handle::new(hdl).ok_or_else(|| Error::Protocol("invalid handle 0x0000".to_owned()))
}
