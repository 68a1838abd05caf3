//! Interface to the underlying Bluetooth LE stack.
//!
//! The stack is a black box reached through a small set of primitive
//! requests. Each request returns as soon as it is submitted; its outcome is
//! reported later through [`crate::gattc::Event`]s passed to
//! [`crate::gattc::Client::dispatch`].

use std::fmt::Debug;

use crate::att::{Handle, HandleRange, Opcode};

/// Error returned when the stack refuses to submit a request.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{op} request rejected by the stack (status {status:#06X})")]
    Rejected { op: &'static str, status: u16 },
    #[error("stack is not available")]
    Unavailable,
}

/// Common transport result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Connection identifier assigned by the stack.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct ConnId(pub u8);

/// GATT client interface identifier returned by the stack when the
/// application registers as a client.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Iface(pub u8);

/// Primitive GATT client requests understood by the stack. Implementations
/// must not block waiting for the outcome and must not hold any lock that
/// the event delivery path needs.
pub trait Transport: Debug + Send + Sync {
    /// Requests the value of the attribute at `hdl`. Completes with
    /// [`crate::gattc::Event::ReadResult`].
    fn read_attr(&self, conn: ConnId, ifc: Iface, hdl: Handle) -> Result<()>;

    /// Writes `val` to the attribute at `hdl` using opcode `op`. Completes
    /// with [`crate::gattc::Event::WriteResult`] for both requests and
    /// commands.
    fn write_attr(&self, conn: ConnId, ifc: Iface, op: Opcode, hdl: Handle, val: &[u8])
        -> Result<()>;

    /// Discovers all primary services. Reports each service with
    /// [`crate::gattc::Event::DiscoveryResult`] and completes with
    /// [`crate::gattc::Event::DiscoveryState`].
    fn discover_services(&self, conn: ConnId, ifc: Iface) -> Result<()>;

    /// Discovers all characteristic declarations within `range`.
    fn discover_characteristics(&self, conn: ConnId, ifc: Iface, range: HandleRange)
        -> Result<()>;

    /// Discovers all characteristic descriptors within `range`.
    fn discover_descriptors(&self, conn: ConnId, ifc: Iface, range: HandleRange) -> Result<()>;
}
