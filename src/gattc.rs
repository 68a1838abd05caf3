//! Generic Attribute Profile client ([Vol 3] Part G, Section 4).
//!
//! Every blocking operation registers a pending request with the connection's
//! correlator, submits a primitive request to the [`Transport`], and then
//! waits until [`Client::dispatch`] delivers the matching completion event,
//! the operation times out, or the link goes down.
//!
//! [`Transport`]: crate::host::Transport

use std::fmt::{Display, Formatter};

use smallvec::SmallVec;

pub use {
    characteristic::*, client::*, consts::*, correlator::Target, descriptor::*, event::*,
    service::*,
};

use crate::att::ErrorCode;
use crate::host;
use crate::uuid::Uuid;

mod characteristic;
mod client;
mod consts;
mod correlator;
mod descriptor;
mod event;
mod service;


/// Error type returned by GATT client operations.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("not connected")]
    NotConnected,
    #[error("link dropped while the operation was pending")]
    Disconnected,
    #[error("timeout while waiting for {0}")]
    Timeout(Target),
    #[error("operation already in progress for {0}")]
    OperationInProgress(Target),
    #[error("descriptor {0} not found")]
    DescriptorNotFound(Uuid),
    #[error("{0} not found")]
    NotFound(Uuid),
    #[error("{op} is not supported by characteristic {uuid}")]
    NotSupported { uuid: Uuid, op: Op },
    #[error("{tgt} failed with {err}")]
    Att { tgt: Target, err: ErrorCode },
    #[error("value too short (need {need} bytes, got {got})")]
    ShortValue { need: usize, got: usize },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Host(#[from] host::Error),
}

impl Error {
    /// Returns whether the error was caused by the link being down, either
    /// before the call or while it was pending.
    #[inline]
    #[must_use]
    pub const fn is_link_down(&self) -> bool {
        matches!(*self, Self::NotConnected | Self::Disconnected)
    }
}

/// Common GATT client result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Attribute value. Most values fit within the default ATT MTU, so they are
/// kept inline.
pub type Value = SmallVec<[u8; 20]>;

/// Returns the first `N` bytes of a little-endian value.
fn le<const N: usize>(v: &[u8]) -> Result<[u8; N]> {
    (v.get(..N))
        .and_then(|b| b.try_into().ok())
        .ok_or(Error::ShortValue {
            need: N,
            got: v.len(),
        })
}

/// Operation kind, used for capability checks and error reporting.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Op {
    Read,
    Write,
    WriteWithoutResponse,
    Notify,
    Indicate,
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match *self {
            Self::Read => "read",
            Self::Write => "write",
            Self::WriteWithoutResponse => "write without response",
            Self::Notify => "notify",
            Self::Indicate => "indicate",
        })
    }
}
