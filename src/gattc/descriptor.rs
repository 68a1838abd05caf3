use std::fmt::{Display, Formatter};
use std::sync::Arc;

use crate::att::Handle;
use crate::uuid::Uuid;
use crate::SyncMutex;

use super::client::Link;
use super::*;

/// Characteristic descriptor discovered on the peer. Descriptors are owned by
/// their characteristic and live as long as it does.
#[derive(Debug)]
pub struct RemoteDescriptor {
    hdl: Handle,
    uuid: Uuid,
    link: Arc<Link>,
    val: SyncMutex<Value>,
}

impl RemoteDescriptor {
    pub(super) fn new(link: Arc<Link>, d: DescDecl) -> Self {
        Self {
            hdl: d.hdl,
            uuid: d.uuid,
            link,
            val: SyncMutex::default(),
        }
    }

    /// Returns the descriptor handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the descriptor UUID.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the last value that was successfully read or written.
    #[must_use]
    pub fn value(&self) -> Value {
        self.val.lock().clone()
    }

    /// Reads the descriptor value from the peer.
    pub fn read_value(&self) -> Result<Value> {
        let v = self.link.read(self.hdl)?;
        self.val.lock().clone_from(&v);
        Ok(v)
    }

    /// Reads a `u8` descriptor value.
    pub fn read_u8(&self) -> Result<u8> {
        Ok(u8::from_le_bytes(le(&self.read_value()?)?))
    }

    /// Reads a little-endian `u16` descriptor value.
    pub fn read_u16(&self) -> Result<u16> {
        Ok(u16::from_le_bytes(le(&self.read_value()?)?))
    }

    /// Reads a little-endian `u32` descriptor value.
    pub fn read_u32(&self) -> Result<u32> {
        Ok(u32::from_le_bytes(le(&self.read_value()?)?))
    }

    /// Writes the descriptor value. The call blocks until the stack reports
    /// completion, even if no response is requested from the peer.
    pub fn write_value(&self, v: &[u8], with_response: bool) -> Result<()> {
        self.link.write(self.hdl, v, with_response)?;
        *self.val.lock() = Value::from_slice(v);
        Ok(())
    }
}

impl Display for RemoteDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let h = u16::from(self.hdl);
        write!(f, "Descriptor: uuid: {}, handle: {h} {h:#06x}", self.uuid)
    }
}
