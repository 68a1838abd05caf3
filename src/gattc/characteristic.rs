use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::att::{Handle, HandleRange};
use crate::uuid::{Uuid, Uuid16};
use crate::SyncMutex;

use super::client::Link;
use super::*;

/// Notification or indication sink. Called with the characteristic, the
/// received value, and `true` for a notification or `false` for an
/// indication. Sinks run on the stack's event delivery context and must not
/// block or call any blocking client operation.
pub type NotifySink = Arc<dyn Fn(&RemoteCharacteristic, &[u8], bool) + Send + Sync>;

/// Server-initiated update type requested by [`RemoteCharacteristic::register_for_notify`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum NotifyMode {
    #[default]
    Notify,
    Indicate,
}

impl NotifyMode {
    /// Returns the matching configuration descriptor value.
    #[inline]
    #[must_use]
    pub const fn cccd(self) -> Cccd {
        match self {
            Self::Notify => Cccd::NOTIFY,
            Self::Indicate => Cccd::INDICATE,
        }
    }

    #[inline]
    const fn op(self) -> Op {
        match self {
            Self::Notify => Op::Notify,
            Self::Indicate => Op::Indicate,
        }
    }
}

/// Characteristic discovered on the peer. Its descriptors are discovered once
/// when the characteristic is created and never change afterwards.
pub struct RemoteCharacteristic {
    hdl: Handle,
    val_hdl: Handle,
    end: Handle,
    uuid: Uuid,
    props: CharProps,
    link: Arc<Link>,
    descs: Vec<RemoteDescriptor>,
    desc_idx: HashMap<Uuid, usize>,
    val: SyncMutex<Value>,
    sink: SyncMutex<Option<NotifySink>>,
    sub: SyncMutex<()>,
}

impl RemoteCharacteristic {
    /// Creates a characteristic and discovers its descriptors in the range
    /// after the value handle up to `end`.
    pub(super) fn new(link: Arc<Link>, d: &CharDecl, end: Handle) -> Result<Self> {
        let mut descs = Vec::new();
        if let Some(first) = d.val_hdl.next().filter(|&h| h <= end) {
            for f in link.discover_descriptors(HandleRange::new(first, end))? {
                if let Found::Descriptor(dd) = f {
                    descs.push(RemoteDescriptor::new(Arc::clone(&link), dd));
                }
            }
            descs.sort_unstable_by_key(RemoteDescriptor::handle);
        } else {
            trace!("No descriptor range for {}", d.uuid);
        }
        let mut desc_idx = HashMap::with_capacity(descs.len());
        for (i, dd) in descs.iter().enumerate() {
            desc_idx.entry(dd.uuid()).or_insert(i);
        }
        debug!("{} has {} descriptor(s)", d.uuid, descs.len());
        Ok(Self {
            hdl: d.hdl,
            val_hdl: d.val_hdl,
            end,
            uuid: d.uuid,
            props: d.props,
            link,
            descs,
            desc_idx,
            val: SyncMutex::default(),
            sink: SyncMutex::default(),
            sub: SyncMutex::default(),
        })
    }

    /// Returns the declaration handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the value handle.
    #[inline(always)]
    #[must_use]
    pub const fn value_handle(&self) -> Handle {
        self.val_hdl
    }

    /// Returns the last handle that belongs to this characteristic.
    #[inline(always)]
    #[must_use]
    pub const fn end_handle(&self) -> Handle {
        self.end
    }

    /// Returns the characteristic UUID.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the characteristic properties.
    #[inline(always)]
    #[must_use]
    pub const fn props(&self) -> CharProps {
        self.props
    }

    /// Returns the descriptor with the specified UUID.
    #[must_use]
    pub fn get_descriptor(&self, uuid: impl Into<Uuid>) -> Option<&RemoteDescriptor> {
        (self.desc_idx.get(&uuid.into())).map(|&i| &self.descs[i])
    }

    /// Returns all descriptors in handle order.
    #[inline]
    #[must_use]
    pub fn descriptors(&self) -> &[RemoteDescriptor] {
        &self.descs
    }

    /// Returns the last value that was successfully read or written.
    #[must_use]
    pub fn value(&self) -> Value {
        self.val.lock().clone()
    }

    /// Reads the characteristic value from the peer.
    pub fn read_value(&self) -> Result<Value> {
        self.require(self.props.can_read(), Op::Read)?;
        let v = self.link.read(self.val_hdl)?;
        self.val.lock().clone_from(&v);
        Ok(v)
    }

    /// Reads a `u8` characteristic value.
    pub fn read_u8(&self) -> Result<u8> {
        Ok(u8::from_le_bytes(le(&self.read_value()?)?))
    }

    /// Reads a little-endian `u16` characteristic value.
    pub fn read_u16(&self) -> Result<u16> {
        Ok(u16::from_le_bytes(le(&self.read_value()?)?))
    }

    /// Reads a little-endian `u32` characteristic value.
    pub fn read_u32(&self) -> Result<u32> {
        Ok(u32::from_le_bytes(le(&self.read_value()?)?))
    }

    /// Reads a little-endian IEEE 754 `f32` characteristic value.
    pub fn read_f32(&self) -> Result<f32> {
        Ok(f32::from_le_bytes(le(&self.read_value()?)?))
    }

    /// Writes the characteristic value using a Write Request if
    /// `with_response` is set or a Write Command otherwise. The call blocks
    /// until the stack reports completion in both cases.
    pub fn write_value(&self, v: &[u8], with_response: bool) -> Result<()> {
        if with_response {
            self.require(self.props.can_write(), Op::Write)?;
        } else {
            self.require(
                self.props.can_write_without_response(),
                Op::WriteWithoutResponse,
            )?;
        }
        self.link.write(self.val_hdl, v, with_response)?;
        *self.val.lock() = Value::from_slice(v);
        Ok(())
    }

    /// Subscribes to value updates. The sink is installed before the Client
    /// Characteristic Configuration descriptor is written, so an update sent
    /// as soon as the peer accepts the write is not missed. If the write
    /// fails, the previous sink is restored. Overlapping subscription changes
    /// fail with [`Error::OperationInProgress`] and leave the sink untouched.
    pub fn register_for_notify<F>(&self, mode: NotifyMode, sink: F) -> Result<()>
    where
        F: Fn(&Self, &[u8], bool) + Send + Sync + 'static,
    {
        let cccd = self.cccd()?;
        self.require(
            match mode {
                NotifyMode::Notify => self.props.can_notify(),
                NotifyMode::Indicate => self.props.can_indicate(),
            },
            mode.op(),
        )?;
        self.configure(cccd, mode.cccd(), Some(Arc::new(sink)))
    }

    /// Removes the sink and disables value updates on the peer. This always
    /// writes the configuration descriptor, even if no sink was registered.
    pub fn unregister_for_notify(&self) -> Result<()> {
        let cccd = self.cccd()?;
        self.configure(cccd, Cccd::empty(), None)
    }

    /// Replaces the sink and writes `cfg` to the configuration descriptor.
    fn configure(
        &self,
        cccd: &RemoteDescriptor,
        cfg: Cccd,
        sink: Option<NotifySink>,
    ) -> Result<()> {
        let Some(_g) = self.sub.try_lock() else {
            return Err(Error::OperationInProgress(Target::Write(cccd.handle())));
        };
        let prev = std::mem::replace(&mut *self.sink.lock(), sink);
        let r = cccd.write_value(&cfg.to_bytes(), true);
        if r.is_err() {
            *self.sink.lock() = prev;
        }
        r
    }

    /// Delivers a notification or indication to the registered sink. Updates
    /// are dropped if there is no sink.
    pub(super) fn deliver(&self, v: &[u8], is_notify: bool) {
        let sink = self.sink.lock().as_ref().map(Arc::clone);
        match sink {
            Some(f) => f(self, v, is_notify),
            None => trace!("No sink for update of {}", self.uuid),
        }
    }

    /// Returns the Client Characteristic Configuration descriptor.
    fn cccd(&self) -> Result<&RemoteDescriptor> {
        (self.get_descriptor(Uuid16::CCCD))
            .ok_or_else(|| Error::DescriptorNotFound(Uuid16::CCCD.as_uuid()))
    }

    #[inline]
    const fn require(&self, supported: bool, op: Op) -> Result<()> {
        if supported {
            Ok(())
        } else {
            Err(Error::NotSupported {
                uuid: self.uuid,
                op,
            })
        }
    }
}

impl Debug for RemoteCharacteristic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCharacteristic")
            .field("hdl", &self.hdl)
            .field("val_hdl", &self.val_hdl)
            .field("end", &self.end)
            .field("uuid", &self.uuid)
            .field("props", &self.props)
            .field("descs", &self.descs)
            .field("sink", &self.sink.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl Display for RemoteCharacteristic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let h = u16::from(self.hdl);
        write!(
            f,
            "Characteristic: uuid: {}, handle: {h} {h:#06x}, props: {:#04x}",
            self.uuid,
            self.props.bits()
        )
    }
}
