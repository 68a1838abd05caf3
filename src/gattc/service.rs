use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::att::{Handle, HandleRange};
use crate::uuid::Uuid;
use crate::SyncRwLock;

use super::client::Link;
use super::*;

/// Primary service discovered on the peer.
#[derive(Debug)]
pub struct RemoteService {
    uuid: Uuid,
    range: HandleRange,
    link: Arc<Link>,
    chars: SyncRwLock<Chars>,
}

impl RemoteService {
    pub(super) fn new(link: Arc<Link>, d: ServiceDecl) -> Self {
        Self {
            uuid: d.uuid,
            range: d.range,
            link,
            chars: SyncRwLock::default(),
        }
    }

    /// Returns the service UUID.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the service handle range.
    #[inline(always)]
    #[must_use]
    pub const fn range(&self) -> HandleRange {
        self.range
    }

    /// Discovers all characteristics of the service and their descriptors,
    /// replacing any previously discovered ones. Nothing is replaced if the
    /// link went down during discovery.
    pub fn discover_characteristics(&self) -> Result<()> {
        let mut decls: Vec<CharDecl> = (self.link.discover_characteristics(self.range)?)
            .into_iter()
            .filter_map(|f| match f {
                Found::Characteristic(c) => Some(c),
                _ => None,
            })
            .collect();
        decls.sort_unstable_by_key(|c| c.hdl);

        let mut chars = Chars::default();
        for (i, d) in decls.iter().enumerate() {
            // Descriptors extend up to the next declaration
            let end = (decls.get(i + 1))
                .and_then(|n| n.hdl.prev())
                .unwrap_or_else(|| self.range.end());
            if !(d.hdl < d.val_hdl && d.val_hdl <= end) {
                warn!("Ignoring invalid {d:?} (end {end})");
                continue;
            }
            let c = RemoteCharacteristic::new(Arc::clone(&self.link), d, end)?;
            chars.by_uuid.entry(d.uuid).or_insert(d.hdl);
            chars.by_hdl.insert(d.hdl, Arc::new(c));
        }
        debug!(
            "Discovered {} characteristic(s) in {}",
            chars.by_hdl.len(),
            self.uuid
        );
        let mut cur = self.chars.write();
        if !self.link.is_up() {
            drop(cur);
            debug!("Discarding characteristics of a closed link");
            return Err(Error::Disconnected);
        }
        let old = std::mem::replace(&mut *cur, chars);
        drop(cur);
        drop(old);
        Ok(())
    }

    /// Returns the characteristic with the specified UUID.
    #[must_use]
    pub fn get_characteristic(&self, uuid: impl Into<Uuid>) -> Option<Arc<RemoteCharacteristic>> {
        let cs = self.chars.read();
        (cs.by_uuid.get(&uuid.into())).and_then(|h| cs.by_hdl.get(h).map(Arc::clone))
    }

    /// Returns the characteristic whose value handle is `hdl`.
    #[must_use]
    pub fn characteristic_by_value_handle(&self, hdl: Handle) -> Option<Arc<RemoteCharacteristic>> {
        let cs = self.chars.read();
        (cs.by_hdl.range(..hdl).next_back())
            .filter(|(_, c)| c.value_handle() == hdl)
            .map(|(_, c)| Arc::clone(c))
    }

    /// Returns all discovered characteristics in handle order.
    #[must_use]
    pub fn characteristics(&self) -> Vec<Arc<RemoteCharacteristic>> {
        self.chars.read().by_hdl.values().map(Arc::clone).collect()
    }

    /// Reads the value of the characteristic with the specified UUID.
    pub fn get_value(&self, uuid: impl Into<Uuid>) -> Result<Value> {
        self.characteristic_for_op(uuid.into())?.read_value()
    }

    /// Writes the value of the characteristic with the specified UUID
    /// without requesting a response.
    pub fn set_value(&self, uuid: impl Into<Uuid>, v: &[u8]) -> Result<()> {
        self.characteristic_for_op(uuid.into())?.write_value(v, false)
    }

    /// Releases all characteristics and their descriptors.
    pub fn remove_characteristics(&self) {
        let old = std::mem::take(&mut *self.chars.write());
        drop(old);
    }

    fn characteristic_for_op(&self, uuid: Uuid) -> Result<Arc<RemoteCharacteristic>> {
        self.get_characteristic(uuid).ok_or(Error::NotFound(uuid))
    }
}

impl Display for RemoteService {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (start, end) = (u16::from(self.range.start()), u16::from(self.range.end()));
        write!(
            f,
            "Service: uuid: {}, start_handle: {start} {start:#06x}, end_handle: {end} {end:#06x}",
            self.uuid
        )
    }
}

/// Characteristics indexed by declaration handle and UUID.
#[derive(Debug, Default)]
struct Chars {
    by_hdl: BTreeMap<Handle, Arc<RemoteCharacteristic>>,
    by_uuid: HashMap<Uuid, Handle>,
}
