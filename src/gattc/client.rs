use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::att::{Handle, HandleRange, Opcode};
use crate::host::{self, ConnId, Iface, Transport};
use crate::uuid::Uuid;
use crate::SyncRwLock;

use super::correlator::{Completion, Correlator};
use super::*;

/// ATT transaction timeout ([Vol 3] Part F, Section 3.3.3).
const TRANSACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize)]
#[non_exhaustive]
#[serde(default)]
pub struct Config {
    /// Maximum time that an operation may remain pending. `None` waits until
    /// the operation completes or the link goes down.
    pub timeout: Option<Duration>,
    /// Issue every write as a Write Request, even when the caller does not
    /// ask for a response.
    pub force_write_rsp: bool,
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            timeout: Some(TRANSACTION_TIMEOUT),
            force_write_rsp: false,
        }
    }
}

/// GATT client for one peer. Owns the registry of discovered services and
/// the context of the current connection, if any.
#[derive(Debug)]
pub struct Client {
    tp: Arc<dyn Transport>,
    ifc: Iface,
    cfg: Config,
    link: SyncRwLock<Option<Arc<Link>>>,
    reg: SyncRwLock<Registry>,
}

impl Client {
    /// Creates a disconnected client that submits requests to `tp` using
    /// interface `ifc`.
    #[must_use]
    pub fn new(tp: Arc<dyn Transport>, ifc: Iface, cfg: Config) -> Self {
        Self {
            tp,
            ifc,
            cfg,
            link: SyncRwLock::default(),
            reg: SyncRwLock::default(),
        }
    }

    /// Returns the client configuration.
    #[inline(always)]
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.cfg
    }

    /// Starts a new connection context for `conn`. Any previous connection is
    /// torn down first. Operations fail with [`Error::NotConnected`] until
    /// [`Self::connected`] is called.
    pub fn connecting(&self, conn: ConnId) {
        if self.link.read().is_some() {
            self.on_disconnect();
        }
        self.remove_all();
        let link = Link::new(Arc::clone(&self.tp), conn, self.ifc, self.cfg.clone());
        debug!("Connecting to {conn:?}");
        *self.link.write() = Some(Arc::new(link));
    }

    /// Marks the pending connection as established.
    pub fn connected(&self) -> Result<()> {
        let link = self.current_link().ok_or(Error::NotConnected)?;
        link.up.store(true, Ordering::Release);
        debug!("Connected to {:?}", link.conn);
        Ok(())
    }

    /// Returns whether the client has an established connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        (self.link.read().as_ref()).is_some_and(|l| l.is_up())
    }

    /// Discovers all primary services of the peer, replacing any previously
    /// discovered ones. Characteristics are not discovered. Results are
    /// discarded with [`Error::Disconnected`] if the link went down before
    /// they could be installed.
    pub fn discover_services(&self) -> Result<()> {
        let link = self.link()?;
        let mut reg = Registry::default();
        for f in link.discover(Target::Services, |tp, conn, ifc| {
            tp.discover_services(conn, ifc)
        })? {
            let Found::Service(s) = f else { continue };
            let svc = Arc::new(RemoteService::new(Arc::clone(&link), s));
            reg.by_uuid.entry(s.uuid).or_insert(s.range.start());
            reg.by_hdl.insert(s.range.start(), svc);
        }
        let mut cur = self.reg.write();
        // Only the current established link may install results
        let live = (self.link.read().as_ref()).is_some_and(|l| Arc::ptr_eq(l, &link));
        if !live || !link.is_up() {
            drop(cur);
            reg.clear();
            debug!("Discarding services of a closed link");
            return Err(Error::Disconnected);
        }
        debug!("Discovered {} service(s)", reg.by_hdl.len());
        let mut old = std::mem::replace(&mut *cur, reg);
        drop(cur);
        old.clear();
        Ok(())
    }

    /// Discovers all services and their characteristics and descriptors.
    pub fn discover(&self) -> Result<()> {
        self.discover_services()?;
        for s in self.services() {
            s.discover_characteristics()?;
        }
        Ok(())
    }

    /// Returns the service with the specified UUID.
    #[must_use]
    pub fn get_service_by_uuid(&self, uuid: impl Into<Uuid>) -> Option<Arc<RemoteService>> {
        let reg = self.reg.read();
        (reg.by_uuid.get(&uuid.into())).and_then(|h| reg.by_hdl.get(h).map(Arc::clone))
    }

    /// Returns the service whose handle range contains `hdl`.
    #[must_use]
    pub fn get_service_by_handle(&self, hdl: Handle) -> Option<Arc<RemoteService>> {
        let reg = self.reg.read();
        (reg.by_hdl.range(..=hdl).next_back())
            .filter(|(_, s)| s.range().contains_handle(hdl))
            .map(|(_, s)| Arc::clone(s))
    }

    /// Returns all discovered services in handle order.
    #[must_use]
    pub fn services(&self) -> Vec<Arc<RemoteService>> {
        self.reg.read().by_hdl.values().map(Arc::clone).collect()
    }

    /// Reads the value of characteristic `chr` within service `svc`.
    pub fn get_value(&self, svc: impl Into<Uuid>, chr: impl Into<Uuid>) -> Result<Value> {
        self.service_for_op(svc.into())?.get_value(chr)
    }

    /// Writes the value of characteristic `chr` within service `svc`.
    pub fn set_value(&self, svc: impl Into<Uuid>, chr: impl Into<Uuid>, v: &[u8]) -> Result<()> {
        self.service_for_op(svc.into())?.set_value(chr, v)
    }

    /// Releases all discovered services along with their characteristics and
    /// descriptors.
    pub fn remove_all(&self) {
        let mut old = std::mem::take(&mut *self.reg.write());
        old.clear();
    }

    /// Tears down the current connection. Every pending operation completes
    /// with [`Error::Disconnected`], the registry is cleared, and further
    /// operations fail with [`Error::NotConnected`].
    pub fn on_disconnect(&self) {
        let Some(link) = self.link.write().take() else {
            return;
        };
        let n = link.close();
        self.remove_all();
        debug!("Closed {:?} ({n} pending operation(s) cancelled)", link.conn);
    }

    /// Returns the current link if it is established.
    fn link(&self) -> Result<Arc<Link>> {
        (self.current_link())
            .filter(|l| l.is_up())
            .ok_or(Error::NotConnected)
    }

    /// Returns the current link in any state.
    pub(super) fn current_link(&self) -> Option<Arc<Link>> {
        self.link.read().as_ref().map(Arc::clone)
    }

    fn service_for_op(&self, uuid: Uuid) -> Result<Arc<RemoteService>> {
        self.link()?;
        self.get_service_by_uuid(uuid).ok_or(Error::NotFound(uuid))
    }
}

/// Discovered services indexed by start handle and UUID.
#[derive(Debug, Default)]
struct Registry {
    by_hdl: BTreeMap<Handle, Arc<RemoteService>>,
    by_uuid: HashMap<Uuid, Handle>,
}

impl Registry {
    /// Releases characteristics and descriptors before the services.
    fn clear(&mut self) {
        for s in self.by_hdl.values() {
            s.remove_characteristics();
        }
        self.by_uuid.clear();
        self.by_hdl.clear();
    }
}

/// Context of one connection, shared by every object discovered over it.
/// A new link is created for each connection, so objects from an earlier
/// connection keep failing with [`Error::NotConnected`].
#[derive(Debug)]
pub(crate) struct Link {
    tp: Arc<dyn Transport>,
    conn: ConnId,
    ifc: Iface,
    cfg: Config,
    up: AtomicBool,
    pub(super) cr: Correlator,
}

impl Link {
    fn new(tp: Arc<dyn Transport>, conn: ConnId, ifc: Iface, cfg: Config) -> Self {
        Self {
            tp,
            conn,
            ifc,
            cfg,
            up: AtomicBool::new(false),
            cr: Correlator::default(),
        }
    }

    /// Returns the connection identifier.
    #[inline(always)]
    pub const fn conn(&self) -> ConnId {
        self.conn
    }

    /// Returns whether the connection is established.
    #[inline]
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Reads the attribute value at `hdl`.
    pub fn read(&self, hdl: Handle) -> Result<Value> {
        let c = self.exec(Target::Read(hdl), |tp, conn, ifc| {
            tp.read_attr(conn, ifc, hdl)
        })?;
        Ok(c.val)
    }

    /// Writes `v` to the attribute at `hdl`. The call waits for the stack to
    /// report completion even when no response is requested from the peer.
    pub fn write(&self, hdl: Handle, v: &[u8], with_rsp: bool) -> Result<()> {
        let op = Opcode::write(with_rsp || self.cfg.force_write_rsp);
        self.exec(Target::Write(hdl), |tp, conn, ifc| {
            tp.write_attr(conn, ifc, op, hdl, v)
        })?;
        Ok(())
    }

    /// Discovers all characteristics in `range`.
    pub fn discover_characteristics(&self, range: HandleRange) -> Result<Vec<Found>> {
        self.discover(Target::Characteristics(range), |tp, conn, ifc| {
            tp.discover_characteristics(conn, ifc, range)
        })
    }

    /// Discovers all descriptors in `range`.
    pub fn discover_descriptors(&self, range: HandleRange) -> Result<Vec<Found>> {
        self.discover(Target::Descriptors(range), |tp, conn, ifc| {
            tp.discover_descriptors(conn, ifc, range)
        })
    }

    /// Runs a discovery procedure and returns the attributes it found.
    fn discover(
        &self,
        tgt: Target,
        submit: impl FnOnce(&dyn Transport, ConnId, Iface) -> host::Result<()>,
    ) -> Result<Vec<Found>> {
        let c = self.exec(tgt, submit)?;
        debug!("Completed {tgt} ({} result(s))", c.found.len());
        Ok(c.found)
    }

    /// Registers a pending operation for `tgt`, submits the request, and
    /// blocks until it completes.
    fn exec(
        &self,
        tgt: Target,
        submit: impl FnOnce(&dyn Transport, ConnId, Iface) -> host::Result<()>,
    ) -> Result<Completion> {
        if !self.is_up() {
            return Err(Error::NotConnected);
        }
        let p = self.cr.register(tgt)?;
        trace!("Submitting {tgt}");
        submit(self.tp.as_ref(), self.conn, self.ifc)?;
        p.wait(self.cfg.timeout)
    }

    /// Marks the link as down and cancels all pending operations.
    fn close(&self) -> usize {
        self.up.store(false, Ordering::Release);
        self.cr.close()
    }
}
