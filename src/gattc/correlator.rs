use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use crate::att::{ErrorCode, Handle, HandleRange};
use crate::SyncMutex;

use super::*;

/// Identifies the completion event that a pending operation is waiting for.
/// At most one operation per target object may be pending at a time.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Target {
    /// Read of the attribute value at the handle.
    Read(Handle),
    /// Write of the attribute value at the handle.
    Write(Handle),
    /// Primary service discovery.
    Services,
    /// Characteristic discovery within a service handle range.
    Characteristics(HandleRange),
    /// Descriptor discovery within a characteristic handle range.
    Descriptors(HandleRange),
}

impl Target {
    /// Returns whether two targets would make event delivery ambiguous if both
    /// were pending. Reads and writes of one handle belong to the same object,
    /// and overlapping discovery ranges would both claim the same results.
    fn conflicts_with(self, other: Self) -> bool {
        use Target::*;
        match (self, other) {
            (Read(a) | Write(a), Read(b) | Write(b)) => a == b,
            (Services, Services) => true,
            (Characteristics(a), Characteristics(b)) | (Descriptors(a), Descriptors(b)) => {
                a.overlaps(b)
            }
            _ => false,
        }
    }

    /// Returns whether a discovery result belongs to this target.
    fn accepts(self, f: &Found) -> bool {
        match (self, f) {
            (Self::Services, &Found::Service(_)) => true,
            (Self::Characteristics(r), &Found::Characteristic(ref c)) => r.contains_handle(c.hdl),
            (Self::Descriptors(r), &Found::Descriptor(ref d)) => r.contains_handle(d.hdl),
            _ => false,
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Read(h) => write!(f, "read of {h}"),
            Self::Write(h) => write!(f, "write of {h}"),
            Self::Services => f.write_str("service discovery"),
            Self::Characteristics(r) => write!(f, "characteristic discovery in {r}"),
            Self::Descriptors(r) => write!(f, "descriptor discovery in {r}"),
        }
    }
}

/// Result that the dispatcher delivers to a pending operation.
#[derive(Debug)]
pub(crate) enum Outcome {
    Done(Value),
    Failed(ErrorCode),
    Disconnected,
}

/// Successful completion of a pending operation.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    pub val: Value,
    pub found: Vec<Found>,
}

/// Per-connection table of pending operations. Each operation owns a
/// single-slot rendezvous that is filled exactly once, either by the
/// dispatcher or by link teardown.
#[derive(Debug, Default)]
pub(crate) struct Correlator {
    ws: SyncMutex<Waiters>,
}

impl Correlator {
    /// Registers a pending operation for `tgt`. This must be called before the
    /// request is submitted to the transport so that a completion delivered
    /// before the caller starts waiting is not lost.
    pub fn register(&self, tgt: Target) -> Result<Pending<'_>> {
        let mut ws = self.ws.lock();
        if ws.closed {
            return Err(Error::NotConnected);
        }
        if ws.queue.iter().any(|w| tgt.conflicts_with(w.tgt)) {
            return Err(Error::OperationInProgress(tgt));
        }
        let id = ws.next_id;
        ws.next_id = ws.next_id.wrapping_add(1);
        let slot = Arc::<Slot>::default();
        ws.queue.push_back(Waiter {
            id,
            tgt,
            slot: Arc::clone(&slot),
        });
        drop(ws);
        trace!("Registered {tgt} (#{id})");
        Ok(Pending {
            cr: self,
            id,
            tgt,
            slot,
        })
    }

    /// Completes the operation pending for `tgt`. Returns a protocol error if
    /// no such operation exists or it was already completed.
    pub fn signal(&self, tgt: Target, out: Outcome) -> Result<()> {
        let slot = self
            .find(|w| w.tgt == tgt)
            .ok_or_else(|| Error::Protocol(format!("no pending {tgt}")))?;
        slot.complete(tgt, out)
    }

    /// Appends a discovery result to the discovery operation that covers it.
    pub fn push(&self, f: Found) -> Result<()> {
        let Some((tgt, slot)) = ({
            let ws = self.ws.lock();
            (ws.queue.iter().find(|w| w.tgt.accepts(&f))).map(|w| (w.tgt, Arc::clone(&w.slot)))
        }) else {
            return Err(Error::Protocol(format!("no pending discovery for {f:?}")));
        };
        let mut st = slot.st.lock();
        if st.done.is_some() {
            return Err(Error::Protocol(format!("{f:?} after {tgt} completed")));
        }
        st.found.push(f);
        Ok(())
    }

    /// Rejects all future registrations and completes every pending operation
    /// with [`Outcome::Disconnected`]. Returns the number of operations that
    /// were cancelled.
    pub fn close(&self) -> usize {
        let mut ws = self.ws.lock();
        ws.closed = true;
        let mut n = 0;
        for w in &ws.queue {
            if w.slot.complete(w.tgt, Outcome::Disconnected).is_ok() {
                n += 1;
            }
        }
        n
    }

    /// Returns the number of pending operations.
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.ws.lock().queue.len()
    }

    fn find(&self, f: impl Fn(&Waiter) -> bool) -> Option<Arc<Slot>> {
        let ws = self.ws.lock();
        ws.queue.iter().find(|w| f(w)).map(|w| Arc::clone(&w.slot))
    }
}

/// Queue of pending operations.
#[derive(Debug)]
struct Waiters {
    queue: VecDeque<Waiter>,
    next_id: u64,
    closed: bool,
}

impl Default for Waiters {
    #[inline]
    fn default() -> Self {
        Self {
            queue: VecDeque::with_capacity(4),
            next_id: 0,
            closed: false,
        }
    }
}

/// Registered pending operation.
#[derive(Debug)]
struct Waiter {
    id: u64,
    tgt: Target,
    slot: Arc<Slot>,
}

/// Single-slot rendezvous between a blocked caller and the dispatcher.
#[derive(Debug, Default)]
struct Slot {
    st: SyncMutex<SlotState>,
    cv: parking_lot::Condvar,
}

#[derive(Debug, Default)]
struct SlotState {
    found: Vec<Found>,
    done: Option<Outcome>,
}

impl Slot {
    /// Fills the slot and wakes the waiter. A second completion is rejected
    /// without overwriting the first.
    fn complete(&self, tgt: Target, out: Outcome) -> Result<()> {
        let mut st = self.st.lock();
        if st.done.is_some() {
            return Err(Error::Protocol(format!("duplicate completion for {tgt}")));
        }
        st.done = Some(out);
        drop(st);
        self.cv.notify_one();
        Ok(())
    }
}

/// Guard for a registered operation. The operation is unregistered when the
/// guard is dropped, so a completion that arrives after a timeout is treated
/// as unmatched rather than being absorbed by a later call.
#[derive(Debug)]
#[must_use]
pub(crate) struct Pending<'a> {
    cr: &'a Correlator,
    id: u64,
    tgt: Target,
    slot: Arc<Slot>,
}

impl Pending<'_> {
    /// Blocks until the operation is completed, `timeout` expires, or the
    /// link is closed.
    pub fn wait(self, timeout: Option<Duration>) -> Result<Completion> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut st = self.slot.st.lock();
        let out = loop {
            if let Some(out) = st.done.take() {
                break out;
            }
            match deadline {
                Some(d) => {
                    if self.slot.cv.wait_until(&mut st, d).timed_out() && st.done.is_none() {
                        warn!("Timeout while waiting for {}", self.tgt);
                        return Err(Error::Timeout(self.tgt));
                    }
                }
                None => self.slot.cv.wait(&mut st),
            }
        };
        let found = std::mem::take(&mut st.found);
        drop(st);
        trace!("Completed {} (#{}): {out:?}", self.tgt, self.id);
        match out {
            Outcome::Done(val) => Ok(Completion { val, found }),
            Outcome::Failed(err) => Err(Error::Att { tgt: self.tgt, err }),
            Outcome::Disconnected => Err(Error::Disconnected),
        }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        let mut ws = self.cr.ws.lock();
        if let Some(i) = ws.queue.iter().position(|w| w.id == self.id) {
            ws.queue.swap_remove_back(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use matches::assert_matches;

    use super::*;

    fn hdl(h: u16) -> Handle {
        Handle::new(h).unwrap()
    }

    #[test]
    fn signal_before_wait() {
        let cr = Correlator::default();
        let p = cr.register(Target::Read(hdl(0x2A))).unwrap();
        cr.signal(Target::Read(hdl(0x2A)), Outcome::Done(Value::from_slice(&[1, 2])))
            .unwrap();
        let c = p.wait(None).unwrap();
        assert_eq!(c.val.as_slice(), &[1, 2]);
        assert_eq!(cr.pending(), 0);
    }

    #[test]
    fn signal_from_other_thread() {
        let cr = Correlator::default();
        let tgt = Target::Write(hdl(0x2A));
        thread::scope(|s| {
            let p = cr.register(tgt).unwrap();
            s.spawn(|| {
                while cr.signal(tgt, Outcome::Done(Value::new())).is_err() {
                    thread::yield_now();
                }
            });
            assert!(p.wait(Some(Duration::from_secs(5))).is_ok());
        });
    }

    #[test]
    fn unrepresentable_deadline() {
        let cr = Correlator::default();
        let tgt = Target::Read(hdl(0x2A));
        thread::scope(|s| {
            let p = cr.register(tgt).unwrap();
            s.spawn(|| cr.signal(tgt, Outcome::Done(Value::from_slice(&[7]))).unwrap());
            let c = p.wait(Some(Duration::MAX)).unwrap();
            assert_eq!(c.val.as_slice(), &[7]);
        });
        assert_eq!(cr.pending(), 0);
    }

    #[test]
    fn conflicts() {
        let cr = Correlator::default();
        let _p = cr.register(Target::Read(hdl(0x2A))).unwrap();
        assert_matches!(
            cr.register(Target::Write(hdl(0x2A))),
            Err(Error::OperationInProgress(Target::Write(_)))
        );
        assert!(cr.register(Target::Read(hdl(0x2B))).is_ok());

        let r = HandleRange::from_raw(0x10, 0x1F).unwrap();
        let _d = cr.register(Target::Descriptors(r)).unwrap();
        let overlap = HandleRange::from_raw(0x1F, 0x2F).unwrap();
        assert!(cr.register(Target::Descriptors(overlap)).is_err());
        assert!(cr.register(Target::Characteristics(overlap)).is_ok());
    }

    #[test]
    fn unmatched_and_duplicate() {
        let cr = Correlator::default();
        let tgt = Target::Read(hdl(0x2A));
        assert_matches!(cr.signal(tgt, Outcome::Done(Value::new())), Err(Error::Protocol(_)));

        let p = cr.register(tgt).unwrap();
        cr.signal(tgt, Outcome::Done(Value::from_slice(&[7]))).unwrap();
        assert_matches!(
            cr.signal(tgt, Outcome::Done(Value::from_slice(&[8]))),
            Err(Error::Protocol(_))
        );
        assert_eq!(p.wait(None).unwrap().val.as_slice(), &[7]);
    }

    #[test]
    fn timeout_unregisters() {
        let cr = Correlator::default();
        let tgt = Target::Read(hdl(0x2A));
        let p = cr.register(tgt).unwrap();
        assert_matches!(
            p.wait(Some(Duration::from_millis(10))),
            Err(Error::Timeout(Target::Read(_)))
        );
        assert_eq!(cr.pending(), 0);
        // A late completion must not be absorbed by the next operation
        assert!(cr.signal(tgt, Outcome::Done(Value::new())).is_err());
        let p = cr.register(tgt).unwrap();
        assert_matches!(p.wait(Some(Duration::from_millis(10))), Err(Error::Timeout(_)));
    }

    #[test]
    fn failure() {
        let cr = Correlator::default();
        let tgt = Target::Write(hdl(0x2A));
        let p = cr.register(tgt).unwrap();
        cr.signal(tgt, Outcome::Failed(ErrorCode::WriteNotPermitted))
            .unwrap();
        assert_matches!(
            p.wait(None),
            Err(Error::Att {
                err: ErrorCode::WriteNotPermitted,
                ..
            })
        );
    }

    #[test]
    fn close_drains() {
        let cr = Correlator::default();
        thread::scope(|s| {
            let ts: Vec<_> = (1..=4)
                .map(|h| {
                    let p = cr.register(Target::Read(hdl(h))).unwrap();
                    s.spawn(move || p.wait(None))
                })
                .collect();
            assert_eq!(cr.close(), 4);
            for t in ts {
                assert_matches!(t.join().unwrap(), Err(Error::Disconnected));
            }
        });
        assert_matches!(cr.register(Target::Services), Err(Error::NotConnected));
    }
}
