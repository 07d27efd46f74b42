//! The upper-layer collaborator (§6.2) and the teardown-synchronisation
//! primitive (§4.1, §5) that lets `destroy_connection` wait for in-flight
//! `write`/`receive` calls to drain before releasing a connection's
//! memory.
use std::sync::{Arc, Condvar, Mutex};

use dtsv::PortId;

/// What a connection's owner exposes beyond [`dtp::Upper`]: notification
/// that the underlying flow has been unbound (§6.2
/// `flow_unbinding_ipcp`), delivered once, at connection teardown.
pub trait ConnectionUpper: dtp::Upper {
    /// The flow backing this connection is gone; the upper layer should
    /// stop assuming it can write or receive on it.
    fn flow_unbinding_ipcp(&self, port_id: PortId);
}

/// A swappable slot holding the current upper-layer collaborator for one
/// connection, so [`crate::EfcpContainer::update_connection`] can rebind
/// it without reconstructing the DTP/DTCP engines that were handed an
/// `Arc<dyn dtp::Upper>` pointing at this slot at construction time.
pub(crate) struct UpperSlot {
    current: Mutex<Arc<dyn ConnectionUpper>>,
}

impl UpperSlot {
    pub(crate) fn new(initial: Arc<dyn ConnectionUpper>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(initial),
        })
    }

    pub(crate) fn set(&self, new_upper: Arc<dyn ConnectionUpper>) {
        *self.current.lock().unwrap() = new_upper;
    }

    pub(crate) fn flow_unbind(&self, port_id: PortId) {
        self.current.lock().unwrap().flow_unbinding_ipcp(port_id);
    }
}

impl dtp::Upper for UpperSlot {
    fn enable_write(&self) {
        self.current.lock().unwrap().enable_write();
    }

    fn disable_write(&self) {
        self.current.lock().unwrap().disable_write();
    }

    fn sdu_enqueue(&self, sdu: Vec<u8>) {
        self.current.lock().unwrap().sdu_enqueue(sdu);
    }
}

/// Per-connection pending-operations counter (§4.1): every `write`/
/// `receive` increments it before doing its work and decrements it after;
/// `destroy_connection` blocks on the paired condition variable until it
/// reaches zero before draining queues and releasing the connection.
#[derive(Default)]
pub(crate) struct PendingOps {
    count: Mutex<usize>,
    cvar: Condvar,
}

impl PendingOps {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn begin(&self) {
        *self.count.lock().unwrap() += 1;
    }

    pub(crate) fn end(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.cvar.notify_all();
        }
    }

    /// Blocks the calling thread until the count reaches zero. Called
    /// directly from `EfcpContainer::destroy_connection` — see its doc
    /// comment for why this never actually blocks in practice.
    pub(crate) fn wait_for_drain(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.cvar.wait(count).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_for_drain_returns_immediately_when_already_zero() {
        let ops = PendingOps::new();
        ops.wait_for_drain();
    }

    #[test]
    fn wait_for_drain_blocks_until_last_end() {
        let ops = PendingOps::new();
        ops.begin();
        ops.begin();
        let waiter = {
            let ops = ops.clone();
            thread::spawn(move || ops.wait_for_drain())
        };
        thread::sleep(Duration::from_millis(20));
        ops.end();
        assert!(!waiter.is_finished());
        ops.end();
        waiter.join().unwrap();
    }
}
