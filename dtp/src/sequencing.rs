//! Sequencing / reassembly queue (§3.3): out-of-order inbound PDUs held
//! until the left window edge catches up to them.
use std::collections::BTreeMap;
use std::time::Instant;

use dtsv::Pdu;

/// Per-connection queue of out-of-order inbound PDUs, sorted by sequence
/// number, each tagged with its arrival time.
///
/// Invariants upheld by construction: no duplicate sequence numbers (`
/// insert` rejects one); every element's sequence number is strictly
/// greater than `rcv_left_window_edge` (callers only insert PDUs they've
/// already checked against LWE).
#[derive(Default)]
pub struct SequencingQueue {
    entries: BTreeMap<u64, (Pdu, Instant)>,
}

impl SequencingQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a PDU. Returns `false` without modifying the queue if its
    /// sequence number is already present.
    pub fn insert(&mut self, pdu: Pdu, now: Instant) -> bool {
        let seq = pdu.pci.seq_num;
        if self.entries.contains_key(&seq) {
            return false;
        }
        self.entries.insert(seq, (pdu, now));
        true
    }

    /// Whether the queue holds no PDUs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of PDUs held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Removes and returns the lowest-sequence-number entry, but only if
    /// its sequence number is exactly `lwe + 1` (the next in-order PDU).
    pub fn pop_if_next(&mut self, lwe: u64) -> Option<(Pdu, Instant)> {
        let &first_seq = self.entries.keys().next()?;
        if first_seq == lwe + 1 {
            self.entries.remove(&first_seq)
        } else {
            None
        }
    }

    /// Returns the head entry's sequence number and arrival time without
    /// removing it.
    pub fn peek(&self) -> Option<(u64, Instant)> {
        self.entries.iter().next().map(|(seq, (_, at))| (*seq, *at))
    }

    /// Removes and returns the head entry unconditionally. Used by
    /// A-timer expiration to force delivery or permanent-skip of a gap
    /// that has aged out.
    pub fn pop_head(&mut self) -> Option<(Pdu, Instant)> {
        let seq = *self.entries.keys().next()?;
        self.entries.remove(&seq)
    }

    /// Discards every held PDU (receiver-inactivity expiration).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use addr::CepId;
    use dtsv::Pci;

    fn pdu(seq: u64) -> Pdu {
        Pdu {
            pci: Pci {
                drf: false,
                dst_cep: CepId(1),
                qos_id: 0,
                seq_num: seq,
            },
            payload: vec![],
        }
    }

    #[test]
    fn rejects_duplicate_sequence_numbers() {
        let mut q = SequencingQueue::new();
        let now = Instant::now();
        assert!(q.insert(pdu(5), now));
        assert!(!q.insert(pdu(5), now));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn pop_if_next_only_releases_the_immediate_successor() {
        let mut q = SequencingQueue::new();
        let now = Instant::now();
        q.insert(pdu(3), now);
        q.insert(pdu(2), now);
        assert!(q.pop_if_next(0).is_none());
        let (p, _) = q.pop_if_next(1).unwrap();
        assert_eq!(p.pci.seq_num, 2);
        let (p, _) = q.pop_if_next(2).unwrap();
        assert_eq!(p.pci.seq_num, 3);
        assert!(q.is_empty());
    }

    #[test]
    fn stays_sorted_regardless_of_insertion_order() {
        let mut q = SequencingQueue::new();
        let now = Instant::now();
        for seq in [4, 2, 3].iter() {
            q.insert(pdu(*seq), now);
        }
        assert_eq!(q.peek().unwrap().0, 2);
    }
}
