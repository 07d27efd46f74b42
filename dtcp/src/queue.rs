//! Closed-window queue and retransmission queue (§3.4).
//!
//! Both queues are owned by the DTCP engine; DTP only ever reaches them
//! through the [`crate::policy::FlowControl`] bridge (renamed `dtp::FlowControl`
//! in that crate). Keeping the bound-enforcement policy out of the queue
//! itself (see [`ClosedWindowQueue::push`]) lets the overrun path still
//! enqueue one entry past the configured bound, matching the boundary
//! behaviour in EFCP data-transfer core §8: "the write after that invokes
//! `flow_control_overrun` ... and still enqueues".
use std::collections::BTreeMap;
use std::time::Instant;

use dtsv::Pdu;

/// FIFO of outbound PDUs held back because the send window or rate budget
/// is closed.
#[derive(Default)]
pub struct ClosedWindowQueue {
    entries: std::collections::VecDeque<Pdu>,
    max_len: usize,
}

impl ClosedWindowQueue {
    /// Creates an empty queue bounded at `max_len` (§6.4
    /// `max_closed_winq_length`).
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: Default::default(),
            max_len,
        }
    }

    /// Number of PDUs currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no PDUs.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured bound. The queue itself never enforces it — see the
    /// module doc — callers (the DTP policy set) decide whether to treat
    /// a push as ordinary or as an overrun before calling this.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Appends `pdu` unconditionally.
    pub fn push(&mut self, pdu: Pdu) {
        self.entries.push_back(pdu);
    }

    /// Removes and returns the head entry, if any.
    pub fn pop(&mut self) -> Option<Pdu> {
        self.entries.pop_front()
    }

    /// Borrows the head entry without removing it, so callers can check
    /// whether the window/rate budget allows draining it before popping.
    pub fn peek(&self) -> Option<&Pdu> {
        self.entries.front()
    }

    /// Discards every held PDU (sender-inactivity expiration, §4.2).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// One outstanding retransmission-queue entry (§3.4).
#[derive(Clone, Debug)]
pub struct RtxEntry {
    /// The sent copy, held in case it must be resent.
    pub pdu: Pdu,
    /// When this entry was last (re)transmitted — the RTT estimator reads
    /// this on the sample taken from a first-try ACK.
    pub first_send_time: Instant,
    /// Number of retransmissions issued so far (0 = never resent).
    pub retries: u32,
}

/// Sequence-number-ordered retransmission queue (§3.4): entries are
/// destroyed on positive ACK, regenerated on NACK/timeout.
#[derive(Default)]
pub struct RetransmissionQueue {
    entries: BTreeMap<u64, RtxEntry>,
}

impl RetransmissionQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers a freshly sent PDU for possible retransmission.
    pub fn push(&mut self, pdu: Pdu, now: Instant) {
        let seq = pdu.pci.seq_num;
        self.entries.insert(
            seq,
            RtxEntry {
                pdu,
                first_send_time: now,
                retries: 0,
            },
        );
    }

    /// Removes every entry with `seq <= ack_seq` (positive ACK). Returns
    /// the newest removed entry that was never retransmitted — the only
    /// kind of sample the RTT estimator (§4.3) may use, since a resent
    /// PDU's ACK can't be attributed to a specific transmission.
    pub fn ack_up_to(&mut self, ack_seq: u64) -> Option<RtxEntry> {
        let to_remove: Vec<u64> = self.entries.range(..=ack_seq).map(|(&s, _)| s).collect();
        let mut newest_clean = None;
        for seq in to_remove {
            if let Some(entry) = self.entries.remove(&seq) {
                if entry.retries == 0 {
                    newest_clean = match newest_clean {
                        Some(ref prev) if seq_of(prev) >= seq => newest_clean,
                        _ => Some(entry),
                    };
                }
            }
        }
        newest_clean
    }

    /// Sequence numbers of every entry with `seq >= nack_seq`, in
    /// ascending order (for NACK handling, §4.3).
    pub fn seqs_from(&self, nack_seq: u64) -> Vec<u64> {
        self.entries.range(nack_seq..).map(|(&s, _)| s).collect()
    }

    /// Mutable access to a single entry, for bumping `retries` on resend.
    pub fn get_mut(&mut self, seq: u64) -> Option<&mut RtxEntry> {
        self.entries.get_mut(&seq)
    }

    /// Removes a single entry (retries exhausted).
    pub fn remove(&mut self, seq: u64) -> Option<RtxEntry> {
        self.entries.remove(&seq)
    }

    /// Entries due for retransmission: `now >= first_send_time + tr`.
    pub fn overdue(&self, now: Instant, tr: std::time::Duration) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|(_, e)| now >= e.first_send_time + tr)
            .map(|(&s, _)| s)
            .collect()
    }

    /// Discards every outstanding entry (sender-inactivity expiration).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn seq_of(entry: &RtxEntry) -> u64 {
    entry.pdu.pci.seq_num
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtsv::{CepId, Pci};

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
    fn cwq_push_exceeds_bound_when_caller_insists() {
        let mut q = ClosedWindowQueue::new(1);
        q.push(pdu(1));
        q.push(pdu(2));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn rtxq_ack_up_to_removes_prefix_and_is_strictly_increasing() {
        let mut q = RetransmissionQueue::new();
        let now = Instant::now();
        q.push(pdu(1), now);
        q.push(pdu(2), now);
        q.push(pdu(3), now);
        let sample = q.ack_up_to(2);
        assert_eq!(sample.unwrap().pdu.pci.seq_num, 2);
        assert_eq!(q.len(), 1);
        assert_eq!(q.seqs_from(0), vec![3]);
    }

    #[test]
    fn rtxq_ack_up_to_ignores_retransmitted_entries_for_rtt_sample() {
        let mut q = RetransmissionQueue::new();
        let now = Instant::now();
        q.push(pdu(1), now);
        q.get_mut(1).unwrap().retries = 1;
        q.push(pdu(2), now);
        let sample = q.ack_up_to(2);
        assert_eq!(sample.unwrap().pdu.pci.seq_num, 2);
    }
}
