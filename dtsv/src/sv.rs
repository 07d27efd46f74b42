//! The shared data-transfer state vector (DT-SV, §3.2).
//!
//! One DT-SV exists per connection, owned by the EFCP instance and
//! referenced (not owned) by DTP and DTCP.
use std::time::Duration;

/// Fixed minimum granularity for `TR`, per RFC 6298.
pub const G: Duration = Duration::from_millis(100);

/// Shared data-transfer state vector.
#[derive(Clone, Debug)]
pub struct StateVector {
    /// Maximum PDU size for this connection, in bytes.
    pub max_flow_pdu_size: u64,
    /// Maximum SDU size for this connection, in bytes.
    pub max_flow_sdu_size: u64,
    /// Maximum packet lifetime.
    pub max_packet_lifetime: Duration,
    /// Initial A-timer period; bounds out-of-order tolerance on receive.
    pub a: Duration,
    /// Total retransmission budget, `data_retransmit_max * tr`.
    pub r: Duration,
    /// Current retransmission timeout, updated by the RTT estimator.
    pub tr: Duration,
    /// Highest in-order sequence number already delivered upward.
    rcv_left_window_edge: u64,
    /// Whether the send-side flow-control window is closed.
    pub window_closed: bool,
    /// Count of times `rcv_left_window_edge` was reset backwards by the
    /// receiver-inactivity policy, which (per the original implementation)
    /// contradicts monotonicity. Kept so tests can assert on it rather than
    /// silently masking the discrepancy.
    pub lwe_reset_count: u64,
}

impl StateVector {
    /// Creates a new state vector for a connection.
    pub fn new(
        max_flow_pdu_size: u64,
        max_flow_sdu_size: u64,
        max_packet_lifetime: Duration,
        a: Duration,
        initial_tr: Duration,
        data_retransmit_max: u32,
    ) -> Self {
        let tr = if initial_tr < G { G } else { initial_tr };
        Self {
            max_flow_pdu_size,
            max_flow_sdu_size,
            max_packet_lifetime,
            a,
            r: tr * data_retransmit_max,
            tr,
            rcv_left_window_edge: 0,
            window_closed: false,
            lwe_reset_count: 0,
        }
    }

    /// Returns the current left window edge.
    pub fn rcv_left_window_edge(&self) -> u64 {
        self.rcv_left_window_edge
    }

    /// Advances the left window edge. Panics in debug builds if `new` would
    /// move it backwards — callers that need the receiver-inactivity reset
    /// must go through [`StateVector::reset_rcv_left_window_edge`] instead so
    /// the discrepancy is visible and counted.
    pub fn advance_rcv_left_window_edge(&mut self, new: u64) {
        debug_assert!(new >= self.rcv_left_window_edge);
        if new > self.rcv_left_window_edge {
            self.rcv_left_window_edge = new;
        }
    }

    /// Resets the left window edge to zero on receiver inactivity.
    ///
    /// Open question (see DESIGN.md): the original IRATI code clears the
    /// left window edge on receiver-inactivity timeout, which contradicts
    /// the monotonicity invariant. We preserve that behaviour rather than
    /// guess at the intended fix, but bump a counter every time it happens.
    pub fn reset_rcv_left_window_edge(&mut self) {
        if self.rcv_left_window_edge != 0 {
            self.lwe_reset_count += 1;
        }
        self.rcv_left_window_edge = 0;
    }

    /// Sets `TR`, clamped to the minimum granularity `G`.
    pub fn set_tr(&mut self, tr: Duration) {
        self.tr = if tr < G { G } else { tr };
    }

    /// Starts a fresh sequencing run whose first PDU, `first_seq`, is
    /// delivered in order by the caller as part of observing DRF (§4.2
    /// step 2). Unlike [`StateVector::advance_rcv_left_window_edge`] this
    /// may move the edge backwards: a fresh run legitimately starts at any
    /// sequence number, not necessarily above the previous run's edge. The
    /// edge lands on `first_seq` itself, not `first_seq - 1`, since that
    /// PDU is already delivered once this returns.
    pub fn start_new_run(&mut self, first_seq: u64) {
        self.rcv_left_window_edge = first_seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv() -> StateVector {
        StateVector::new(8192, 8192, Duration::from_millis(1000), Duration::from_millis(0), Duration::from_millis(50), 3)
    }

    #[test]
    fn tr_is_clamped_to_granularity() {
        let v = sv();
        assert_eq!(v.tr, G);
    }

    #[test]
    fn lwe_is_monotonic_non_decreasing() {
        let mut v = sv();
        v.advance_rcv_left_window_edge(5);
        assert_eq!(v.rcv_left_window_edge(), 5);
        v.advance_rcv_left_window_edge(3);
        assert_eq!(v.rcv_left_window_edge(), 5);
        v.advance_rcv_left_window_edge(9);
        assert_eq!(v.rcv_left_window_edge(), 9);
    }

    #[test]
    fn start_new_run_may_move_the_edge_backwards() {
        let mut v = sv();
        v.advance_rcv_left_window_edge(100);
        v.start_new_run(5);
        assert_eq!(v.rcv_left_window_edge(), 5);
    }

    #[test]
    fn receiver_inactivity_reset_is_counted() {
        let mut v = sv();
        v.advance_rcv_left_window_edge(5);
        v.reset_rcv_left_window_edge();
        assert_eq!(v.rcv_left_window_edge(), 0);
        assert_eq!(v.lwe_reset_count, 1);
        v.reset_rcv_left_window_edge();
        assert_eq!(v.lwe_reset_count, 1);
    }
}
