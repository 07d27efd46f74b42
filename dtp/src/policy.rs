//! DTP's policy-set interface (§4.7) and the bridge trait DTCP implements
//! to give DTP's flow-control-facing hooks somewhere to act.
//!
//! The hook trait lives next to [`crate::engine::Dtp`] rather than in the
//! shared `policy` crate: a hook's first parameter is the engine's own
//! state, and putting the trait in a separate crate that `dtp` doesn't
//! depend on would make that parameter type unreachable (see
//! `SPEC_FULL.md`'s workspace-layout note on this split).
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use channel::Channel;
use dtsv::{Error, Pdu, Result};
use policy::PolicyParams;
use rand::Rng;

use crate::engine::Dtp;

/// What DTCP exposes to DTP so the outbound path (§4.2 steps 4-5) can
/// consult and update window/rate state and the queues DTCP owns (§3.4)
/// without DTP depending on the concrete `dtcp` crate.
#[async_trait]
pub trait FlowControl: Send + Sync {
    /// Whether `seq` falls outside the currently open window or rate
    /// budget and must be withheld.
    fn is_window_closed(&self, seq: u64) -> bool;

    /// Current number of PDUs held on the closed-window queue.
    fn closed_window_queue_len(&self) -> usize;

    /// Configured bound on the closed-window queue.
    fn max_closed_window_queue_len(&self) -> usize;

    /// Appends `pdu` to the closed-window queue. Fails with
    /// `ResourceExhausted` if the queue is already at its bound — the
    /// hard backstop behind the policy-level length checks.
    async fn push_closed_window_queue(&self, pdu: Pdu) -> Result<()>;

    /// Duplicates `pdu` onto the retransmission queue and arms the RTX
    /// timer if this is the first outstanding entry.
    async fn register_for_retransmission(&self, pdu: Pdu);

    /// Discards CWQ and RTXQ (sender-inactivity expiration, §4.2).
    async fn flush_queues(&self);

    /// Resets the send window to `base_seq + initial_credit` (sender
    /// inactivity expiration).
    fn reset_send_window(&self, base_seq: u64);

    /// Whether retransmission control is active for this connection.
    fn retransmission_control_enabled(&self) -> bool;

    /// Signals that the A-timer found `seq` still missing past its
    /// tolerance and retransmission control should request it from the
    /// peer (§4.2, A-timer expiration).
    async fn request_retransmission(&self, seq: u64);

    /// Notifies DTCP that a fresh run started (DRF observed inbound), so
    /// it can reset its own receive-side state.
    fn notify_drf(&self);

    /// Emits an ACK/FC control PDU reflecting the current window, sent
    /// when an inbound PDU at or below the left window edge is discarded
    /// (§4.2 step 4).
    async fn emit_window_update(&self);
}

/// DTP's named, parametrisable policy-set hooks (§4.7).
#[async_trait]
pub trait DtpPolicySet<C: Channel<Packet = BytesMut>>: Send + Sync {
    /// Hands a PDU to the RMT collaborator (§4.2 step 6).
    async fn transmission_control(&self, dtp: &Dtp<C>, pdu: Pdu) -> Result<()>;

    /// Invoked when the send window or rate budget is closed for `pdu`'s
    /// sequence number (§4.2 step 4).
    async fn closed_window(&self, dtp: &Dtp<C>, pdu: Pdu) -> Result<()>;

    /// Invoked when the closed-window queue cannot accept another entry.
    async fn flow_control_overrun(&self, dtp: &Dtp<C>, pdu: Pdu) -> Result<()>;

    /// Picks the first sequence number of a fresh run.
    fn initial_sequence_number(&self) -> u64;

    /// Receiver-inactivity expiration (§4.2).
    async fn receiver_inactivity_timer(&self, dtp: &Dtp<C>);

    /// Sender-inactivity expiration (§4.2).
    async fn sender_inactivity_timer(&self, dtp: &Dtp<C>);

    /// Whether a conflicting flow-control update from the peer should be
    /// accepted.
    fn reconcile_flow_conflict(&self) -> bool;
}

/// Default DTP policy set, grounded on
/// `original_source/linux/net/rina/dtp-ps-common.c`.
pub struct DefaultDtpPolicySet;

impl DefaultDtpPolicySet {
    /// Builds the default policy set. Takes `params` for symmetry with
    /// `by_name` and other policy-sets that are parametrisable; the
    /// default hooks below don't need any.
    pub fn new(_params: &PolicyParams) -> Self {
        Self
    }
}

#[async_trait]
impl<C: Channel<Packet = BytesMut>> DtpPolicySet<C> for DefaultDtpPolicySet {
    async fn transmission_control(&self, dtp: &Dtp<C>, pdu: Pdu) -> Result<()> {
        dtp.send_to_rmt(&pdu).await
    }

    async fn closed_window(&self, dtp: &Dtp<C>, pdu: Pdu) -> Result<()> {
        let fc = dtp
            .flow_control
            .as_ref()
            .expect("closed_window invoked without a DTCP flow-control bridge");
        // Matches the documented boundary behaviour (§8): a write that
        // brings the queue exactly to its bound still succeeds; only the
        // write that finds it already full overruns.
        if fc.closed_window_queue_len() < fc.max_closed_window_queue_len() {
            fc.push_closed_window_queue(pdu).await
        } else {
            dtp.policy_set.flow_control_overrun(dtp, pdu).await
        }
    }

    async fn flow_control_overrun(&self, dtp: &Dtp<C>, pdu: Pdu) -> Result<()> {
        dtp.upper.disable_write();
        let fc = dtp
            .flow_control
            .as_ref()
            .expect("flow_control_overrun invoked without a DTCP flow-control bridge");
        fc.push_closed_window_queue(pdu).await
    }

    fn initial_sequence_number(&self) -> u64 {
        loop {
            let v: u64 = rand::thread_rng().gen();
            if v != 0 {
                return v;
            }
        }
    }

    async fn receiver_inactivity_timer(&self, dtp: &Dtp<C>) {
        // Open question (DESIGN.md): the original resets LWE to zero here,
        // which contradicts the monotonicity invariant. Preserved
        // intentionally; `StateVector` counts every occurrence.
        let mut sv = dtp.sv.lock().await;
        sv.reset_rcv_left_window_edge();
        drop(sv);
        let mut inner = dtp.inner.lock().await;
        inner.sequencing_queue.clear();
        inner.drf_required = true;
    }

    async fn sender_inactivity_timer(&self, dtp: &Dtp<C>) {
        let mut inner = dtp.inner.lock().await;
        inner.next_drf_out = true;
        inner.last_seq_nr_sent = self.initial_sequence_number();
        let base = inner.last_seq_nr_sent;
        drop(inner);
        if let Some(fc) = &dtp.flow_control {
            fc.flush_queues().await;
            fc.reset_send_window(base);
        }
    }

    fn reconcile_flow_conflict(&self) -> bool {
        true
    }
}

/// Selects a named DTP policy-set implementation. Only `"default"` is
/// shipped; custom policy plug-ins are out of scope (§1).
pub fn by_name<C: Channel<Packet = BytesMut>>(
    name: &str,
    params: &PolicyParams,
) -> Result<Arc<dyn DtpPolicySet<C>>> {
    match name {
        "default" => Ok(Arc::new(DefaultDtpPolicySet::new(params))),
        _ => Err(Error::PolicyRejected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_sequence_number_is_never_zero() {
        let ps = DefaultDtpPolicySet::new(&PolicyParams::new());
        for _ in 0..100 {
            assert_ne!(ps.initial_sequence_number(), 0);
        }
    }
}
