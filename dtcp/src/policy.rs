//! DTCP's named, parametrisable policy-set hooks (§4.7).
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use channel::Channel;
use dtsv::sv::G;
use dtsv::{Error, Result};
use policy::PolicyParams;

use crate::engine::Dtcp;

/// DTCP's named policy-set hooks. Each is invoked from
/// [`Dtcp`]'s control-PDU dispatch or queue-drain paths rather than
/// called directly by callers of this crate.
#[async_trait]
pub trait DtcpPolicySet<C: Channel<Packet = BytesMut>>: Send + Sync {
    /// Invoked when a NACK or RTX-timer expiration finds the requested
    /// entry already past `data_retransmit_max` retries.
    async fn lost_control_pdu(&self, dtcp: &Dtcp<C>);

    /// Invoked after an inbound ACK removes entries from the
    /// retransmission queue, for policies that track per-connection ACK
    /// metrics.
    async fn sender_ack(&self, dtcp: &Dtcp<C>, ack_seq: u64);

    /// Whether the left window edge advancing to `new_lwe` should trigger
    /// an immediate acknowledgement.
    fn sending_ack(&self, dtcp: &Dtcp<C>, new_lwe: u64) -> bool;

    /// Applies an inbound FlowControl/AckFlowControl update to the
    /// sender-side window and rate, then lets the caller drain the
    /// closed-window queue.
    async fn receiving_flow_control(&self, dtcp: &Dtcp<C>, new_rwe: Option<u64>, new_rate: Option<u64>);

    /// Computes the window/rate values to advertise to the peer in an
    /// outbound ACK/FC PDU.
    fn rcvr_flow_control(&self, dtcp: &Dtcp<C>) -> (Option<u64>, Option<u64>);

    /// Invoked on persistent loss to back off the sending rate.
    fn rate_reduction(&self, dtcp: &Dtcp<C>);

    /// Folds a fresh RTT sample into the estimator and updates the shared
    /// state vector's `TR` (§4.3, RFC 6298-style).
    async fn rtt_estimator(&self, dtcp: &Dtcp<C>, new_rtt: Duration);

    /// Whether `rate_reduction` is disabled for this connection.
    fn no_rate_slow_down(&self) -> bool;

    /// Whether a peer-advertised receive window may exceed our own
    /// configured peak.
    fn no_override_default_peak(&self) -> bool;
}

/// Default DTCP policy set, grounded on
/// `original_source/linux/net/rina/dtcp-ps-common.c` and the RFC 6298
/// RTT estimator referenced by EFCP data-transfer core §4.3.
pub struct DefaultDtcpPolicySet;

impl DefaultDtcpPolicySet {
    /// Builds the default policy set. Takes `params` for symmetry with
    /// `by_name`; the default hooks below don't need any.
    pub fn new(_params: &PolicyParams) -> Self {
        Self
    }
}

#[async_trait]
impl<C: Channel<Packet = BytesMut> + 'static> DtcpPolicySet<C> for DefaultDtcpPolicySet {
    async fn lost_control_pdu(&self, _dtcp: &Dtcp<C>) {
        tracing::warn!("retransmission budget exhausted for a pdu, giving up");
    }

    async fn sender_ack(&self, _dtcp: &Dtcp<C>, _ack_seq: u64) {}

    fn sending_ack(&self, _dtcp: &Dtcp<C>, _new_lwe: u64) -> bool {
        // Cumulative ack-on-receipt: every left-window-edge advance is
        // acknowledged immediately.
        true
    }

    async fn receiving_flow_control(&self, dtcp: &Dtcp<C>, new_rwe: Option<u64>, new_rate: Option<u64>) {
        let mut state = dtcp.state.lock().unwrap();
        if let Some(rwe) = new_rwe {
            state.snd_right_window_edge = state.snd_right_window_edge.max(rwe);
        }
        if let Some(rate) = new_rate {
            state.sending_rate = rate;
        }
    }

    fn rcvr_flow_control(&self, dtcp: &Dtcp<C>) -> (Option<u64>, Option<u64>) {
        if !dtcp.cfg.flow_control {
            return (None, None);
        }
        let state = dtcp.state.lock().unwrap();
        let new_rwe = Some(state.rcv_right_window_edge);
        let new_rate = if dtcp.cfg.rate_based_fc {
            Some(state.receiver_rate)
        } else {
            None
        };
        (new_rwe, new_rate)
    }

    fn rate_reduction(&self, dtcp: &Dtcp<C>) {
        if self.no_rate_slow_down() {
            return;
        }
        let mut state = dtcp.state.lock().unwrap();
        state.sending_rate = (state.sending_rate / 2).max(1);
    }

    async fn rtt_estimator(&self, dtcp: &Dtcp<C>, new_rtt: Duration) {
        let tr = {
            let mut state = dtcp.state.lock().unwrap();
            if state.srtt == Duration::from_millis(0) {
                state.srtt = new_rtt;
                state.rttvar = new_rtt / 2;
            } else {
                let diff = if state.srtt > new_rtt {
                    state.srtt - new_rtt
                } else {
                    new_rtt - state.srtt
                };
                state.rttvar = (state.rttvar * 3 + diff) / 4;
                state.srtt = (state.srtt * 7 + new_rtt) / 8;
            }
            state.rtt = new_rtt;
            state.srtt + G.max(state.rttvar * 4)
        };
        let sv_a = dtcp.sv.lock().await.a;
        let tr = (tr + sv_a).max(Duration::from_secs(1));
        dtcp.sv.lock().await.set_tr(tr);
    }

    fn no_rate_slow_down(&self) -> bool {
        false
    }

    fn no_override_default_peak(&self) -> bool {
        true
    }
}

/// Selects a named DTCP policy-set implementation. Only `"default"` is
/// shipped; custom policy plug-ins are out of scope (§1).
pub fn by_name<C: Channel<Packet = BytesMut> + 'static>(
    name: &str,
    params: &PolicyParams,
) -> Result<Arc<dyn DtcpPolicySet<C>>> {
    match name {
        "default" => Ok(Arc::new(DefaultDtcpPolicySet::new(params))),
        _ => Err(Error::PolicyRejected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::sync::Mutex as AsyncMutex;
    use channel::Loopback;
    use dtp::Upper as DtpUpper;
    use dtsv::{CepId, DtcpConfig, StateVector};
    use std::sync::Arc as StdArc;

    struct NullUpper;
    impl DtpUpper for NullUpper {
        fn enable_write(&self) {}
        fn disable_write(&self) {}
        fn sdu_enqueue(&self, _sdu: Vec<u8>) {}
    }

    fn new_dtcp() -> StdArc<Dtcp<Loopback>> {
        let sv = StdArc::new(AsyncMutex::new(StateVector::new(
            1500,
            1500,
            Duration::from_millis(1000),
            Duration::from_millis(0),
            Duration::from_millis(100),
            3,
        )));
        let cfg = DtcpConfig::default();
        let ps = StdArc::new(DefaultDtcpPolicySet::new(&PolicyParams::new()));
        Dtcp::new(
            Loopback::default(),
            sv,
            cfg,
            CepId(9),
            0,
            ps,
            StdArc::new(NullUpper),
        )
    }

    #[test]
    fn rtt_estimator_seeds_srtt_on_first_sample() {
        async_std::task::block_on(async {
            let dtcp = new_dtcp();
            let ps = DefaultDtcpPolicySet::new(&PolicyParams::new());
            ps.rtt_estimator(&dtcp, Duration::from_millis(40)).await;
            let state = dtcp.state.lock().unwrap();
            assert_eq!(state.srtt, Duration::from_millis(40));
            assert_eq!(state.rttvar, Duration::from_millis(20));
        });
    }

    #[test]
    fn rtt_estimator_updates_tr_on_second_sample() {
        async_std::task::block_on(async {
            let dtcp = new_dtcp();
            let ps = DefaultDtcpPolicySet::new(&PolicyParams::new());
            ps.rtt_estimator(&dtcp, Duration::from_millis(40)).await;
            ps.rtt_estimator(&dtcp, Duration::from_millis(60)).await;
            let tr = dtcp.sv.lock().await.tr;
            assert!(tr >= Duration::from_secs(1));
        });
    }

    #[test]
    fn rate_reduction_halves_sending_rate() {
        async_std::task::block_on(async {
            let dtcp = new_dtcp();
            dtcp.state.lock().unwrap().sending_rate = 10;
            let ps = DefaultDtcpPolicySet::new(&PolicyParams::new());
            ps.rate_reduction(&dtcp);
            assert_eq!(dtcp.state.lock().unwrap().sending_rate, 5);
        });
    }
}
