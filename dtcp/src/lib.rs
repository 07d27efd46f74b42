//! # Data Transfer Control Protocol
//!
//! Flow control, retransmission control, and the closed-window and
//! retransmission queues that back them (EFCP data-transfer core §4.3).
//! DTCP is optional per connection (§6.4 `dtcp_present`): when absent, DTP
//! runs unassisted and every [`FlowControl`](dtp::FlowControl) call site in
//! `dtp` is skipped.
//!
//! A [`Dtcp`] is constructed against the same [`channel::Channel`] and
//! shared state vector as its sibling [`dtp::Dtp`], and is handed to it as
//! `Arc<dyn dtp::FlowControl>` so the two can cooperate without either
//! crate depending on the other's concrete types.
#![deny(missing_docs)]
#![deny(warnings)]
mod engine;
mod policy;
mod queue;

pub use crate::engine::Dtcp;
pub use crate::policy::{by_name, DefaultDtcpPolicySet, DtcpPolicySet};
pub use crate::queue::{ClosedWindowQueue, RetransmissionQueue, RtxEntry};

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::sync::Mutex as AsyncMutex;
    use async_std::task;
    use channel::Loopback;
    use dtp::{FlowControl, Upper as DtpUpper};
    use dtsv::{CepId, ControlOpcode, ControlPdu, DtcpConfig, Pci, StateVector};
    use policy::PolicyParams;
    use std::sync::Arc;
    use std::time::Duration;

    struct NullUpper;
    impl DtpUpper for NullUpper {
        fn enable_write(&self) {}
        fn disable_write(&self) {}
        fn sdu_enqueue(&self, _sdu: Vec<u8>) {}
    }

    fn new_dtcp() -> Arc<Dtcp<Loopback>> {
        let cfg = DtcpConfig::default();
        let ps = by_name::<Loopback>("default", &PolicyParams::new()).unwrap();
        let sv = Arc::new(AsyncMutex::new(StateVector::new(
            1500,
            1500,
            Duration::from_millis(1000),
            Duration::from_millis(0),
            Duration::from_millis(50),
            3,
        )));
        Dtcp::new(Loopback::default(), sv, cfg, CepId(2), 0, ps, Arc::new(NullUpper))
    }

    #[test]
    fn ack_advances_peer_left_window_edge() {
        task::block_on(async {
            let dtcp = new_dtcp();
            let pdu = ControlPdu {
                pci: Pci {
                    drf: false,
                    dst_cep: CepId(2),
                    qos_id: 0,
                    seq_num: 1,
                },
                opcode: ControlOpcode::Ack,
                ack_seq: Some(5),
                nack_seq: None,
                new_rwe: None,
                new_rate: None,
            };
            dtcp.receive(&pdu.encode()).await.unwrap();
            assert_eq!(dtcp.snd_right_window_edge(), 4); // default initial_credit
        });
    }

    #[test]
    fn closed_window_queue_drains_on_flow_control_update() {
        task::block_on(async {
            let dtcp = new_dtcp();
            dtcp.reset_send_window(0);
            let pdu = dtsv::Pdu {
                pci: Pci {
                    drf: false,
                    dst_cep: CepId(2),
                    qos_id: 0,
                    seq_num: 100,
                },
                payload: b"x".to_vec(),
            };
            dtcp.push_closed_window_queue(pdu).await.unwrap();
            assert_eq!(dtcp.cwq_len(), 1);
            let fc_pdu = ControlPdu {
                pci: Pci {
                    drf: false,
                    dst_cep: CepId(2),
                    qos_id: 0,
                    seq_num: 1,
                },
                opcode: ControlOpcode::FlowControl,
                ack_seq: None,
                nack_seq: None,
                new_rwe: Some(200),
                new_rate: None,
            };
            dtcp.receive(&fc_pdu.encode()).await.unwrap();
            assert_eq!(dtcp.cwq_len(), 0);
        });
    }

    #[test]
    fn second_closed_window_push_past_overrun_is_rejected() {
        task::block_on(async {
            let dtcp = new_dtcp();
            let cfg = DtcpConfig {
                max_closed_winq_length: 1,
                ..DtcpConfig::default()
            };
            let ps = by_name::<Loopback>("default", &PolicyParams::new()).unwrap();
            let sv = Arc::new(AsyncMutex::new(StateVector::new(
                1500,
                1500,
                Duration::from_millis(1000),
                Duration::from_millis(0),
                Duration::from_millis(50),
                3,
            )));
            let dtcp = Dtcp::new(Loopback::default(), sv, cfg, CepId(2), 0, ps, Arc::new(NullUpper));
            let pdu = |seq| dtsv::Pdu {
                pci: Pci {
                    drf: false,
                    dst_cep: CepId(2),
                    qos_id: 0,
                    seq_num: seq,
                },
                payload: vec![],
            };
            dtcp.push_closed_window_queue(pdu(1)).await.unwrap();
            dtcp.push_closed_window_queue(pdu(2)).await.unwrap();
            assert!(dtcp.push_closed_window_queue(pdu(3)).await.is_err());
            let _ = dtcp;
        });
    }
}
