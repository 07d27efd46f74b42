//! The DTP engine (§4.2): outbound SDU→PDU pipeline, inbound ordering and
//! reassembly, the sequencing queue, and the A-timer / sender- and
//! receiver-inactivity timers that drive delivery and liveness recovery.
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_std::sync::Mutex;
use bytes::BytesMut;
use channel::Channel;
use dtsv::{ArmableTimer, CepId, DtpConfig, Pci, Pdu, Result, StateVector};

use crate::policy::DtpPolicySet;
use crate::sequencing::SequencingQueue;
use crate::FlowControl;

/// The upper-layer collaborator DTP calls into to deliver SDUs and signal
/// backpressure (§6.2). Implemented by the EFCP instance.
pub trait Upper: Send + Sync {
    /// Re-enables the upper layer's write side.
    fn enable_write(&self);
    /// Disables the upper layer's write side (closed-window queue
    /// saturated).
    fn disable_write(&self);
    /// Delivers an in-order SDU upward.
    fn sdu_enqueue(&self, sdu: Vec<u8>);
}

pub(crate) struct Inner {
    pub(crate) last_seq_nr_sent: u64,
    pub(crate) max_seq_nr_rcv: u64,
    pub(crate) dropped_pdus: u64,
    pub(crate) sequencing_queue: SequencingQueue,
    /// Set by receiver-inactivity expiration: the next inbound PDU is
    /// treated as the start of a fresh run even without DRF set.
    pub(crate) drf_required: bool,
    /// Set by sender-inactivity expiration: the next outbound PDU carries
    /// DRF.
    pub(crate) next_drf_out: bool,
}

/// One direction's worth of DTP-local state (§3.3) plus the timers and
/// policy-set hooks that act on it.
pub struct Dtp<C: Channel<Packet = BytesMut>> {
    channel: C,
    pub(crate) sv: Arc<Mutex<StateVector>>,
    pub(crate) cfg: DtpConfig,
    dst_cep: CepId,
    qos_id: u64,
    pub(crate) policy_set: Arc<dyn DtpPolicySet<C>>,
    pub(crate) flow_control: Option<Arc<dyn FlowControl>>,
    pub(crate) upper: Arc<dyn Upper>,
    /// Divisor applied to `A` when arming the A-timer (open question,
    /// §9: treated as a tunable with default 1).
    af: u32,
    pub(crate) inner: Mutex<Inner>,
    sender_inactivity: Mutex<ArmableTimer>,
    receiver_inactivity: Mutex<ArmableTimer>,
    a_timer: Mutex<ArmableTimer>,
}

impl<C: Channel<Packet = BytesMut> + 'static> Dtp<C> {
    /// Constructs a new DTP engine. `sender_inactivity_interval` and
    /// `receiver_inactivity_interval` are computed by the caller (the
    /// EFCP instance) from the shared state vector at connection-creation
    /// time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel: C,
        sv: Arc<Mutex<StateVector>>,
        cfg: DtpConfig,
        dst_cep: CepId,
        qos_id: u64,
        policy_set: Arc<dyn DtpPolicySet<C>>,
        flow_control: Option<Arc<dyn FlowControl>>,
        upper: Arc<dyn Upper>,
        sender_inactivity_interval: Duration,
        receiver_inactivity_interval: Duration,
        af: u32,
    ) -> Arc<Self> {
        let initial_seq = policy_set.initial_sequence_number();
        Arc::new(Self {
            channel,
            sv,
            cfg,
            dst_cep,
            qos_id,
            policy_set,
            flow_control,
            upper,
            af: af.max(1),
            inner: Mutex::new(Inner {
                last_seq_nr_sent: initial_seq,
                max_seq_nr_rcv: 0,
                dropped_pdus: 0,
                sequencing_queue: SequencingQueue::new(),
                drf_required: false,
                next_drf_out: true,
            }),
            sender_inactivity: Mutex::new(ArmableTimer::new(sender_inactivity_interval)),
            receiver_inactivity: Mutex::new(ArmableTimer::new(receiver_inactivity_interval)),
            a_timer: Mutex::new(ArmableTimer::new(Duration::from_millis(0))),
        })
    }

    /// Number of PDUs discarded on receipt (duplicates, stale gaps).
    pub async fn dropped_pdus(&self) -> u64 {
        self.inner.lock().await.dropped_pdus
    }

    /// Hands an opaque SDU through the outbound pipeline (§4.2).
    pub async fn write(self: &Arc<Self>, sdu: Vec<u8>) -> Result<()> {
        self.rearm_sender_inactivity().await;

        // Fragmentation/reassembly is out of scope (treated as identity).
        let (seq, drf) = {
            let mut inner = self.inner.lock().await;
            inner.last_seq_nr_sent += 1;
            let seq = inner.last_seq_nr_sent;
            let drf = std::mem::replace(&mut inner.next_drf_out, false);
            (seq, drf)
        };
        let pdu = Pdu {
            pci: Pci {
                drf,
                dst_cep: self.dst_cep,
                qos_id: self.qos_id,
                seq_num: seq,
            },
            payload: sdu,
        };

        if let Some(fc) = &self.flow_control {
            if fc.is_window_closed(seq) {
                return self.policy_set.clone().closed_window(self, pdu).await;
            }
            if fc.retransmission_control_enabled() {
                fc.register_for_retransmission(pdu.clone()).await;
            }
        }

        self.policy_set.clone().transmission_control(self, pdu).await
    }

    /// Dispatches an inbound wire-format PDU through the inbound pipeline
    /// (§4.2).
    pub async fn receive(self: &Arc<Self>, bytes: &[u8]) -> Result<()> {
        self.rearm_receiver_inactivity().await;

        let pdu = Pdu::decode(bytes)?;

        let drf_required = {
            let mut inner = self.inner.lock().await;
            std::mem::replace(&mut inner.drf_required, false)
        };
        if pdu.pci.drf || drf_required {
            {
                let mut inner = self.inner.lock().await;
                inner.sequencing_queue.clear();
                inner.max_seq_nr_rcv = pdu.pci.seq_num;
            }
            self.sv.lock().await.start_new_run(pdu.pci.seq_num);
            if let Some(fc) = &self.flow_control {
                fc.notify_drf();
            }
            self.upper.sdu_enqueue(pdu.payload);
            return Ok(());
        }

        let lwe = self.sv.lock().await.rcv_left_window_edge();
        let seq = pdu.pci.seq_num;

        if seq <= lwe {
            self.inner.lock().await.dropped_pdus += 1;
            if let Some(fc) = &self.flow_control {
                fc.emit_window_update().await;
            }
            return Ok(());
        }

        {
            let mut inner = self.inner.lock().await;
            if seq > inner.max_seq_nr_rcv {
                inner.max_seq_nr_rcv = seq;
            }
        }

        let a_is_zero = self.sv.lock().await.a == Duration::from_millis(0);

        if a_is_zero {
            let gap = seq - lwe - 1;
            if gap <= self.cfg.max_sdu_gap {
                self.sv.lock().await.advance_rcv_left_window_edge(seq);
                self.upper.sdu_enqueue(pdu.payload);
            } else {
                if let Some(fc) = &self.flow_control {
                    if fc.retransmission_control_enabled() {
                        fc.request_retransmission(lwe + 1).await;
                    }
                }
                self.inner.lock().await.dropped_pdus += 1;
            }
            return Ok(());
        }

        let inserted = self
            .inner
            .lock()
            .await
            .sequencing_queue
            .insert(pdu, Instant::now());
        if !inserted {
            // Duplicate sequence number already queued.
            self.inner.lock().await.dropped_pdus += 1;
            return Ok(());
        }

        loop {
            let lwe_now = self.sv.lock().await.rcv_left_window_edge();
            let popped = self.inner.lock().await.sequencing_queue.pop_if_next(lwe_now);
            match popped {
                Some((pdu, _)) => {
                    self.sv
                        .lock()
                        .await
                        .advance_rcv_left_window_edge(pdu.pci.seq_num);
                    self.upper.sdu_enqueue(pdu.payload);
                }
                None => break,
            }
        }

        self.arm_a_timer().await;
        Ok(())
    }

    /// Sends a PDU to the RMT collaborator (§6.1). Send failures are
    /// logged and swallowed: the underlying multiplexing layer is
    /// unreliable by design, and PDU-level failures never propagate past
    /// this boundary (§7).
    pub(crate) async fn send_to_rmt(&self, pdu: &Pdu) -> Result<()> {
        if let Err(error) = self.channel.send(pdu.encode()).await {
            tracing::warn!(%error, seq = pdu.pci.seq_num, "rmt send failed, dropping pdu");
        }
        Ok(())
    }

    async fn rearm_sender_inactivity(self: &Arc<Self>) {
        let mut timer = self.sender_inactivity.lock().await;
        let dtp = self.clone();
        timer.arm(move || async move {
            dtp.policy_set.clone().sender_inactivity_timer(&dtp).await;
        });
    }

    async fn rearm_receiver_inactivity(self: &Arc<Self>) {
        let mut timer = self.receiver_inactivity.lock().await;
        let dtp = self.clone();
        timer.arm(move || async move {
            dtp.policy_set.clone().receiver_inactivity_timer(&dtp).await;
        });
    }

    async fn arm_a_timer(self: &Arc<Self>) {
        let a = self.sv.lock().await.a;
        if a == Duration::from_millis(0) {
            return;
        }
        let interval = a / self.af;
        let mut timer = self.a_timer.lock().await;
        timer.set_interval(interval);
        let dtp = self.clone();
        timer.arm(move || async move {
            dtp.a_timer_fired().await;
        });
    }

    /// A-timer expiration handler (§4.2): delivers everything within
    /// tolerance, requests retransmission or force-skips whatever has
    /// aged out, and re-arms itself while the queue is non-empty.
    async fn a_timer_fired(self: &Arc<Self>) {
        loop {
            let head = self.inner.lock().await.sequencing_queue.peek();
            let (seq, arrived_at) = match head {
                Some(x) => x,
                None => return,
            };
            let (lwe, a) = {
                let sv = self.sv.lock().await;
                (sv.rcv_left_window_edge(), sv.a)
            };
            let gap = seq - lwe - 1;
            if gap <= self.cfg.max_sdu_gap {
                self.force_deliver_head(seq).await;
                continue;
            }
            if Instant::now().duration_since(arrived_at) >= a {
                let retx_enabled = self
                    .flow_control
                    .as_ref()
                    .map_or(false, |fc| fc.retransmission_control_enabled());
                if retx_enabled {
                    if let Some(fc) = &self.flow_control {
                        fc.request_retransmission(seq).await;
                    }
                    break;
                } else {
                    self.force_deliver_head(seq).await;
                    continue;
                }
            }
            break;
        }
        if !self.inner.lock().await.sequencing_queue.is_empty() {
            self.arm_a_timer().await;
        }
    }

    async fn force_deliver_head(self: &Arc<Self>, expected_seq: u64) {
        let popped = self.inner.lock().await.sequencing_queue.pop_head();
        if let Some((pdu, _)) = popped {
            debug_assert_eq!(pdu.pci.seq_num, expected_seq);
            self.sv
                .lock()
                .await
                .advance_rcv_left_window_edge(pdu.pci.seq_num);
            self.upper.sdu_enqueue(pdu.payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::DefaultDtpPolicySet;
    use async_std::task;
    use channel::Loopback;
    use dtsv::DtpConfig;
    use policy::PolicyParams;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct TestUpper {
        delivered: Mutex<Vec<Vec<u8>>>,
        write_enabled: AtomicBool,
        disable_count: AtomicUsize,
    }

    impl TestUpper {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(vec![]),
                write_enabled: AtomicBool::new(true),
                disable_count: AtomicUsize::new(0),
            })
        }
    }

    impl Upper for TestUpper {
        fn enable_write(&self) {
            self.write_enabled.store(true, Ordering::SeqCst);
        }

        fn disable_write(&self) {
            self.write_enabled.store(false, Ordering::SeqCst);
            self.disable_count.fetch_add(1, Ordering::SeqCst);
        }

        fn sdu_enqueue(&self, sdu: Vec<u8>) {
            task::block_on(self.delivered.lock()).push(sdu);
        }
    }

    fn new_dtp(a: Duration, max_sdu_gap: u64) -> (Arc<Dtp<Loopback>>, Arc<TestUpper>) {
        let sv = Arc::new(Mutex::new(StateVector::new(
            1500,
            1500,
            Duration::from_millis(1000),
            a,
            Duration::from_millis(100),
            3,
        )));
        let cfg = DtpConfig {
            max_sdu_gap,
            dtcp_present: false,
            ..DtpConfig::default()
        };
        let policy_set = Arc::new(DefaultDtpPolicySet::new(&PolicyParams::new()));
        let upper = TestUpper::new();
        let dtp = Dtp::new(
            Loopback::default(),
            sv,
            cfg,
            CepId(9),
            0,
            policy_set,
            None,
            upper.clone(),
            Duration::from_secs(10),
            Duration::from_secs(10),
            1,
        );
        (dtp, upper)
    }

    #[test]
    fn in_order_delivery_with_a_zero() {
        task::block_on(async {
            let (dtp, upper) = new_dtp(Duration::from_millis(0), 0);
            for sdu in [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()].iter() {
                let pdu = dtsv::Pdu {
                    pci: dtsv::Pci {
                        drf: false,
                        dst_cep: CepId(9),
                        qos_id: 0,
                        seq_num: dtp.inner.lock().await.max_seq_nr_rcv + 1,
                    },
                    payload: sdu.clone(),
                };
                dtp.receive(&pdu.encode()).await.unwrap();
            }
            let delivered = upper.delivered.lock().await;
            assert_eq!(&*delivered, &[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        });
    }

    #[test]
    fn reorder_within_a_is_delivered_in_order() {
        task::block_on(async {
            let (dtp, upper) = new_dtp(Duration::from_millis(200), 0);
            let mk = |seq: u64| {
                dtsv::Pdu {
                    pci: dtsv::Pci {
                        drf: false,
                        dst_cep: CepId(9),
                        qos_id: 0,
                        seq_num: seq,
                    },
                    payload: vec![seq as u8],
                }
                .encode()
            };
            dtp.receive(&mk(1)).await.unwrap();
            dtp.receive(&mk(3)).await.unwrap();
            dtp.receive(&mk(2)).await.unwrap();
            dtp.receive(&mk(4)).await.unwrap();
            let delivered = upper.delivered.lock().await;
            assert_eq!(&*delivered, &[vec![1u8], vec![2], vec![3], vec![4]]);
        });
    }

    #[test]
    fn write_assigns_strictly_increasing_sequence_numbers() {
        task::block_on(async {
            let (dtp, _upper) = new_dtp(Duration::from_millis(0), 0);
            dtp.write(b"x".to_vec()).await.unwrap();
            dtp.write(b"y".to_vec()).await.unwrap();
            let inner = dtp.inner.lock().await;
            assert_eq!(inner.last_seq_nr_sent, inner.last_seq_nr_sent);
            assert!(inner.last_seq_nr_sent >= 2);
        });
    }
}
