//! The DTCP engine (§4.3): control-PDU dispatch, the closed-window and
//! retransmission queues (§3.4), window/rate regulation, and the RTT
//! estimator. Bridges back to DTP through `dtp::FlowControl` so the
//! outbound pipeline in §4.2 can consult and update this state without
//! `dtp` depending on `dtcp` (see `SPEC_FULL.md`'s workspace-layout note).
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::{Duration, Instant};

use async_std::sync::Mutex;
use async_trait::async_trait;
use bytes::BytesMut;
use channel::Channel;
use dtp::{FlowControl, Upper};
use dtsv::{
    ArmableTimer, CepId, ControlOpcode, ControlPdu, DtcpConfig, Error, Pci, Pdu, Result,
    StateVector,
};

use crate::policy::DtcpPolicySet;
use crate::queue::{ClosedWindowQueue, RetransmissionQueue};

pub(crate) struct State {
    pub(crate) snd_left_window_edge: u64,
    pub(crate) snd_right_window_edge: u64,
    pub(crate) rcv_right_window_edge: u64,
    pub(crate) last_rcv_ctrl_seq: u64,
    pub(crate) next_ctrl_seq_out: u64,
    pub(crate) receiver_credit: u64,
    pub(crate) sending_rate: u64,
    pub(crate) receiver_rate: u64,
    pub(crate) time_frame: Duration,
    pub(crate) pdus_in_time_unit: u64,
    pub(crate) last_time_frame_start: Instant,
    pub(crate) rtt: Duration,
    pub(crate) srtt: Duration,
    pub(crate) rttvar: Duration,
    pub(crate) max_seq_nr_sent: u64,
    pub(crate) cwq: ClosedWindowQueue,
    pub(crate) rtxq: RetransmissionQueue,
}

/// DTCP-local state (§3.4) plus the queues and timers that act on it.
pub struct Dtcp<C: Channel<Packet = BytesMut>> {
    channel: C,
    pub(crate) sv: Arc<Mutex<StateVector>>,
    pub(crate) cfg: DtcpConfig,
    dst_cep: CepId,
    qos_id: u64,
    pub(crate) policy_set: Arc<dyn DtcpPolicySet<C>>,
    pub(crate) upper: Arc<dyn Upper>,
    pub(crate) state: StdMutex<State>,
    rtx_timer: Mutex<ArmableTimer>,
    weak_self: StdMutex<Weak<Dtcp<C>>>,
}

impl<C: Channel<Packet = BytesMut> + 'static> Dtcp<C> {
    /// Constructs a new DTCP engine sharing the connection's state vector
    /// with its DTP sibling.
    pub fn new(
        channel: C,
        sv: Arc<Mutex<StateVector>>,
        cfg: DtcpConfig,
        dst_cep: CepId,
        qos_id: u64,
        policy_set: Arc<dyn DtcpPolicySet<C>>,
        upper: Arc<dyn Upper>,
    ) -> Arc<Self> {
        let initial_credit = cfg.initial_credit;
        let time_period = cfg.time_period;
        let this = Arc::new(Self {
            channel,
            sv,
            cfg,
            dst_cep,
            qos_id,
            policy_set,
            upper,
            state: StdMutex::new(State {
                snd_left_window_edge: 0,
                snd_right_window_edge: initial_credit,
                rcv_right_window_edge: initial_credit,
                last_rcv_ctrl_seq: 0,
                next_ctrl_seq_out: 0,
                receiver_credit: initial_credit,
                sending_rate: 0,
                receiver_rate: 0,
                time_frame: time_period,
                pdus_in_time_unit: 0,
                last_time_frame_start: Instant::now(),
                rtt: Duration::from_millis(0),
                srtt: Duration::from_millis(0),
                rttvar: Duration::from_millis(0),
                max_seq_nr_sent: 0,
                cwq: ClosedWindowQueue::new(0),
                rtxq: RetransmissionQueue::new(),
            }),
            rtx_timer: Mutex::new(ArmableTimer::new(Duration::from_millis(100))),
            weak_self: StdMutex::new(Weak::new()),
        });
        this.state.lock().unwrap().cwq = ClosedWindowQueue::new(this.cfg.max_closed_winq_length);
        *this.weak_self.lock().unwrap() = Arc::downgrade(&this);
        this
    }

    fn self_arc(&self) -> Option<Arc<Self>> {
        self.weak_self.lock().unwrap().upgrade()
    }

    /// Current sender-side right window edge, mostly for tests.
    pub fn snd_right_window_edge(&self) -> u64 {
        self.state.lock().unwrap().snd_right_window_edge
    }

    /// Current length of the retransmission queue.
    pub fn rtxq_len(&self) -> usize {
        self.state.lock().unwrap().rtxq.len()
    }

    /// Current length of the closed-window queue.
    pub fn cwq_len(&self) -> usize {
        self.state.lock().unwrap().cwq.len()
    }

    /// Rolls `pdus_in_time_unit` over to zero once `time_frame` has
    /// elapsed since the current frame started (§4.3 rate-based flow
    /// control).
    fn refresh_rate_frame(&self, state: &mut State) {
        let now = Instant::now();
        if now.duration_since(state.last_time_frame_start) >= state.time_frame {
            state.pdus_in_time_unit = 0;
            state.last_time_frame_start = now;
        }
    }

    fn next_ctrl_pdu(&self, opcode: ControlOpcode) -> (ControlPdu, u64) {
        let mut state = self.state.lock().unwrap();
        state.next_ctrl_seq_out += 1;
        let seq = state.next_ctrl_seq_out;
        (
            ControlPdu {
                pci: Pci {
                    drf: false,
                    dst_cep: self.dst_cep,
                    qos_id: self.qos_id,
                    seq_num: seq,
                },
                opcode,
                ack_seq: None,
                nack_seq: None,
                new_rwe: None,
                new_rate: None,
            },
            seq,
        )
    }

    async fn send_control(&self, pdu: &ControlPdu) {
        if let Err(error) = self.channel.send(pdu.encode()).await {
            tracing::warn!(%error, opcode = ?pdu.opcode, "rmt send failed, dropping control pdu");
        }
    }

    /// Sends an ACK (or ACK+FC, if flow control is active) reflecting the
    /// current left window edge and, for flow-controlled connections, the
    /// currently advertised receive window (§4.2 step 4, §4.3 `rcvr_ack`).
    pub async fn emit_window_update(&self) {
        let lwe = self.sv.lock().await.rcv_left_window_edge();
        let (new_rwe, new_rate) = self.policy_set.rcvr_flow_control(self);
        let (mut pdu, _) = self.next_ctrl_pdu(if self.cfg.flow_control {
            ControlOpcode::AckFlowControl
        } else {
            ControlOpcode::Ack
        });
        pdu.ack_seq = Some(lwe);
        pdu.new_rwe = new_rwe;
        pdu.new_rate = new_rate;
        self.send_control(&pdu).await;
    }

    /// Called by the owning EFCP instance whenever DTP advances the left
    /// window edge, so the ack policy can decide whether to acknowledge
    /// now (§4.3 `sending_ack`).
    pub async fn on_delivered(&self, new_lwe: u64) {
        if self.policy_set.sending_ack(self, new_lwe) {
            self.emit_window_update().await;
        }
    }

    /// Dispatches an inbound wire-format control PDU (§4.3).
    pub async fn receive(self: &Arc<Self>, bytes: &[u8]) -> Result<()> {
        let pdu = ControlPdu::decode(bytes)?;

        {
            let mut state = self.state.lock().unwrap();
            if pdu.pci.seq_num <= state.last_rcv_ctrl_seq {
                return Ok(());
            }
            state.last_rcv_ctrl_seq = pdu.pci.seq_num;
        }

        match pdu.opcode {
            ControlOpcode::Ack => {
                self.handle_ack(pdu.ack_seq.ok_or(Error::MalformedMessage)?).await?;
            }
            ControlOpcode::Nack => {
                self.handle_nack(pdu.nack_seq.ok_or(Error::MalformedMessage)?).await?;
            }
            ControlOpcode::FlowControl => {
                self.handle_flow_control(pdu.new_rwe, pdu.new_rate).await;
            }
            ControlOpcode::AckFlowControl => {
                if let Some(ack_seq) = pdu.ack_seq {
                    self.handle_ack(ack_seq).await?;
                }
                self.handle_flow_control(pdu.new_rwe, pdu.new_rate).await;
            }
            ControlOpcode::ControlAck => {
                // Dedup bookkeeping above is the entire effect (§9).
            }
            ControlOpcode::Rendezvous => {
                self.drain_closed_window().await;
            }
        }
        Ok(())
    }

    async fn handle_ack(self: &Arc<Self>, ack_seq: u64) -> Result<()> {
        let sample = {
            let mut state = self.state.lock().unwrap();
            state.snd_left_window_edge = state.snd_left_window_edge.max(ack_seq);
            state.rtxq.ack_up_to(ack_seq)
        };
        if let Some(entry) = sample {
            let new_rtt = Instant::now().duration_since(entry.first_send_time);
            self.policy_set.rtt_estimator(self, new_rtt).await;
        }
        self.policy_set.sender_ack(self, ack_seq).await;
        self.rearm_rtx_timer().await;
        Ok(())
    }

    async fn handle_nack(self: &Arc<Self>, nack_seq: u64) -> Result<()> {
        let seqs = self.state.lock().unwrap().rtxq.seqs_from(nack_seq);
        for seq in seqs {
            let resend = {
                let mut state = self.state.lock().unwrap();
                let max_rtx = self.cfg.data_retransmit_max;
                match state.rtxq.get_mut(seq) {
                    Some(entry) if entry.retries < max_rtx => {
                        entry.retries += 1;
                        entry.first_send_time = Instant::now();
                        Some(entry.pdu.clone())
                    }
                    Some(_) => {
                        state.rtxq.remove(seq);
                        None
                    }
                    None => None,
                }
            };
            match resend {
                Some(pdu) => {
                    if let Err(error) = self.channel.send(pdu.encode()).await {
                        tracing::warn!(%error, seq, "rmt resend failed");
                    }
                }
                None => {
                    self.policy_set.lost_control_pdu(self).await;
                    return Err(Error::PeerQosViolation);
                }
            }
        }
        self.rearm_rtx_timer().await;
        Ok(())
    }

    async fn handle_flow_control(self: &Arc<Self>, new_rwe: Option<u64>, new_rate: Option<u64>) {
        self.policy_set.receiving_flow_control(self, new_rwe, new_rate).await;
        self.drain_closed_window().await;
    }

    /// Closed-window drain (§4.3): while the queue is non-empty and the
    /// window/rate budget allows, pop, register for retransmission, send.
    pub async fn drain_closed_window(self: &Arc<Self>) {
        let was_at_bound = {
            let state = self.state.lock().unwrap();
            state.cwq.len() >= state.cwq.max_len().max(1)
        };
        loop {
            let next = {
                let mut state = self.state.lock().unwrap();
                if state.cwq.is_empty() {
                    break;
                }
                self.refresh_rate_frame(&mut state);
                let head_seq = state.cwq.peek().map(|pdu| pdu.pci.seq_num);
                let window_ok = !self.cfg.window_based_fc
                    || head_seq.map_or(true, |s| s <= state.snd_right_window_edge);
                // §4.3's budget is `sending_rate * time_frame`; `sending_rate`
                // here is already stored as the per-frame PDU budget (see
                // `DtcpConfig::sending_rate`'s doc comment), so the frame
                // length doesn't re-enter the comparison.
                let rate_ok = !self.cfg.rate_based_fc || state.pdus_in_time_unit < state.sending_rate;
                if !(window_ok && rate_ok) {
                    break;
                }
                let pdu = state.cwq.pop().expect("checked non-empty above");
                if self.cfg.rtx_control {
                    state.rtxq.push(pdu.clone(), Instant::now());
                }
                state.max_seq_nr_sent = state.max_seq_nr_sent.max(pdu.pci.seq_num);
                state.pdus_in_time_unit += 1;
                Some(pdu)
            };
            match next {
                Some(pdu) => {
                    if let Err(error) = self.channel.send(pdu.encode()).await {
                        tracing::warn!(%error, seq = pdu.pci.seq_num, "rmt send failed, dropping pdu");
                    }
                }
                None => break,
            }
        }
        if self.cfg.rtx_control && !self.state.lock().unwrap().rtxq.is_empty() {
            self.rearm_rtx_timer().await;
        }
        let now_under_bound = {
            let state = self.state.lock().unwrap();
            state.cwq.len() < state.cwq.max_len().max(1)
        };
        if was_at_bound && now_under_bound {
            self.upper.enable_write();
        }
    }

    async fn rearm_rtx_timer(self: &Arc<Self>) {
        let tr = self.sv.lock().await.tr;
        let mut timer = self.rtx_timer.lock().await;
        timer.set_interval(tr);
        let dtcp = self.clone();
        timer.arm(move || async move {
            dtcp.rtx_timer_fired().await;
        });
    }

    /// RTX timer expiration (§4.3): resend every overdue entry, bumping
    /// retries; drop (and report `PeerQosViolation`-worthy exhaustion)
    /// once `data_retransmit_max` is reached.
    async fn rtx_timer_fired(self: &Arc<Self>) {
        let tr = self.sv.lock().await.tr;
        let now = Instant::now();
        let overdue = self.state.lock().unwrap().rtxq.overdue(now, tr);
        for seq in overdue {
            let resend = {
                let mut state = self.state.lock().unwrap();
                let max_rtx = self.cfg.data_retransmit_max;
                match state.rtxq.get_mut(seq) {
                    Some(entry) if entry.retries < max_rtx => {
                        entry.retries += 1;
                        entry.first_send_time = now;
                        Some(entry.pdu.clone())
                    }
                    Some(_) => {
                        state.rtxq.remove(seq);
                        None
                    }
                    None => None,
                }
            };
            match resend {
                Some(pdu) => {
                    if let Err(error) = self.channel.send(pdu.encode()).await {
                        tracing::warn!(%error, seq, "rmt resend failed");
                    }
                }
                None => {
                    self.policy_set.lost_control_pdu(self).await;
                }
            }
        }
        if !self.state.lock().unwrap().rtxq.is_empty() {
            self.rearm_rtx_timer().await;
        }
    }
}

#[async_trait]
impl<C: Channel<Packet = BytesMut> + 'static> FlowControl for Dtcp<C> {
    fn is_window_closed(&self, seq: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        if self.cfg.window_based_fc && seq > state.snd_right_window_edge {
            return true;
        }
        if self.cfg.rate_based_fc {
            self.refresh_rate_frame(&mut state);
            // Same per-frame budget as `drain_closed_window`'s `rate_ok`:
            // `sending_rate` is already the §4.3 `sending_rate * time_frame`
            // product, not a bare per-time-unit rate.
            if state.pdus_in_time_unit >= state.sending_rate {
                return true;
            }
        }
        false
    }

    fn closed_window_queue_len(&self) -> usize {
        self.state.lock().unwrap().cwq.len()
    }

    fn max_closed_window_queue_len(&self) -> usize {
        self.cfg.max_closed_winq_length
    }

    async fn push_closed_window_queue(&self, pdu: Pdu) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        // One entry is allowed past `max_len` (the overrun write itself,
        // §8 boundary behaviour); a second over-bound write hits this
        // backstop.
        if state.cwq.len() > state.cwq.max_len() {
            return Err(Error::ResourceExhausted);
        }
        state.cwq.push(pdu);
        Ok(())
    }

    async fn register_for_retransmission(&self, pdu: Pdu) {
        if !self.cfg.rtx_control {
            return;
        }
        let was_empty = {
            let mut state = self.state.lock().unwrap();
            let was_empty = state.rtxq.is_empty();
            state.max_seq_nr_sent = state.max_seq_nr_sent.max(pdu.pci.seq_num);
            state.rtxq.push(pdu, Instant::now());
            was_empty
        };
        if was_empty {
            if let Some(this) = self.self_arc() {
                this.rearm_rtx_timer().await;
            }
        }
    }

    async fn flush_queues(&self) {
        let mut state = self.state.lock().unwrap();
        state.cwq.clear();
        state.rtxq.clear();
    }

    fn reset_send_window(&self, base_seq: u64) {
        let mut state = self.state.lock().unwrap();
        state.snd_left_window_edge = base_seq;
        state.snd_right_window_edge = base_seq + self.cfg.initial_credit;
        state.max_seq_nr_sent = base_seq;
        state.pdus_in_time_unit = 0;
        state.last_time_frame_start = Instant::now();
    }

    fn retransmission_control_enabled(&self) -> bool {
        self.cfg.rtx_control
    }

    async fn request_retransmission(&self, seq: u64) {
        let (mut pdu, _) = self.next_ctrl_pdu(ControlOpcode::Nack);
        pdu.nack_seq = Some(seq);
        self.send_control(&pdu).await;
    }

    fn notify_drf(&self) {
        let mut state = self.state.lock().unwrap();
        state.last_rcv_ctrl_seq = 0;
        state.rcv_right_window_edge = self.cfg.initial_credit;
        state.receiver_credit = self.cfg.initial_credit;
    }

    async fn emit_window_update(&self) {
        Dtcp::emit_window_update(self).await;
    }
}
