//! Per-connection configuration (see EFCP data-transfer core §6.4).
use std::time::Duration;

/// Per-connection DTP configuration.
#[derive(Clone, Debug)]
pub struct DtpConfig {
    /// Largest gap between `rcv_left_window_edge` and a sequence number
    /// that is still delivered upward instead of held for retransmission.
    pub max_sdu_gap: u64,
    /// Initial A-timer period.
    pub initial_a_timer: Duration,
    /// Whether SDUs must be delivered to the upper layer strictly in order.
    pub in_order_delivery: bool,
    /// Whether SDUs with a missing fragment may still be delivered.
    pub incomplete_delivery: bool,
    /// Whether SDUs may be delivered incrementally as fragments arrive.
    pub partial_delivery: bool,
    /// Sequence number value at which a rollover warning is raised.
    pub seq_num_rollover_threshold: u64,
    /// Whether a DTCP instance backs this connection.
    pub dtcp_present: bool,
}

impl Default for DtpConfig {
    fn default() -> Self {
        Self {
            max_sdu_gap: 0,
            initial_a_timer: Duration::from_millis(0),
            in_order_delivery: true,
            incomplete_delivery: false,
            partial_delivery: false,
            seq_num_rollover_threshold: u64::max_value() - 1,
            dtcp_present: true,
        }
    }
}

/// Per-connection DTCP configuration.
#[derive(Clone, Debug)]
pub struct DtcpConfig {
    /// Whether flow control (window- or rate-based) is active at all.
    pub flow_control: bool,
    /// Whether the window-based flow control algorithm is active.
    pub window_based_fc: bool,
    /// Whether the rate-based flow control algorithm is active.
    pub rate_based_fc: bool,
    /// Whether retransmission control is active.
    pub rtx_control: bool,
    /// Initial sender/receiver credit for window-based flow control.
    pub initial_credit: u64,
    /// Bound on the closed-window queue.
    pub max_closed_winq_length: usize,
    /// PDUs allowed per `time_period` under rate-based flow control — the
    /// §4.3 `sending_rate * time_frame` product already folded into one
    /// value, since `time_period` is this same budget's frame length.
    pub sending_rate: u64,
    /// Length of a rate-control time frame.
    pub time_period: Duration,
    /// Initial retransmission timeout, before the RTT estimator updates it.
    pub initial_tr: Duration,
    /// Maximum retransmissions for a single PDU before `PeerQosViolation`.
    pub data_retransmit_max: u32,
}

impl Default for DtcpConfig {
    fn default() -> Self {
        Self {
            flow_control: true,
            window_based_fc: true,
            rate_based_fc: false,
            rtx_control: true,
            initial_credit: 4,
            max_closed_winq_length: 8,
            sending_rate: 0,
            time_period: Duration::from_millis(1000),
            initial_tr: Duration::from_millis(100),
            data_retransmit_max: 5,
        }
    }
}
