//! The EFCP container (§4.1): the connection table, CEP-id allocation, and
//! the lock/pending-ops/condvar teardown discipline that lets `write` and
//! `receive` run concurrently with `destroy_connection` without a
//! use-after-free.
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_std::sync::Mutex as AsyncMutex;
use dtsv::pdu::PduType;
use dtsv::{Address, CepId, ConnectionId, DtcpConfig, DtpConfig, Error, PortId, QosId, Result, StateVector};
use policy::PolicyParams;

use crate::cep::CepIdPool;
use crate::rmt::{Rmt, RmtChannel};
use crate::upper::{ConnectionUpper, PendingOps, UpperSlot};

struct ConnectionEntry {
    id: ConnectionId,
    sv: Arc<AsyncMutex<StateVector>>,
    dtp: Arc<dtp::Dtp<RmtChannel>>,
    dtcp: Option<Arc<dtcp::Dtcp<RmtChannel>>>,
    upper: Arc<UpperSlot>,
    pending: Arc<PendingOps>,
}

struct Inner {
    cep_pool: CepIdPool,
    connections: HashMap<CepId, Arc<ConnectionEntry>>,
}

/// Owns every EFCP connection instance in this IPC process (§4.1). Looked
/// up and dispatched to by CEP-id; bound to a single [`Rmt`] collaborator
/// at a time. Constructed via [`EfcpContainer::new`], which wraps it in an
/// `Arc` up front: [`EfcpContainer::create_connection`] needs a `Weak`
/// back-reference to hand each connection's [`RmtChannel`] for the
/// loopback shortcut (§6.1).
pub struct EfcpContainer {
    inner: StdMutex<Inner>,
    rmt: StdMutex<Option<Arc<dyn Rmt>>>,
}

impl EfcpContainer {
    /// Creates an empty container with no connections and no bound RMT.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: StdMutex::new(Inner {
                cep_pool: CepIdPool::new(),
                connections: HashMap::new(),
            }),
            rmt: StdMutex::new(None),
        })
    }

    /// Binds the lower multiplexing collaborator (§4.1 `bind_rmt`).
    /// Connections between two different addresses send through it;
    /// same-address connections never need it (§6.1 loopback shortcut).
    pub fn bind_rmt(&self, rmt: Arc<dyn Rmt>) {
        *self.rmt.lock().unwrap() = Some(rmt);
    }

    /// Unbinds the current RMT (§4.1 `unbind_rmt`).
    pub fn unbind_rmt(&self) {
        *self.rmt.lock().unwrap() = None;
    }

    pub(crate) fn rmt(&self) -> Option<Arc<dyn Rmt>> {
        self.rmt.lock().unwrap().clone()
    }

    fn lookup(&self, cep: CepId) -> Result<Arc<ConnectionEntry>> {
        self.inner
            .lock()
            .unwrap()
            .connections
            .get(&cep)
            .cloned()
            .ok_or(Error::InvalidHandle)
    }

    /// Creates a new connection instance and returns its local CEP-id
    /// (§4.1 `create_connection`).
    ///
    /// `dst_cep` is `None` when the peer's connection-endpoint id is not
    /// yet known (the requester side, before the peer's response
    /// arrives) — it defaults to [`CepId::INVALID`]. Unlike `src_cep`,
    /// which this container always allocates itself from its monotonic
    /// pool (see `DESIGN.md`), `dst_cep` is fixed for the lifetime of the
    /// DTP/DTCP engines built here: there is no live rebind once a value
    /// arrives late, only a fresh `create_connection` call.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_connection(
        self: &Arc<Self>,
        upper: Arc<dyn ConnectionUpper>,
        src_addr: Address,
        dst_addr: Address,
        port_id: PortId,
        qos_id: QosId,
        dst_cep: Option<CepId>,
        max_flow_pdu_size: u64,
        max_flow_sdu_size: u64,
        max_packet_lifetime: Duration,
        dtp_cfg: DtpConfig,
        dtcp_cfg: Option<DtcpConfig>,
        policy_name: &str,
        policy_params: &PolicyParams,
    ) -> Result<CepId> {
        let dst_cep = dst_cep.unwrap_or(CepId::INVALID);
        let src_cep = self.inner.lock().unwrap().cep_pool.allocate()?;

        let a = dtp_cfg.initial_a_timer;
        let initial_tr = dtcp_cfg
            .as_ref()
            .map(|c| c.initial_tr)
            .unwrap_or(Duration::from_millis(0));
        let data_retransmit_max = dtcp_cfg.as_ref().map(|c| c.data_retransmit_max).unwrap_or(0);
        let sv = Arc::new(AsyncMutex::new(StateVector::new(
            max_flow_pdu_size,
            max_flow_sdu_size,
            max_packet_lifetime,
            a,
            initial_tr,
            data_retransmit_max,
        )));

        // Grounded on `original_source/linux/net/rina/dtp.c`'s inactivity
        // timer restart interval: 2 * (MPL + R + A).
        let r = initial_tr * data_retransmit_max.max(1);
        let inactivity_interval = (max_packet_lifetime + r + a) * 2;

        let channel = RmtChannel {
            container: Arc::downgrade(self),
            local_addr: src_addr,
            dst_addr,
            dst_cep,
            qos_id,
        };

        let upper_slot = UpperSlot::new(upper);

        let dtcp = match &dtcp_cfg {
            Some(cfg) => {
                let policy_set = dtcp::by_name::<RmtChannel>(policy_name, policy_params)?;
                Some(dtcp::Dtcp::new(
                    channel.clone(),
                    sv.clone(),
                    cfg.clone(),
                    dst_cep,
                    qos_id.0,
                    policy_set,
                    upper_slot.clone(),
                ))
            }
            None => None,
        };

        let flow_control: Option<Arc<dyn dtp::FlowControl>> =
            dtcp.clone().map(|d| d as Arc<dyn dtp::FlowControl>);
        let dtp_policy_set = dtp::by_name::<RmtChannel>(policy_name, policy_params)?;
        let af = policy_params.get_u32("af", 1);
        let dtp = dtp::Dtp::new(
            channel,
            sv.clone(),
            dtp_cfg,
            dst_cep,
            qos_id.0,
            dtp_policy_set,
            flow_control,
            upper_slot.clone(),
            inactivity_interval,
            inactivity_interval,
            af,
        );

        let id = ConnectionId {
            src_addr,
            src_cep,
            dst_addr,
            dst_cep,
            qos_id,
            port_id,
        };
        let entry = Arc::new(ConnectionEntry {
            id,
            sv,
            dtp,
            dtcp,
            upper: upper_slot,
            pending: PendingOps::new(),
        });

        self.inner.lock().unwrap().connections.insert(src_cep, entry);
        Ok(src_cep)
    }

    /// Rebinds an existing connection's upper-layer collaborator, optionally
    /// under a new CEP-id (§4.1 `update_connection`). Used when the upper
    /// layer handling a connection changes without tearing the connection
    /// down.
    pub fn update_connection(
        &self,
        from_cep: CepId,
        to_cep: CepId,
        new_upper: Arc<dyn ConnectionUpper>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.connections.remove(&from_cep).ok_or(Error::InvalidHandle)?;
        entry.upper.set(new_upper);
        if from_cep != to_cep && inner.connections.contains_key(&to_cep) {
            inner.connections.insert(from_cep, entry);
            return Err(Error::StateMismatch);
        }
        inner.connections.insert(to_cep, entry);
        Ok(())
    }

    /// Tears a connection down (§4.1 `destroy_connection`): removes it from
    /// the table immediately (satisfying idempotence — a concurrent or
    /// repeated call sees `InvalidHandle`), then blocks until every
    /// in-flight `write`/`receive` against it has returned before the id is
    /// released back to the pool and the entry (and its queues) is dropped.
    pub async fn destroy_connection(&self, cep: CepId) -> Result<()> {
        let entry = {
            let mut inner = self.inner.lock().unwrap();
            inner.connections.remove(&cep).ok_or(Error::InvalidHandle)?
        };

        // Blocks this task's thread until every in-flight write/receive
        // against `entry` has returned. In practice this returns
        // immediately: `write`/`receive` never suspend past their first
        // poll (§5, "destruction suspends the caller until in-flight work
        // drains").
        entry.pending.wait_for_drain();

        self.inner.lock().unwrap().cep_pool.release(cep);
        entry.upper.flow_unbind(entry.id.port_id);
        Ok(())
    }

    /// Hands an SDU from the upper layer through to the named connection's
    /// DTP instance (§4.1 `write`).
    pub async fn write(&self, cep: CepId, sdu: Vec<u8>) -> Result<()> {
        let entry = self.lookup(cep)?;
        entry.pending.begin();
        let result = entry.dtp.write(sdu).await;
        entry.pending.end();
        result
    }

    /// Dispatches an inbound wire-format PDU to the named connection's DTP
    /// or DTCP instance, by inspecting its type byte (§4.1 `receive`).
    pub async fn receive(&self, cep: CepId, bytes: &[u8]) -> Result<()> {
        let entry = self.lookup(cep)?;
        entry.pending.begin();
        let result = self.dispatch(&entry, bytes).await;
        entry.pending.end();
        result
    }

    async fn dispatch(&self, entry: &Arc<ConnectionEntry>, bytes: &[u8]) -> Result<()> {
        match dtsv::pdu::peek_type(bytes)? {
            PduType::Transfer => {
                let lwe_before = entry.sv.lock().await.rcv_left_window_edge();
                entry.dtp.receive(bytes).await?;
                if let Some(dtcp) = &entry.dtcp {
                    let lwe_after = entry.sv.lock().await.rcv_left_window_edge();
                    if lwe_after != lwe_before {
                        dtcp.on_delivered(lwe_after).await;
                    }
                }
                Ok(())
            }
            PduType::Control => match &entry.dtcp {
                Some(dtcp) => dtcp.receive(bytes).await,
                None => Err(Error::StateMismatch),
            },
        }
    }
}
