//! The RMT-facing collaborator (§6.1): a per-connection [`channel::Channel`]
//! that either forwards an outbound PDU to the bound [`Rmt`] or, when the
//! connection loops back to the same address, short-circuits straight into
//! [`crate::EfcpContainer::receive`].
use std::io;
use std::sync::Weak;

use async_trait::async_trait;
use bytes::BytesMut;
use channel::Channel;
use dtsv::{Address, CepId, QosId};

use crate::EfcpContainer;

/// What the container calls to hand a PDU to the lower multiplexing layer
/// (§6.1 `rmt.send(dst_address, qos_id, pdu)`).
#[async_trait]
pub trait Rmt: Send + Sync {
    /// Sends `pdu` toward `dst_addr` on behalf of the connection identified
    /// by `qos_id`. A single error return is sufficient; the caller never
    /// inspects the failure beyond logging it.
    async fn send(&self, dst_addr: Address, qos_id: QosId, pdu: Vec<u8>) -> io::Result<()>;
}

/// One connection's view of the RMT: knows its own and the peer's address
/// so it can decide, per send, whether to loop back locally or forward to
/// the bound [`Rmt`].
#[derive(Clone)]
pub(crate) struct RmtChannel {
    pub(crate) container: Weak<EfcpContainer>,
    pub(crate) local_addr: Address,
    pub(crate) dst_addr: Address,
    /// The peer's connection-endpoint id — the same value carried in this
    /// connection's outbound PCI, and the id the loopback shortcut
    /// dispatches to.
    pub(crate) dst_cep: CepId,
    pub(crate) qos_id: QosId,
}

#[async_trait]
impl Channel for RmtChannel {
    type Packet = BytesMut;

    async fn send(&self, packet: Self::Packet) -> io::Result<()> {
        let container = self
            .container
            .upgrade()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "container gone"))?;

        if self.local_addr == self.dst_addr {
            return container
                .receive(self.dst_cep, &packet)
                .await
                .map_err(|error| io::Error::new(io::ErrorKind::Other, error));
        }

        let rmt = container
            .rmt()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no rmt bound"))?;
        rmt.send(self.dst_addr, self.qos_id, packet.to_vec()).await
    }

    async fn recv(&self) -> io::Result<Self::Packet> {
        // DTP/DTCP only ever drive this channel through `send`; inbound
        // PDUs arrive through `EfcpContainer::receive` instead.
        Err(io::Error::new(
            io::ErrorKind::Other,
            "rmt channel does not support recv",
        ))
    }
}
