//! Wire format shared by DTP transfer PDUs and DTCP control PDUs.
//!
//! Both halves of a connection's data-transfer pair need the same PCI
//! layout (§3.1, §6.3 style) and the same codec idiom the teacher uses in
//! `dtcp/src/packet.rs` (a type/flags byte followed by big-endian fields).
//! Keeping the type here, rather than in `dtp` or `dtcp`, lets both crates
//! and the `policy` hook traits refer to it without forming a cycle.
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use addr::CepId;

/// Minimum encoded size of a PCI: version + type/flags + dst_cep + qos_id +
/// seq_num.
const PCI_LEN: usize = 1 + 1 + 8 + 8 + 8;

/// Whether a PDU carries user data or control information.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PduType {
    /// DTP transfer PDU.
    Transfer,
    /// DTCP control PDU.
    Control,
}

/// Protocol Control Information common to transfer and control PDUs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pci {
    /// Whether this PDU is the first of a fresh sequencing run (§4.2).
    pub drf: bool,
    /// Connection-endpoint id this PDU is addressed to.
    pub dst_cep: CepId,
    /// Quality-of-service class, carried for the RMT's benefit.
    pub qos_id: u64,
    /// Sequence number; data space for transfer PDUs, control-PDU dedup
    /// space (`last_rcv_ctrl_seq`) for control PDUs — the two spaces never
    /// overlap (§5, "control PDUs do not consume or produce sequence
    /// numbers from the data space").
    pub seq_num: u64,
}

/// A DTP transfer PDU: PCI plus an opaque SDU fragment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pdu {
    /// Header.
    pub pci: Pci,
    /// Payload. Fragmentation/reassembly above the identity policy is out
    /// of scope (§4.2 step 2); this is the whole SDU for every PDU we
    /// construct.
    pub payload: Vec<u8>,
}

impl Pdu {
    /// Encodes this PDU to its wire representation.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(PCI_LEN + self.payload.len());
        buf.put_u8(0);
        buf.put_u8(if self.pci.drf { 1 } else { 0 });
        put_u64(&mut buf, self.pci.dst_cep.0);
        put_u64(&mut buf, self.pci.qos_id);
        put_u64(&mut buf, self.pci.seq_num);
        buf.put_slice(&self.payload);
        buf
    }

    /// Decodes a PDU from its wire representation.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let pci = decode_pci(bytes, PduType::Transfer)?;
        Ok(Pdu {
            pci,
            payload: bytes[PCI_LEN..].to_vec(),
        })
    }
}

/// Opcode of a DTCP control PDU (§4.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlOpcode {
    /// Positive acknowledgement up to (and including) a sequence number.
    Ack,
    /// Negative acknowledgement from a sequence number onward.
    Nack,
    /// Flow-control update (window and/or rate).
    FlowControl,
    /// `Ack` and `FlowControl` combined in a single message.
    AckFlowControl,
    /// Confirms receipt of a prior control exchange.
    ControlAck,
    /// Re-synchronises windows after inactivity.
    Rendezvous,
}

impl ControlOpcode {
    fn to_raw(self) -> u8 {
        match self {
            ControlOpcode::Ack => 0,
            ControlOpcode::Nack => 1,
            ControlOpcode::FlowControl => 2,
            ControlOpcode::AckFlowControl => 3,
            ControlOpcode::ControlAck => 4,
            ControlOpcode::Rendezvous => 5,
        }
    }

    fn from_raw(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => ControlOpcode::Ack,
            1 => ControlOpcode::Nack,
            2 => ControlOpcode::FlowControl,
            3 => ControlOpcode::AckFlowControl,
            4 => ControlOpcode::ControlAck,
            5 => ControlOpcode::Rendezvous,
            _ => return Err(Error::MalformedMessage),
        })
    }
}

/// A DTCP control PDU.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlPdu {
    /// Header. `seq_num` here is the control-PDU dedup sequence
    /// (`last_rcv_ctrl_seq`), not a data sequence number.
    pub pci: Pci,
    /// What kind of control exchange this is.
    pub opcode: ControlOpcode,
    /// Present on `Ack`/`AckFlowControl`.
    pub ack_seq: Option<u64>,
    /// Present on `Nack`.
    pub nack_seq: Option<u64>,
    /// Present on `FlowControl`/`AckFlowControl`: new advertised right
    /// window edge.
    pub new_rwe: Option<u64>,
    /// Present on `FlowControl`/`AckFlowControl`: new advertised rate, in
    /// PDUs per `time_period`.
    pub new_rate: Option<u64>,
}

/// Bit positions within the control PDU's optional-field presence byte.
const F_ACK: u8 = 0b0001;
const F_NACK: u8 = 0b0010;
const F_RWE: u8 = 0b0100;
const F_RATE: u8 = 0b1000;

impl ControlPdu {
    /// Encodes this control PDU to its wire representation.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(PCI_LEN + 1 + 1 + 4 * 8);
        buf.put_u8(1);
        buf.put_u8(if self.pci.drf { 1 } else { 0 });
        put_u64(&mut buf, self.pci.dst_cep.0);
        put_u64(&mut buf, self.pci.qos_id);
        put_u64(&mut buf, self.pci.seq_num);
        buf.put_u8(self.opcode.to_raw());
        let mut present = 0u8;
        if self.ack_seq.is_some() {
            present |= F_ACK;
        }
        if self.nack_seq.is_some() {
            present |= F_NACK;
        }
        if self.new_rwe.is_some() {
            present |= F_RWE;
        }
        if self.new_rate.is_some() {
            present |= F_RATE;
        }
        buf.put_u8(present);
        for field in [self.ack_seq, self.nack_seq, self.new_rwe, self.new_rate].iter() {
            if let Some(v) = field {
                put_u64(&mut buf, *v);
            }
        }
        buf
    }

    /// Decodes a control PDU from its wire representation.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let pci = decode_pci(bytes, PduType::Control)?;
        let rest = &bytes[PCI_LEN..];
        if rest.len() < 2 {
            return Err(Error::MalformedMessage);
        }
        let opcode = ControlOpcode::from_raw(rest[0])?;
        let present = rest[1];
        let mut offset = 2;
        let mut next = |flag: u8| -> Result<Option<u64>> {
            if present & flag == 0 {
                return Ok(None);
            }
            if rest.len() < offset + 8 {
                return Err(Error::MalformedMessage);
            }
            let v = BigEndian::read_u64(&rest[offset..offset + 8]);
            offset += 8;
            Ok(Some(v))
        };
        let ack_seq = next(F_ACK)?;
        let nack_seq = next(F_NACK)?;
        let new_rwe = next(F_RWE)?;
        let new_rate = next(F_RATE)?;
        Ok(ControlPdu {
            pci,
            opcode,
            ack_seq,
            nack_seq,
            new_rwe,
            new_rate,
        })
    }
}

fn put_u64(buf: &mut BytesMut, v: u64) {
    let mut tmp = [0u8; 8];
    BigEndian::write_u64(&mut tmp, v);
    buf.put_slice(&tmp);
}

fn decode_pci(bytes: &[u8], expected: PduType) -> Result<Pci> {
    if bytes.len() < PCI_LEN {
        return Err(Error::MalformedMessage);
    }
    let raw_type = bytes[0];
    let want = match expected {
        PduType::Transfer => 0,
        PduType::Control => 1,
    };
    if raw_type != want {
        return Err(Error::MalformedMessage);
    }
    let drf = bytes[1] != 0;
    let dst_cep = CepId(BigEndian::read_u64(&bytes[2..10]));
    let qos_id = BigEndian::read_u64(&bytes[10..18]);
    let seq_num = BigEndian::read_u64(&bytes[18..26]);
    Ok(Pci {
        drf,
        dst_cep,
        qos_id,
        seq_num,
    })
}

/// Inspects the first byte of an encoded PDU without fully decoding it, so
/// the EFCP instance can dispatch to DTP or DTCP before paying for a full
/// parse.
pub fn peek_type(bytes: &[u8]) -> Result<PduType> {
    match bytes.first() {
        Some(0) => Ok(PduType::Transfer),
        Some(1) => Ok(PduType::Control),
        _ => Err(Error::MalformedMessage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pci(seq: u64) -> Pci {
        Pci {
            drf: false,
            dst_cep: CepId(42),
            qos_id: 1,
            seq_num: seq,
        }
    }

    #[test]
    fn transfer_pdu_round_trips() {
        let pdu = Pdu {
            pci: pci(7),
            payload: b"hello".to_vec(),
        };
        let bytes = pdu.encode();
        assert_eq!(peek_type(&bytes).unwrap(), PduType::Transfer);
        assert_eq!(Pdu::decode(&bytes).unwrap(), pdu);
    }

    #[test]
    fn control_pdu_round_trips_with_optional_fields() {
        let cpdu = ControlPdu {
            pci: pci(3),
            opcode: ControlOpcode::AckFlowControl,
            ack_seq: Some(10),
            nack_seq: None,
            new_rwe: Some(20),
            new_rate: None,
        };
        let bytes = cpdu.encode();
        assert_eq!(peek_type(&bytes).unwrap(), PduType::Control);
        assert_eq!(ControlPdu::decode(&bytes).unwrap(), cpdu);
    }

    #[test]
    fn truncated_bytes_are_malformed() {
        assert_eq!(Pdu::decode(&[0u8; 4]).unwrap_err(), Error::MalformedMessage);
    }

    #[test]
    fn wrong_type_byte_is_malformed() {
        let pdu = Pdu {
            pci: pci(1),
            payload: vec![],
        };
        let mut bytes = pdu.encode();
        bytes[0] = 9;
        assert_eq!(Pdu::decode(&bytes).unwrap_err(), Error::MalformedMessage);
    }
}
