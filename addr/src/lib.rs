//! Naming and addressing for EFCP connections.
//!
//! A connection is named by the quadruple `(src_address, src_cep_id,
//! dst_address, dst_cep_id)` plus a `qos_id` and a local `port_id` (see the
//! data-transfer core's connection-identifier section). Addresses are
//! assigned by the enrolment layer, CEP-ids by the EFCP container's pool,
//! port-ids by the underlying flow allocator. All three are opaque unsigned
//! integers to every layer above this one.
#![deny(missing_docs)]
#![deny(warnings)]
use std::fmt;

/// Address of an IPC process, assigned by the enrolment layer.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Address(pub u64);

/// Connection-endpoint id, unique within a single EFCP container.
///
/// `0` is reserved to mean "invalid" / "not yet assigned", matching the
/// container's allocation rule: a freshly created connection's peer
/// `dst_cep_id` is `CepId::INVALID` until the peer's response arrives.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CepId(pub u64);

impl CepId {
    /// The reserved invalid id.
    pub const INVALID: CepId = CepId(0);

    /// Returns whether this is the reserved invalid id.
    pub fn is_invalid(self) -> bool {
        self == Self::INVALID
    }
}

/// Port-id of the underlying flow, allocated by the flow allocator.
///
/// The EFCP core treats this as an opaque handle; it never interprets or
/// generates the value itself.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PortId(pub u64);

/// Quality-of-service class id.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QosId(pub u64);

/// The immutable part of a connection's identity.
///
/// `dst_cep` may be set exactly once after creation, when the peer's
/// response arrives; every other field is fixed for the connection's
/// lifetime.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ConnectionId {
    /// Local address.
    pub src_addr: Address,
    /// Local connection-endpoint id.
    pub src_cep: CepId,
    /// Remote address.
    pub dst_addr: Address,
    /// Remote connection-endpoint id, `CepId::INVALID` until negotiated.
    pub dst_cep: CepId,
    /// Quality-of-service class.
    pub qos_id: QosId,
    /// Local port-id of the underlying flow.
    pub port_id: PortId,
}

macro_rules! display_as_int {
    ($ty:ident) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $ty {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

display_as_int!(Address);
display_as_int!(CepId);
display_as_int!(PortId);
display_as_int!(QosId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_cep_id_is_zero() {
        assert!(CepId::default().is_invalid());
        assert!(CepId(0).is_invalid());
        assert!(!CepId(1).is_invalid());
    }

    #[test]
    fn connection_id_equality_ignores_nothing() {
        let a = ConnectionId {
            src_addr: Address(1),
            src_cep: CepId(1),
            dst_addr: Address(2),
            dst_cep: CepId::INVALID,
            qos_id: QosId(0),
            port_id: PortId(7),
        };
        let mut b = a;
        b.dst_cep = CepId(9);
        assert_ne!(a, b);
    }
}
