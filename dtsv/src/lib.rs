//! Shared data-transfer state vector, configuration, and error taxonomy.
//!
//! This is the bottom of the dependency chain `state-vector <- DTP <- DTCP
//! <- EFCP-container`: DTP and DTCP each hold a reference to one
//! [`sv::StateVector`] per connection, owned by the EFCP instance.
#![deny(missing_docs)]
#![deny(warnings)]
pub mod config;
pub mod error;
pub mod pdu;
pub mod sv;
pub mod timer;

pub use addr::{Address, CepId, ConnectionId, PortId, QosId};
pub use config::{DtcpConfig, DtpConfig};
pub use error::{Error, Result};
pub use pdu::{ControlOpcode, ControlPdu, Pci, Pdu, PduType};
pub use sv::StateVector;
pub use timer::{ArmableTimer, Timer};
