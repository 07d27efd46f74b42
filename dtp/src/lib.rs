//! # Data Transfer Protocol
//!
//! The outbound SDU→PDU pipeline and inbound ordering/reassembly half of
//! the data-transfer core (EFCP data-transfer core §4.2). Carries a PDU
//! stream over an arbitrary [`channel::Channel`] collaborator — in
//! production the RMT, in tests a loopback or lossy test channel.
#![deny(missing_docs)]
#![deny(warnings)]
mod engine;
mod policy;
mod sequencing;

pub use crate::engine::{Dtp, Upper};
pub use crate::policy::{by_name, DefaultDtpPolicySet, DtpPolicySet, FlowControl};
pub use crate::sequencing::SequencingQueue;
