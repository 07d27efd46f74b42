//! # RIB daemon
//!
//! The Resource Information Base: a hierarchical, schema-validated object
//! store with local CRUD-style verbs and CDAP-backed remote twins, plus
//! the response-handler table that demultiplexes replies by invoke-id
//! (EFCP data-transfer core §3.7, §4.6).
//!
//! [`store::Rib`] is the object tree alone — synchronous, lock-free,
//! embeddable wherever only local lookups are needed. [`daemon::RibDaemon`]
//! wraps it with the CDAP session/transport plumbing the remote verbs
//! require, the way `efcp::EfcpContainer` wraps the DTP/DTCP pair with the
//! RMT/upper-layer plumbing.
#![deny(missing_docs)]
#![deny(warnings)]
mod daemon;
mod error;
mod object;
mod schema;
mod store;

pub use crate::daemon::{RemoteTransport, ResponseHandler, RibDaemon};
pub use crate::error::{RibError, Result};
pub use crate::object::{ObjectValue, RibObject, DEFAULT_FIELD_SEPARATOR, DEFAULT_ID_SEPARATOR};
pub use crate::schema::{RibSchema, ROOT_CLASS};
pub use crate::store::Rib;
