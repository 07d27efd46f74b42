//! # CDAP message model, session state machine, and wire codec
//!
//! The Common Distributed Application Protocol layer used for control-plane
//! exchanges between peer IPC processes (EFCP data-transfer core §3.5-§3.6,
//! §4.4-§4.5). [`codec`] is pure and stateless; [`session::CdapSession`] is
//! the only stateful piece, and the only one [`crate::error`] taxonomy
//! pertains to — a decode failure never mutates a session.
#![deny(missing_docs)]
#![deny(warnings)]
pub mod codec;
mod error;
mod invoke;
mod message;
mod session;
mod validate;

pub use crate::error::{CdapError, Result};
pub use crate::invoke::InvokeIdManager;
pub use crate::message::{ApNamingInfo, AuthPolicy, CdapMessage, Flags, ObjectValue, Opcode};
pub use crate::session::{CdapSession, SessionState};
