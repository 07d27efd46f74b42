//! Error taxonomy shared by the data-transfer core.
use failure::Fail;

/// Errors raised by the EFCP data-transfer core.
///
/// PDU-level failures (`MalformedMessage`, a dropped retransmission) are
/// logged and counted by the component that observes them; they never
/// propagate past the DTP/DTCP boundary into the upper layer, which only
/// ever sees flow-level `established`/`deallocated` events. Control-plane
/// failures during a CDAP `CONNECT` are the one path that does propagate,
/// since the caller is synchronously waiting on the outcome.
#[derive(Clone, Debug, Fail, Eq, PartialEq)]
pub enum Error {
    /// Unknown CEP-id or port-id.
    #[fail(display = "invalid handle")]
    InvalidHandle,
    /// CEP-id pool empty, or a bounded queue is full under a policy that
    /// forbids blocking.
    #[fail(display = "resource exhausted")]
    ResourceExhausted,
    /// Operation not valid in the current session/connection state.
    #[fail(display = "state mismatch")]
    StateMismatch,
    /// The codec rejected the input; the bytes are dropped, never surfaced.
    #[fail(display = "malformed message")]
    MalformedMessage,
    /// A policy hook returned failure; fatal for the affected PDU only.
    #[fail(display = "policy rejected")]
    PolicyRejected,
    /// `data_retransmit_max` exceeded; the connection must be torn down.
    #[fail(display = "peer qos violation")]
    PeerQosViolation,
    /// Destruction raced with an in-flight operation.
    #[fail(display = "cancelled")]
    Cancelled,
}

/// Convenience alias for a result bound by [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
