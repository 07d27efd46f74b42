//! Error taxonomy for the CDAP layer.
use failure::Fail;

/// Errors raised by CDAP session handling and the wire codec.
#[derive(Clone, Debug, Fail, Eq, PartialEq)]
pub enum CdapError {
    /// Message not valid in the session's current state (§4.4).
    #[fail(display = "state mismatch")]
    StateMismatch,
    /// The codec rejected the input; the bytes are dropped, session state
    /// is never mutated on a decode failure.
    #[fail(display = "malformed message")]
    MalformedMessage,
    /// A field the opcode requires was absent (§4.4 message validator).
    #[fail(display = "mandatory field missing: {}", _0)]
    MandatoryFieldMissing(&'static str),
    /// A field forbidden for the opcode was present (§4.4 message
    /// validator), e.g. a result code on a request.
    #[fail(display = "forbidden field present: {}", _0)]
    ForbiddenFieldPresent(&'static str),
    /// No sent/received invoke-id tracked under this id.
    #[fail(display = "invalid handle")]
    InvalidHandle,
}

/// Convenience alias for a result bound by [`CdapError`].
pub type Result<T> = std::result::Result<T, CdapError>;
