//! Error taxonomy for the RIB daemon.
use cdap::CdapError;
use failure::Fail;

/// Errors raised by the object tree and the local/remote verb dispatch
/// built on top of it (§4.6).
#[derive(Clone, Debug, Fail, Eq, PartialEq)]
pub enum RibError {
    /// No object with this name/instance, or no response handler
    /// registered under this invoke-id.
    #[fail(display = "invalid handle")]
    InvalidHandle,
    /// An object with this name already exists.
    #[fail(display = "duplicate object: {}", _0)]
    DuplicateObject(String),
    /// The object's parent is not present in the tree.
    #[fail(display = "parent missing: {}", _0)]
    ParentMissing(String),
    /// The class does not match the schema entry registered for this
    /// container/field combination, or no entry is registered at all
    /// (§4.6 "class names must match the schema entry... or the
    /// insertion is rejected").
    #[fail(display = "schema violation: {}", _0)]
    SchemaViolation(String),
    /// The schema caps the number of children a container may have under
    /// a given field, and this insertion would exceed it.
    #[fail(display = "schema object limit exceeded: {}", _0)]
    SchemaObjectLimitExceeded(String),
    /// The underlying CDAP session or codec rejected the message.
    #[fail(display = "cdap error: {}", _0)]
    Cdap(CdapError),
}

impl From<CdapError> for RibError {
    fn from(error: CdapError) -> Self {
        RibError::Cdap(error)
    }
}

/// Convenience alias for a result bound by [`RibError`].
pub type Result<T> = std::result::Result<T, RibError>;
