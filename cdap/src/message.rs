//! The CDAP message model (§3.5): the closed opcode set, flags, the tagged
//! object value, and the message itself.
//!
//! Grounded on `original_source/librina/include/librina/cdap.h`'s
//! `CDAPMessage`/`ObjectValueInterface`, flattened from the original's
//! class-per-primitive-type hierarchy into one tagged enum.

/// Message opcode (§3.5). Every even-indexed-looking pair is a
/// request/response couple; [`Opcode::is_request`] tells them apart
/// without a second table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Opcode {
    /// `M_CONNECT` — open a CDAP session.
    Connect,
    /// `M_CONNECT_R` — response to `Connect`.
    ConnectR,
    /// `M_RELEASE` — orderly close of a session.
    Release,
    /// `M_RELEASE_R` — response to `Release`.
    ReleaseR,
    /// `M_CREATE` — create an object.
    Create,
    /// `M_CREATE_R` — response to `Create`.
    CreateR,
    /// `M_DELETE` — delete an object.
    Delete,
    /// `M_DELETE_R` — response to `Delete`.
    DeleteR,
    /// `M_READ` — read an object's value.
    Read,
    /// `M_READ_R` — response to `Read`.
    ReadR,
    /// `M_CANCELREAD` — cancel a previously issued `Read`.
    CancelRead,
    /// `M_CANCELREAD_R` — response to `CancelRead`.
    CancelReadR,
    /// `M_WRITE` — write an object's value.
    Write,
    /// `M_WRITE_R` — response to `Write`.
    WriteR,
    /// `M_START` — start an object's operation.
    Start,
    /// `M_START_R` — response to `Start`.
    StartR,
    /// `M_STOP` — stop an object's operation.
    Stop,
    /// `M_STOP_R` — response to `Stop`.
    StopR,
}

impl Opcode {
    /// Whether this opcode is a request (as opposed to its paired
    /// response).
    pub fn is_request(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Connect | Release | Create | Delete | Read | CancelRead | Write | Start | Stop
        )
    }

    /// Whether this opcode names an object verb (everything but
    /// `Connect`/`ConnectR`/`Release`/`ReleaseR`).
    pub fn is_object_verb(self) -> bool {
        use Opcode::*;
        !matches!(self, Connect | ConnectR | Release | ReleaseR)
    }

    pub(crate) fn to_raw(self) -> u8 {
        use Opcode::*;
        match self {
            Connect => 0,
            ConnectR => 1,
            Release => 2,
            ReleaseR => 3,
            Create => 4,
            CreateR => 5,
            Delete => 6,
            DeleteR => 7,
            Read => 8,
            ReadR => 9,
            CancelRead => 10,
            CancelReadR => 11,
            Write => 12,
            WriteR => 13,
            Start => 14,
            StartR => 15,
            Stop => 16,
            StopR => 17,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Option<Self> {
        use Opcode::*;
        Some(match raw {
            0 => Connect,
            1 => ConnectR,
            2 => Release,
            3 => ReleaseR,
            4 => Create,
            5 => CreateR,
            6 => Delete,
            7 => DeleteR,
            8 => Read,
            9 => ReadR,
            10 => CancelRead,
            11 => CancelReadR,
            12 => Write,
            13 => WriteR,
            14 => Start,
            15 => StartR,
            16 => Stop,
            17 => StopR,
            _ => return None,
        })
    }
}

/// Message-level flags (§3.5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flags {
    /// No flags set.
    None,
    /// The exchange is synchronized; the sender blocks for a reply.
    Sync,
    /// A `Read`/`ReadR` exchange whose value is delivered across several
    /// messages; the final one clears this flag.
    ReadIncomplete,
}

impl Flags {
    pub(crate) fn to_raw(self) -> u8 {
        match self {
            Flags::None => 0,
            Flags::Sync => 1,
            Flags::ReadIncomplete => 2,
        }
    }

    pub(crate) fn from_raw(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Flags::None,
            1 => Flags::Sync,
            2 => Flags::ReadIncomplete,
            _ => return None,
        })
    }
}

/// An object's value, tagged by primitive type (§3.5).
///
/// Flattens `original_source`'s `IntObjectValue`/`SIntObjectValue`/
/// `LongObjectValue`/`SLongObjectValue`/... class hierarchy into one enum;
/// the distinction between `int32`/`sint32` and `int64`/`sint64` is a
/// historical artifact of the C++ `int`/`short int`/`long long`/`long`
/// split and carries no behavioural difference here, so both members of
/// each pair share a Rust primitive.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectValue {
    /// `int32`.
    Int32(i32),
    /// `sint32`.
    SInt32(i32),
    /// `int64`.
    Int64(i64),
    /// `sint64`.
    SInt64(i64),
    /// `string`.
    Str(String),
    /// `bytes`.
    Bytes(Vec<u8>),
    /// `float32`.
    Float32(f32),
    /// `float64`.
    Float64(f64),
    /// `bool`.
    Bool(bool),
}

/// Authentication policy block (§3.5), carried opaquely: this layer
/// neither interprets `options` nor implements an authentication
/// protocol (§1 "policy plug-ins... only the interface is built").
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AuthPolicy {
    /// Authentication policy name.
    pub name: String,
    /// Policy versions the sender supports.
    pub versions: Vec<String>,
    /// Policy-specific parameters, opaque to CDAP.
    pub options: Vec<u8>,
}

/// A source or destination AE/AP naming tuple (§3.5), mandatory only on
/// `Connect`/`ConnectR`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ApNamingInfo {
    /// Application-process name.
    pub ap_name: Option<String>,
    /// Application-process instance id.
    pub ap_inst: Option<String>,
    /// Application-entity name.
    pub ae_name: Option<String>,
    /// Application-entity instance id.
    pub ae_inst: Option<String>,
}

/// A CDAP message (§3.5).
#[derive(Clone, Debug, PartialEq)]
pub struct CdapMessage {
    /// Message type.
    pub opcode: Opcode,
    /// Message-level flags.
    pub flags: Flags,
    /// Unique id pairing a request with its response.
    pub invoke_id: u32,
    /// CDAP protocol version this message conforms to. Mandatory on
    /// `Connect`/`ConnectR`.
    pub abs_syntax: Option<i32>,
    /// RIB/object-vocabulary version in use for this conversation.
    /// Mandatory on `Connect`/`ConnectR`.
    pub version: Option<i64>,
    /// Target object's class.
    pub obj_class: Option<String>,
    /// Target object's instance id.
    pub obj_inst: Option<i64>,
    /// Target object's hierarchical name.
    pub obj_name: Option<String>,
    /// Target object's value; only ever present on `Read`/`ReadR` (and
    /// then only on `ReadR` when `result == Some(0)`) per §4.4's message
    /// validator.
    pub obj_value: Option<ObjectValue>,
    /// Operation result code. Mandatory on responses, forbidden on
    /// requests.
    pub result: Option<i32>,
    /// Human-readable elaboration of `result`.
    pub result_reason: Option<String>,
    /// Depth of the object tree at the destination this operation
    /// (subject to `filter`) applies to; absent or `0` means only the
    /// targeted object.
    pub scope: Option<i32>,
    /// Opaque filter predicate; this layer does not interpret it (§4.4).
    pub filter: Option<Vec<u8>>,
    /// Authentication parameters, mandatory on `Connect`/`ConnectR`.
    pub auth_policy: Option<AuthPolicy>,
    /// Source AE/AP naming tuple.
    pub src: Option<ApNamingInfo>,
    /// Destination AE/AP naming tuple.
    pub dst: Option<ApNamingInfo>,
}

impl CdapMessage {
    /// Builds the minimal message for `opcode`, with every optional field
    /// unset. Callers fill in whichever fields the opcode requires.
    pub fn new(opcode: Opcode, invoke_id: u32) -> Self {
        Self {
            opcode,
            flags: Flags::None,
            invoke_id,
            abs_syntax: None,
            version: None,
            obj_class: None,
            obj_inst: None,
            obj_name: None,
            obj_value: None,
            result: None,
            result_reason: None,
            scope: None,
            filter: None,
            auth_policy: None,
            src: None,
            dst: None,
        }
    }
}
