//! The CDAP message validator (§4.4): mandatory/forbidden-field rules per
//! opcode, independent of session state.
//!
//! Grounded on `original_source/librina/include/librina/cdap.h`'s
//! `CDAPMessageValidator`, collapsed from one `validate*` method per field
//! into a single pass over the rules §4.4 actually states.
use crate::error::{CdapError, Result};
use crate::message::{CdapMessage, Opcode};

/// Validates `msg` against the mandatory/forbidden-field rules for its
/// opcode. Purely structural — does not consult session state.
pub fn validate(msg: &CdapMessage) -> Result<()> {
    if matches!(msg.opcode, Opcode::Connect | Opcode::ConnectR) {
        if msg.abs_syntax.is_none() {
            return Err(CdapError::MandatoryFieldMissing("abs_syntax"));
        }
        if msg.version.is_none() {
            return Err(CdapError::MandatoryFieldMissing("version"));
        }
    }

    // dest_ap_name is mandatory on the request, optional on the response
    // (original_source/librina/include/librina/cdap.h's field comment).
    if msg.opcode == Opcode::Connect
        && msg.dst.as_ref().and_then(|d| d.ap_name.as_ref()).is_none()
    {
        return Err(CdapError::MandatoryFieldMissing("dst.ap_name"));
    }

    if msg.opcode.is_request() {
        if msg.result.is_some() {
            return Err(CdapError::ForbiddenFieldPresent("result"));
        }
        if msg.result_reason.is_some() {
            return Err(CdapError::ForbiddenFieldPresent("result_reason"));
        }
    } else {
        // All responses forbid a value unless result == 0 for READ_R.
        let value_allowed = msg.opcode == Opcode::ReadR && msg.result == Some(0);
        if msg.obj_value.is_some() && !value_allowed {
            return Err(CdapError::ForbiddenFieldPresent("obj_value"));
        }
    }

    Ok(())
}
