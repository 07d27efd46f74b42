//! The CDAP wire codec (§4.5, §6.3): pure, stateless `encode`/`decode`
//! functions defining the on-the-wire byte layout. Decode errors are
//! always [`CdapError::MalformedMessage`] and never touch session state.
//!
//! A fixed-size prefix (opcode, flags, invoke-id) is followed by the
//! presence-tagged `abs-syntax`/`version` fields and then a run of
//! tag/length/value fields for everything else optional, in the style of
//! `dtsv::pdu`'s PCI encoding but with explicit per-field tags rather than
//! a presence bitmask, since CDAP carries far more optional fields than a
//! control PDU does. The tag numbers below are part of the interop
//! contract (§6.3) and must never be renumbered.
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, BytesMut};

use crate::error::{CdapError, Result};
use crate::message::{ApNamingInfo, AuthPolicy, CdapMessage, Flags, ObjectValue, Opcode};

/// Fixed-size prefix before the presence-tagged `abs_syntax`/`version`
/// fields: opcode, flags, invoke_id. The rest of the header is variable
/// length (each of `abs_syntax`/`version` is a presence byte optionally
/// followed by its value), so `decode` walks it with a cursor rather than
/// a constant offset.
const FIXED_HEADER_LEN: usize = 1 + 1 + 4;

const TAG_OBJ_CLASS: u8 = 1;
const TAG_OBJ_INST: u8 = 2;
const TAG_OBJ_NAME: u8 = 3;
const TAG_OBJ_VALUE: u8 = 4;
const TAG_RESULT: u8 = 5;
const TAG_RESULT_REASON: u8 = 6;
const TAG_SCOPE: u8 = 7;
const TAG_FILTER: u8 = 8;
const TAG_AUTH_POLICY: u8 = 9;
const TAG_SRC: u8 = 10;
const TAG_DST: u8 = 11;

/// Encodes `msg` to its wire representation.
pub fn encode(msg: &CdapMessage) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(FIXED_HEADER_LEN + 16);
    buf.put_u8(msg.opcode.to_raw());
    buf.put_u8(msg.flags.to_raw());
    put_u32(&mut buf, msg.invoke_id);
    match msg.abs_syntax {
        Some(v) => {
            buf.put_u8(1);
            put_i32(&mut buf, v);
        }
        None => buf.put_u8(0),
    }
    match msg.version {
        Some(v) => {
            buf.put_u8(1);
            put_i64(&mut buf, v);
        }
        None => buf.put_u8(0),
    }

    if let Some(v) = &msg.obj_class {
        put_tlv_str(&mut buf, TAG_OBJ_CLASS, v);
    }
    if let Some(v) = msg.obj_inst {
        put_tlv(&mut buf, TAG_OBJ_INST, 8, |b| put_i64(b, v));
    }
    if let Some(v) = &msg.obj_name {
        put_tlv_str(&mut buf, TAG_OBJ_NAME, v);
    }
    if let Some(v) = &msg.obj_value {
        put_tlv_value(&mut buf, TAG_OBJ_VALUE, v);
    }
    if let Some(v) = msg.result {
        put_tlv(&mut buf, TAG_RESULT, 4, |b| put_i32(b, v));
    }
    if let Some(v) = &msg.result_reason {
        put_tlv_str(&mut buf, TAG_RESULT_REASON, v);
    }
    if let Some(v) = msg.scope {
        put_tlv(&mut buf, TAG_SCOPE, 4, |b| put_i32(b, v));
    }
    if let Some(v) = &msg.filter {
        put_tlv_bytes(&mut buf, TAG_FILTER, v);
    }
    if let Some(v) = &msg.auth_policy {
        put_tlv_auth_policy(&mut buf, v);
    }
    if let Some(v) = &msg.src {
        put_tlv_naming(&mut buf, TAG_SRC, v);
    }
    if let Some(v) = &msg.dst {
        put_tlv_naming(&mut buf, TAG_DST, v);
    }

    buf.to_vec()
}

/// Decodes a message from its wire representation.
pub fn decode(bytes: &[u8]) -> Result<CdapMessage> {
    if bytes.len() < FIXED_HEADER_LEN {
        return Err(CdapError::MalformedMessage);
    }
    let opcode = Opcode::from_raw(bytes[0]).ok_or(CdapError::MalformedMessage)?;
    let flags = Flags::from_raw(bytes[1]).ok_or(CdapError::MalformedMessage)?;
    let invoke_id = BigEndian::read_u32(&bytes[2..6]);

    let mut cursor = FIXED_HEADER_LEN;
    let abs_syntax = take_opt_i32_field(bytes, &mut cursor)?;
    let version = take_opt_i64_field(bytes, &mut cursor)?;

    let mut msg = CdapMessage::new(opcode, invoke_id);
    msg.flags = flags;
    msg.abs_syntax = abs_syntax;
    msg.version = version;

    let mut rest = &bytes[cursor..];
    while !rest.is_empty() {
        if rest.len() < 5 {
            return Err(CdapError::MalformedMessage);
        }
        let tag = rest[0];
        let len = BigEndian::read_u32(&rest[1..5]) as usize;
        if rest.len() < 5 + len {
            return Err(CdapError::MalformedMessage);
        }
        let value = &rest[5..5 + len];
        match tag {
            TAG_OBJ_CLASS => msg.obj_class = Some(read_str(value)?),
            TAG_OBJ_INST => msg.obj_inst = Some(read_i64(value)?),
            TAG_OBJ_NAME => msg.obj_name = Some(read_str(value)?),
            TAG_OBJ_VALUE => msg.obj_value = Some(read_value(value)?),
            TAG_RESULT => msg.result = Some(read_i32(value)?),
            TAG_RESULT_REASON => msg.result_reason = Some(read_str(value)?),
            TAG_SCOPE => msg.scope = Some(read_i32(value)?),
            TAG_FILTER => msg.filter = Some(value.to_vec()),
            TAG_AUTH_POLICY => msg.auth_policy = Some(read_auth_policy(value)?),
            TAG_SRC => msg.src = Some(read_naming(value)?),
            TAG_DST => msg.dst = Some(read_naming(value)?),
            _ => return Err(CdapError::MalformedMessage),
        }
        rest = &rest[5 + len..];
    }

    Ok(msg)
}

fn put_u32(buf: &mut BytesMut, v: u32) {
    let mut tmp = [0u8; 4];
    BigEndian::write_u32(&mut tmp, v);
    buf.put_slice(&tmp);
}

fn put_i32(buf: &mut BytesMut, v: i32) {
    let mut tmp = [0u8; 4];
    BigEndian::write_i32(&mut tmp, v);
    buf.put_slice(&tmp);
}

fn put_i64(buf: &mut BytesMut, v: i64) {
    let mut tmp = [0u8; 8];
    BigEndian::write_i64(&mut tmp, v);
    buf.put_slice(&tmp);
}

fn put_f32(buf: &mut BytesMut, v: f32) {
    let mut tmp = [0u8; 4];
    BigEndian::write_f32(&mut tmp, v);
    buf.put_slice(&tmp);
}

fn put_f64(buf: &mut BytesMut, v: f64) {
    let mut tmp = [0u8; 8];
    BigEndian::write_f64(&mut tmp, v);
    buf.put_slice(&tmp);
}

/// Writes a TLV header (`tag`, `len`) followed by whatever `write_value`
/// puts into the buffer; `len` must match exactly what `write_value`
/// writes.
fn put_tlv(buf: &mut BytesMut, tag: u8, len: u32, write_value: impl FnOnce(&mut BytesMut)) {
    buf.put_u8(tag);
    put_u32(buf, len);
    write_value(buf);
}

fn put_tlv_str(buf: &mut BytesMut, tag: u8, value: &str) {
    put_tlv(buf, tag, value.len() as u32, |b| b.put_slice(value.as_bytes()));
}

fn put_tlv_bytes(buf: &mut BytesMut, tag: u8, value: &[u8]) {
    put_tlv(buf, tag, value.len() as u32, |b| b.put_slice(value));
}

fn put_tlv_value(buf: &mut BytesMut, tag: u8, value: &ObjectValue) {
    let mut body = BytesMut::new();
    match value {
        ObjectValue::Int32(v) => {
            body.put_u8(0);
            put_i32(&mut body, *v);
        }
        ObjectValue::SInt32(v) => {
            body.put_u8(1);
            put_i32(&mut body, *v);
        }
        ObjectValue::Int64(v) => {
            body.put_u8(2);
            put_i64(&mut body, *v);
        }
        ObjectValue::SInt64(v) => {
            body.put_u8(3);
            put_i64(&mut body, *v);
        }
        ObjectValue::Str(v) => {
            body.put_u8(4);
            body.put_slice(v.as_bytes());
        }
        ObjectValue::Bytes(v) => {
            body.put_u8(5);
            body.put_slice(v);
        }
        ObjectValue::Float32(v) => {
            body.put_u8(6);
            put_f32(&mut body, *v);
        }
        ObjectValue::Float64(v) => {
            body.put_u8(7);
            put_f64(&mut body, *v);
        }
        ObjectValue::Bool(v) => {
            body.put_u8(8);
            body.put_u8(if *v { 1 } else { 0 });
        }
    }
    put_tlv_bytes(buf, tag, &body);
}

fn put_tlv_auth_policy(buf: &mut BytesMut, policy: &AuthPolicy) {
    let mut body = BytesMut::new();
    put_str_field(&mut body, &policy.name);
    put_u32(&mut body, policy.versions.len() as u32);
    for v in &policy.versions {
        put_str_field(&mut body, v);
    }
    put_u32(&mut body, policy.options.len() as u32);
    body.put_slice(&policy.options);
    put_tlv_bytes(buf, TAG_AUTH_POLICY, &body);
}

fn put_tlv_naming(buf: &mut BytesMut, tag: u8, naming: &ApNamingInfo) {
    let mut body = BytesMut::new();
    put_opt_str_field(&mut body, &naming.ap_name);
    put_opt_str_field(&mut body, &naming.ap_inst);
    put_opt_str_field(&mut body, &naming.ae_name);
    put_opt_str_field(&mut body, &naming.ae_inst);
    put_tlv_bytes(buf, tag, &body);
}

fn put_str_field(buf: &mut BytesMut, value: &str) {
    put_u32(buf, value.len() as u32);
    buf.put_slice(value.as_bytes());
}

fn put_opt_str_field(buf: &mut BytesMut, value: &Option<String>) {
    match value {
        Some(v) => {
            buf.put_u8(1);
            put_str_field(buf, v);
        }
        None => buf.put_u8(0),
    }
}

fn read_i32(bytes: &[u8]) -> Result<i32> {
    if bytes.len() != 4 {
        return Err(CdapError::MalformedMessage);
    }
    Ok(BigEndian::read_i32(bytes))
}

fn read_i64(bytes: &[u8]) -> Result<i64> {
    if bytes.len() != 8 {
        return Err(CdapError::MalformedMessage);
    }
    Ok(BigEndian::read_i64(bytes))
}

fn read_f32(bytes: &[u8]) -> Result<f32> {
    if bytes.len() != 4 {
        return Err(CdapError::MalformedMessage);
    }
    Ok(BigEndian::read_f32(bytes))
}

fn read_f64(bytes: &[u8]) -> Result<f64> {
    if bytes.len() != 8 {
        return Err(CdapError::MalformedMessage);
    }
    Ok(BigEndian::read_f64(bytes))
}

fn read_str(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CdapError::MalformedMessage)
}

fn read_value(bytes: &[u8]) -> Result<ObjectValue> {
    if bytes.is_empty() {
        return Err(CdapError::MalformedMessage);
    }
    let (tag, rest) = (bytes[0], &bytes[1..]);
    Ok(match tag {
        0 => ObjectValue::Int32(read_i32(rest)?),
        1 => ObjectValue::SInt32(read_i32(rest)?),
        2 => ObjectValue::Int64(read_i64(rest)?),
        3 => ObjectValue::SInt64(read_i64(rest)?),
        4 => ObjectValue::Str(read_str(rest)?),
        5 => ObjectValue::Bytes(rest.to_vec()),
        6 => ObjectValue::Float32(read_f32(rest)?),
        7 => ObjectValue::Float64(read_f64(rest)?),
        8 => {
            if rest.len() != 1 {
                return Err(CdapError::MalformedMessage);
            }
            ObjectValue::Bool(rest[0] != 0)
        }
        _ => return Err(CdapError::MalformedMessage),
    })
}

/// Reads one length-prefixed string field, advancing `cursor` past it.
fn take_str_field(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    if bytes.len() < *cursor + 4 {
        return Err(CdapError::MalformedMessage);
    }
    let len = BigEndian::read_u32(&bytes[*cursor..*cursor + 4]) as usize;
    *cursor += 4;
    if bytes.len() < *cursor + len {
        return Err(CdapError::MalformedMessage);
    }
    let value = read_str(&bytes[*cursor..*cursor + len])?;
    *cursor += len;
    Ok(value)
}

fn take_opt_str_field(bytes: &[u8], cursor: &mut usize) -> Result<Option<String>> {
    if bytes.len() <= *cursor {
        return Err(CdapError::MalformedMessage);
    }
    let present = bytes[*cursor];
    *cursor += 1;
    match present {
        0 => Ok(None),
        1 => Ok(Some(take_str_field(bytes, cursor)?)),
        _ => Err(CdapError::MalformedMessage),
    }
}

/// Reads a presence byte followed, if set, by a big-endian `i32` —
/// the `abs_syntax` header field's encoding.
fn take_opt_i32_field(bytes: &[u8], cursor: &mut usize) -> Result<Option<i32>> {
    if bytes.len() <= *cursor {
        return Err(CdapError::MalformedMessage);
    }
    let present = bytes[*cursor];
    *cursor += 1;
    match present {
        0 => Ok(None),
        1 => {
            if bytes.len() < *cursor + 4 {
                return Err(CdapError::MalformedMessage);
            }
            let v = BigEndian::read_i32(&bytes[*cursor..*cursor + 4]);
            *cursor += 4;
            Ok(Some(v))
        }
        _ => Err(CdapError::MalformedMessage),
    }
}

/// Reads a presence byte followed, if set, by a big-endian `i64` —
/// the `version` header field's encoding.
fn take_opt_i64_field(bytes: &[u8], cursor: &mut usize) -> Result<Option<i64>> {
    if bytes.len() <= *cursor {
        return Err(CdapError::MalformedMessage);
    }
    let present = bytes[*cursor];
    *cursor += 1;
    match present {
        0 => Ok(None),
        1 => {
            if bytes.len() < *cursor + 8 {
                return Err(CdapError::MalformedMessage);
            }
            let v = BigEndian::read_i64(&bytes[*cursor..*cursor + 8]);
            *cursor += 8;
            Ok(Some(v))
        }
        _ => Err(CdapError::MalformedMessage),
    }
}

fn read_auth_policy(bytes: &[u8]) -> Result<AuthPolicy> {
    let mut cursor = 0;
    let name = take_str_field(bytes, &mut cursor)?;
    if bytes.len() < cursor + 4 {
        return Err(CdapError::MalformedMessage);
    }
    let count = BigEndian::read_u32(&bytes[cursor..cursor + 4]) as usize;
    cursor += 4;
    let mut versions = Vec::with_capacity(count);
    for _ in 0..count {
        versions.push(take_str_field(bytes, &mut cursor)?);
    }
    if bytes.len() < cursor + 4 {
        return Err(CdapError::MalformedMessage);
    }
    let options_len = BigEndian::read_u32(&bytes[cursor..cursor + 4]) as usize;
    cursor += 4;
    if bytes.len() < cursor + options_len {
        return Err(CdapError::MalformedMessage);
    }
    let options = bytes[cursor..cursor + options_len].to_vec();
    Ok(AuthPolicy {
        name,
        versions,
        options,
    })
}

fn read_naming(bytes: &[u8]) -> Result<ApNamingInfo> {
    let mut cursor = 0;
    let ap_name = take_opt_str_field(bytes, &mut cursor)?;
    let ap_inst = take_opt_str_field(bytes, &mut cursor)?;
    let ae_name = take_opt_str_field(bytes, &mut cursor)?;
    let ae_inst = take_opt_str_field(bytes, &mut cursor)?;
    Ok(ApNamingInfo {
        ap_name,
        ap_inst,
        ae_name,
        ae_inst,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ApNamingInfo;

    fn sample_connect() -> CdapMessage {
        let mut msg = CdapMessage::new(Opcode::Connect, 42);
        msg.flags = Flags::Sync;
        msg.abs_syntax = Some(1);
        msg.version = Some(1);
        msg.auth_policy = Some(AuthPolicy {
            name: "default".into(),
            versions: vec!["1".into(), "2".into()],
            options: vec![1, 2, 3],
        });
        msg.src = Some(ApNamingInfo {
            ap_name: Some("A".into()),
            ap_inst: None,
            ae_name: Some("mgmt".into()),
            ae_inst: None,
        });
        msg.dst = Some(ApNamingInfo {
            ap_name: Some("B".into()),
            ..Default::default()
        });
        msg
    }

    #[test]
    fn connect_round_trips() {
        let msg = sample_connect();
        assert_eq!(decode(&encode(&msg)).unwrap(), msg);
    }

    #[test]
    fn read_r_with_every_value_type_round_trips() {
        for value in [
            ObjectValue::Int32(-7),
            ObjectValue::SInt32(7),
            ObjectValue::Int64(-7),
            ObjectValue::SInt64(7),
            ObjectValue::Str("hello".into()),
            ObjectValue::Bytes(vec![1, 2, 3]),
            ObjectValue::Bool(true),
        ] {
            let mut msg = CdapMessage::new(Opcode::ReadR, 1);
            msg.result = Some(0);
            msg.obj_value = Some(value);
            assert_eq!(decode(&encode(&msg)).unwrap(), msg);
        }
    }

    #[test]
    fn float_values_round_trip() {
        let mut msg = CdapMessage::new(Opcode::ReadR, 1);
        msg.result = Some(0);
        msg.obj_value = Some(ObjectValue::Float64(1.5));
        assert_eq!(decode(&encode(&msg)).unwrap(), msg);
    }

    #[test]
    fn create_request_round_trips() {
        let mut msg = CdapMessage::new(Opcode::Create, 3);
        msg.obj_class = Some("flow".into());
        msg.obj_inst = Some(5);
        msg.obj_name = Some("A=1,B=2".into());
        msg.scope = Some(2);
        msg.filter = Some(vec![9, 9]);
        assert_eq!(decode(&encode(&msg)).unwrap(), msg);
    }

    #[test]
    fn truncated_bytes_are_malformed() {
        assert_eq!(decode(&[0u8; 4]).unwrap_err(), CdapError::MalformedMessage);
    }

    #[test]
    fn unknown_opcode_byte_is_malformed() {
        let mut bytes = encode(&CdapMessage::new(Opcode::Release, 1));
        bytes[0] = 255;
        assert_eq!(decode(&bytes).unwrap_err(), CdapError::MalformedMessage);
    }

    #[test]
    fn truncated_tlv_length_is_malformed() {
        let mut bytes = encode(&sample_connect());
        bytes.truncate(bytes.len() - 1);
        assert_eq!(decode(&bytes).unwrap_err(), CdapError::MalformedMessage);
    }
}
