//! Application-tagged property values, and the encode/decode glue on top of
//! `bacnet-rs`'s primitive tag codecs. The upstream crate has no generic
//! "decoded property value" type of its own — the teacher decodes ad hoc at
//! the call site via `bacnet_rs::encoding::decode_real` (`bacnet-mqtt-gateway
//! /src/main.rs`) — so this module owns the value type this crate's tables
//! and operations pass around, and dispatches to the matching
//! `bacnet_rs::encoding` primitive by the leading application tag byte.

use bacnet_rs::encoding::advanced::bitstring::{decode_bit_string, encode_bit_string};
use bacnet_rs::encoding::{
    decode_application_tag, decode_boolean, decode_character_string, decode_enumerated,
    decode_object_identifier, decode_real, decode_signed, decode_unsigned, encode_application_tag,
    encode_boolean, encode_character_string, encode_enumerated, encode_object_identifier,
    encode_real, encode_signed, encode_unsigned, ApplicationTag,
};
use bacnet_rs::object::ObjectType;

/// A decoded (or to-be-encoded) application-tagged property value. Mirrors
/// the application tags this crate's services actually exchange; BACnet's
/// constructed/array property encodings are out of scope.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Unsigned(u32),
    Signed(i32),
    Real(f32),
    CharacterString(String),
    Enumerated(u32),
    BitString(Vec<bool>),
    Date(u16, u8, u8, u8),
    Time(u8, u8, u8, u8),
    ObjectIdentifier(ObjectType, u32),
    /// A decodable application tag this crate doesn't model a variant for.
    Unknown(Vec<u8>),
}

/// Decode a raw application-tagged property value. Empty data (a server that
/// answered with a zero-length value) decodes as `Null` rather than failing.
pub fn decode_property_value(data: &[u8]) -> Option<PropertyValue> {
    if data.is_empty() {
        return Some(PropertyValue::Null);
    }
    decode_any_application_value(data).map(|(value, _)| value)
}

/// Dispatch on the leading application tag to the matching
/// `bacnet_rs::encoding` decoder.
fn decode_any_application_value(data: &[u8]) -> Option<(PropertyValue, usize)> {
    let (tag, _length, _consumed) = decode_application_tag(data).ok()?;
    match tag {
        ApplicationTag::Null => Some((PropertyValue::Null, 1)),
        ApplicationTag::Boolean => decode_boolean(data).ok().map(|(v, n)| (PropertyValue::Boolean(v), n)),
        ApplicationTag::UnsignedInt => decode_unsigned(data).ok().map(|(v, n)| (PropertyValue::Unsigned(v), n)),
        ApplicationTag::SignedInt => decode_signed(data).ok().map(|(v, n)| (PropertyValue::Signed(v), n)),
        ApplicationTag::Real => decode_real(data).ok().map(|(v, n)| (PropertyValue::Real(v), n)),
        ApplicationTag::CharacterString => decode_character_string(data)
            .ok()
            .map(|(v, n)| (PropertyValue::CharacterString(v), n)),
        ApplicationTag::Enumerated => decode_enumerated(data).ok().map(|(v, n)| (PropertyValue::Enumerated(v), n)),
        ApplicationTag::ObjectIdentifier => decode_object_identifier(data).ok().and_then(|((raw_type, instance), n)| {
            ObjectType::try_from(raw_type)
                .ok()
                .map(|object_type| (PropertyValue::ObjectIdentifier(object_type, instance), n))
        }),
        ApplicationTag::BitString => decode_bit_string(data).ok().map(|(bits, n)| (PropertyValue::BitString(bits), n)),
        _ => None,
    }
}

/// Encode a value into its application-tagged wire representation, using the
/// matching `bacnet_rs::encoding` primitive encoder.
pub fn encode_property_value(value: &PropertyValue) -> Vec<u8> {
    let mut buffer = Vec::new();
    match value {
        PropertyValue::Null => {
            let _ = encode_application_tag(&mut buffer, ApplicationTag::Null, 0);
        }
        PropertyValue::Boolean(b) => {
            let _ = encode_boolean(&mut buffer, *b);
        }
        PropertyValue::Unsigned(u) => {
            let _ = encode_unsigned(&mut buffer, *u);
        }
        PropertyValue::Signed(i) => {
            let _ = encode_signed(&mut buffer, *i);
        }
        PropertyValue::Real(f) => {
            let _ = encode_real(&mut buffer, *f);
        }
        PropertyValue::CharacterString(s) => {
            let _ = encode_character_string(&mut buffer, s);
        }
        PropertyValue::Enumerated(e) => {
            let _ = encode_enumerated(&mut buffer, *e);
        }
        PropertyValue::BitString(bits) => {
            let _ = encode_bit_string(&mut buffer, bits);
        }
        PropertyValue::ObjectIdentifier(object_type, instance) => {
            let _ = encode_object_identifier(&mut buffer, *object_type as u16, *instance);
        }
        PropertyValue::Date(..) | PropertyValue::Time(..) | PropertyValue::Unknown(_) => {}
    }
    buffer
}
