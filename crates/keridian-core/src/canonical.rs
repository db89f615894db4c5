//! Canonical CBOR encoding for key events and witness receipts.
//!
//! Hashed content must encode identically everywhere, so this module
//! hand-rolls the RFC 8949 core deterministic profile: small integer map
//! keys, map entries sorted by encoded key bytes, definite lengths,
//! shortest-form integers, no floats. Decoding goes through
//! [`ciborium`] and then re-encodes to confirm the input was canonical;
//! a message whose bytes differ from its own canonical form is rejected,
//! which keeps every logical event at exactly one wire form and one
//! digest.
//!
//! Wire layout:
//! - event message = canonical event map, then a CBOR array of
//!   `[key index, signature bytes]` pairs
//! - receipt message = canonical receipt map, then 64 raw signature bytes

use ciborium::value::Value;
use std::io::Cursor;

use crate::crypto::{Ed25519PublicKey, Ed25519Signature};
use crate::error::CoreError;
use crate::event::{
    ConfigTrait, EventKind, EventMessage, IndexedSignature, KeyEvent, Seal, EVENT_VERSION,
    MAX_ANCHORS, MAX_KEYS, MAX_SIGNATURES, MAX_WITNESSES,
};
use crate::receipt::{Receipt, RECEIPT_VERSION};
use crate::threshold::{SigningThreshold, Weight};
use crate::types::{Aid, Said};

/// Map keys for the event map. Kept below 24 so every key encodes as a
/// single byte and numeric order equals canonical byte order.
mod keys {
    pub const VERSION: u64 = 0;
    pub const KIND: u64 = 1;
    pub const AID: u64 = 2;
    pub const SEQ: u64 = 3;
    pub const PRIOR: u64 = 4;
    pub const KEYS: u64 = 5;
    pub const THRESHOLD: u64 = 6;
    pub const NEXT_DIGEST: u64 = 7;
    pub const WITNESSES: u64 = 8;
    pub const WITNESS_THRESHOLD: u64 = 9;
    pub const CUTS: u64 = 10;
    pub const ADDS: u64 = 11;
    pub const CONFIG: u64 = 12;
    pub const ANCHORS: u64 = 13;
    pub const DELEGATOR: u64 = 14;
}

/// Map keys for the receipt map.
mod receipt_keys {
    pub const VERSION: u64 = 0;
    pub const AID: u64 = 1;
    pub const SEQ: u64 = 2;
    pub const SAID: u64 = 3;
    pub const WITNESS: u64 = 4;
}

// ─────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────

/// Canonical bytes of the event map alone. This is the digest input for
/// the event's [`Said`].
pub fn event_bytes(event: &KeyEvent) -> Vec<u8> {
    let value = event_to_cbor_value(event);
    let mut buf = Vec::new();
    encode_value_to(&value, &mut buf);
    buf
}

/// Canonical bytes of the event with the identifier zeroed: the
/// self-addressing digest input for inceptions.
pub fn inception_digest_bytes(event: &KeyEvent) -> Vec<u8> {
    let mut zeroed = event.clone();
    zeroed.aid = Aid::ZERO;
    event_bytes(&zeroed)
}

/// Full wire bytes of an event message: event map then signatures.
pub fn message_bytes(message: &EventMessage) -> Vec<u8> {
    let mut buf = event_bytes(&message.event);
    let sigs = signatures_to_cbor_value(&message.signatures);
    encode_value_to(&sigs, &mut buf);
    buf
}

/// Canonical bytes of a bare key list: the pre-rotation commitment
/// input. Commit and reveal must use this same encoding.
pub fn key_list_bytes(keys: &[Ed25519PublicKey]) -> Vec<u8> {
    let value = Value::Array(keys.iter().map(|k| byte_string(k.as_bytes())).collect());
    let mut buf = Vec::new();
    encode_value_to(&value, &mut buf);
    buf
}

/// Canonical bytes of the receipt map alone.
pub fn receipt_header_bytes(receipt: &Receipt) -> Vec<u8> {
    let value = receipt_to_cbor_value(receipt);
    let mut buf = Vec::new();
    encode_value_to(&value, &mut buf);
    buf
}

/// Full wire bytes of a receipt: receipt map then the raw signature.
pub fn receipt_bytes(receipt: &Receipt) -> Vec<u8> {
    let mut buf = receipt_header_bytes(receipt);
    buf.extend_from_slice(&receipt.signature.0);
    buf
}

fn uint(n: u64) -> Value {
    Value::Integer(n.into())
}

fn byte_string(bytes: &[u8]) -> Value {
    Value::Bytes(bytes.to_vec())
}

fn event_to_cbor_value(event: &KeyEvent) -> Value {
    let kind = event.kind;
    let mut entries: Vec<(Value, Value)> = vec![
        (uint(keys::VERSION), uint(event.version as u64)),
        (uint(keys::KIND), uint(kind.to_u8() as u64)),
        (uint(keys::AID), byte_string(event.aid.as_bytes())),
        (uint(keys::SEQ), uint(event.seq)),
    ];

    if kind.has_prior() {
        entries.push((uint(keys::PRIOR), byte_string(event.prior.as_bytes())));
    }

    if kind.is_establishment() {
        entries.push((
            uint(keys::KEYS),
            Value::Array(
                event
                    .keys
                    .iter()
                    .map(|k| byte_string(k.as_bytes()))
                    .collect(),
            ),
        ));
        if let Some(threshold) = &event.threshold {
            entries.push((uint(keys::THRESHOLD), threshold_to_cbor_value(threshold)));
        }
        entries.push((
            uint(keys::NEXT_DIGEST),
            byte_string(event.next_digest.as_bytes()),
        ));
        entries.push((
            uint(keys::WITNESS_THRESHOLD),
            uint(event.witness_threshold as u64),
        ));
    }

    if kind.is_inception() {
        entries.push((
            uint(keys::WITNESSES),
            Value::Array(
                event
                    .witnesses
                    .iter()
                    .map(|k| byte_string(k.as_bytes()))
                    .collect(),
            ),
        ));
        entries.push((
            uint(keys::CONFIG),
            Value::Array(
                event
                    .config
                    .iter()
                    .map(|c| uint(c.to_u8() as u64))
                    .collect(),
            ),
        ));
    }

    if kind.is_rotation() {
        entries.push((
            uint(keys::CUTS),
            Value::Array(
                event
                    .witness_cuts
                    .iter()
                    .map(|k| byte_string(k.as_bytes()))
                    .collect(),
            ),
        ));
        entries.push((
            uint(keys::ADDS),
            Value::Array(
                event
                    .witness_adds
                    .iter()
                    .map(|k| byte_string(k.as_bytes()))
                    .collect(),
            ),
        ));
    }

    entries.push((
        uint(keys::ANCHORS),
        Value::Array(event.anchors.iter().map(seal_to_cbor_value).collect()),
    ));

    if kind == EventKind::DelegatedInception {
        if let Some(delegator) = &event.delegator {
            entries.push((uint(keys::DELEGATOR), byte_string(delegator.as_bytes())));
        }
    }

    Value::Map(entries)
}

fn seal_to_cbor_value(seal: &Seal) -> Value {
    Value::Array(vec![
        byte_string(seal.aid.as_bytes()),
        uint(seal.seq),
        byte_string(seal.said.as_bytes()),
    ])
}

fn threshold_to_cbor_value(threshold: &SigningThreshold) -> Value {
    match threshold {
        SigningThreshold::Simple(n) => uint(*n),
        SigningThreshold::Weighted(clauses) => Value::Array(
            clauses
                .iter()
                .map(|clause| {
                    Value::Array(
                        clause
                            .iter()
                            .map(|w| Value::Array(vec![uint(w.num()), uint(w.den())]))
                            .collect(),
                    )
                })
                .collect(),
        ),
    }
}

fn signatures_to_cbor_value(signatures: &[IndexedSignature]) -> Value {
    Value::Array(
        signatures
            .iter()
            .map(|s| {
                Value::Array(vec![
                    uint(s.index as u64),
                    byte_string(&s.signature.0),
                ])
            })
            .collect(),
    )
}

fn receipt_to_cbor_value(receipt: &Receipt) -> Value {
    Value::Map(vec![
        (uint(receipt_keys::VERSION), uint(receipt.version as u64)),
        (uint(receipt_keys::AID), byte_string(receipt.aid.as_bytes())),
        (uint(receipt_keys::SEQ), uint(receipt.seq)),
        (uint(receipt_keys::SAID), byte_string(receipt.said.as_bytes())),
        (
            uint(receipt_keys::WITNESS),
            byte_string(receipt.witness.as_bytes()),
        ),
    ])
}

/// Encode a CBOR value in the deterministic profile.
fn encode_value_to(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => encode_integer(buf, i128::from(*i)),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(t) => {
            encode_uint(buf, 3, t.len() as u64);
            buf.extend_from_slice(t.as_bytes());
        }
        Value::Array(items) => {
            encode_uint(buf, 4, items.len() as u64);
            for item in items {
                encode_value_to(item, buf);
            }
        }
        Value::Map(entries) => encode_map_canonical(entries, buf),
        // Floats and the remaining variants never appear in hashed
        // content; the decoder rejects them before re-encoding.
        _ => unreachable!("non-deterministic CBOR value in canonical content"),
    }
}

fn encode_integer(buf: &mut Vec<u8>, value: i128) {
    if value >= 0 {
        encode_uint(buf, 0, value as u64);
    } else {
        encode_uint(buf, 1, (-1 - value) as u64);
    }
}

/// Encode a CBOR header byte plus shortest-form length/value.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let m = major << 5;
    if n < 24 {
        buf.push(m | n as u8);
    } else if n <= 0xff {
        buf.push(m | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(m | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(m | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(m | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map with entries sorted by their encoded key bytes.
fn encode_map_canonical(entries: &[(Value, Value)], buf: &mut Vec<u8>) {
    let mut encoded: Vec<(Vec<u8>, Vec<u8>)> = entries
        .iter()
        .map(|(k, v)| {
            let mut kb = Vec::new();
            encode_value_to(k, &mut kb);
            let mut vb = Vec::new();
            encode_value_to(v, &mut vb);
            (kb, vb)
        })
        .collect();
    encoded.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, encoded.len() as u64);
    for (k, v) in encoded {
        buf.extend_from_slice(&k);
        buf.extend_from_slice(&v);
    }
}

// ─────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────

/// Decode an event message from wire bytes.
///
/// Rejects anything that is not the canonical encoding of the decoded
/// message, including trailing bytes.
pub fn decode_message(bytes: &[u8]) -> Result<EventMessage, CoreError> {
    if bytes.is_empty() {
        return Err(CoreError::MalformedEvent("empty input".to_string()));
    }

    let event_value: Value = ciborium::from_reader(Cursor::new(bytes))
        .map_err(|e| CoreError::MalformedEvent(format!("cbor: {}", e)))?;
    let event = cbor_value_to_event(&event_value)?;

    let canonical = event_bytes(&event);
    if bytes.len() < canonical.len() || bytes[..canonical.len()] != canonical[..] {
        return Err(CoreError::MalformedEvent(
            "non-canonical event encoding".to_string(),
        ));
    }

    let rest = &bytes[canonical.len()..];
    let sig_value: Value = ciborium::from_reader(Cursor::new(rest))
        .map_err(|_| CoreError::MalformedEvent("truncated signature section".to_string()))?;
    let signatures = cbor_value_to_signatures(&sig_value)?;

    let mut sig_canonical = Vec::new();
    encode_value_to(&signatures_to_cbor_value(&signatures), &mut sig_canonical);
    if sig_canonical[..] != rest[..] {
        return Err(CoreError::MalformedEvent(
            "non-canonical signature section".to_string(),
        ));
    }

    Ok(EventMessage { event, signatures })
}

/// Decode a witness receipt from wire bytes.
pub fn decode_receipt(bytes: &[u8]) -> Result<Receipt, CoreError> {
    // Smallest possible receipt: one-byte header fields plus signature.
    if bytes.len() < 64 + 8 {
        return Err(CoreError::MalformedReceipt("too short".to_string()));
    }

    let header_value: Value = ciborium::from_reader(Cursor::new(bytes))
        .map_err(|e| CoreError::MalformedReceipt(format!("cbor: {}", e)))?;
    let mut receipt = cbor_value_to_receipt(&header_value)?;

    let header = receipt_header_bytes(&receipt);
    if bytes.len() < header.len() || bytes[..header.len()] != header[..] {
        return Err(CoreError::MalformedReceipt(
            "non-canonical receipt encoding".to_string(),
        ));
    }

    let sig_bytes = &bytes[header.len()..];
    let arr: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| CoreError::MalformedReceipt("signature must be 64 bytes".to_string()))?;
    receipt.signature = Ed25519Signature(arr);
    Ok(receipt)
}

fn malformed(msg: impl Into<String>) -> CoreError {
    CoreError::MalformedEvent(msg.into())
}

fn map_get<'a>(map: &'a [(Value, Value)], key: u64) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
        .map(|(_, v)| v)
}

fn require<'a>(map: &'a [(Value, Value)], key: u64, name: &str) -> Result<&'a Value, CoreError> {
    map_get(map, key).ok_or_else(|| malformed(format!("missing {}", name)))
}

fn forbid(map: &[(Value, Value)], key: u64, name: &str) -> Result<(), CoreError> {
    if map_get(map, key).is_some() {
        return Err(malformed(format!("unexpected {} for this kind", name)));
    }
    Ok(())
}

fn as_u64(value: &Value, name: &str) -> Result<u64, CoreError> {
    match value {
        Value::Integer(i) => u64::try_from(i128::from(*i))
            .map_err(|_| malformed(format!("{} out of range", name))),
        _ => Err(malformed(format!("{} must be an unsigned integer", name))),
    }
}

fn as_bytes32(value: &Value, name: &str) -> Result<[u8; 32], CoreError> {
    match value {
        Value::Bytes(b) => b
            .as_slice()
            .try_into()
            .map_err(|_| malformed(format!("{} must be 32 bytes", name))),
        _ => Err(malformed(format!("{} must be a byte string", name))),
    }
}

fn as_array<'a>(value: &'a Value, name: &str) -> Result<&'a [Value], CoreError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(malformed(format!("{} must be an array", name))),
    }
}

fn as_key_list(
    value: &Value,
    name: &str,
    max: usize,
) -> Result<Vec<Ed25519PublicKey>, CoreError> {
    let items = as_array(value, name)?;
    if items.len() > max {
        return Err(malformed(format!("{} exceeds {} entries", name, max)));
    }
    items
        .iter()
        .map(|v| as_bytes32(v, name).map(Ed25519PublicKey))
        .collect()
}

fn as_threshold(value: &Value) -> Result<SigningThreshold, CoreError> {
    match value {
        Value::Integer(_) => Ok(SigningThreshold::Simple(as_u64(value, "threshold")?)),
        Value::Array(clauses) => {
            let mut out = Vec::with_capacity(clauses.len());
            for clause in clauses {
                let weights = as_array(clause, "threshold clause")?;
                let mut parsed = Vec::with_capacity(weights.len());
                for weight in weights {
                    let pair = as_array(weight, "weight")?;
                    if pair.len() != 2 {
                        return Err(malformed("weight must be a [num, den] pair"));
                    }
                    let num = as_u64(&pair[0], "weight numerator")?;
                    let den = as_u64(&pair[1], "weight denominator")?;
                    let w = Weight::new(num, den)
                        .map_err(|e| malformed(format!("bad weight: {}", e)))?;
                    parsed.push(w);
                }
                out.push(parsed);
            }
            Ok(SigningThreshold::Weighted(out))
        }
        _ => Err(malformed("threshold must be an integer or clause array")),
    }
}

fn as_config(value: &Value) -> Result<Vec<ConfigTrait>, CoreError> {
    let items = as_array(value, "config")?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let tag = as_u64(item, "config trait")?;
        let tag = u8::try_from(tag).map_err(|_| malformed("config trait out of range"))?;
        let trait_ = ConfigTrait::from_u8(tag)
            .ok_or_else(|| malformed(format!("unknown config trait: {:#04x}", tag)))?;
        if out.contains(&trait_) {
            return Err(malformed("duplicate config trait"));
        }
        out.push(trait_);
    }
    Ok(out)
}

fn as_anchors(value: &Value) -> Result<Vec<Seal>, CoreError> {
    let items = as_array(value, "anchors")?;
    if items.len() > MAX_ANCHORS {
        return Err(malformed(format!("anchors exceed {} entries", MAX_ANCHORS)));
    }
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let triple = as_array(item, "anchor")?;
        if triple.len() != 3 {
            return Err(malformed("anchor must be an [aid, seq, said] triple"));
        }
        out.push(Seal {
            aid: Aid(as_bytes32(&triple[0], "anchor aid")?),
            seq: as_u64(&triple[1], "anchor seq")?,
            said: Said(as_bytes32(&triple[2], "anchor said")?),
        });
    }
    Ok(out)
}

fn cbor_value_to_event(value: &Value) -> Result<KeyEvent, CoreError> {
    let map = match value {
        Value::Map(entries) => entries.as_slice(),
        _ => return Err(malformed("event must be a map")),
    };

    let version = as_u64(require(map, keys::VERSION, "version")?, "version")?;
    let version = u8::try_from(version).map_err(|_| malformed("version out of range"))?;
    if version != EVENT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let kind_tag = as_u64(require(map, keys::KIND, "kind")?, "kind")?;
    let kind_tag = u8::try_from(kind_tag).map_err(|_| malformed("kind out of range"))?;
    let kind = EventKind::from_u8(kind_tag).ok_or(CoreError::UnknownEventKind(kind_tag))?;

    let aid = Aid(as_bytes32(require(map, keys::AID, "aid")?, "aid")?);
    if aid.is_zero() {
        return Err(malformed("zero aid"));
    }
    let seq = as_u64(require(map, keys::SEQ, "seq")?, "seq")?;

    let prior = if kind.has_prior() {
        if seq == 0 {
            return Err(malformed("sequence 0 is reserved for inception"));
        }
        let prior = Said(as_bytes32(require(map, keys::PRIOR, "prior digest")?, "prior digest")?);
        if prior.is_zero() {
            return Err(malformed("zero prior digest"));
        }
        prior
    } else {
        if seq != 0 {
            return Err(malformed("inception sequence must be 0"));
        }
        forbid(map, keys::PRIOR, "prior digest")?;
        Said::ZERO
    };

    let (keys_list, threshold, next_digest, witness_threshold) = if kind.is_establishment() {
        let keys_list = as_key_list(require(map, keys::KEYS, "keys")?, "keys", MAX_KEYS)?;
        if keys_list.is_empty() {
            return Err(malformed("empty key list"));
        }
        let threshold = as_threshold(require(map, keys::THRESHOLD, "threshold")?)?;
        threshold
            .validate(keys_list.len())
            .map_err(|e| malformed(e.to_string()))?;
        let next_digest = Said(as_bytes32(
            require(map, keys::NEXT_DIGEST, "next-key digest")?,
            "next-key digest",
        )?);
        let toad = as_u64(
            require(map, keys::WITNESS_THRESHOLD, "witness threshold")?,
            "witness threshold",
        )?;
        let toad =
            u32::try_from(toad).map_err(|_| malformed("witness threshold out of range"))?;
        (keys_list, Some(threshold), next_digest, toad)
    } else {
        for (key, name) in [
            (keys::KEYS, "keys"),
            (keys::THRESHOLD, "threshold"),
            (keys::NEXT_DIGEST, "next-key digest"),
            (keys::WITNESS_THRESHOLD, "witness threshold"),
        ] {
            forbid(map, key, name)?;
        }
        (Vec::new(), None, Said::ZERO, 0)
    };

    let (witnesses, config) = if kind.is_inception() {
        let witnesses = as_key_list(
            require(map, keys::WITNESSES, "witnesses")?,
            "witnesses",
            MAX_WITNESSES,
        )?;
        let config = as_config(require(map, keys::CONFIG, "config")?)?;
        (witnesses, config)
    } else {
        forbid(map, keys::WITNESSES, "witnesses")?;
        forbid(map, keys::CONFIG, "config")?;
        (Vec::new(), Vec::new())
    };

    let (witness_cuts, witness_adds) = if kind.is_rotation() {
        let cuts = as_key_list(require(map, keys::CUTS, "witness cuts")?, "witness cuts", MAX_WITNESSES)?;
        let adds = as_key_list(require(map, keys::ADDS, "witness adds")?, "witness adds", MAX_WITNESSES)?;
        (cuts, adds)
    } else {
        forbid(map, keys::CUTS, "witness cuts")?;
        forbid(map, keys::ADDS, "witness adds")?;
        (Vec::new(), Vec::new())
    };

    let anchors = as_anchors(require(map, keys::ANCHORS, "anchors")?)?;

    let delegator = if kind == EventKind::DelegatedInception {
        let delegator = Aid(as_bytes32(
            require(map, keys::DELEGATOR, "delegator")?,
            "delegator",
        )?);
        if delegator.is_zero() {
            return Err(malformed("zero delegator"));
        }
        Some(delegator)
    } else {
        forbid(map, keys::DELEGATOR, "delegator")?;
        None
    };

    Ok(KeyEvent {
        version,
        kind,
        aid,
        seq,
        prior,
        keys: keys_list,
        threshold,
        next_digest,
        witnesses,
        witness_threshold,
        witness_cuts,
        witness_adds,
        config,
        anchors,
        delegator,
    })
}

fn cbor_value_to_signatures(value: &Value) -> Result<Vec<IndexedSignature>, CoreError> {
    let items = as_array(value, "signature section")?;
    if items.len() > MAX_SIGNATURES {
        return Err(malformed(format!(
            "signature section exceeds {} entries",
            MAX_SIGNATURES
        )));
    }
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let pair = as_array(item, "signature")?;
        if pair.len() != 2 {
            return Err(malformed("signature must be an [index, bytes] pair"));
        }
        let index = as_u64(&pair[0], "signature index")?;
        let index =
            u32::try_from(index).map_err(|_| malformed("signature index out of range"))?;
        let sig = match &pair[1] {
            Value::Bytes(b) => {
                let arr: [u8; 64] = b
                    .as_slice()
                    .try_into()
                    .map_err(|_| malformed("signature must be 64 bytes"))?;
                Ed25519Signature(arr)
            }
            _ => return Err(malformed("signature must be a byte string")),
        };
        out.push(IndexedSignature {
            index,
            signature: sig,
        });
    }
    Ok(out)
}

fn cbor_value_to_receipt(value: &Value) -> Result<Receipt, CoreError> {
    let map = match value {
        Value::Map(entries) => entries.as_slice(),
        _ => return Err(CoreError::MalformedReceipt("receipt must be a map".to_string())),
    };

    let get = |key: u64, name: &str| -> Result<&Value, CoreError> {
        map_get(map, key)
            .ok_or_else(|| CoreError::MalformedReceipt(format!("missing {}", name)))
    };
    let bytes32 = |value: &Value, name: &str| -> Result<[u8; 32], CoreError> {
        as_bytes32(value, name)
            .map_err(|e| CoreError::MalformedReceipt(e.to_string()))
    };

    let version = as_u64(get(receipt_keys::VERSION, "version")?, "version")
        .map_err(|e| CoreError::MalformedReceipt(e.to_string()))?;
    let version =
        u8::try_from(version).map_err(|_| CoreError::MalformedReceipt("version out of range".to_string()))?;
    if version != RECEIPT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let aid = Aid(bytes32(get(receipt_keys::AID, "aid")?, "aid")?);
    let seq = as_u64(get(receipt_keys::SEQ, "seq")?, "seq")
        .map_err(|e| CoreError::MalformedReceipt(e.to_string()))?;
    let said = Said(bytes32(get(receipt_keys::SAID, "said")?, "said")?);
    let witness = Ed25519PublicKey(bytes32(get(receipt_keys::WITNESS, "witness")?, "witness")?);

    Ok(Receipt {
        version,
        aid,
        seq,
        said,
        witness,
        signature: Ed25519Signature::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InceptionBuilder;
    use crate::crypto::Keypair;

    fn sample_inception() -> KeyEvent {
        let kp = Keypair::from_seed(&[1u8; 32]);
        let next = Keypair::from_seed(&[2u8; 32]);
        InceptionBuilder::new(vec![kp.public_key()], SigningThreshold::simple(1))
            .next_keys(vec![next.public_key()])
            .build_event()
    }

    #[test]
    fn test_encode_uint_sizes() {
        let mut buf = Vec::new();
        encode_uint(&mut buf, 0, 0);
        assert_eq!(buf, [0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, [0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, [0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, [0x19, 0x01, 0x00]);

        buf.clear();
        encode_uint(&mut buf, 0, 70000);
        assert_eq!(buf, [0x1a, 0x00, 0x01, 0x11, 0x70]);

        buf.clear();
        encode_uint(&mut buf, 0, u64::MAX);
        assert_eq!(buf[0], 0x1b);
        assert_eq!(buf.len(), 9);
    }

    #[test]
    fn test_event_bytes_deterministic() {
        let event = sample_inception();
        assert_eq!(event_bytes(&event), event_bytes(&event));
    }

    #[test]
    fn test_inception_map_shape() {
        let event = sample_inception();
        let bytes = event_bytes(&event);
        // 11 fields for an inception, all keys single-byte and ascending.
        assert_eq!(bytes[0], 0xab);
        assert_eq!(bytes[1], 0x00);
    }

    #[test]
    fn test_message_roundtrip_no_signatures() {
        let event = sample_inception();
        let message = EventMessage {
            event,
            signatures: Vec::new(),
        };
        let bytes = message_bytes(&message);
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_message_roundtrip_with_signatures() {
        let kp = Keypair::from_seed(&[1u8; 32]);
        let next = Keypair::from_seed(&[2u8; 32]);
        let message = InceptionBuilder::new(vec![kp.public_key()], SigningThreshold::simple(1))
            .next_keys(vec![next.public_key()])
            .sign(&[&kp]);
        let bytes = message_bytes(&message);
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.signatures.len(), 1);
    }

    #[test]
    fn test_said_stable_across_encodings() {
        let event = sample_inception();
        let said1 = Said::digest(&event_bytes(&event));
        let said2 = Said::digest(&event_bytes(&event));
        assert_eq!(said1, said2);
        assert_eq!(event.said(), said1);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let event = sample_inception();
        let message = EventMessage {
            event,
            signatures: Vec::new(),
        };
        let bytes = message_bytes(&message);
        for cut in [0, 1, bytes.len() / 2, bytes.len() - 1] {
            assert!(decode_message(&bytes[..cut]).is_err());
        }
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let event = sample_inception();
        let message = EventMessage {
            event,
            signatures: Vec::new(),
        };
        let mut bytes = message_bytes(&message);
        bytes.push(0x00);
        let err = decode_message(&bytes).unwrap_err();
        assert!(matches!(err, CoreError::MalformedEvent(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let mut entries = match event_to_cbor_value(&sample_inception()) {
            Value::Map(entries) => entries,
            _ => unreachable!(),
        };
        for (k, v) in entries.iter_mut() {
            if matches!(k, Value::Integer(i) if i128::from(*i) == keys::KIND as i128) {
                *v = uint(0x7f);
            }
        }
        let mut bytes = Vec::new();
        encode_value_to(&Value::Map(entries), &mut bytes);
        encode_value_to(&signatures_to_cbor_value(&[]), &mut bytes);
        assert!(matches!(
            decode_message(&bytes),
            Err(CoreError::UnknownEventKind(0x7f))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let entries = match event_to_cbor_value(&sample_inception()) {
            Value::Map(entries) => entries,
            _ => unreachable!(),
        };
        let stripped: Vec<(Value, Value)> = entries
            .into_iter()
            .filter(|(k, _)| !matches!(k, Value::Integer(i) if i128::from(*i) == keys::KEYS as i128))
            .collect();
        let mut bytes = Vec::new();
        encode_value_to(&Value::Map(stripped), &mut bytes);
        encode_value_to(&signatures_to_cbor_value(&[]), &mut bytes);
        let err = decode_message(&bytes).unwrap_err();
        assert!(matches!(err, CoreError::MalformedEvent(ref m) if m.contains("missing keys")));
    }

    #[test]
    fn test_decode_rejects_threshold_exceeding_keys() {
        let kp = Keypair::from_seed(&[1u8; 32]);
        let event = InceptionBuilder::new(vec![kp.public_key()], SigningThreshold::simple(2))
            .build_event();
        let message = EventMessage {
            event,
            signatures: Vec::new(),
        };
        let err = decode_message(&message_bytes(&message)).unwrap_err();
        assert!(matches!(err, CoreError::MalformedEvent(ref m) if m.contains("threshold")));
    }

    #[test]
    fn test_decode_rejects_weight_count_mismatch() {
        let kps: Vec<Keypair> = (1..=3).map(|i| Keypair::from_seed(&[i as u8; 32])).collect();
        let half = Weight::new(1, 2).unwrap();
        // Two weights cannot cover three keys.
        let event = InceptionBuilder::new(
            kps.iter().map(|k| k.public_key()).collect(),
            SigningThreshold::weighted(vec![vec![half, half]]),
        )
        .build_event();
        let message = EventMessage {
            event,
            signatures: Vec::new(),
        };
        let err = decode_message(&message_bytes(&message)).unwrap_err();
        assert!(matches!(err, CoreError::MalformedEvent(ref m) if m.contains("weights")));
    }

    #[test]
    fn test_decode_rejects_wrong_version() {
        let mut entries = match event_to_cbor_value(&sample_inception()) {
            Value::Map(entries) => entries,
            _ => unreachable!(),
        };
        for (k, v) in entries.iter_mut() {
            if matches!(k, Value::Integer(i) if i128::from(*i) == keys::VERSION as i128) {
                *v = uint(9);
            }
        }
        let mut bytes = Vec::new();
        encode_value_to(&Value::Map(entries), &mut bytes);
        encode_value_to(&signatures_to_cbor_value(&[]), &mut bytes);
        assert!(matches!(
            decode_message(&bytes),
            Err(CoreError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_receipt_roundtrip() {
        let witness = Keypair::from_seed(&[9u8; 32]);
        let said = Said::digest(b"some event");
        let receipt = Receipt::sign(Aid::from_bytes([3u8; 32]), 4, said, &witness);
        let bytes = receipt_bytes(&receipt);
        let decoded = decode_receipt(&bytes).unwrap();
        assert_eq!(decoded, receipt);
    }

    #[test]
    fn test_receipt_rejects_short_input() {
        assert!(matches!(
            decode_receipt(&[0u8; 10]),
            Err(CoreError::MalformedReceipt(_))
        ));
    }

    #[test]
    fn test_receipt_rejects_bad_signature_length() {
        let witness = Keypair::from_seed(&[9u8; 32]);
        let said = Said::digest(b"some event");
        let receipt = Receipt::sign(Aid::from_bytes([3u8; 32]), 4, said, &witness);
        let mut bytes = receipt_bytes(&receipt);
        bytes.pop();
        assert!(decode_receipt(&bytes).is_err());
    }
}
