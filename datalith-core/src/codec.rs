//! Order-preserving byte codec for values
//!
//! Every value serializes to `(type-tag, payload)` where the payload bytes
//! order bytewise exactly as the values order semantically. This is what lets
//! the AVE index answer range queries with plain bytewise-key cursors.
//!
//! Encoding rules:
//! - Longs and instants: big-endian two's-complement with the sign bit
//!   flipped, so negative values sort below positive ones.
//! - Doubles: IEEE-754 bits; positive values get the sign bit set, negative
//!   values are bitwise inverted. Byte order then matches numeric order.
//! - Strings, keywords, symbols: UTF-8 with interior `0x00` escaped as
//!   `0x00 0xFF` and a `0x00 0x00` terminator. Bytes use the same framing.
//! - Tuples: tag, then the concatenated component encodings, then a `0x00`
//!   end marker. Component encodings are self-delimiting and start with a
//!   nonzero tag, so bytewise comparison is component-wise lexicographic and
//!   a shorter tuple sorts before its extensions.
//! - Encodings longer than [`MAX_VAL_KEY`] do not go into index keys at all;
//!   the store replaces them with a giant tag plus SHA-256 digest and keeps
//!   the full encoding out of line (see `encode_giant_key`).

use crate::error::{Error, Result};
use crate::keyword::Keyword;
use crate::value::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Maximum encoded value length allowed inside an index key.
///
/// The substrate bounds total key size (LMDB-class stores cap around 511
/// bytes); this leaves room for the fixed e/a components.
pub const MAX_VAL_KEY: usize = 400;

/// Tuple end marker. No value tag is zero.
const TERM: u8 = 0x00;

const TAG_NIL: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_LONG: u8 = 3;
const TAG_DOUBLE: u8 = 4;
const TAG_STR: u8 = 5;
const TAG_KEYWORD: u8 = 6;
const TAG_SYMBOL: u8 = 7;
const TAG_UUID: u8 = 8;
const TAG_INSTANT: u8 = 9;
const TAG_REF: u8 = 10;
const TAG_BYTES: u8 = 11;
const TAG_TUPLE: u8 = 12;

/// Tag for out-of-line ("giant") values: sorts after every inline value.
pub const TAG_GIANT: u8 = 0xF0;

const SIGN: u64 = 0x8000_0000_0000_0000;

/// Encode a value, appending to `out`. The encoding is self-delimiting.
pub fn encode_value(v: &Value, out: &mut Vec<u8>) {
    match v {
        Value::Nil => out.push(TAG_NIL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(*b as u8);
        }
        Value::Long(n) => {
            out.push(TAG_LONG);
            out.extend_from_slice(&((*n as u64) ^ SIGN).to_be_bytes());
        }
        Value::Double(d) => {
            out.push(TAG_DOUBLE);
            let bits = d.to_bits();
            let enc = if bits & SIGN == 0 { bits ^ SIGN } else { !bits };
            out.extend_from_slice(&enc.to_be_bytes());
        }
        Value::Str(s) => {
            out.push(TAG_STR);
            write_escaped(s.as_bytes(), out);
        }
        Value::Keyword(k) => {
            out.push(TAG_KEYWORD);
            write_escaped(k.to_string().as_bytes(), out);
        }
        Value::Symbol(s) => {
            out.push(TAG_SYMBOL);
            write_escaped(s.as_bytes(), out);
        }
        Value::Uuid(u) => {
            out.push(TAG_UUID);
            out.extend_from_slice(u.as_bytes());
        }
        Value::Instant(ms) => {
            out.push(TAG_INSTANT);
            out.extend_from_slice(&((*ms as u64) ^ SIGN).to_be_bytes());
        }
        Value::Ref(e) => {
            out.push(TAG_REF);
            out.extend_from_slice(&e.to_be_bytes());
        }
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            write_escaped(b, out);
        }
        Value::Tuple(vs) => {
            out.push(TAG_TUPLE);
            for v in vs {
                encode_value(v, out);
            }
            out.push(TERM);
        }
    }
}

/// Convenience: encode into a fresh buffer.
pub fn encode_to_vec(v: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    encode_value(v, &mut out);
    out
}

/// Decode one value from the front of `buf`; returns the value and the
/// number of bytes consumed.
pub fn decode_value(buf: &[u8]) -> Result<(Value, usize)> {
    let tag = *buf.first().ok_or_else(|| Error::decode("empty input"))?;
    let rest = &buf[1..];
    match tag {
        TAG_NIL => Ok((Value::Nil, 1)),
        TAG_BOOL => {
            let b = *rest.first().ok_or_else(|| Error::decode("bool"))?;
            Ok((Value::Bool(b != 0), 2))
        }
        TAG_LONG => {
            let raw = read_u64(rest)?;
            Ok((Value::Long((raw ^ SIGN) as i64), 9))
        }
        TAG_DOUBLE => {
            let enc = read_u64(rest)?;
            let bits = if enc & SIGN != 0 { enc ^ SIGN } else { !enc };
            Ok((Value::Double(f64::from_bits(bits)), 9))
        }
        TAG_STR => {
            let (bytes, n) = read_escaped(rest)?;
            let s = String::from_utf8(bytes).map_err(|e| Error::decode(e.to_string()))?;
            Ok((Value::Str(s), 1 + n))
        }
        TAG_KEYWORD => {
            let (bytes, n) = read_escaped(rest)?;
            let s = String::from_utf8(bytes).map_err(|e| Error::decode(e.to_string()))?;
            Ok((Value::Keyword(Keyword::parse(&s)?), 1 + n))
        }
        TAG_SYMBOL => {
            let (bytes, n) = read_escaped(rest)?;
            let s = String::from_utf8(bytes).map_err(|e| Error::decode(e.to_string()))?;
            Ok((Value::Symbol(s), 1 + n))
        }
        TAG_UUID => {
            if rest.len() < 16 {
                return Err(Error::decode("uuid: truncated"));
            }
            let mut b = [0u8; 16];
            b.copy_from_slice(&rest[..16]);
            Ok((Value::Uuid(Uuid::from_bytes(b)), 17))
        }
        TAG_INSTANT => {
            let raw = read_u64(rest)?;
            Ok((Value::Instant((raw ^ SIGN) as i64), 9))
        }
        TAG_REF => {
            let raw = read_u64(rest)?;
            Ok((Value::Ref(raw), 9))
        }
        TAG_BYTES => {
            let (bytes, n) = read_escaped(rest)?;
            Ok((Value::Bytes(bytes), 1 + n))
        }
        TAG_TUPLE => {
            let mut vs = Vec::new();
            let mut pos = 0;
            loop {
                match rest.get(pos) {
                    None => return Err(Error::decode("tuple: missing end marker")),
                    Some(&TERM) => return Ok((Value::Tuple(vs), 1 + pos + 1)),
                    Some(_) => {
                        let (v, n) = decode_value(&rest[pos..])?;
                        vs.push(v);
                        pos += n;
                    }
                }
            }
        }
        other => Err(Error::decode(format!("unknown value tag {other:#04x}"))),
    }
}

/// Whether an encoding must be stored out of line.
pub fn is_giant(encoded: &[u8]) -> bool {
    encoded.len() > MAX_VAL_KEY
}

/// Index-key stand-in for a giant value: tag plus SHA-256 content digest.
///
/// Giant keys order by digest - stable, not semantic - and sort after every
/// inline value.
pub fn encode_giant_key(full_encoding: &[u8]) -> Vec<u8> {
    let digest = giant_digest(full_encoding);
    let mut out = Vec::with_capacity(33);
    out.push(TAG_GIANT);
    out.extend_from_slice(&digest);
    out
}

/// SHA-256 content digest of a full value encoding.
pub fn giant_digest(full_encoding: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(full_encoding);
    h.finalize().into()
}

/// True if an index-key value slice is a giant stand-in.
pub fn is_giant_key(encoded: &[u8]) -> bool {
    encoded.first() == Some(&TAG_GIANT)
}

/// Extract the digest from a giant stand-in key.
pub fn giant_key_digest(encoded: &[u8]) -> Result<[u8; 32]> {
    if !is_giant_key(encoded) || encoded.len() != 33 {
        return Err(Error::decode("not a giant key"));
    }
    let mut d = [0u8; 32];
    d.copy_from_slice(&encoded[1..]);
    Ok(d)
}

fn read_u64(buf: &[u8]) -> Result<u64> {
    if buf.len() < 8 {
        return Err(Error::decode("u64: truncated"));
    }
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[..8]);
    Ok(u64::from_be_bytes(b))
}

/// Escaped framing: interior 0x00 becomes 0x00 0xFF, terminated by 0x00 0x00.
/// Preserves bytewise order and the prefix property.
fn write_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xFF);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
    out.push(0x00);
}

fn read_escaped(buf: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        match buf.get(pos) {
            None => return Err(Error::decode("string: missing terminator")),
            Some(&0x00) => match buf.get(pos + 1) {
                Some(&0x00) => return Ok((out, pos + 2)),
                Some(&0xFF) => {
                    out.push(0x00);
                    pos += 2;
                }
                _ => return Err(Error::decode("string: bad escape")),
            },
            Some(&b) => {
                out.push(b);
                pos += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::kw;
    use std::cmp::Ordering;

    fn roundtrip(v: Value) {
        let enc = encode_to_vec(&v);
        let (dec, n) = decode_value(&enc).unwrap();
        assert_eq!(n, enc.len());
        assert_eq!(dec, v);
    }

    #[test]
    fn test_roundtrip_all_types() {
        roundtrip(Value::Nil);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Long(0));
        roundtrip(Value::Long(i64::MIN));
        roundtrip(Value::Long(i64::MAX));
        roundtrip(Value::Double(-0.5));
        roundtrip(Value::Double(f64::INFINITY));
        roundtrip(Value::Str("hello \u{0} world".into()));
        roundtrip(Value::Str(String::new()));
        roundtrip(Value::Keyword(kw(":person/name")));
        roundtrip(Value::Symbol("?x".into()));
        roundtrip(Value::Uuid(Uuid::from_u128(42)));
        roundtrip(Value::Instant(-1_000));
        roundtrip(Value::Ref(17));
        roundtrip(Value::Bytes(vec![0, 1, 0, 255]));
        roundtrip(Value::Tuple(vec![
            Value::Str("a".into()),
            Value::Nil,
            Value::Long(3),
        ]));
        roundtrip(Value::Tuple(vec![]));
    }

    /// Byte order must match value order for every pair.
    #[test]
    fn test_order_preservation() {
        let vals = vec![
            Value::Nil,
            Value::Bool(false),
            Value::Bool(true),
            Value::Long(i64::MIN),
            Value::Long(-1),
            Value::Long(0),
            Value::Long(42),
            Value::Long(i64::MAX),
            Value::Double(f64::NEG_INFINITY),
            Value::Double(-1.5),
            Value::Double(0.0),
            Value::Double(2.5),
            Value::Double(f64::INFINITY),
            Value::Str("".into()),
            Value::Str("a".into()),
            Value::Str("a\u{0}".into()),
            Value::Str("a\u{1}".into()),
            Value::Str("ab".into()),
            Value::Str("b".into()),
            Value::Instant(-5),
            Value::Instant(5),
            Value::Ref(1),
            Value::Ref(2),
            Value::Tuple(vec![Value::Nil]),
            Value::Tuple(vec![Value::Str("a".into())]),
            Value::Tuple(vec![Value::Str("a".into()), Value::Str("b".into())]),
            Value::Tuple(vec![Value::Str("b".into())]),
        ];
        for a in &vals {
            for b in &vals {
                let ord = a.cmp(b);
                let byte_ord = encode_to_vec(a).cmp(&encode_to_vec(b));
                assert_eq!(ord, byte_ord, "value order vs byte order for {a} / {b}");
            }
        }
    }

    #[test]
    fn test_negative_zero_double() {
        // -0.0 and 0.0 are distinct under total_cmp and under the codec
        let neg = encode_to_vec(&Value::Double(-0.0));
        let pos = encode_to_vec(&Value::Double(0.0));
        assert_eq!(neg.cmp(&pos), Ordering::Less);
    }

    #[test]
    fn test_giant_threshold() {
        let small = encode_to_vec(&Value::Str("short".into()));
        assert!(!is_giant(&small));

        let big = encode_to_vec(&Value::Str("x".repeat(MAX_VAL_KEY + 1)));
        assert!(is_giant(&big));

        let key = encode_giant_key(&big);
        assert!(is_giant_key(&key));
        assert_eq!(giant_key_digest(&key).unwrap(), giant_digest(&big));
        // giants sort after every inline value
        assert!(key > encode_to_vec(&Value::Tuple(vec![Value::Long(i64::MAX)])));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_value(&[]).is_err());
        assert!(decode_value(&[0x7E]).is_err());
        assert!(decode_value(&[TAG_LONG, 1, 2]).is_err());
        assert!(decode_value(&[TAG_STR, b'a']).is_err());
    }
}
