//! Index key composition
//!
//! Four dbis realize the four orderings. Key layouts (all integers
//! big-endian):
//!
//! | dbi | key |
//! |-----|-----------------------------|
//! | eav | `e(8) a(4) v(var)` |
//! | aev | `a(4) e(8) v(var)` |
//! | ave | `a(4) v(var) e(8)` |
//! | vae | `v(8, ref target) a(4) e(8)` |
//!
//! `v(var)` is the codec encoding, or a giant stand-in (tag + SHA-256) when
//! the encoding exceeds the key budget; the full encoding then lives in the
//! `giants` dbi keyed by digest. The dbi value is the datom payload:
//! `t(8) flags(1)`.

use crate::error::{Error, Result};
use datalith_core::codec;
use datalith_core::value::{Aid, Eid, Value};

/// Payload flag: the key's value slot is a giant stand-in.
pub const FLAG_GIANT: u8 = 0x01;

/// Encoded value destined for an index key.
pub struct VKey {
    /// Bytes that go into the key (inline encoding or giant stand-in)
    pub bytes: Vec<u8>,
    /// Full encoding to store out of line, when giant
    pub giant_full: Option<Vec<u8>>,
}

/// Encode a value for key use, spilling oversize encodings out of line.
pub fn vkey(v: &Value) -> VKey {
    let full = codec::encode_to_vec(v);
    if codec::is_giant(&full) {
        VKey {
            bytes: codec::encode_giant_key(&full),
            giant_full: Some(full),
        }
    } else {
        VKey {
            bytes: full,
            giant_full: None,
        }
    }
}

pub fn eav_key(e: Eid, a: Aid, vbytes: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(12 + vbytes.len());
    k.extend_from_slice(&e.to_be_bytes());
    k.extend_from_slice(&a.to_be_bytes());
    k.extend_from_slice(vbytes);
    k
}

pub fn aev_key(a: Aid, e: Eid, vbytes: &[u8]) -> Vec<u8> {
    let mut k = Vec::with_capacity(12 + vbytes.len());
    k.extend_from_slice(&a.to_be_bytes());
    k.extend_from_slice(&e.to_be_bytes());
    k.extend_from_slice(vbytes);
    k
}

pub fn ave_key(a: Aid, vbytes: &[u8], e: Eid) -> Vec<u8> {
    let mut k = Vec::with_capacity(12 + vbytes.len());
    k.extend_from_slice(&a.to_be_bytes());
    k.extend_from_slice(vbytes);
    k.extend_from_slice(&e.to_be_bytes());
    k
}

pub fn vae_key(target: Eid, a: Aid, e: Eid) -> Vec<u8> {
    let mut k = Vec::with_capacity(20);
    k.extend_from_slice(&target.to_be_bytes());
    k.extend_from_slice(&a.to_be_bytes());
    k.extend_from_slice(&e.to_be_bytes());
    k
}

/// Datom payload stored as the dbi value.
pub fn payload(tx: u64, giant: bool) -> Vec<u8> {
    let mut p = Vec::with_capacity(9);
    p.extend_from_slice(&tx.to_be_bytes());
    p.push(if giant { FLAG_GIANT } else { 0 });
    p
}

pub fn decode_payload(val: &[u8]) -> Result<(u64, bool)> {
    if val.len() != 9 {
        return Err(Error::corrupt("payload", format!("len {}", val.len())));
    }
    let mut t = [0u8; 8];
    t.copy_from_slice(&val[..8]);
    Ok((u64::from_be_bytes(t), val[8] & FLAG_GIANT != 0))
}

fn be_u64(b: &[u8]) -> u64 {
    let mut x = [0u8; 8];
    x.copy_from_slice(b);
    u64::from_be_bytes(x)
}

fn be_u32(b: &[u8]) -> u32 {
    let mut x = [0u8; 4];
    x.copy_from_slice(b);
    u32::from_be_bytes(x)
}

/// Split an `eav` key into components; the value slice is returned raw.
pub fn split_eav(key: &[u8]) -> Result<(Eid, Aid, &[u8])> {
    if key.len() < 13 {
        return Err(Error::corrupt("eav", "short key"));
    }
    Ok((be_u64(&key[..8]), be_u32(&key[8..12]), &key[12..]))
}

pub fn split_aev(key: &[u8]) -> Result<(Eid, Aid, &[u8])> {
    if key.len() < 13 {
        return Err(Error::corrupt("aev", "short key"));
    }
    Ok((be_u64(&key[4..12]), be_u32(&key[..4]), &key[12..]))
}

pub fn split_ave(key: &[u8]) -> Result<(Eid, Aid, &[u8])> {
    if key.len() < 13 {
        return Err(Error::corrupt("ave", "short key"));
    }
    let e = be_u64(&key[key.len() - 8..]);
    Ok((e, be_u32(&key[..4]), &key[4..key.len() - 8]))
}

/// `vae` keys carry the target eid instead of an encoded value.
pub fn split_vae(key: &[u8]) -> Result<(Eid, Aid, Eid)> {
    if key.len() != 20 {
        return Err(Error::corrupt("vae", "bad key length"));
    }
    Ok((be_u64(&key[12..20]), be_u32(&key[8..12]), be_u64(&key[..8])))
}

/// Smallest byte string strictly greater than every key with this prefix,
/// or None when the prefix is all 0xFF (scan to the end instead).
pub fn prefix_successor(mut prefix: Vec<u8>) -> Option<Vec<u8>> {
    while let Some(&last) = prefix.last() {
        if last == 0xFF {
            prefix.pop();
        } else {
            *prefix.last_mut().unwrap() = last + 1;
            return Some(prefix);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_splits() {
        let vk = vkey(&Value::Str("x".into()));
        let k = eav_key(7, 3, &vk.bytes);
        let (e, a, v) = split_eav(&k).unwrap();
        assert_eq!((e, a), (7, 3));
        assert_eq!(v, &vk.bytes[..]);

        let k = ave_key(3, &vk.bytes, 7);
        let (e, a, v) = split_ave(&k).unwrap();
        assert_eq!((e, a), (7, 3));
        assert_eq!(v, &vk.bytes[..]);

        let k = vae_key(9, 3, 7);
        let (e, a, t) = split_vae(&k).unwrap();
        assert_eq!((e, a, t), (7, 3, 9));
    }

    #[test]
    fn test_eav_keys_sort_entity_first() {
        let v1 = vkey(&Value::Long(99));
        let v2 = vkey(&Value::Long(1));
        assert!(eav_key(1, 5, &v1.bytes) < eav_key(2, 1, &v2.bytes));
        assert!(eav_key(1, 1, &v1.bytes) < eav_key(1, 2, &v2.bytes));
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(vec![1, 2, 3]), Some(vec![1, 2, 4]));
        assert_eq!(prefix_successor(vec![1, 0xFF]), Some(vec![2]));
        assert_eq!(prefix_successor(vec![0xFF, 0xFF]), None);
    }

    #[test]
    fn test_giant_spill() {
        let big = Value::Str("y".repeat(4096));
        let vk = vkey(&big);
        assert!(vk.giant_full.is_some());
        assert_eq!(vk.bytes.len(), 33);
    }
}
