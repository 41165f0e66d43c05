//! Snapshot-owning cursors
//!
//! Iterators here own an `Arc` of the table they scan, so they stay valid for
//! as long as the caller keeps them - the read snapshot cannot be pulled out
//! from under them. Each step re-seeks from the last yielded key, which keeps
//! the iterator lazy at O(log n) per step without borrowing the map.

use crate::env::{Slot, Table};
use std::ops::Bound;
use std::sync::Arc;

/// True if `(lo, hi)` describes a non-empty byte range. `BTreeMap::range`
/// panics on inverted bounds, so every step checks first.
fn bounds_ok(lo: &Bound<Vec<u8>>, hi: &Bound<Vec<u8>>) -> bool {
    match (lo, hi) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => true,
        (Bound::Included(a), Bound::Included(b)) => a <= b,
        (Bound::Included(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b))
        | (Bound::Excluded(a), Bound::Excluded(b)) => a < b,
    }
}

/// Lazy range scan over a dbi's plain values, in either direction.
pub struct Scan {
    table: Option<Arc<Table>>,
    lo: Bound<Vec<u8>>,
    hi: Bound<Vec<u8>>,
    reverse: bool,
    done: bool,
}

impl Scan {
    pub(crate) fn new(
        table: Option<Arc<Table>>,
        lo: Bound<Vec<u8>>,
        hi: Bound<Vec<u8>>,
        reverse: bool,
    ) -> Self {
        Self {
            table,
            lo,
            hi,
            reverse,
            done: false,
        }
    }
}

impl Iterator for Scan {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let table = self.table.clone()?;
        loop {
            if !bounds_ok(&self.lo, &self.hi) {
                self.done = true;
                return None;
            }
            let mut range = table.map.range((self.lo.clone(), self.hi.clone()));
            let step = if self.reverse {
                range.next_back()
            } else {
                range.next()
            };
            let Some((k, slot)) = step else {
                self.done = true;
                return None;
            };
            let key = k.clone();
            let slot = slot.clone();
            if self.reverse {
                self.hi = Bound::Excluded(key.clone());
            } else {
                self.lo = Bound::Excluded(key.clone());
            }
            match slot {
                Slot::Val(v) => return Some((key, v)),
                Slot::List(_) => continue,
            }
        }
    }
}

/// Lazy iteration over one inverted list, in sorted order.
pub struct ListIter {
    table: Option<Arc<Table>>,
    key: Vec<u8>,
    after: Option<Vec<u8>>,
}

impl ListIter {
    pub(crate) fn new(table: Option<Arc<Table>>, key: Vec<u8>) -> Self {
        Self {
            table,
            key,
            after: None,
        }
    }
}

impl Iterator for ListIter {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.table.clone()?;
        let Some(Slot::List(set)) = table.map.get(&self.key) else {
            return None;
        };
        let lower = match &self.after {
            Some(k) => Bound::Excluded(k.clone()),
            None => Bound::Unbounded,
        };
        let next = set.range((lower, Bound::Unbounded)).next()?.clone();
        self.after = Some(next.clone());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Env;

    #[test]
    fn test_scan_directions_and_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::open(dir.path()).unwrap();
        let dbi = env.open_dbi("t");
        let mut w = env.write();
        for k in [b"a", b"b", b"c", b"d"] {
            w.put(&dbi, k.to_vec(), k.to_vec());
        }
        w.commit();
        let r = env.read();

        let fwd: Vec<Vec<u8>> = r
            .scan(&dbi, Bound::Included(b"b".to_vec()), Bound::Excluded(b"d".to_vec()))
            .map(|(k, _)| k)
            .collect();
        assert_eq!(fwd, vec![b"b".to_vec(), b"c".to_vec()]);

        let back: Vec<Vec<u8>> = r
            .scan_back(&dbi, Bound::Unbounded, Bound::Included(b"c".to_vec()))
            .map(|(k, _)| k)
            .collect();
        assert_eq!(back, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);

        // empty and inverted ranges yield nothing instead of panicking
        assert_eq!(
            r.scan(&dbi, Bound::Excluded(b"b".to_vec()), Bound::Excluded(b"b".to_vec()))
                .count(),
            0
        );
        assert_eq!(
            r.scan(&dbi, Bound::Included(b"d".to_vec()), Bound::Included(b"a".to_vec()))
                .count(),
            0
        );
    }

    #[test]
    fn test_scan_survives_later_commits() {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::open(dir.path()).unwrap();
        let dbi = env.open_dbi("t");
        let mut w = env.write();
        w.put(&dbi, b"a".to_vec(), b"1".to_vec());
        w.put(&dbi, b"b".to_vec(), b"2".to_vec());
        w.commit();

        let r = env.read();
        let mut scan = r.scan(&dbi, Bound::Unbounded, Bound::Unbounded);
        assert_eq!(scan.next().unwrap().0, b"a".to_vec());

        let mut w = env.write();
        w.del(&dbi, b"b");
        w.commit();

        // cursor still walks the pinned snapshot
        assert_eq!(scan.next().unwrap().0, b"b".to_vec());
    }
}
