//! Relations and joins
//!
//! Evaluation threads a relation - a (header, tuples) pair - through the
//! clause sequence. Joins hash the smaller side; tiny inner relations fall
//! back to a nested loop to skip the hash table build.

use crate::error::{Error, Result};
use crate::parse::Var;
use datalith_core::Value;
use rustc_hash::{FxHashMap, FxHashSet};

/// Below this tuple count a nested-loop join beats building a hash table.
const NESTED_LOOP_MAX: usize = 8;

/// A set of named tuples.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Relation {
    pub header: Vec<Var>,
    pub tuples: Vec<Vec<Value>>,
}

impl Relation {
    /// The identity relation: no columns, one empty row. Joining against it
    /// returns the other side unchanged.
    pub fn unit() -> Relation {
        Relation {
            header: Vec::new(),
            tuples: vec![Vec::new()],
        }
    }

    pub fn new(header: Vec<Var>, tuples: Vec<Vec<Value>>) -> Relation {
        Relation { header, tuples }
    }

    pub fn empty(header: Vec<Var>) -> Relation {
        Relation {
            header,
            tuples: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn col(&self, var: &str) -> Option<usize> {
        self.header.iter().position(|h| h == var)
    }

    /// Project to the given columns, deduplicating rows.
    pub fn project(&self, vars: &[Var]) -> Result<Relation> {
        let idxs: Vec<usize> = vars
            .iter()
            .map(|v| self.col(v).ok_or_else(|| Error::UnboundFind(v.clone())))
            .collect::<Result<Vec<_>>>()?;
        let mut seen = FxHashSet::default();
        let mut tuples = Vec::new();
        for row in &self.tuples {
            let proj: Vec<Value> = idxs.iter().map(|&i| row[i].clone()).collect();
            if seen.insert(proj.clone()) {
                tuples.push(proj);
            }
        }
        Ok(Relation {
            header: vars.to_vec(),
            tuples,
        })
    }

    pub fn dedup(&mut self) {
        let mut seen = FxHashSet::default();
        self.tuples.retain(|row| seen.insert(row.clone()));
    }

    /// Natural join on shared columns; a cartesian product when none are
    /// shared.
    pub fn join(self, other: Relation) -> Relation {
        let shared: Vec<Var> = self
            .header
            .iter()
            .filter(|v| other.header.contains(v))
            .cloned()
            .collect();

        let out_header: Vec<Var> = self
            .header
            .iter()
            .cloned()
            .chain(
                other
                    .header
                    .iter()
                    .filter(|v| !self.header.contains(v))
                    .cloned(),
            )
            .collect();

        let left_key: Vec<usize> = shared.iter().map(|v| self.col(v).unwrap()).collect();
        let right_key: Vec<usize> = shared.iter().map(|v| other.col(v).unwrap()).collect();
        let right_extra: Vec<usize> = other
            .header
            .iter()
            .enumerate()
            .filter(|(_, v)| !self.header.contains(v))
            .map(|(i, _)| i)
            .collect();

        let mut tuples = Vec::new();
        if shared.is_empty() || other.tuples.len() <= NESTED_LOOP_MAX {
            for l in &self.tuples {
                for r in &other.tuples {
                    if left_key
                        .iter()
                        .zip(&right_key)
                        .all(|(&li, &ri)| l[li] == r[ri])
                    {
                        let mut row = l.clone();
                        row.extend(right_extra.iter().map(|&i| r[i].clone()));
                        tuples.push(row);
                    }
                }
            }
        } else {
            let mut table: FxHashMap<Vec<Value>, Vec<&Vec<Value>>> = FxHashMap::default();
            for r in &other.tuples {
                let key: Vec<Value> = right_key.iter().map(|&i| r[i].clone()).collect();
                table.entry(key).or_default().push(r);
            }
            for l in &self.tuples {
                let key: Vec<Value> = left_key.iter().map(|&i| l[i].clone()).collect();
                if let Some(matches) = table.get(&key) {
                    for r in matches {
                        let mut row = l.clone();
                        row.extend(right_extra.iter().map(|&i| r[i].clone()));
                        tuples.push(row);
                    }
                }
            }
        }
        Relation {
            header: out_header,
            tuples,
        }
    }

    /// Keep rows whose shared-column key does NOT appear in `other`.
    pub fn antijoin(self, other: &Relation) -> Relation {
        let shared: Vec<Var> = self
            .header
            .iter()
            .filter(|v| other.header.contains(v))
            .cloned()
            .collect();
        if shared.is_empty() {
            // no shared vars: any row in other rejects everything
            return if other.tuples.is_empty() {
                self
            } else {
                Relation::empty(self.header)
            };
        }
        let left_key: Vec<usize> = shared.iter().map(|v| self.col(v).unwrap()).collect();
        let right_key: Vec<usize> = shared.iter().map(|v| other.col(v).unwrap()).collect();
        let reject: FxHashSet<Vec<Value>> = other
            .tuples
            .iter()
            .map(|r| right_key.iter().map(|&i| r[i].clone()).collect())
            .collect();
        let tuples = self
            .tuples
            .into_iter()
            .filter(|l| {
                let key: Vec<Value> = left_key.iter().map(|&i| l[i].clone()).collect();
                !reject.contains(&key)
            })
            .collect();
        Relation {
            header: self.header,
            tuples,
        }
    }

    /// Union with another relation over the same variable set; the other's
    /// columns are reordered to match.
    pub fn union(mut self, other: Relation) -> Result<Relation> {
        if self.header == other.header {
            self.tuples.extend(other.tuples);
        } else {
            let reordered = other.project(&self.header)?;
            self.tuples.extend(reordered.tuples);
        }
        self.dedup();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(header: &[&str], rows: &[&[i64]]) -> Relation {
        Relation::new(
            header.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|&n| Value::Long(n)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_hash_join_on_shared() {
        let a = rel(&["?x", "?y"], &[&[1, 10], &[2, 20], &[3, 30]]);
        let rows: Vec<&[i64]> = (0..20).map(|_| &[2i64, 200][..]).collect();
        let mut b = rel(&["?x", "?z"], &rows);
        b.dedup();
        b.tuples.push(vec![Value::Long(1), Value::Long(100)]);

        let j = a.join(b);
        assert_eq!(j.header, vec!["?x", "?y", "?z"]);
        let mut sorted = j.tuples.clone();
        sorted.sort();
        assert_eq!(
            sorted,
            vec![
                vec![Value::Long(1), Value::Long(10), Value::Long(100)],
                vec![Value::Long(2), Value::Long(20), Value::Long(200)],
            ]
        );
    }

    #[test]
    fn test_cartesian_when_disjoint() {
        let a = rel(&["?x"], &[&[1], &[2]]);
        let b = rel(&["?y"], &[&[10], &[20]]);
        let j = a.join(b);
        assert_eq!(j.tuples.len(), 4);
    }

    #[test]
    fn test_unit_is_identity() {
        let a = rel(&["?x"], &[&[1], &[2]]);
        let j = Relation::unit().join(a.clone());
        assert_eq!(j, a);
    }

    #[test]
    fn test_antijoin() {
        let a = rel(&["?x", "?y"], &[&[1, 10], &[2, 20]]);
        let bad = rel(&["?x"], &[&[2]]);
        let kept = a.antijoin(&bad);
        assert_eq!(kept.tuples, vec![vec![Value::Long(1), Value::Long(10)]]);
    }

    #[test]
    fn test_union_reorders_columns() {
        let a = rel(&["?x", "?y"], &[&[1, 10]]);
        let b = rel(&["?y", "?x"], &[&[20, 2], &[10, 1]]);
        let u = a.union(b).unwrap();
        let mut rows = u.tuples.clone();
        rows.sort();
        assert_eq!(
            rows,
            vec![
                vec![Value::Long(1), Value::Long(10)],
                vec![Value::Long(2), Value::Long(20)],
            ]
        );
    }

    #[test]
    fn test_project_dedups() {
        let a = rel(&["?x", "?y"], &[&[1, 10], &[1, 20]]);
        let p = a.project(&["?x".to_string()]).unwrap();
        assert_eq!(p.tuples, vec![vec![Value::Long(1)]]);
    }
}
