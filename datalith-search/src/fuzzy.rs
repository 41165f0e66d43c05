//! Symmetric-delete fuzzy lookup
//!
//! Candidate generation precomputes every deletion of each dictionary term's
//! prefix (up to the configured edit distance) and matches query deletions
//! against them. Candidates are then verified with a real edit distance
//! (optimal string alignment, transpositions count as one edit) and returned
//! in (distance, term) order.

use rustc_hash::{FxHashMap, FxHashSet};

/// Fuzzy correction dictionary over the term universe.
#[derive(Clone, Debug)]
pub struct FuzzyDict {
    max_edit: u32,
    prefix_len: usize,
    /// deleted-prefix form -> terms it can reach
    deletes: FxHashMap<String, Vec<String>>,
    terms: FxHashSet<String>,
}

impl FuzzyDict {
    pub fn new(max_edit: u32, prefix_len: usize) -> Self {
        Self {
            max_edit,
            prefix_len,
            deletes: FxHashMap::default(),
            terms: FxHashSet::default(),
        }
    }

    fn prefix(&self, term: &str) -> String {
        term.chars().take(self.prefix_len).collect()
    }

    /// Register a dictionary term.
    pub fn insert(&mut self, term: &str) {
        if !self.terms.insert(term.to_string()) {
            return;
        }
        let prefix = self.prefix(term);
        for del in deletions(&prefix, self.max_edit) {
            let entry = self.deletes.entry(del).or_default();
            if !entry.iter().any(|t| t == term) {
                entry.push(term.to_string());
            }
        }
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains(term)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Candidate terms within the edit distance budget, closest first.
    /// An exact dictionary hit short-circuits to just itself.
    pub fn lookup(&self, query: &str) -> Vec<(String, u32)> {
        if self.terms.contains(query) {
            return vec![(query.to_string(), 0)];
        }
        let prefix = self.prefix(query);
        let mut seen = FxHashSet::default();
        let mut candidates: Vec<(String, u32)> = Vec::new();
        for del in deletions(&prefix, self.max_edit) {
            if let Some(terms) = self.deletes.get(&del) {
                for term in terms {
                    if !seen.insert(term.clone()) {
                        continue;
                    }
                    let dist = edit_distance(query, term);
                    if dist <= self.max_edit {
                        candidates.push((term.clone(), dist));
                    }
                }
            }
        }
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        candidates
    }
}

/// All strings reachable from `s` by up to `max_edit` single-character
/// deletions, `s` itself included.
fn deletions(s: &str, max_edit: u32) -> FxHashSet<String> {
    let mut all = FxHashSet::default();
    all.insert(s.to_string());
    let mut frontier = vec![s.to_string()];
    for _ in 0..max_edit {
        let mut next = Vec::new();
        for word in &frontier {
            let chars: Vec<char> = word.chars().collect();
            for i in 0..chars.len() {
                let mut shorter = String::with_capacity(word.len());
                for (j, c) in chars.iter().enumerate() {
                    if j != i {
                        shorter.push(*c);
                    }
                }
                if all.insert(shorter.clone()) {
                    next.push(shorter);
                }
            }
        }
        frontier = next;
    }
    all
}

/// Optimal string alignment distance (Levenshtein plus adjacent
/// transposition).
pub fn edit_distance(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m as u32;
    }
    if m == 0 {
        return n as u32;
    }
    let mut d = vec![vec![0u32; m + 1]; n + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i as u32;
    }
    for j in 0..=m {
        d[0][j] = j as u32;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            let mut best = (d[i - 1][j] + 1).min(d[i][j - 1] + 1).min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(d[i - 2][j - 2] + 1);
            }
            d[i][j] = best;
        }
    }
    d[n][m]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("fox", "fox"), 0);
        assert_eq!(edit_distance("fox", "fx"), 1);
        assert_eq!(edit_distance("fox", "foxes"), 2);
        assert_eq!(edit_distance("form", "from"), 1); // transposition
        assert_eq!(edit_distance("", "abc"), 3);
    }

    #[test]
    fn test_lookup_corrects_typos() {
        let mut dict = FuzzyDict::new(2, 7);
        dict.insert("quick");
        dict.insert("quite");
        dict.insert("red");
        dict.insert("fox");

        let hits = dict.lookup("quick");
        assert_eq!(hits, vec![("quick".to_string(), 0)]);

        // one deletion
        let hits = dict.lookup("quck");
        assert_eq!(hits[0].0, "quick");
        assert_eq!(hits[0].1, 1);

        // one substitution
        let hits = dict.lookup("rad");
        assert!(hits.iter().any(|(t, d)| t == "red" && *d == 1));

        // hopeless garbage finds nothing
        assert!(dict.lookup("zzzzzzz").is_empty());
    }

    #[test]
    fn test_lookup_orders_by_distance() {
        let mut dict = FuzzyDict::new(2, 7);
        dict.insert("quick");
        dict.insert("quack");
        let hits = dict.lookup("quicc");
        assert_eq!(hits[0].0, "quick");
        assert!(hits.iter().any(|(t, _)| t == "quack"));
    }

    #[test]
    fn test_prefix_truncation_still_matches() {
        let mut dict = FuzzyDict::new(1, 5);
        dict.insert("understanding");
        // long terms are matched on their prefix
        let hits = dict.lookup("understanding");
        assert_eq!(hits[0].1, 0);
    }
}
