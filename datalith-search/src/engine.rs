//! The search engine
//!
//! Five persistent structures over the substrate, all updated in one write
//! transaction per document:
//!
//! | dbi | key | value |
//! |-----|-----|-------|
//! | `unigrams` | term (utf8) | term-id, document frequency |
//! | `bigrams` | (term-id1, term-id2) | adjacency frequency |
//! | `docs` | doc-id | token count, encoded doc ref |
//! | `term-docs` | term-id | inverted list of doc-ids |
//! | `positions` | (doc-id, term-id) | list of (position, offset) |
//!
//! Queries tokenize, correct each term through the symmetric-delete
//! dictionary, union per-term doc sets, and rank with the bigram-boosted
//! scorer. Results come back best-first as an iterator.

use crate::analyzer::en_analyzer;
use crate::error::{Error, Result};
use crate::fuzzy::FuzzyDict;
use crate::score::{bigram_score, idf, term_score, ScoreParams};
use datalith_core::codec;
use datalith_core::Value;
use datalith_kv::{Dbi, Env, ReadTxn, WriteTxn};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::ops::Bound;

/// Document id within one search engine.
pub type DocId = u32;

const META_MAX_TID: &[u8] = b"max-tid";
const META_MAX_DID: &[u8] = b"max-did";
const META_DOC_COUNT: &[u8] = b"doc-count";
const META_TOTAL_LEN: &[u8] = b"total-len";

/// Engine configuration.
#[derive(Clone, Copy, Debug)]
pub struct SearchOptions {
    /// Maximum edit distance for fuzzy term correction
    pub max_edit_distance: u32,
    /// Dictionary prefix length for symmetric-delete generation
    pub prefix_length: usize,
    pub params: ScoreParams,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            max_edit_distance: 2,
            prefix_length: 7,
            params: ScoreParams::default(),
        }
    }
}

#[derive(Clone)]
struct SearchDbis {
    unigrams: Dbi,
    bigrams: Dbi,
    docs: Dbi,
    term_docs: Dbi,
    positions: Dbi,
    meta: Dbi,
}

/// Ranked results, best first.
pub struct SearchResults {
    inner: std::vec::IntoIter<(Value, DocId)>,
}

impl Iterator for SearchResults {
    type Item = (Value, DocId);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// A full-text search engine over one environment.
pub struct SearchEngine {
    env: Env,
    dbis: SearchDbis,
    opts: SearchOptions,
    dict: RwLock<FuzzyDict>,
    terms_by_tid: RwLock<FxHashMap<u32, String>>,
}

impl SearchEngine {
    /// Open (or create) the engine's dbis on an environment and load the
    /// fuzzy dictionary from the persisted term universe.
    pub fn open(env: Env, opts: SearchOptions) -> Result<SearchEngine> {
        let dbis = SearchDbis {
            unigrams: env.open_dbi("unigrams"),
            bigrams: env.open_dbi("bigrams"),
            docs: env.open_dbi("docs"),
            term_docs: env.open_dbi("term-docs"),
            positions: env.open_dbi("positions"),
            meta: env.open_dbi("search-meta"),
        };
        let mut dict = FuzzyDict::new(opts.max_edit_distance, opts.prefix_length);
        let mut terms_by_tid = FxHashMap::default();
        let r = env.read();
        for (key, val) in r.scan(&dbis.unigrams, Bound::Unbounded, Bound::Unbounded) {
            let term = String::from_utf8(key)
                .map_err(|e| Error::corrupt("unigrams", e.to_string()))?;
            let (tid, _df) = decode_unigram(&val)?;
            dict.insert(&term);
            terms_by_tid.insert(tid, term);
        }
        Ok(SearchEngine {
            env,
            dbis,
            opts,
            dict: RwLock::new(dict),
            terms_by_tid: RwLock::new(terms_by_tid),
        })
    }

    /// Index a document. Assigns a fresh doc-id, tokenizes, aggregates term
    /// and bigram frequencies, and persists all five structures atomically.
    pub fn add_doc(&self, doc_ref: Value, text: &str) -> Result<DocId> {
        let tokens = en_analyzer(text);
        let mut w = self.env.write();

        let mut max_tid = self.meta_u64(&w, META_MAX_TID) as u32;
        let did = self.meta_u64(&w, META_MAX_DID) as u32 + 1;

        // aggregate (term -> positions) preserving first-seen order
        let mut order: Vec<String> = Vec::new();
        let mut occur: FxHashMap<String, Vec<(u32, u32)>> = FxHashMap::default();
        for t in &tokens {
            if !occur.contains_key(&t.term) {
                order.push(t.term.clone());
            }
            occur
                .entry(t.term.clone())
                .or_default()
                .push((t.position, t.offset));
        }

        let mut tids: FxHashMap<String, u32> = FxHashMap::default();
        let mut fresh_terms: Vec<(u32, String)> = Vec::new();
        for term in &order {
            let positions = &occur[term];
            let tid = match w.get(&self.dbis.unigrams, term.as_bytes()) {
                Some(val) => {
                    let (tid, df) = decode_unigram(&val)?;
                    w.put(
                        &self.dbis.unigrams,
                        term.as_bytes().to_vec(),
                        encode_unigram(tid, df + 1),
                    );
                    tid
                }
                None => {
                    max_tid += 1;
                    w.put(
                        &self.dbis.unigrams,
                        term.as_bytes().to_vec(),
                        encode_unigram(max_tid, 1),
                    );
                    fresh_terms.push((max_tid, term.clone()));
                    max_tid
                }
            };
            tids.insert(term.clone(), tid);
            w.put_list_item(
                &self.dbis.term_docs,
                tid.to_be_bytes().to_vec(),
                did.to_be_bytes().to_vec(),
            );
            w.put(
                &self.dbis.positions,
                positions_key(did, tid),
                encode_positions(positions),
            );
        }

        // bigrams need true adjacency: position2 = position1 + 1
        let by_position: FxHashMap<u32, &str> =
            tokens.iter().map(|t| (t.position, t.term.as_str())).collect();
        for t in &tokens {
            if let Some(next) = by_position.get(&(t.position + 1)) {
                let key = bigram_key(tids[&t.term], tids[*next]);
                let freq = match w.get(&self.dbis.bigrams, &key) {
                    Some(val) => decode_u32(&val)? + 1,
                    None => 1,
                };
                w.put(&self.dbis.bigrams, key, freq.to_le_bytes().to_vec());
            }
        }

        let n_terms = tokens.len() as u32;
        w.put(&self.dbis.docs, did.to_be_bytes().to_vec(), encode_doc(n_terms, &doc_ref));

        self.put_meta(&mut w, META_MAX_TID, max_tid as u64);
        self.put_meta(&mut w, META_MAX_DID, did as u64);
        let doc_count = self.meta_u64(&w, META_DOC_COUNT) + 1;
        self.put_meta(&mut w, META_DOC_COUNT, doc_count);
        let total = self.meta_u64(&w, META_TOTAL_LEN) + n_terms as u64;
        self.put_meta(&mut w, META_TOTAL_LEN, total);
        w.commit();

        {
            let mut dict = self.dict.write();
            let mut by_tid = self.terms_by_tid.write();
            for (tid, term) in fresh_terms {
                dict.insert(&term);
                by_tid.insert(tid, term);
            }
        }
        tracing::debug!(did, terms = order.len(), "indexed document");
        Ok(did)
    }

    /// Remove a document from all five structures.
    pub fn remove_doc(&self, did: DocId) -> Result<()> {
        let mut w = self.env.write();
        let r = self.env.read();
        let Some(doc_val) = r.get(&self.dbis.docs, &did.to_be_bytes()) else {
            return Err(Error::NoSuchDoc(did));
        };
        let (n_terms, _) = decode_doc(&doc_val)?;

        // gather this doc's (tid -> positions) from the positions dbi
        let prefix = did.to_be_bytes().to_vec();
        let hi = {
            let mut p = prefix.clone();
            p.extend_from_slice(&[0xFF; 4]);
            Bound::Included(p)
        };
        let mut doc_terms: Vec<(u32, Vec<(u32, u32)>)> = Vec::new();
        for (key, val) in r.scan(&self.dbis.positions, Bound::Included(prefix), hi) {
            let tid = decode_positions_key_tid(&key)?;
            doc_terms.push((tid, decode_positions(&val)?));
        }

        let by_tid = self.terms_by_tid.read();
        let mut position_owner: FxHashMap<u32, u32> = FxHashMap::default();
        for (tid, positions) in &doc_terms {
            for (pos, _) in positions {
                position_owner.insert(*pos, *tid);
            }
            w.del(&self.dbis.positions, &positions_key(did, *tid));
            w.del_list_items(
                &self.dbis.term_docs,
                &tid.to_be_bytes(),
                &[did.to_be_bytes().to_vec()],
            );
            if let Some(term) = by_tid.get(tid) {
                if let Some(val) = w.get(&self.dbis.unigrams, term.as_bytes()) {
                    let (t, df) = decode_unigram(&val)?;
                    w.put(
                        &self.dbis.unigrams,
                        term.as_bytes().to_vec(),
                        encode_unigram(t, df.saturating_sub(1)),
                    );
                }
            }
        }

        // decrement the bigrams this doc contributed
        for (&pos, &tid) in &position_owner {
            if let Some(&next_tid) = position_owner.get(&(pos + 1)) {
                let key = bigram_key(tid, next_tid);
                if let Some(val) = w.get(&self.dbis.bigrams, &key) {
                    let freq = decode_u32(&val)?;
                    if freq <= 1 {
                        w.del(&self.dbis.bigrams, &key);
                    } else {
                        w.put(&self.dbis.bigrams, key, (freq - 1).to_le_bytes().to_vec());
                    }
                }
            }
        }

        w.del(&self.dbis.docs, &did.to_be_bytes());
        let doc_count = self.meta_u64(&w, META_DOC_COUNT).saturating_sub(1);
        self.put_meta(&mut w, META_DOC_COUNT, doc_count);
        let total = self.meta_u64(&w, META_TOTAL_LEN).saturating_sub(n_terms as u64);
        self.put_meta(&mut w, META_TOTAL_LEN, total);
        w.commit();
        tracing::debug!(did, "removed document");
        Ok(())
    }

    /// Search: tokenize, fuzz-correct each term, union per-term doc sets,
    /// rank by the bigram-boosted score. Best first.
    pub fn search(&self, query: &str) -> Result<SearchResults> {
        let r = self.env.read();
        let n_docs = self.meta_u64_r(&r, META_DOC_COUNT);
        let total_len = self.meta_u64_r(&r, META_TOTAL_LEN);
        let avg_len = if n_docs > 0 {
            total_len as f64 / n_docs as f64
        } else {
            0.0
        };

        struct Cand {
            tid: u32,
            idf: f64,
            weight: f64,
        }

        let q_tokens = en_analyzer(query);
        let dict = self.dict.read();
        let mut per_token: Vec<Vec<Cand>> = Vec::with_capacity(q_tokens.len());
        for t in &q_tokens {
            let mut cands = Vec::new();
            for (term, dist) in dict.lookup(&t.term) {
                let Some(val) = r.get(&self.dbis.unigrams, term.as_bytes()) else {
                    continue;
                };
                let (tid, df) = decode_unigram(&val)?;
                if df == 0 {
                    continue;
                }
                cands.push(Cand {
                    tid,
                    idf: idf(n_docs, df),
                    weight: 1.0 / (1.0 + dist as f64),
                });
            }
            per_token.push(cands);
        }

        let mut scores: FxHashMap<DocId, f64> = FxHashMap::default();
        for cands in &per_token {
            for c in cands {
                for did_bytes in r.iter_list(&self.dbis.term_docs, &c.tid.to_be_bytes()) {
                    let did = decode_u32_be(&did_bytes)?;
                    let tf = match r.get(&self.dbis.positions, &positions_key(did, c.tid)) {
                        Some(val) => decode_positions(&val)?.len() as f64,
                        None => continue,
                    };
                    let doc_len = match r.get(&self.dbis.docs, &did.to_be_bytes()) {
                        Some(val) => decode_doc(&val)?.0 as f64,
                        None => continue,
                    };
                    *scores.entry(did).or_insert(0.0) +=
                        c.weight * term_score(tf, c.idf, doc_len, avg_len, &self.opts.params);
                }
            }
        }

        // bigram pass over adjacent query terms, best candidate each
        for i in 0..q_tokens.len().saturating_sub(1) {
            if q_tokens[i + 1].position != q_tokens[i].position + 1 {
                continue;
            }
            let (Some(c1), Some(c2)) = (per_token[i].first(), per_token[i + 1].first()) else {
                continue;
            };
            for did_bytes in r.iter_list(&self.dbis.term_docs, &c1.tid.to_be_bytes()) {
                let did = decode_u32_be(&did_bytes)?;
                if !r.in_list(
                    &self.dbis.term_docs,
                    &c2.tid.to_be_bytes(),
                    &did.to_be_bytes(),
                ) {
                    continue;
                }
                let p1 = match r.get(&self.dbis.positions, &positions_key(did, c1.tid)) {
                    Some(val) => decode_positions(&val)?,
                    None => continue,
                };
                let p2 = match r.get(&self.dbis.positions, &positions_key(did, c2.tid)) {
                    Some(val) => decode_positions(&val)?,
                    None => continue,
                };
                let second: rustc_hash::FxHashSet<u32> = p2.iter().map(|(p, _)| *p).collect();
                let hits = p1.iter().filter(|(p, _)| second.contains(&(p + 1))).count();
                if hits > 0 {
                    *scores.entry(did).or_insert(0.0) += c1.weight.min(c2.weight)
                        * bigram_score(hits as f64, c1.idf, c2.idf, &self.opts.params);
                }
            }
        }

        let mut ranked: Vec<(DocId, f64)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut out = Vec::with_capacity(ranked.len());
        for (did, _score) in ranked {
            let val = r
                .get(&self.dbis.docs, &did.to_be_bytes())
                .ok_or(Error::NoSuchDoc(did))?;
            let (_, doc_ref) = decode_doc(&val)?;
            out.push((doc_ref, did));
        }
        Ok(SearchResults {
            inner: out.into_iter(),
        })
    }

    /// Number of live documents.
    pub fn doc_count(&self) -> u64 {
        self.meta_u64_r(&self.env.read(), META_DOC_COUNT)
    }

    fn meta_u64(&self, w: &WriteTxn<'_>, key: &[u8]) -> u64 {
        w.get(&self.dbis.meta, key)
            .and_then(|v| v.try_into().ok().map(u64::from_le_bytes))
            .unwrap_or(0)
    }

    fn meta_u64_r(&self, r: &ReadTxn, key: &[u8]) -> u64 {
        r.get(&self.dbis.meta, key)
            .and_then(|v| v.try_into().ok().map(u64::from_le_bytes))
            .unwrap_or(0)
    }

    fn put_meta(&self, w: &mut WriteTxn<'_>, key: &[u8], val: u64) {
        w.put(&self.dbis.meta, key.to_vec(), val.to_le_bytes().to_vec());
    }
}

fn encode_unigram(tid: u32, df: u32) -> Vec<u8> {
    let mut v = Vec::with_capacity(8);
    v.extend_from_slice(&tid.to_le_bytes());
    v.extend_from_slice(&df.to_le_bytes());
    v
}

fn decode_unigram(val: &[u8]) -> Result<(u32, u32)> {
    if val.len() != 8 {
        return Err(Error::corrupt("unigrams", format!("len {}", val.len())));
    }
    Ok((
        u32::from_le_bytes(val[..4].try_into().unwrap()),
        u32::from_le_bytes(val[4..].try_into().unwrap()),
    ))
}

fn bigram_key(tid1: u32, tid2: u32) -> Vec<u8> {
    let mut k = Vec::with_capacity(8);
    k.extend_from_slice(&tid1.to_be_bytes());
    k.extend_from_slice(&tid2.to_be_bytes());
    k
}

fn positions_key(did: DocId, tid: u32) -> Vec<u8> {
    let mut k = Vec::with_capacity(8);
    k.extend_from_slice(&did.to_be_bytes());
    k.extend_from_slice(&tid.to_be_bytes());
    k
}

fn decode_positions_key_tid(key: &[u8]) -> Result<u32> {
    if key.len() != 8 {
        return Err(Error::corrupt("positions", format!("key len {}", key.len())));
    }
    Ok(u32::from_be_bytes(key[4..].try_into().unwrap()))
}

fn encode_positions(positions: &[(u32, u32)]) -> Vec<u8> {
    let mut v = Vec::with_capacity(positions.len() * 8);
    for (pos, off) in positions {
        v.extend_from_slice(&pos.to_le_bytes());
        v.extend_from_slice(&off.to_le_bytes());
    }
    v
}

fn decode_positions(val: &[u8]) -> Result<Vec<(u32, u32)>> {
    if val.len() % 8 != 0 {
        return Err(Error::corrupt("positions", format!("len {}", val.len())));
    }
    Ok(val
        .chunks_exact(8)
        .map(|c| {
            (
                u32::from_le_bytes(c[..4].try_into().unwrap()),
                u32::from_le_bytes(c[4..].try_into().unwrap()),
            )
        })
        .collect())
}

fn decode_u32(val: &[u8]) -> Result<u32> {
    val.try_into()
        .map(u32::from_le_bytes)
        .map_err(|_| Error::corrupt("bigrams", format!("len {}", val.len())))
}

fn decode_u32_be(val: &[u8]) -> Result<u32> {
    val.try_into()
        .map(u32::from_be_bytes)
        .map_err(|_| Error::corrupt("term-docs", format!("len {}", val.len())))
}

fn encode_doc(n_terms: u32, doc_ref: &Value) -> Vec<u8> {
    let mut v = Vec::with_capacity(16);
    v.extend_from_slice(&n_terms.to_le_bytes());
    codec::encode_value(doc_ref, &mut v);
    v
}

fn decode_doc(val: &[u8]) -> Result<(u32, Value)> {
    if val.len() < 4 {
        return Err(Error::corrupt("docs", format!("len {}", val.len())));
    }
    let n_terms = u32::from_le_bytes(val[..4].try_into().unwrap());
    let (doc_ref, _) = codec::decode_value(&val[4..])?;
    Ok((n_terms, doc_ref))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, SearchEngine) {
        let dir = tempfile::tempdir().unwrap();
        let env = Env::open(dir.path()).unwrap();
        let engine = SearchEngine::open(env, SearchOptions::default()).unwrap();
        (dir, engine)
    }

    #[test]
    fn test_bigram_match_outranks_isolated_terms() {
        let (_d, engine) = scratch();
        engine
            .add_doc(
                Value::Long(0),
                "The quick red fox jumped over the lazy red dogs.",
            )
            .unwrap();
        engine
            .add_doc(
                Value::Long(1),
                "Mary had a little lamb whose fleece was red as fire.",
            )
            .unwrap();

        let hits: Vec<(Value, DocId)> = engine.search("red fox").unwrap().collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, Value::Long(0));
        assert_eq!(hits[1].0, Value::Long(1));
    }

    #[test]
    fn test_fuzzy_correction_finds_docs() {
        let (_d, engine) = scratch();
        engine.add_doc(Value::Long(0), "a quick brown fox").unwrap();
        // one deletion and one substitution away
        let hits: Vec<_> = engine.search("qick browm").unwrap().collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 1);
    }

    #[test]
    fn test_stop_words_never_match() {
        let (_d, engine) = scratch();
        engine.add_doc(Value::Long(0), "the cat sat on the mat").unwrap();
        let hits: Vec<_> = engine.search("the on a").unwrap().collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_remove_doc_drops_from_results() {
        let (_d, engine) = scratch();
        let d1 = engine.add_doc(Value::Long(0), "red fox").unwrap();
        engine.add_doc(Value::Long(1), "red lamp").unwrap();
        assert_eq!(engine.doc_count(), 2);

        engine.remove_doc(d1).unwrap();
        assert_eq!(engine.doc_count(), 1);
        let hits: Vec<_> = engine.search("red").unwrap().collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, Value::Long(1));

        assert!(matches!(
            engine.remove_doc(d1),
            Err(Error::NoSuchDoc(_))
        ));
    }

    #[test]
    fn test_doc_refs_roundtrip_values() {
        let (_d, engine) = scratch();
        let doc_ref = Value::Str("doc://alpha".into());
        engine.add_doc(doc_ref.clone(), "alpha beta gamma").unwrap();
        let hits: Vec<_> = engine.search("beta").unwrap().collect();
        assert_eq!(hits[0].0, doc_ref);
    }

    #[test]
    fn test_term_frequency_matters() {
        let (_d, engine) = scratch();
        engine.add_doc(Value::Long(0), "wolf wolf wolf wolf").unwrap();
        engine.add_doc(Value::Long(1), "wolf sheep goat cow").unwrap();
        let hits: Vec<_> = engine.search("wolf").unwrap().collect();
        assert_eq!(hits[0].0, Value::Long(0));
    }
}
