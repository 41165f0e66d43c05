//! Ranking
//!
//! Unigram scoring is BM25-shaped: IDF times a saturating term-frequency
//! curve with document-length normalization. Bigram hits (adjacent query
//! terms adjacent in the document) add a boosted contribution on top, so
//! phrase-ish matches outrank bags of isolated terms.

/// Scoring parameters.
#[derive(Clone, Copy, Debug)]
pub struct ScoreParams {
    pub k1: f64,
    pub b: f64,
    /// Multiplier for bigram contributions relative to unigrams
    pub bigram_boost: f64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            bigram_boost: 2.0,
        }
    }
}

/// IDF: `log(1 + (N - n + 0.5) / (n + 0.5))`.
#[inline]
pub fn idf(total_docs: u64, doc_freq: u32) -> f64 {
    let n = total_docs as f64;
    let df = doc_freq as f64;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// One term's contribution:
/// `idf * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl/avg_dl))`.
#[inline]
pub fn term_score(tf: f64, idf: f64, doc_len: f64, avg_doc_len: f64, p: &ScoreParams) -> f64 {
    let len_norm = if avg_doc_len > 0.0 {
        doc_len / avg_doc_len
    } else {
        1.0
    };
    idf * (tf * (p.k1 + 1.0)) / (tf + p.k1 * (1.0 - p.b + p.b * len_norm))
}

/// A bigram hit's contribution: the pair's mean IDF, saturated on the hit
/// count, multiplied by the boost.
#[inline]
pub fn bigram_score(hits: f64, idf1: f64, idf2: f64, p: &ScoreParams) -> f64 {
    p.bigram_boost * (idf1 + idf2) / 2.0 * (hits / (hits + 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idf_decreases_with_doc_freq() {
        let rare = idf(100, 1);
        let common = idf(100, 90);
        assert!(rare > common);
        assert!(common > 0.0);
    }

    #[test]
    fn test_term_score_saturates() {
        let p = ScoreParams::default();
        let s1 = term_score(1.0, 1.0, 10.0, 10.0, &p);
        let s2 = term_score(2.0, 1.0, 10.0, 10.0, &p);
        let s10 = term_score(10.0, 1.0, 10.0, 10.0, &p);
        assert!(s2 > s1);
        // diminishing returns
        assert!(s10 - s2 < (s2 - s1) * 9.0);
    }

    #[test]
    fn test_long_docs_penalized() {
        let p = ScoreParams::default();
        let short = term_score(1.0, 1.0, 5.0, 10.0, &p);
        let long = term_score(1.0, 1.0, 50.0, 10.0, &p);
        assert!(short > long);
    }

    #[test]
    fn test_bigram_outweighs_unigram() {
        let p = ScoreParams::default();
        let uni = term_score(1.0, 1.0, 10.0, 10.0, &p);
        let bi = bigram_score(1.0, 1.0, 1.0, &p);
        assert!(bi > uni * 0.4);
    }
}
