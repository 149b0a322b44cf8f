//! Okapi BM25.
//!
//! idf = ln(1 + (N - df + 0.5) / (df + 0.5))
//! w   = idf * tf * (k1 + 1) / (tf + k1 * (1 - b + b * dl / avgdl))

use crate::error::{IndexError, Result};
use crate::stats::CorpusStatistics;
use crate::{PostingsKey, Revision};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25Params {
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(IndexError::InvalidConfig(format!("k1 must be a non-negative number, got {}", self.k1)));
        }
        if !self.b.is_finite() || !(0.0..=1.0).contains(&self.b) {
            return Err(IndexError::InvalidConfig(format!("b must be within [0, 1], got {}", self.b)));
        }
        Ok(())
    }
}

pub fn idf(doc_freq: u32, num_docs: u32) -> f32 {
    let n = num_docs as f32;
    let df = doc_freq as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

pub fn term_weight(params: Bm25Params, idf: f32, tf: u32, doc_len: u32, avg_len: f32) -> f32 {
    if tf == 0 {
        return 0.0;
    }
    let tf = tf as f32;
    let avg_len = if avg_len > 0.0 { avg_len } else { 1.0 };
    let norm = params.k1 * (1.0 - params.b + params.b * doc_len as f32 / avg_len);
    idf * tf * (params.k1 + 1.0) / (tf + norm)
}

/// Scores postings against one set of corpus statistics.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Scorer<'a> {
    params: Bm25Params,
    stats: &'a CorpusStatistics,
}

impl<'a> Bm25Scorer<'a> {
    /// Refuses statistics computed at a different revision than the postings being scored.
    pub fn new(params: Bm25Params, stats: &'a CorpusStatistics, revision: Revision) -> Result<Self> {
        if stats.revision != revision {
            return Err(IndexError::StaleStatistics { expected: revision, found: stats.revision });
        }
        params.validate()?;
        Ok(Self { params, stats })
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    pub fn idf(&self, key: PostingsKey) -> f32 {
        idf(self.stats.doc_freq(key), self.stats.num_docs)
    }

    /// Contribution of one (field, term) match with frequency `tf` in a field of length `doc_len`.
    pub fn score(&self, key: PostingsKey, tf: u32, doc_len: u32) -> f32 {
        term_weight(self.params, self.idf(key), tf, doc_len, self.stats.avg_field_length(key.field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::FieldStats;

    fn stats(revision: Revision) -> CorpusStatistics {
        let mut s = CorpusStatistics {
            revision,
            num_docs: 10,
            fields: vec![FieldStats { name: "body".into(), doc_count: 10, total_length: 100, avg_length: 10.0 }],
            ..Default::default()
        };
        s.doc_freq.insert(PostingsKey::new(0, 0), 2);
        s.doc_freq.insert(PostingsKey::new(0, 1), 9);
        s
    }

    #[test]
    fn rare_terms_weigh_more() {
        let st = stats(1);
        let scorer = Bm25Scorer::new(Bm25Params::default(), &st, 1).unwrap();
        let rare = scorer.score(PostingsKey::new(0, 0), 1, 10);
        let common = scorer.score(PostingsKey::new(0, 1), 1, 10);
        assert!(rare > common && common > 0.0);
    }

    #[test]
    fn higher_tf_scores_higher_but_saturates() {
        let st = stats(1);
        let scorer = Bm25Scorer::new(Bm25Params::default(), &st, 1).unwrap();
        let key = PostingsKey::new(0, 0);
        let s1 = scorer.score(key, 1, 10);
        let s2 = scorer.score(key, 2, 10);
        let s50 = scorer.score(key, 50, 10);
        assert!(s2 > s1);
        assert!(s50 < scorer.idf(key) * (1.2 + 1.0));
    }

    #[test]
    fn shorter_fields_score_higher() {
        let st = stats(1);
        let scorer = Bm25Scorer::new(Bm25Params::default(), &st, 1).unwrap();
        let key = PostingsKey::new(0, 0);
        assert!(scorer.score(key, 1, 5) > scorer.score(key, 1, 20));
    }

    #[test]
    fn matches_reference_value() {
        // N=10, df=2: idf = ln(1 + 8.5/2.5) = ln(4.4)
        let w = term_weight(Bm25Params::default(), idf(2, 10), 1, 10, 10.0);
        let expected = 4.4f32.ln() * 2.2 / (1.0 + 1.2);
        assert!((w - expected).abs() < 1e-6);
    }

    #[test]
    fn stale_statistics_are_refused() {
        let st = stats(3);
        let err = Bm25Scorer::new(Bm25Params::default(), &st, 4).unwrap_err();
        assert!(matches!(err, IndexError::StaleStatistics { expected: 4, found: 3 }));
    }

    #[test]
    fn invalid_params_are_refused() {
        let st = stats(1);
        let bad = Bm25Params { k1: 1.2, b: 1.5 };
        assert!(matches!(Bm25Scorer::new(bad, &st, 1), Err(IndexError::InvalidConfig(_))));
    }
}
