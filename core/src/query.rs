//! Query evaluation against one segment.
//!
//! A query moves through parse → retrieve → score → rank, each stage a
//! separate type so a stage cannot be skipped or re-entered:
//! [`ParsedQuery`] → [`RetrievedQuery`] → [`ScoredQuery`] → [`RankedResults`].
//!
//! Syntax: whitespace separated clauses, either `text` (all fields) or
//! `field:text` (one field). Clause text goes through the segment's analyzer,
//! so stop words vanish and words are stemmed exactly as at index time.

use crate::document::Document;
use crate::error::{IndexError, Result};
use crate::segment::Segment;
use crate::{DocId, FieldId, PostingsKey, PostingsList};
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Keep only the best `k` results.
    pub top_k: Option<usize>,
    /// Per-field multiplier; fields not listed weigh 1.0.
    pub field_weights: HashMap<String, f32>,
}

impl QueryOptions {
    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn field_weight(mut self, field: impl Into<String>, weight: f32) -> Self {
        self.field_weights.insert(field.into(), weight);
        self
    }

    fn weight(&self, field: &str) -> f32 {
        self.field_weights.get(field).copied().unwrap_or(1.0)
    }

    fn validate(&self) -> Result<()> {
        for (field, w) in &self.field_weights {
            if !w.is_finite() || *w < 0.0 {
                return Err(IndexError::InvalidQuery(format!("weight for `{field}` must be a non-negative number")));
            }
        }
        Ok(())
    }
}

/// One analyzed query term, optionally restricted to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    pub field: Option<String>,
    pub term: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f32,
    pub fields: Document,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'s> {
    segment: &'s Segment,
}

impl<'s> QueryEngine<'s> {
    pub fn new(segment: &'s Segment) -> Self {
        Self { segment }
    }

    pub fn parse(&self, text: &str, options: &QueryOptions) -> Result<ParsedQuery<'s>> {
        options.validate()?;
        let analyzer = self.segment.analyzer();
        let mut terms = Vec::new();
        for clause in text.split_whitespace() {
            let (field, body) = match clause.split_once(':') {
                Some((field, body)) => {
                    if field.is_empty() || body.is_empty() {
                        return Err(IndexError::InvalidQuery(format!("incomplete field clause `{clause}`")));
                    }
                    (Some(field), body)
                }
                None => (None, clause),
            };
            terms.extend(analyzer.analyze(body).map(|t| QueryTerm { field: field.map(str::to_string), term: t.term }));
        }
        tracing::debug!(query = text, terms = terms.len(), "parsed query");
        Ok(ParsedQuery { segment: self.segment, terms, options: options.clone() })
    }

    /// Run every stage and return ranked `(doc_id, score)` pairs.
    pub fn search(&self, text: &str, options: &QueryOptions) -> Result<RankedResults> {
        self.parse(text, options)?.retrieve().score().map(ScoredQuery::rank)
    }
}

#[derive(Debug)]
pub struct ParsedQuery<'s> {
    segment: &'s Segment,
    terms: Vec<QueryTerm>,
    options: QueryOptions,
}

impl<'s> ParsedQuery<'s> {
    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    /// Look up postings for every term. Unknown terms and fields yield nothing.
    pub fn retrieve(self) -> RetrievedQuery<'s> {
        let segment = self.segment;
        let mut lists = Vec::new();
        for qt in &self.terms {
            let Some(term) = segment.term_id(&qt.term) else { continue };
            let fields: Vec<FieldId> = match &qt.field {
                Some(name) => segment.field_id(name).into_iter().collect(),
                None => (0..segment.fields().len() as FieldId).collect(),
            };
            for field in fields {
                let weight = self.options.weight(&segment.fields()[field as usize]);
                if weight == 0.0 {
                    continue;
                }
                let key = PostingsKey::new(field, term);
                if let Some(list) = segment.postings(key) {
                    lists.push(WeightedPostings { key, weight, list });
                }
            }
        }
        tracing::debug!(lists = lists.len(), "retrieved postings");
        RetrievedQuery { segment, lists, top_k: self.options.top_k }
    }
}

#[derive(Debug)]
struct WeightedPostings<'s> {
    key: PostingsKey,
    weight: f32,
    list: &'s PostingsList,
}

#[derive(Debug)]
pub struct RetrievedQuery<'s> {
    segment: &'s Segment,
    lists: Vec<WeightedPostings<'s>>,
    top_k: Option<usize>,
}

impl RetrievedQuery<'_> {
    pub fn num_lists(&self) -> usize {
        self.lists.len()
    }

    /// Union the postings lists in doc id order, summing BM25 contributions.
    pub fn score(self) -> Result<ScoredQuery> {
        let scorer = self.segment.scorer()?;
        let mut cursors = vec![0usize; self.lists.len()];
        let mut heap: BinaryHeap<Reverse<(DocId, usize)>> = self
            .lists
            .iter()
            .enumerate()
            .filter_map(|(i, wp)| wp.list.as_slice().first().map(|p| Reverse((p.doc_id, i))))
            .collect();

        let mut scored: Vec<(DocId, f32)> = Vec::new();
        while let Some(Reverse((doc_id, i))) = heap.pop() {
            let wp = &self.lists[i];
            let posting = &wp.list.as_slice()[cursors[i]];
            let dl = self.segment.field_length(wp.key.field, doc_id);
            let contribution = wp.weight * scorer.score(wp.key, posting.term_freq, dl);

            match scored.last_mut() {
                Some((last, score)) if *last == doc_id => *score += contribution,
                _ => scored.push((doc_id, contribution)),
            }

            cursors[i] += 1;
            if let Some(next) = wp.list.as_slice().get(cursors[i]) {
                heap.push(Reverse((next.doc_id, i)));
            }
        }
        tracing::debug!(matches = scored.len(), "scored query");
        Ok(ScoredQuery { scored, top_k: self.top_k })
    }
}

#[derive(Debug)]
pub struct ScoredQuery {
    scored: Vec<(DocId, f32)>,
    top_k: Option<usize>,
}

impl ScoredQuery {
    /// Order by descending score, then ascending doc id.
    pub fn rank(mut self) -> RankedResults {
        self.scored.sort_by(|a, b| compare_hits(*a, *b));
        let total_hits = self.scored.len();
        if let Some(k) = self.top_k {
            self.scored.truncate(k);
        }
        RankedResults { total_hits, hits: self.scored.into_iter() }
    }
}

pub fn compare_hits(a: (DocId, f32), b: (DocId, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Final ranking, consumed once.
#[derive(Debug)]
pub struct RankedResults {
    total_hits: usize,
    hits: std::vec::IntoIter<(DocId, f32)>,
}

impl RankedResults {
    /// Matches before top-k truncation.
    pub fn total_hits(&self) -> usize {
        self.total_hits
    }

    /// Attach stored fields to the remaining results.
    pub fn into_hits(self, segment: &Segment) -> Result<Vec<SearchHit>> {
        self.hits
            .map(|(doc_id, score)| Ok(SearchHit { doc_id, score, fields: segment.get_document(doc_id)?.clone() }))
            .collect()
    }
}

impl Iterator for RankedResults {
    type Item = (DocId, f32);

    fn next(&mut self) -> Option<Self::Item> {
        self.hits.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.hits.size_hint()
    }
}

impl ExactSizeIterator for RankedResults {}
