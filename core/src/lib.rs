use serde::{Deserialize, Serialize};

pub mod analyzer;
pub mod config;
pub mod document;
pub mod error;
pub mod handle;
pub mod index;
pub mod persist;
pub mod query;
pub mod run;
pub mod scorer;
pub mod segment;
pub mod stats;

pub use analyzer::{AnalyzedDocument, Analyzer, Language, Token, TokenStream};
pub use config::IndexConfig;
pub use document::{DocIdSequence, DocStore, Document, Field};
pub use error::{IndexError, Result};
pub use handle::IndexHandle;
pub use index::IndexBuilder;
pub use persist::{IndexPaths, IndexWriter, Published, SegmentReader};
pub use query::{QueryEngine, QueryOptions, RankedResults, SearchHit};
pub use run::IndexingRun;
pub use scorer::{Bm25Params, Bm25Scorer};
pub use segment::Segment;
pub use stats::{CorpusStatistics, FieldStats};

pub type TermId = u32;
pub type DocId = u32;
pub type FieldId = u16;
/// Bumped on every indexed document; statistics are only valid for the revision they were computed at.
pub type Revision = u64;
/// Number of a published on-disk segment generation.
pub type Generation = u64;

/// Postings are keyed per field, so the same term in `title` and `body` has two lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostingsKey {
    pub field: FieldId,
    pub term: TermId,
}

impl PostingsKey {
    pub fn new(field: FieldId, term: TermId) -> Self {
        Self { field, term }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub term_freq: u32,
    /// Token positions within the field, ascending.
    pub positions: Vec<u32>,
}

/// Postings for one (field, term) pair, sorted by doc_id with no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingsList {
    postings: Vec<Posting>,
}

impl PostingsList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of the term at `position` in document `doc_id`.
    ///
    /// Documents arrive in ascending id order, so either the last posting
    /// belongs to `doc_id` or a new posting is appended.
    pub(crate) fn record(&mut self, doc_id: DocId, position: u32) {
        match self.postings.last_mut() {
            Some(last) if last.doc_id == doc_id => {
                last.term_freq += 1;
                last.positions.push(position);
            }
            _ => self.postings.push(Posting { doc_id, term_freq: 1, positions: vec![position] }),
        }
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Posting> {
        self.postings.iter()
    }

    pub fn as_slice(&self) -> &[Posting] {
        &self.postings
    }

    /// True when doc ids are strictly increasing.
    pub fn is_well_ordered(&self) -> bool {
        self.postings.windows(2).all(|w| w[0].doc_id < w[1].doc_id)
    }
}

impl<'a> IntoIterator for &'a PostingsList {
    type Item = &'a Posting;
    type IntoIter = std::slice::Iter<'a, Posting>;

    fn into_iter(self) -> Self::IntoIter {
        self.postings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_and_increments() {
        let mut list = PostingsList::new();
        list.record(0, 1);
        list.record(0, 4);
        list.record(2, 0);
        assert_eq!(list.len(), 2);
        assert_eq!(list.as_slice()[0].term_freq, 2);
        assert_eq!(list.as_slice()[0].positions, vec![1, 4]);
        assert_eq!(list.as_slice()[1].doc_id, 2);
        assert!(list.is_well_ordered());
    }
}
