//! In-memory inverted index construction.

use crate::analyzer::AnalyzedDocument;
use crate::error::{IndexError, Result};
use crate::stats::{CorpusStatistics, FieldStats};
use crate::{DocId, FieldId, PostingsKey, PostingsList, Revision, TermId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct IndexBuilder {
    pub(crate) fields: Vec<String>,
    field_ids: HashMap<String, FieldId>,
    pub(crate) vocabulary: HashMap<String, TermId>,
    pub(crate) postings: BTreeMap<PostingsKey, PostingsList>,
    /// Analyzed length per field, indexed by doc id. Shorter vectors mean zero.
    pub(crate) field_lengths: Vec<Vec<u32>>,
    field_doc_counts: Vec<u32>,
    num_docs: u32,
    last_doc: Option<DocId>,
    revision: Revision,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn num_terms(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn postings(&self, field: &str, term: &str) -> Option<&PostingsList> {
        let field = *self.field_ids.get(field)?;
        let term = *self.vocabulary.get(term)?;
        self.postings.get(&PostingsKey::new(field, term))
    }

    /// Add one analyzed document. Ids must be strictly increasing across calls.
    pub fn index_document(&mut self, id: DocId, doc: &AnalyzedDocument) -> Result<()> {
        if let Some(last) = self.last_doc {
            if id <= last {
                return Err(IndexError::OrderViolation { last, got: id });
            }
        }
        if self.fields.len() + doc.fields.len() > FieldId::MAX as usize {
            return Err(IndexError::InvalidDocument("too many distinct fields".into()));
        }

        for field in &doc.fields {
            let fid = self.field_id(&field.name);
            let lengths = &mut self.field_lengths[fid as usize];
            if lengths.len() <= id as usize {
                lengths.resize(id as usize + 1, 0);
            }
            lengths[id as usize] = field.tokens.len() as u32;
            self.field_doc_counts[fid as usize] += 1;

            for token in &field.tokens {
                let next_term = self.vocabulary.len() as TermId;
                let tid = *self.vocabulary.entry(token.term.clone()).or_insert(next_term);
                self.postings.entry(PostingsKey::new(fid, tid)).or_default().record(id, token.position);
            }
        }

        self.num_docs += 1;
        self.last_doc = Some(id);
        self.revision += 1;
        Ok(())
    }

    fn field_id(&mut self, name: &str) -> FieldId {
        if let Some(&id) = self.field_ids.get(name) {
            return id;
        }
        let id = self.fields.len() as FieldId;
        self.fields.push(name.to_string());
        self.field_ids.insert(name.to_string(), id);
        self.field_lengths.push(Vec::new());
        self.field_doc_counts.push(0);
        id
    }

    /// Compute document frequencies and field length averages for the current revision.
    pub fn finalize(&self) -> CorpusStatistics {
        let doc_freq = self.postings.iter().map(|(key, list)| (*key, list.len() as u32)).collect();

        let fields = self
            .fields
            .iter()
            .zip(&self.field_lengths)
            .zip(&self.field_doc_counts)
            .map(|((name, lengths), &doc_count)| {
                let total_length: u64 = lengths.iter().map(|&l| l as u64).sum();
                let avg_length = if doc_count == 0 { 0.0 } else { total_length as f32 / doc_count as f32 };
                FieldStats { name: name.clone(), doc_count, total_length, avg_length }
            })
            .collect();

        tracing::debug!(num_docs = self.num_docs, num_terms = self.vocabulary.len(), revision = self.revision, "finalized corpus statistics");
        CorpusStatistics { revision: self.revision, num_docs: self.num_docs, fields, doc_freq }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::document::Document;

    fn analyzed(a: &Analyzer, body: &str) -> AnalyzedDocument {
        a.analyze_document(&Document::new().with_field("body", body))
    }

    #[test]
    fn postings_track_frequency_and_positions() {
        let a = Analyzer::default();
        let mut b = IndexBuilder::new();
        b.index_document(0, &analyzed(&a, "cat cat dog")).unwrap();
        b.index_document(1, &analyzed(&a, "cat")).unwrap();
        let list = b.postings("body", "cat").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.as_slice()[0].term_freq, 2);
        assert_eq!(list.as_slice()[0].positions, vec![0, 1]);
        assert!(list.is_well_ordered());
    }

    #[test]
    fn rejects_out_of_order_ids() {
        let a = Analyzer::default();
        let mut b = IndexBuilder::new();
        b.index_document(3, &analyzed(&a, "cat")).unwrap();
        let err = b.index_document(3, &analyzed(&a, "dog")).unwrap_err();
        assert!(matches!(err, IndexError::OrderViolation { last: 3, got: 3 }));
        assert_eq!(b.num_docs(), 1);
    }

    #[test]
    fn stopword_only_field_counts_document() {
        let a = Analyzer::default();
        let mut b = IndexBuilder::new();
        b.index_document(0, &analyzed(&a, "the and of")).unwrap();
        let stats = b.finalize();
        assert_eq!(stats.num_docs, 1);
        assert!(stats.doc_freq.is_empty());
        assert_eq!(stats.fields[0].total_length, 0);
    }

    #[test]
    fn finalize_stamps_revision() {
        let a = Analyzer::default();
        let mut b = IndexBuilder::new();
        b.index_document(0, &analyzed(&a, "alpha beta")).unwrap();
        b.index_document(1, &analyzed(&a, "beta gamma delta epsilon")).unwrap();
        let stats = b.finalize();
        assert_eq!(stats.revision, b.revision());
        assert_eq!(stats.fields[0].avg_length, 3.0);
        let beta = PostingsKey::new(0, b.vocabulary["beta"]);
        assert_eq!(stats.doc_freq(beta), 2);
    }
}
