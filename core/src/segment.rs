//! The immutable unit a query runs against.

use crate::analyzer::Analyzer;
use crate::config::IndexConfig;
use crate::document::{DocStore, Document};
use crate::error::{IndexError, Result};
use crate::index::IndexBuilder;
use crate::scorer::Bm25Scorer;
use crate::stats::CorpusStatistics;
use crate::{DocId, FieldId, PostingsKey, PostingsList, Revision, TermId};
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct Segment {
    pub(crate) config: IndexConfig,
    pub(crate) fields: Vec<String>,
    pub(crate) vocabulary: BTreeMap<String, TermId>,
    pub(crate) postings: BTreeMap<PostingsKey, PostingsList>,
    pub(crate) field_lengths: Vec<Vec<u32>>,
    pub(crate) docs: DocStore,
    pub(crate) stats: CorpusStatistics,
    pub(crate) revision: Revision,
    analyzer: Analyzer,
}

/// Everything a segment is made of, as stored on disk.
pub(crate) struct SegmentParts {
    pub config: IndexConfig,
    pub fields: Vec<String>,
    pub vocabulary: BTreeMap<String, TermId>,
    pub postings: BTreeMap<PostingsKey, PostingsList>,
    pub field_lengths: Vec<Vec<u32>>,
    pub docs: Vec<Document>,
    pub stats: CorpusStatistics,
    pub revision: Revision,
}

impl Segment {
    /// Seal a builder and its document store. `stats` must come from `builder.finalize()`
    /// after the last document was indexed.
    pub fn build(config: IndexConfig, builder: IndexBuilder, docs: DocStore, stats: CorpusStatistics) -> Result<Self> {
        if stats.revision != builder.revision() {
            return Err(IndexError::StaleStatistics { expected: builder.revision(), found: stats.revision });
        }
        config.validate()?;
        let revision = builder.revision();
        let IndexBuilder { fields, vocabulary, postings, field_lengths, .. } = builder;
        Ok(Self {
            analyzer: config.analyzer(),
            config,
            fields,
            vocabulary: vocabulary.into_iter().collect(),
            postings,
            field_lengths,
            docs,
            stats,
            revision,
        })
    }

    pub fn empty(config: IndexConfig) -> Self {
        Self {
            analyzer: config.analyzer(),
            config,
            fields: Vec::new(),
            vocabulary: BTreeMap::new(),
            postings: BTreeMap::new(),
            field_lengths: Vec::new(),
            docs: DocStore::default(),
            stats: CorpusStatistics::default(),
            revision: 0,
        }
    }

    pub(crate) fn from_parts(parts: SegmentParts) -> Result<Self> {
        if parts.stats.revision != parts.revision {
            return Err(IndexError::StaleStatistics { expected: parts.revision, found: parts.stats.revision });
        }
        Ok(Self {
            analyzer: parts.config.analyzer(),
            config: parts.config,
            fields: parts.fields,
            vocabulary: parts.vocabulary,
            postings: parts.postings,
            field_lengths: parts.field_lengths,
            docs: DocStore::from_documents(parts.docs),
            stats: parts.stats,
            revision: parts.revision,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn stats(&self) -> &CorpusStatistics {
        &self.stats
    }

    pub fn num_docs(&self) -> u32 {
        self.stats.num_docs
    }

    pub fn num_terms(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.fields.iter().position(|f| f == name).map(|i| i as FieldId)
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.vocabulary.get(term).copied()
    }

    /// Terms in sorted order.
    pub fn terms(&self) -> impl Iterator<Item = &str> + '_ {
        self.vocabulary.keys().map(String::as_str)
    }

    pub fn postings(&self, key: PostingsKey) -> Option<&PostingsList> {
        self.postings.get(&key)
    }

    pub fn postings_for(&self, field: &str, term: &str) -> Option<&PostingsList> {
        let key = PostingsKey::new(self.field_id(field)?, self.term_id(term)?);
        self.postings(key)
    }

    pub fn field_length(&self, field: FieldId, doc: DocId) -> u32 {
        self.field_lengths.get(field as usize).and_then(|l| l.get(doc as usize)).copied().unwrap_or(0)
    }

    pub fn get_document(&self, id: DocId) -> Result<&Document> {
        self.docs.get_document(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = (DocId, &Document)> + '_ {
        self.docs.iter()
    }

    pub fn scorer(&self) -> Result<Bm25Scorer<'_>> {
        Bm25Scorer::new(self.config.bm25, &self.stats, self.revision)
    }
}
