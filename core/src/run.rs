use crate::analyzer::{AnalyzedDocument, Analyzer};
use crate::config::IndexConfig;
use crate::document::{DocIdSequence, DocStore, Document};
use crate::error::Result;
use crate::index::IndexBuilder;
use crate::segment::Segment;
use crate::DocId;
use rayon::prelude::*;

/// One indexing pass from empty to a sealed [`Segment`].
///
/// Nothing is visible outside the run until [`IndexingRun::finish`]; dropping
/// the run abandons it.
#[derive(Debug)]
pub struct IndexingRun {
    config: IndexConfig,
    analyzer: Analyzer,
    store: DocStore,
    builder: IndexBuilder,
}

impl IndexingRun {
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            analyzer: config.analyzer(),
            config,
            store: DocStore::new(DocIdSequence::new()),
            builder: IndexBuilder::new(),
        })
    }

    pub fn num_docs(&self) -> usize {
        self.store.len()
    }

    pub fn add_document(&mut self, doc: Document) -> Result<DocId> {
        let analyzed = self.analyzer.analyze_document(&doc);
        self.ingest(doc, analyzed)
    }

    /// Analyze a batch in parallel, then store and index serially in input order.
    ///
    /// Stops at the first invalid document; documents before it stay in the run.
    pub fn add_documents(&mut self, docs: Vec<Document>) -> Result<Vec<DocId>> {
        let analyzer = &self.analyzer;
        let analyzed: Vec<AnalyzedDocument> = docs.par_iter().map(|d| analyzer.analyze_document(d)).collect();
        docs.into_iter().zip(analyzed).map(|(doc, analyzed)| self.ingest(doc, analyzed)).collect()
    }

    fn ingest(&mut self, doc: Document, analyzed: AnalyzedDocument) -> Result<DocId> {
        let id = self.store.add_document(doc)?;
        self.builder.index_document(id, &analyzed)?;
        Ok(id)
    }

    pub fn finish(self) -> Result<Segment> {
        let stats = self.builder.finalize();
        tracing::info!(num_docs = stats.num_docs, num_terms = self.builder.num_terms(), language = %self.config.language, "indexing run finished");
        Segment::build(self.config, self.builder, self.store, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;

    #[test]
    fn batch_and_single_agree() {
        let bodies = ["The cat sat on the mat", "Dogs chase cats", "Nothing here", "cat"];
        let mut single = IndexingRun::new(IndexConfig::default()).unwrap();
        for b in bodies {
            single.add_document(Document::new().with_field("body", b)).unwrap();
        }
        let mut batch = IndexingRun::new(IndexConfig::default()).unwrap();
        let ids = batch.add_documents(bodies.iter().map(|b| Document::new().with_field("body", *b)).collect()).unwrap();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        let a = single.finish().unwrap();
        let b = batch.finish().unwrap();
        assert_eq!(a.postings, b.postings);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn invalid_document_stops_batch() {
        let mut run = IndexingRun::new(IndexConfig::default()).unwrap();
        let docs = vec![Document::new().with_field("body", "ok"), Document::new(), Document::new().with_field("body", "late")];
        assert!(matches!(run.add_documents(docs), Err(IndexError::InvalidDocument(_))));
        assert_eq!(run.num_docs(), 1);
        assert_eq!(run.finish().unwrap().num_docs(), 1);
    }
}
