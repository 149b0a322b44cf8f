use crate::{FieldId, PostingsKey, Revision};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub name: String,
    /// Documents with at least one value for this field.
    pub doc_count: u32,
    /// Sum of analyzed lengths over those documents.
    pub total_length: u64,
    pub avg_length: f32,
}

/// Corpus-wide inputs to BM25, valid only for the builder revision they carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorpusStatistics {
    pub revision: Revision,
    pub num_docs: u32,
    pub fields: Vec<FieldStats>,
    pub doc_freq: BTreeMap<PostingsKey, u32>,
}

impl CorpusStatistics {
    pub fn doc_freq(&self, key: PostingsKey) -> u32 {
        self.doc_freq.get(&key).copied().unwrap_or(0)
    }

    pub fn field(&self, field: FieldId) -> Option<&FieldStats> {
        self.fields.get(field as usize)
    }

    pub fn avg_field_length(&self, field: FieldId) -> f32 {
        self.field(field).map(|f| f.avg_length).unwrap_or(0.0)
    }

    /// Number of distinct (field, term) pairs.
    pub fn num_keys(&self) -> usize {
        self.doc_freq.len()
    }
}
