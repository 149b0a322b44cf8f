use crate::error::{IndexError, Result};
use crate::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// Named text fields in input order. The order is kept through storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(Field { name: name.into(), value: value.into() });
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(IndexError::InvalidDocument("document has no fields".into()));
        }
        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(IndexError::InvalidDocument("field name is empty".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(IndexError::InvalidDocument(format!("duplicate field `{}`", field.name)));
            }
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.push(k, v);
        }
        doc
    }
}

/// Hands out document ids for one indexing run, starting at zero.
#[derive(Debug, Default)]
pub struct DocIdSequence {
    next: DocId,
}

impl DocIdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> DocId {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u32 {
        self.next
    }
}

/// Stored (not indexed) copy of every ingested document, addressed by id.
#[derive(Debug, Default)]
pub struct DocStore {
    sequence: DocIdSequence,
    docs: Vec<Document>,
}

impl DocStore {
    pub fn new(sequence: DocIdSequence) -> Self {
        Self { sequence, docs: Vec::new() }
    }

    pub(crate) fn from_documents(docs: Vec<Document>) -> Self {
        let sequence = DocIdSequence { next: docs.len() as DocId };
        Self { sequence, docs }
    }

    pub fn add_document(&mut self, doc: Document) -> Result<DocId> {
        doc.validate()?;
        let id = self.sequence.next_id();
        debug_assert_eq!(id as usize, self.docs.len());
        self.docs.push(doc);
        Ok(id)
    }

    pub fn get_document(&self, id: DocId) -> Result<&Document> {
        self.docs.get(id as usize).ok_or_else(|| IndexError::NotFound(format!("document {id}")))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &Document)> + '_ {
        self.docs.iter().enumerate().map(|(i, d)| (i as DocId, d))
    }

    pub(crate) fn documents(&self) -> &[Document] {
        &self.docs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_sequential_ids() {
        let mut store = DocStore::new(DocIdSequence::new());
        let a = store.add_document(Document::new().with_field("body", "one")).unwrap();
        let b = store.add_document(Document::new().with_field("body", "two")).unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(store.get_document(1).unwrap().get("body"), Some("two"));
    }

    #[test]
    fn rejects_empty_document() {
        let mut store = DocStore::default();
        let err = store.add_document(Document::new()).unwrap_err();
        assert!(matches!(err, IndexError::InvalidDocument(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_duplicate_field() {
        let mut store = DocStore::default();
        let doc: Document = [("a", "x"), ("a", "y")].into_iter().collect();
        assert!(matches!(store.add_document(doc), Err(IndexError::InvalidDocument(_))));
    }

    #[test]
    fn missing_id_is_not_found() {
        let store = DocStore::default();
        assert!(matches!(store.get_document(3), Err(IndexError::NotFound(_))));
    }

    #[test]
    fn preserves_field_order() {
        let doc: Document = [("title", "T"), ("body", "B"), ("author", "A")].into_iter().collect();
        let names: Vec<&str> = doc.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["title", "body", "author"]);
    }
}
