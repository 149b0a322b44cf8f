use crate::analyzer::{Analyzer, Language};
use crate::error::Result;
use crate::scorer::Bm25Params;
use serde::{Deserialize, Serialize};

/// Settings an index is built with. Persisted alongside the segment so that
/// queries are analyzed and scored the way the documents were.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub bm25: Bm25Params,
}

impl IndexConfig {
    pub fn new(language: Language, bm25: Bm25Params) -> Self {
        Self { language, bm25 }
    }

    pub fn validate(&self) -> Result<()> {
        self.bm25.validate()
    }

    pub fn analyzer(&self) -> Analyzer {
        Analyzer::new(self.language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg: IndexConfig = serde_json::from_str(r#"{"language":"french"}"#).unwrap();
        assert_eq!(cfg.language, Language::French);
        assert_eq!(cfg.bm25, Bm25Params::default());
    }
}
