//! Text analysis shared by indexing and querying.
//!
//! Raw text is NFKC-normalized, lowercased, split into words, stripped of
//! English-style possessives, filtered against the language's stop words and
//! stemmed with the Snowball stemmer for that language. The same `Analyzer`
//! must be used on both sides, otherwise query terms never meet index terms.

use crate::document::Document;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
    static ref ENGLISH_STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","her","here","hers","herself","him","himself","his","how",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","should","shouldn't","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","when","where","which","while","who","whom","why","will","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
    static ref FRENCH_STOPWORDS: HashSet<&'static str> = [
        "au","aux","avec","ce","ces","dans","de","des","du","elle","en","et","eux","il","je","la","le","les",
        "leur","lui","ma","mais","me","même","mes","moi","mon","ne","nos","notre","nous","on","ou","par",
        "pas","pour","qu","que","qui","sa","se","ses","son","sur","ta","te","tes","toi","ton","tu","un",
        "une","vos","votre","vous","est","sont","été","être",
    ].into_iter().collect();
    static ref GERMAN_STOPWORDS: HashSet<&'static str> = [
        "aber","als","am","an","auch","auf","aus","bei","bin","bis","das","dass","dem","den","der","des",
        "die","du","ein","eine","einem","einen","einer","er","es","für","hat","ich","ihr","im","in","ist",
        "mit","nach","nicht","noch","nur","oder","sich","sie","sind","so","und","uns","von","vor","war",
        "was","wie","wir","zu","zum","zur",
    ].into_iter().collect();
    static ref SPANISH_STOPWORDS: HashSet<&'static str> = [
        "a","al","como","con","de","del","el","ella","en","es","esta","este","la","las","le","lo","los",
        "mas","me","mi","no","nos","o","para","pero","por","que","se","si","sin","su","sus","te","tu",
        "un","una","uno","y","ya","yo",
    ].into_iter().collect();
    static ref ITALIAN_STOPWORDS: HashSet<&'static str> = [
        "a","al","alla","anche","che","ci","come","con","da","dal","dei","del","della","delle","di","e",
        "gli","ha","i","il","in","io","la","le","lo","ma","mi","nel","nella","non","per","se","si","sono",
        "su","sul","un","una","uno",
    ].into_iter().collect();
    static ref PORTUGUESE_STOPWORDS: HashSet<&'static str> = [
        "a","ao","aos","as","com","como","da","das","de","do","dos","e","ela","ele","em","era","eu","foi",
        "mais","mas","na","nas","no","nos","o","os","ou","para","pela","pelo","por","que","se","sem","seu",
        "sua","um","uma",
    ].into_iter().collect();
    static ref DUTCH_STOPWORDS: HashSet<&'static str> = [
        "aan","als","bij","dan","dat","de","die","dit","een","en","er","het","hij","ik","in","is","je",
        "maar","met","na","niet","nog","of","om","ook","op","te","tot","uit","van","voor","was","wat",
        "we","wij","ze","zij","zijn",
    ].into_iter().collect();
}

/// Languages with a stemmer and stop-word set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    French,
    German,
    Spanish,
    Italian,
    Portuguese,
    Dutch,
}

impl Language {
    fn algorithm(self) -> Algorithm {
        match self {
            Language::English => Algorithm::English,
            Language::French => Algorithm::French,
            Language::German => Algorithm::German,
            Language::Spanish => Algorithm::Spanish,
            Language::Italian => Algorithm::Italian,
            Language::Portuguese => Algorithm::Portuguese,
            Language::Dutch => Algorithm::Dutch,
        }
    }

    fn stopwords(self) -> &'static HashSet<&'static str> {
        match self {
            Language::English => &ENGLISH_STOPWORDS,
            Language::French => &FRENCH_STOPWORDS,
            Language::German => &GERMAN_STOPWORDS,
            Language::Spanish => &SPANISH_STOPWORDS,
            Language::Italian => &ITALIAN_STOPWORDS,
            Language::Portuguese => &PORTUGUESE_STOPWORDS,
            Language::Dutch => &DUTCH_STOPWORDS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::English => "english",
            Language::French => "french",
            Language::German => "german",
            Language::Spanish => "spanish",
            Language::Italian => "italian",
            Language::Portuguese => "portuguese",
            Language::Dutch => "dutch",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "french" | "fr" => Ok(Language::French),
            "german" | "de" => Ok(Language::German),
            "spanish" | "es" => Ok(Language::Spanish),
            "italian" | "it" => Ok(Language::Italian),
            "portuguese" | "pt" => Ok(Language::Portuguese),
            "dutch" | "nl" => Ok(Language::Dutch),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// A normalized term and the position of the word it came from.
///
/// Positions count every word in the field, stop words included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub position: u32,
}

pub struct Analyzer {
    language: Language,
    stemmer: Stemmer,
    stopwords: &'static HashSet<&'static str>,
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer").field("language", &self.language).finish()
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Language::default())
    }
}

impl Analyzer {
    pub fn new(language: Language) -> Self {
        Self { language, stemmer: Stemmer::create(language.algorithm()), stopwords: language.stopwords() }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Lazily analyze `text`. Nothing is stemmed until the stream is pulled.
    pub fn analyze(&self, text: &str) -> TokenStream<'_> {
        let buffer = text.nfkc().collect::<String>().to_lowercase();
        TokenStream { analyzer: self, buffer, offset: 0, position: 0 }
    }

    /// Convenience for callers that want the whole field at once.
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.analyze(text).map(|t| t.term).collect()
    }

    pub fn analyze_document(&self, doc: &Document) -> AnalyzedDocument {
        let fields = doc
            .fields()
            .iter()
            .map(|f| AnalyzedField { name: f.name.clone(), tokens: self.analyze(&f.value).collect() })
            .collect();
        AnalyzedDocument { fields }
    }

    /// Turn one lowercased word into an index term, or drop it.
    fn normalize_word(&self, word: &str) -> Option<String> {
        // contractions such as "let's" are listed whole
        if self.stopwords.contains(word) {
            return None;
        }
        let word = strip_possessive(word);
        if word.is_empty() || self.stopwords.contains(word) {
            return None;
        }
        Some(self.stemmer.stem(word).into_owned())
    }
}

fn strip_possessive(word: &str) -> &str {
    let word = word.strip_suffix("'s").unwrap_or(word);
    word.trim_end_matches('\'')
}

/// Lazy, finite term sequence over one piece of text.
///
/// Restart with [`TokenStream::reset`] or by cloning before consumption.
#[derive(Debug, Clone)]
pub struct TokenStream<'a> {
    analyzer: &'a Analyzer,
    buffer: String,
    offset: usize,
    position: u32,
}

impl TokenStream<'_> {
    pub fn reset(&mut self) {
        self.offset = 0;
        self.position = 0;
    }
}

impl Iterator for TokenStream<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            let m = WORD_RE.find_at(&self.buffer, self.offset)?;
            self.offset = m.end();
            let position = self.position;
            self.position += 1;
            if let Some(term) = self.analyzer.normalize_word(m.as_str()) {
                return Some(Token { term, position });
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedField {
    pub name: String,
    pub tokens: Vec<Token>,
}

/// Every field of a document after analysis, in the document's field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzedDocument {
    pub fields: Vec<AnalyzedField>,
}
