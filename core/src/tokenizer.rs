use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::Algorithm;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

use crate::error::{IndexError, Result};
use crate::query::QueryError;

lazy_static! {
    static ref RE: Regex = Regex::new(r"(?u)[\p{L}\p{N}][\p{L}\p{N}_']*").expect("valid regex");
}

pub const ENGLISH_STOPWORDS: &[&str] = &[
    "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
    "be","because","been","before","being","below","between","both","but","by",
    "can","can't","cannot","could","couldn't",
    "did","didn't","do","does","doesn't","doing","don't","down","during",
    "each","few","for","from","further",
    "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
    "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
    "let's","me","more","most","mustn't","my","myself",
    "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
    "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
    "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
    "under","until","up","very",
    "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
    "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
];

/// Reduces a lower-cased token to its index form.
pub trait Stemmer: Send + Sync {
    fn stem(&self, token: &str) -> String;
}

/// Leaves tokens untouched.
pub struct IdentityStemmer;

impl Stemmer for IdentityStemmer {
    fn stem(&self, token: &str) -> String {
        token.to_string()
    }
}

pub struct SnowballStemmer(rust_stemmers::Stemmer);

impl SnowballStemmer {
    pub fn new(algorithm: Algorithm) -> Self {
        Self(rust_stemmers::Stemmer::create(algorithm))
    }
}

impl Stemmer for SnowballStemmer {
    fn stem(&self, token: &str) -> String {
        self.0.stem(token).into_owned()
    }
}

/// Persisted analyzer settings, so queries are processed exactly like the
/// documents they run against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Snowball algorithm name; `None` disables stemming.
    pub language: Option<String>,
    pub stopwords: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            language: Some("english".to_string()),
            stopwords: ENGLISH_STOPWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl AnalyzerConfig {
    /// No stemming, no stopwords.
    pub fn plain() -> Self {
        Self {
            language: None,
            stopwords: Vec::new(),
        }
    }
}

fn algorithm_for(language: &str) -> Result<Algorithm> {
    let algorithm = match language.to_ascii_lowercase().as_str() {
        "arabic" => Algorithm::Arabic,
        "danish" => Algorithm::Danish,
        "dutch" => Algorithm::Dutch,
        "english" => Algorithm::English,
        "finnish" => Algorithm::Finnish,
        "french" => Algorithm::French,
        "german" => Algorithm::German,
        "greek" => Algorithm::Greek,
        "hungarian" => Algorithm::Hungarian,
        "italian" => Algorithm::Italian,
        "norwegian" => Algorithm::Norwegian,
        "portuguese" => Algorithm::Portuguese,
        "romanian" => Algorithm::Romanian,
        "russian" => Algorithm::Russian,
        "spanish" => Algorithm::Spanish,
        "swedish" => Algorithm::Swedish,
        "tamil" => Algorithm::Tamil,
        "turkish" => Algorithm::Turkish,
        _ => return Err(IndexError::UnknownLanguage(language.to_string())),
    };
    Ok(algorithm)
}

/// NFKC normalization, lowercasing, word segmentation and stemming, shared by
/// indexing and querying. A word is a stopword when either it or its stem is
/// in the stopword set.
pub struct Analyzer {
    stemmer: Box<dyn Stemmer>,
    stopwords: HashSet<String>,
}

impl Analyzer {
    pub fn new(stemmer: Box<dyn Stemmer>, stopwords: impl IntoIterator<Item = String>) -> Self {
        Self {
            stemmer,
            stopwords: stopwords.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let stemmer: Box<dyn Stemmer> = match &config.language {
            Some(language) => Box::new(SnowballStemmer::new(algorithm_for(language)?)),
            None => Box::new(IdentityStemmer),
        };
        Ok(Self::new(stemmer, config.stopwords.iter().cloned()))
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    fn words(text: &str) -> Vec<String> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        RE.find_iter(&normalized).map(|m| m.as_str().to_string()).collect()
    }

    /// Stem of `word`, or `None` when the word or its stem is a stopword.
    fn term(&self, word: &str) -> Option<String> {
        if self.is_stopword(word) {
            return None;
        }
        let stem = self.stemmer.stem(word);
        (!self.is_stopword(&stem)).then_some(stem)
    }

    /// Index terms of a document, stopwords dropped.
    pub fn analyze(&self, text: &str) -> Vec<String> {
        Self::words(text)
            .into_iter()
            .filter_map(|w| self.term(&w))
            .collect()
    }

    /// Index terms of one query word. A stopword is an error here, not
    /// silently dropped, since it would change the meaning of the expression.
    pub fn query_terms(&self, word: &str) -> std::result::Result<Vec<String>, QueryError> {
        let mut terms = Vec::new();
        for w in Self::words(word) {
            match self.term(&w) {
                Some(term) => terms.push(term),
                None => return Err(QueryError::Stopword(w)),
            }
        }
        Ok(terms)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(
            Box::new(SnowballStemmer::new(Algorithm::English)),
            ENGLISH_STOPWORDS.iter().map(|s| s.to_string()),
        )
    }
}
