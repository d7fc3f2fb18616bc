//! Blocked sort-based indexing (BSBI) of a document collection into a
//! Boolean inverted index, plus the query side that reads it back.

pub mod bsbi;
pub mod compression;
pub mod error;
pub mod id_map;
pub mod index;
pub mod inverter;
pub mod merge;
pub mod persist;
pub mod query;
pub mod set_ops;
pub mod tokenizer;

pub type TermId = u32;
pub type DocId = u32;

pub use bsbi::{BsbiConfig, BsbiIndex, IndexStats, SearchOutcome, Searcher};
pub use compression::PostingsEncoding;
pub use error::{IndexError, Result};
pub use id_map::IdMap;
pub use index::{InvertedIndexReader, InvertedIndexWriter};
pub use query::{BooleanQuery, QueryError};
pub use tokenizer::{Analyzer, AnalyzerConfig};
