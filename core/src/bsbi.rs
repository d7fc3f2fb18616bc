//! Blocked sort-based indexing over a collection directory, and the
//! searcher that answers boolean queries against the result.
//!
//! Every immediate sub-directory of the collection is one block and every
//! regular file inside a block is one document, keyed `"<block>/<file>"`.
//! Blocks and documents are visited in file-name order, so ids are
//! reproducible across runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use walkdir::WalkDir;

use crate::compression::PostingsEncoding;
use crate::error::Result;
use crate::id_map::IdMap;
use crate::index::{remove_index, InvertedIndexReader, InvertedIndexWriter};
use crate::inverter::invert_block;
use crate::merge::{merge_indices, MergeStats};
use crate::persist::{
    load_dictionaries, load_meta, now_rfc3339, save_dictionaries, save_meta, IndexPaths, MetaFile,
    FORMAT_VERSION,
};
use crate::query::{BooleanQuery, QueryError};
use crate::tokenizer::{Analyzer, AnalyzerConfig};
use crate::{DocId, TermId};

#[derive(Debug, Clone)]
pub struct BsbiConfig {
    pub data_path: PathBuf,
    pub output_path: PathBuf,
    pub encoding: PostingsEncoding,
    pub index_name: String,
    pub analyzer: AnalyzerConfig,
    /// Keep the per-block indices after the merge.
    pub keep_intermediate: bool,
}

impl BsbiConfig {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(data_path: P, output_path: Q) -> Self {
        Self {
            data_path: data_path.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
            encoding: PostingsEncoding::default(),
            index_name: "main_index".to_string(),
            analyzer: AnalyzerConfig::default(),
            keep_intermediate: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub blocks: usize,
    pub documents: usize,
    pub skipped_documents: usize,
    pub terms: usize,
    pub postings: usize,
    pub index_bytes: u64,
}

struct ParsedBlock {
    pairs: Vec<(TermId, DocId)>,
    documents: usize,
    skipped: usize,
}

/// Drives indexing: parse each block into `(term_id, doc_id)` pairs, invert
/// it into an intermediate index, then merge all intermediates.
///
/// One instance owns the term and document id maps for the whole run, so a
/// term seen in a later block keeps the id it got in an earlier one.
pub struct BsbiIndex {
    config: BsbiConfig,
    term_id_map: IdMap,
    doc_id_map: IdMap,
    intermediate_indices: Vec<String>,
}

impl BsbiIndex {
    pub fn new(config: BsbiConfig) -> Self {
        Self {
            config,
            term_id_map: IdMap::new(),
            doc_id_map: IdMap::new(),
            intermediate_indices: Vec::new(),
        }
    }

    pub fn config(&self) -> &BsbiConfig {
        &self.config
    }

    pub fn term_id_map(&self) -> &IdMap {
        &self.term_id_map
    }

    pub fn doc_id_map(&self) -> &IdMap {
        &self.doc_id_map
    }

    fn paths(&self) -> IndexPaths {
        IndexPaths::new(&self.config.output_path)
    }

    pub fn save(&self) -> Result<()> {
        save_dictionaries(&self.paths(), &self.term_id_map, &self.doc_id_map)
    }

    pub fn load(&mut self) -> Result<()> {
        let (terms, docs) = load_dictionaries(&self.paths())?;
        self.term_id_map = terms;
        self.doc_id_map = docs;
        Ok(())
    }

    pub fn start_indexing(&mut self) -> Result<IndexStats> {
        let start = Instant::now();
        let analyzer = Analyzer::from_config(&self.config.analyzer)?;
        fs::create_dir_all(&self.config.output_path)?;
        self.term_id_map = IdMap::new();
        self.doc_id_map = IdMap::new();
        self.intermediate_indices.clear();

        let blocks = list_blocks(&self.config.data_path)?;
        let mut stats = IndexStats {
            blocks: blocks.len(),
            ..Default::default()
        };

        for block in &blocks {
            let parsed = self.parse_block(block, &analyzer)?;
            stats.skipped_documents += parsed.skipped;

            let index_id = format!("intermediate_index_{block}");
            let mut index =
                InvertedIndexWriter::create(&self.config.output_path, &index_id, self.config.encoding)?;
            self.intermediate_indices.push(index_id);
            let pairs = parsed.pairs.len();
            let terms = invert_block(parsed.pairs, &mut index)?;
            index.finish()?;
            tracing::info!(block = %block, documents = parsed.documents, pairs, terms, "block inverted");
        }

        self.save()?;
        let (merge_stats, index_bytes) = self.merge()?;

        let meta = MetaFile {
            version: FORMAT_VERSION,
            created_at: now_rfc3339(),
            encoding: self.config.encoding,
            index_name: self.config.index_name.clone(),
            data_path: self.config.data_path.clone(),
            blocks: blocks.clone(),
            num_docs: self.doc_id_map.len() as u32,
            num_terms: self.term_id_map.len() as u32,
            analyzer: self.config.analyzer.clone(),
        };
        save_meta(&self.paths(), &meta)?;

        if !self.config.keep_intermediate {
            for index_id in self.intermediate_indices.drain(..) {
                remove_index(&self.config.output_path, &index_id)?;
            }
        }

        stats.documents = self.doc_id_map.len();
        stats.terms = merge_stats.terms;
        stats.postings = merge_stats.postings;
        stats.index_bytes = index_bytes;
        tracing::info!(
            blocks = stats.blocks,
            num_docs = stats.documents,
            num_terms = stats.terms,
            skipped = stats.skipped_documents,
            bytes = stats.index_bytes,
            elapsed_s = start.elapsed().as_secs_f64(),
            "index build complete"
        );
        Ok(stats)
    }

    /// Turn every readable document of `block` into `(term_id, doc_id)` pairs.
    /// Unreadable or non UTF-8 files are skipped and get no doc id.
    fn parse_block(&mut self, block: &str, analyzer: &Analyzer) -> Result<ParsedBlock> {
        let block_dir = self.config.data_path.join(block);
        let mut parsed = ParsedBlock {
            pairs: Vec::new(),
            documents: 0,
            skipped: 0,
        };

        for entry in WalkDir::new(&block_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let key = format!("{block}/{}", entry.file_name().to_string_lossy());
            let text = match fs::read(entry.path()).map(String::from_utf8) {
                Ok(Ok(text)) => text,
                Ok(Err(err)) => {
                    tracing::warn!(document = %key, error = %err, "skipping document that is not valid UTF-8");
                    parsed.skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(document = %key, error = %err, "skipping unreadable document");
                    parsed.skipped += 1;
                    continue;
                }
            };

            let doc_id = self.doc_id_map.intern(&key);
            for term in analyzer.analyze(&text) {
                let term_id = self.term_id_map.intern(&term);
                parsed.pairs.push((term_id, doc_id));
            }
            parsed.documents += 1;
        }
        Ok(parsed)
    }

    /// External merge of every intermediate index into the final index.
    /// Returns the merge counts and the size of the final postings stream.
    fn merge(&self) -> Result<(MergeStats, u64)> {
        let out = &self.config.output_path;
        let encoding = self.config.encoding;
        // every reader is released when this vector drops, on success or error
        let mut readers = self
            .intermediate_indices
            .iter()
            .map(|index_id| InvertedIndexReader::open(out, index_id, encoding))
            .collect::<Result<Vec<_>>>()?;
        // created only once every intermediate opened, so a failed open leaves no final index
        let mut merged = InvertedIndexWriter::create(out, &self.config.index_name, encoding)?;
        let stats = merge_indices(&mut readers, self.term_id_map.len(), &mut merged)?;
        drop(readers);

        let bytes = merged.bytes_written();
        merged.finish()?;
        Ok((stats, bytes))
    }

    /// One-shot query against the index this instance was configured for.
    pub fn boolean_retrieve(&self, query: &str) -> Result<SearchOutcome> {
        let mut searcher = Searcher::open_with(
            &self.config.output_path,
            &self.config.index_name,
            self.config.encoding,
            &self.config.analyzer,
        )?;
        searcher.search(query)
    }
}

fn list_blocks(data_path: &Path) -> Result<Vec<String>> {
    let mut blocks = Vec::new();
    for entry in WalkDir::new(data_path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if entry.file_type().is_dir() {
            blocks.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(blocks)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    pub doc_ids: Vec<DocId>,
    /// Document keys, in doc id order. Each key is `<block>/<file>`, relative
    /// to the collection root recorded as [`Searcher::data_path`].
    pub documents: Vec<String>,
    /// Why the query was rejected, when it was.
    pub diagnostic: Option<String>,
}

impl SearchOutcome {
    fn rejected(err: QueryError) -> Self {
        Self {
            diagnostic: Some(err.to_string()),
            ..Default::default()
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.diagnostic.is_some()
    }
}

/// Loaded dictionaries plus an open reader on the final index, serving any
/// number of queries.
pub struct Searcher {
    term_id_map: IdMap,
    doc_id_map: IdMap,
    analyzer: Analyzer,
    reader: InvertedIndexReader,
    data_path: Option<PathBuf>,
}

impl Searcher {
    /// Open with the codec and analyzer recorded in `meta.json` at build time.
    pub fn open<P: AsRef<Path>>(output_path: P) -> Result<Self> {
        let paths = IndexPaths::new(output_path.as_ref());
        let meta = load_meta(&paths)?;
        let mut searcher =
            Self::open_with(&paths.root, &meta.index_name, meta.encoding, &meta.analyzer)?;
        searcher.data_path = Some(meta.data_path);
        Ok(searcher)
    }

    pub fn open_with<P: AsRef<Path>>(
        output_path: P,
        index_name: &str,
        encoding: PostingsEncoding,
        analyzer: &AnalyzerConfig,
    ) -> Result<Self> {
        let paths = IndexPaths::new(output_path.as_ref());
        let (term_id_map, doc_id_map) = load_dictionaries(&paths)?;
        let reader = InvertedIndexReader::open(&paths.root, index_name, encoding)?;
        Ok(Self {
            term_id_map,
            doc_id_map,
            analyzer: Analyzer::from_config(analyzer)?,
            reader,
            data_path: None,
        })
    }

    pub fn num_docs(&self) -> usize {
        self.doc_id_map.len()
    }

    pub fn num_terms(&self) -> usize {
        self.term_id_map.len()
    }

    pub fn encoding(&self) -> PostingsEncoding {
        self.reader.encoding()
    }

    /// Collection root the index was built from, when known.
    pub fn data_path(&self) -> Option<&Path> {
        self.data_path.as_deref()
    }

    pub fn doc_path(&self, doc_id: DocId) -> Option<&str> {
        self.doc_id_map.resolve(doc_id).ok()
    }

    /// Postings of an already analyzed term; unknown terms yield an empty list.
    pub fn postings_for(&mut self, term: &str) -> Result<Vec<DocId>> {
        match self.term_id_map.get(term) {
            Some(term_id) => self.reader.get_postings_list(term_id),
            None => Ok(Vec::new()),
        }
    }

    /// Evaluate a boolean expression. A rejected query (stopword, bad syntax)
    /// is not an error: it comes back empty with a diagnostic.
    pub fn search(&mut self, query: &str) -> Result<SearchOutcome> {
        let parsed = match BooleanQuery::parse(query, &self.analyzer) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(query, error = %err, "query rejected");
                return Ok(SearchOutcome::rejected(err));
            }
        };
        tracing::debug!(query, postfix = %parsed, "evaluating query");

        let doc_ids = parsed.evaluate(|term| self.postings_for(term))?;
        let documents = doc_ids
            .iter()
            .map(|&doc_id| self.doc_id_map.resolve(doc_id).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        Ok(SearchOutcome {
            doc_ids,
            documents,
            diagnostic: None,
        })
    }
}
