use crate::compression::PostingsEncoding;
use crate::error::Result;
use crate::id_map::IdMap;
use crate::tokenizer::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

/// Build settings and counts recorded next to a finished index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub created_at: String,
    pub encoding: PostingsEncoding,
    pub index_name: String,
    pub data_path: PathBuf,
    pub blocks: Vec<String>,
    pub num_docs: u32,
    pub num_terms: u32,
    pub analyzer: AnalyzerConfig,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn terms(&self) -> PathBuf { self.root.join("terms.dict") }
    pub fn docs(&self) -> PathBuf { self.root.join("docs.dict") }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

fn save_id_map(path: &Path, map: &IdMap) -> Result<()> {
    let mut f = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut f, map)?;
    f.flush()?;
    Ok(())
}

fn load_id_map(path: &Path) -> Result<IdMap> {
    let f = BufReader::new(File::open(path)?);
    let map = bincode::deserialize_from(f)?;
    Ok(map)
}

/// Persist the term and document dictionaries as two separate artifacts.
pub fn save_dictionaries(paths: &IndexPaths, terms: &IdMap, docs: &IdMap) -> Result<()> {
    create_dir_all(&paths.root)?;
    save_id_map(&paths.terms(), terms)?;
    save_id_map(&paths.docs(), docs)?;
    Ok(())
}

/// Returns `(terms, docs)`.
pub fn load_dictionaries(paths: &IndexPaths) -> Result<(IdMap, IdMap)> {
    let terms = load_id_map(&paths.terms())?;
    let docs = load_id_map(&paths.docs())?;
    Ok((terms, docs))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
