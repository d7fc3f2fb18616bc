//! On-disk inverted index: a postings byte stream (`<name>.index`) paired
//! with a directory (`<name>.dict`) of `(term_id, offset, doc_count, length)`
//! entries sorted by term id.
//!
//! Directory layout, little-endian:
//!
//! ```text
//! magic "BSBD" | version u16 | encoding tag u8 | entry count u64
//! entry* = term_id u32 | offset u64 | doc_count u32 | length u64
//! ```
//!
//! The directory is written only when the writer closes, after the postings
//! stream has been flushed, so it never points past valid postings data.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::compression::PostingsEncoding;
use crate::error::{IndexError, Result};
use crate::{DocId, TermId};

const MAGIC: &[u8; 4] = b"BSBD";
const VERSION: u16 = 1;
const HEADER_BYTES: u64 = 4 + 2 + 1 + 8;
const ENTRY_BYTES: u64 = 4 + 8 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub term_id: TermId,
    pub offset: u64,
    pub doc_count: u32,
    pub length: u64,
}

pub fn postings_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.index"))
}

pub fn directory_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.dict"))
}

/// Remove both files of an index, ignoring files that are already gone.
pub fn remove_index(dir: &Path, name: &str) -> Result<()> {
    for path in [postings_path(dir, name), directory_path(dir, name)] {
        match fs::remove_file(&path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
    }
    Ok(())
}

/// Appends postings lists in ascending term id order.
///
/// Call [`InvertedIndexWriter::finish`] to surface flush errors. A writer
/// dropped without `finish` (an early `?` return, a panic unwinding) still
/// writes the directory for everything appended so far.
///
/// A failed postings write poisons the writer: later appends fail and no
/// directory is written.
pub struct InvertedIndexWriter {
    name: String,
    encoding: PostingsEncoding,
    directory_path: PathBuf,
    postings: Option<BufWriter<File>>,
    entries: Vec<DirectoryEntry>,
    offset: u64,
}

impl InvertedIndexWriter {
    pub fn create<P: AsRef<Path>>(dir: P, name: &str, encoding: PostingsEncoding) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        remove_index(dir, name)?;
        let postings = BufWriter::new(File::create(postings_path(dir, name))?);
        Ok(Self {
            name: name.to_string(),
            encoding,
            directory_path: directory_path(dir, name),
            postings: Some(postings),
            entries: Vec::new(),
            offset: 0,
        })
    }

    pub fn append(&mut self, term_id: TermId, postings: &[DocId]) -> Result<()> {
        if let Some(last) = self.entries.last() {
            if term_id <= last.term_id {
                return Err(IndexError::TermOrder {
                    term_id,
                    last: last.term_id,
                });
            }
        }
        let bytes = self.encoding.encode(postings)?;
        let writer = self
            .postings
            .as_mut()
            .ok_or_else(|| io::Error::other("index writer is closed or failed"))?;
        if let Err(err) = writer.write_all(&bytes) {
            // a partial write leaves the stream out of step with `offset`
            self.postings = None;
            return Err(err.into());
        }
        self.entries.push(DirectoryEntry {
            term_id,
            offset: self.offset,
            doc_count: postings.len() as u32,
            length: bytes.len() as u64,
        });
        self.offset += bytes.len() as u64;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the postings stream so far.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    pub fn finish(mut self) -> Result<()> {
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut postings) = self.postings.take() else {
            return Ok(());
        };
        postings.flush()?;
        postings.get_ref().sync_all()?;

        let tmp = self.directory_path.with_extension("dict.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            out.write_all(MAGIC)?;
            out.write_u16::<LittleEndian>(VERSION)?;
            out.write_u8(self.encoding.tag())?;
            out.write_u64::<LittleEndian>(self.entries.len() as u64)?;
            for entry in &self.entries {
                out.write_u32::<LittleEndian>(entry.term_id)?;
                out.write_u64::<LittleEndian>(entry.offset)?;
                out.write_u32::<LittleEndian>(entry.doc_count)?;
                out.write_u64::<LittleEndian>(entry.length)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.directory_path)?;
        tracing::debug!(
            index = %self.name,
            terms = self.entries.len(),
            bytes = self.offset,
            "index directory written"
        );
        Ok(())
    }
}

impl Drop for InvertedIndexWriter {
    fn drop(&mut self) {
        if self.postings.is_some() {
            if let Err(err) = self.close() {
                tracing::warn!(index = %self.name, error = %err, "failed to write index directory");
            }
        }
    }
}

/// Read-only view over an index written by [`InvertedIndexWriter`].
pub struct InvertedIndexReader {
    name: String,
    encoding: PostingsEncoding,
    postings_path: PathBuf,
    postings: BufReader<File>,
    position: u64,
    entries: Vec<DirectoryEntry>,
}

impl InvertedIndexReader {
    /// Open an index, failing with [`IndexError::EncodingMismatch`] when it
    /// was written with a different codec than `encoding`.
    pub fn open<P: AsRef<Path>>(dir: P, name: &str, encoding: PostingsEncoding) -> Result<Self> {
        let dir = dir.as_ref();
        let dict_path = directory_path(dir, name);
        let postings_path = postings_path(dir, name);

        let postings_file = File::open(&postings_path)?;
        let postings_len = postings_file.metadata()?.len();
        let dict_file = File::open(&dict_path)?;
        let dict_len = dict_file.metadata()?.len();
        let mut dict = BufReader::new(dict_file);

        if dict_len < HEADER_BYTES {
            return Err(IndexError::corrupt(&dict_path, "truncated header"));
        }
        let mut magic = [0u8; 4];
        dict.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(IndexError::corrupt(&dict_path, "bad magic"));
        }
        let version = dict.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(IndexError::corrupt(
                &dict_path,
                format!("unsupported version {version}"),
            ));
        }
        let tag = dict.read_u8()?;
        let found = PostingsEncoding::from_tag(tag)
            .ok_or_else(|| IndexError::corrupt(&dict_path, format!("unknown encoding tag {tag}")))?;
        if found != encoding {
            return Err(IndexError::EncodingMismatch {
                name: name.to_string(),
                expected: encoding,
                found,
            });
        }
        let count = dict.read_u64::<LittleEndian>()?;
        if dict_len != HEADER_BYTES + count.saturating_mul(ENTRY_BYTES) {
            return Err(IndexError::corrupt(
                &dict_path,
                format!("{count} entries do not match file size {dict_len}"),
            ));
        }

        let mut entries: Vec<DirectoryEntry> = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let entry = DirectoryEntry {
                term_id: dict.read_u32::<LittleEndian>()?,
                offset: dict.read_u64::<LittleEndian>()?,
                doc_count: dict.read_u32::<LittleEndian>()?,
                length: dict.read_u64::<LittleEndian>()?,
            };
            if let Some(prev) = entries.last() {
                if entry.term_id <= prev.term_id {
                    return Err(IndexError::corrupt(
                        &dict_path,
                        format!("term id {} follows {}", entry.term_id, prev.term_id),
                    ));
                }
            }
            if entry.offset.saturating_add(entry.length) > postings_len {
                return Err(IndexError::corrupt(
                    &dict_path,
                    format!("term id {} points past the postings stream", entry.term_id),
                ));
            }
            entries.push(entry);
        }

        Ok(Self {
            name: name.to_string(),
            encoding,
            postings_path,
            postings: BufReader::new(postings_file),
            position: 0,
            entries,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encoding(&self) -> PostingsEncoding {
        self.encoding
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    fn entry(&self, term_id: TermId) -> Option<DirectoryEntry> {
        self.entries
            .binary_search_by_key(&term_id, |e| e.term_id)
            .ok()
            .map(|i| self.entries[i])
    }

    pub fn contains(&self, term_id: TermId) -> bool {
        self.entry(term_id).is_some()
    }

    /// Number of documents in the postings list of `term_id`, 0 when absent.
    pub fn doc_frequency(&self, term_id: TermId) -> u32 {
        self.entry(term_id).map_or(0, |e| e.doc_count)
    }

    /// Postings list of `term_id`; a term without an entry yields an empty list.
    pub fn get_postings_list(&mut self, term_id: TermId) -> Result<Vec<DocId>> {
        match self.entry(term_id) {
            Some(entry) => self.read_entry(&entry),
            None => Ok(Vec::new()),
        }
    }

    fn read_entry(&mut self, entry: &DirectoryEntry) -> Result<Vec<DocId>> {
        if self.position != entry.offset {
            self.postings.seek(SeekFrom::Start(entry.offset))?;
        }
        // unknown until the read completes
        self.position = u64::MAX;
        let mut buf = vec![0u8; entry.length as usize];
        self.postings.read_exact(&mut buf)?;
        self.position = entry.offset + entry.length;

        let postings = self.encoding.decode(&buf)?;
        if postings.len() != entry.doc_count as usize {
            return Err(IndexError::corrupt(
                &self.postings_path,
                format!(
                    "term id {} decoded {} postings, directory says {}",
                    entry.term_id,
                    postings.len(),
                    entry.doc_count
                ),
            ));
        }
        Ok(postings)
    }

    /// Sequential scan in ascending term id order, matching write order.
    pub fn iter(&mut self) -> PostingsIter<'_> {
        PostingsIter {
            reader: self,
            next: 0,
        }
    }
}

pub struct PostingsIter<'a> {
    reader: &'a mut InvertedIndexReader,
    next: usize,
}

impl PostingsIter<'_> {
    /// Term id the next call to `next` will yield.
    pub fn peek_term_id(&self) -> Option<TermId> {
        self.reader.entries.get(self.next).map(|e| e.term_id)
    }

    pub fn postings_path(&self) -> &Path {
        &self.reader.postings_path
    }
}

impl Iterator for PostingsIter<'_> {
    type Item = Result<(TermId, Vec<DocId>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = *self.reader.entries.get(self.next)?;
        self.next += 1;
        Some(
            self.reader
                .read_entry(&entry)
                .map(|postings| (entry.term_id, postings)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.reader.entries.len() - self.next;
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_sample(dir: &Path, encoding: PostingsEncoding) {
        let mut writer = InvertedIndexWriter::create(dir, "sample", encoding).unwrap();
        writer.append(0, &[1, 4, 9]).unwrap();
        writer.append(2, &[0]).unwrap();
        writer.append(5, &[3, 300, 70000]).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn missing_terms_read_as_empty() {
        for encoding in PostingsEncoding::ALL {
            let dir = tempdir().unwrap();
            write_sample(dir.path(), encoding);
            let mut reader = InvertedIndexReader::open(dir.path(), "sample", encoding).unwrap();
            assert_eq!(reader.len(), 3);
            assert_eq!(reader.get_postings_list(5).unwrap(), vec![3, 300, 70000]);
            assert_eq!(reader.get_postings_list(1).unwrap(), Vec::<DocId>::new());
            assert_eq!(reader.get_postings_list(0).unwrap(), vec![1, 4, 9]);
            assert_eq!(reader.get_postings_list(42).unwrap(), Vec::<DocId>::new());
            assert_eq!(reader.doc_frequency(5), 3);
            assert_eq!(reader.doc_frequency(3), 0);
            assert!(reader.contains(2));
            assert!(!reader.contains(4));
        }
    }

    #[test]
    fn iterates_in_write_order() {
        let dir = tempdir().unwrap();
        write_sample(dir.path(), PostingsEncoding::VariableByte);
        let mut reader =
            InvertedIndexReader::open(dir.path(), "sample", PostingsEncoding::VariableByte).unwrap();
        let all: Vec<(TermId, Vec<DocId>)> = reader.iter().collect::<Result<_>>().unwrap();
        assert_eq!(
            all,
            vec![(0, vec![1, 4, 9]), (2, vec![0]), (5, vec![3, 300, 70000])]
        );
        // random access still works after a full scan
        assert_eq!(reader.get_postings_list(2).unwrap(), vec![0]);
    }

    #[test]
    fn rejects_out_of_order_terms() {
        let dir = tempdir().unwrap();
        let mut writer =
            InvertedIndexWriter::create(dir.path(), "sample", PostingsEncoding::Standard).unwrap();
        writer.append(3, &[1]).unwrap();
        let err = writer.append(3, &[2]).unwrap_err();
        assert!(matches!(err, IndexError::TermOrder { term_id: 3, last: 3 }));
        let err = writer.append(1, &[2]).unwrap_err();
        assert!(matches!(err, IndexError::TermOrder { term_id: 1, last: 3 }));
        writer.finish().unwrap();

        let reader =
            InvertedIndexReader::open(dir.path(), "sample", PostingsEncoding::Standard).unwrap();
        assert_eq!(reader.len(), 1);
    }

    #[test]
    fn detects_codec_mismatch() {
        let dir = tempdir().unwrap();
        write_sample(dir.path(), PostingsEncoding::EliasGamma);
        let err = InvertedIndexReader::open(dir.path(), "sample", PostingsEncoding::Standard)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            IndexError::EncodingMismatch {
                expected: PostingsEncoding::Standard,
                found: PostingsEncoding::EliasGamma,
                ..
            }
        ));
    }

    #[test]
    fn dropped_writer_still_writes_directory() {
        let dir = tempdir().unwrap();
        {
            let mut writer =
                InvertedIndexWriter::create(dir.path(), "partial", PostingsEncoding::VariableByte)
                    .unwrap();
            writer.append(1, &[2, 3]).unwrap();
            assert!(writer.append(2, &[5, 4]).is_err());
        }
        let mut reader =
            InvertedIndexReader::open(dir.path(), "partial", PostingsEncoding::VariableByte)
                .unwrap();
        assert_eq!(reader.len(), 1);
        assert_eq!(reader.get_postings_list(1).unwrap(), vec![2, 3]);
    }

    #[test]
    fn rejects_corrupt_directory() {
        let dir = tempdir().unwrap();
        write_sample(dir.path(), PostingsEncoding::Standard);
        let dict = directory_path(dir.path(), "sample");

        let mut bytes = fs::read(&dict).unwrap();
        bytes[0] = b'X';
        fs::write(&dict, &bytes).unwrap();
        let err = InvertedIndexReader::open(dir.path(), "sample", PostingsEncoding::Standard)
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::Corrupt { .. }));

        // postings stream shorter than the directory claims
        write_sample(dir.path(), PostingsEncoding::Standard);
        let postings = postings_path(dir.path(), "sample");
        let data = fs::read(&postings).unwrap();
        fs::write(&postings, &data[..data.len() - 4]).unwrap();
        let err = InvertedIndexReader::open(dir.path(), "sample", PostingsEncoding::Standard)
            .err()
            .unwrap();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }

    #[test]
    fn empty_index_round_trips() {
        let dir = tempdir().unwrap();
        let writer =
            InvertedIndexWriter::create(dir.path(), "empty", PostingsEncoding::EliasGamma).unwrap();
        assert!(writer.is_empty());
        writer.finish().unwrap();
        let mut reader =
            InvertedIndexReader::open(dir.path(), "empty", PostingsEncoding::EliasGamma).unwrap();
        assert!(reader.is_empty());
        assert_eq!(reader.iter().count(), 0);
        assert_eq!(reader.get_postings_list(0).unwrap(), Vec::<DocId>::new());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_write_poisons_the_writer() {
        let dir = tempdir().unwrap();
        let mut writer =
            InvertedIndexWriter::create(dir.path(), "full", PostingsEncoding::Standard).unwrap();
        writer.append(0, &[1, 2]).unwrap();
        let Ok(full) = File::options().write(true).open("/dev/full") else {
            return;
        };
        // unbuffered, so the write hits the device and fails with ENOSPC
        writer.postings = Some(BufWriter::with_capacity(0, full));

        assert!(matches!(writer.append(1, &[3]), Err(IndexError::Io(_))));
        assert!(matches!(writer.append(2, &[4]), Err(IndexError::Io(_))));
        assert_eq!(writer.len(), 1);
        assert_eq!(writer.bytes_written(), 8);
        drop(writer);
        assert!(!directory_path(dir.path(), "full").exists());
    }
}
