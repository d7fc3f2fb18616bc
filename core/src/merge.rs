//! External multi-way merge of per-block indices into the final index.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::{IndexError, Result};
use crate::index::{InvertedIndexReader, InvertedIndexWriter, PostingsIter};
use crate::{DocId, TermId};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub terms: usize,
    pub postings: usize,
}

/// Merge sorted lists into one sorted list with a heap holding the current
/// head of every list.
///
/// Lists coming from different blocks never share a doc id, so this is a
/// plain k-way merge, not a deduplicating one.
pub fn kway_merge(lists: Vec<Vec<DocId>>) -> Vec<DocId> {
    let mut lists: Vec<Vec<DocId>> = lists.into_iter().filter(|l| !l.is_empty()).collect();
    match lists.len() {
        0 => return Vec::new(),
        1 => return lists.pop().unwrap_or_default(),
        _ => {}
    }

    let total = lists.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    let mut heap: BinaryHeap<Reverse<(DocId, usize, usize)>> = lists
        .iter()
        .enumerate()
        .map(|(source, list)| Reverse((list[0], source, 0)))
        .collect();
    while let Some(Reverse((doc_id, source, pos))) = heap.pop() {
        out.push(doc_id);
        if let Some(&next) = lists[source].get(pos + 1) {
            heap.push(Reverse((next, source, pos + 1)));
        }
    }
    out
}

/// Merge every intermediate index into `merged`, term by term for term ids
/// `0..num_terms`.
///
/// Each reader is scanned sequentially, so at any moment only the postings of
/// the current term are held in memory, one list per reader. Terms absent
/// from every block get no entry.
pub fn merge_indices(
    readers: &mut [InvertedIndexReader],
    num_terms: usize,
    merged: &mut InvertedIndexWriter,
) -> Result<MergeStats> {
    let mut cursors: Vec<PostingsIter<'_>> = readers.iter_mut().map(|r| r.iter()).collect();
    let mut stats = MergeStats::default();

    for term_id in 0..num_terms as TermId {
        let mut lists = Vec::new();
        for cursor in cursors.iter_mut() {
            if cursor.peek_term_id() == Some(term_id) {
                if let Some(next) = cursor.next() {
                    let (_, postings) = next?;
                    lists.push(postings);
                }
            }
        }
        let postings = kway_merge(lists);
        if postings.is_empty() {
            continue;
        }
        merged.append(term_id, &postings)?;
        stats.terms += 1;
        stats.postings += postings.len();
    }

    for cursor in &cursors {
        if let Some(term_id) = cursor.peek_term_id() {
            return Err(IndexError::corrupt(
                cursor.postings_path(),
                format!("term id {term_id} is outside the dictionary of {num_terms} terms"),
            ));
        }
    }

    tracing::debug!(terms = stats.terms, postings = stats.postings, "merged intermediate indices");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::PostingsEncoding;
    use tempfile::tempdir;

    #[test]
    fn kway_merge_interleaves_sorted_lists() {
        let merged = kway_merge(vec![vec![1, 7, 12], vec![], vec![3, 4, 20], vec![0, 15]]);
        assert_eq!(merged, vec![0, 1, 3, 4, 7, 12, 15, 20]);
        assert_eq!(kway_merge(vec![vec![5, 6]]), vec![5, 6]);
        assert!(kway_merge(vec![]).is_empty());
        assert!(kway_merge(vec![vec![], vec![]]).is_empty());
    }

    #[test]
    fn merges_blocks_term_by_term() {
        let dir = tempdir().unwrap();
        let encoding = PostingsEncoding::EliasGamma;
        let blocks: Vec<Vec<(TermId, Vec<DocId>)>> = vec![
            vec![(0, vec![0, 2]), (1, vec![1]), (3, vec![0, 1, 2])],
            vec![(1, vec![4, 5]), (3, vec![3])],
            vec![(0, vec![6, 8]), (3, vec![7])],
        ];
        let mut names = Vec::new();
        for (i, block) in blocks.iter().enumerate() {
            let name = format!("intermediate_index_{i}");
            let mut writer = InvertedIndexWriter::create(dir.path(), &name, encoding).unwrap();
            for (term_id, postings) in block {
                writer.append(*term_id, postings).unwrap();
            }
            writer.finish().unwrap();
            names.push(name);
        }

        let mut readers: Vec<InvertedIndexReader> = names
            .iter()
            .map(|n| InvertedIndexReader::open(dir.path(), n, encoding).unwrap())
            .collect();
        let mut merged = InvertedIndexWriter::create(dir.path(), "main_index", encoding).unwrap();
        let stats = merge_indices(&mut readers, 4, &mut merged).unwrap();
        merged.finish().unwrap();
        assert_eq!(stats, MergeStats { terms: 3, postings: 12 });

        let mut reader = InvertedIndexReader::open(dir.path(), "main_index", encoding).unwrap();
        assert_eq!(reader.get_postings_list(0).unwrap(), vec![0, 2, 6, 8]);
        assert_eq!(reader.get_postings_list(1).unwrap(), vec![1, 4, 5]);
        assert_eq!(reader.get_postings_list(2).unwrap(), Vec::<DocId>::new());
        assert_eq!(reader.get_postings_list(3).unwrap(), vec![0, 1, 2, 3, 7]);
    }

    #[test]
    fn rejects_terms_beyond_dictionary() {
        let dir = tempdir().unwrap();
        let encoding = PostingsEncoding::Standard;
        let mut writer = InvertedIndexWriter::create(dir.path(), "block", encoding).unwrap();
        writer.append(0, &[1]).unwrap();
        writer.append(9, &[2]).unwrap();
        writer.finish().unwrap();

        let mut readers = vec![InvertedIndexReader::open(dir.path(), "block", encoding).unwrap()];
        let mut merged = InvertedIndexWriter::create(dir.path(), "merged", encoding).unwrap();
        let err = merge_indices(&mut readers, 2, &mut merged).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }
}
