use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::index::InvertedIndexWriter;
use crate::{DocId, TermId};

/// Invert one block of `(term_id, doc_id)` pairs and write it out.
///
/// The whole block lives in a single in-memory dictionary; repeated
/// occurrences of a term in one document collapse to one posting. Terms are
/// written in ascending id order with sorted postings. Returns the number of
/// terms written.
pub fn invert_block<I>(pairs: I, index: &mut InvertedIndexWriter) -> Result<usize>
where
    I: IntoIterator<Item = (TermId, DocId)>,
{
    let mut term_dict: HashMap<TermId, HashSet<DocId>> = HashMap::new();
    for (term_id, doc_id) in pairs {
        term_dict.entry(term_id).or_default().insert(doc_id);
    }

    let mut term_ids: Vec<TermId> = term_dict.keys().copied().collect();
    term_ids.sort_unstable();
    for term_id in &term_ids {
        let mut postings: Vec<DocId> = term_dict
            .remove(term_id)
            .map(|docs| docs.into_iter().collect())
            .unwrap_or_default();
        postings.sort_unstable();
        index.append(*term_id, &postings)?;
    }
    Ok(term_ids.len())
}
