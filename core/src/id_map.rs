use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Bidirectional string <-> dense integer id registry, used for both terms
/// and document keys. Ids are handed out in insertion order starting at 0.
///
/// Only the `id -> string` side is serialized; the reverse table is rebuilt
/// on load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct IdMap {
    str_to_id: HashMap<String, u32>,
    id_to_str: Vec<String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `s`, assigning the next free id on first sight.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.str_to_id.get(s) {
            return id;
        }
        let id = self.id_to_str.len() as u32;
        self.str_to_id.insert(s.to_string(), id);
        self.id_to_str.push(s.to_string());
        id
    }

    /// Id of `s` without assigning one.
    pub fn get(&self, s: &str) -> Option<u32> {
        self.str_to_id.get(s).copied()
    }

    pub fn resolve(&self, id: u32) -> Result<&str> {
        self.id_to_str
            .get(id as usize)
            .map(String::as_str)
            .ok_or(IndexError::IdOutOfRange {
                id,
                len: self.id_to_str.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_str.is_empty()
    }

    /// Strings in id order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.id_to_str.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for IdMap {
    fn from(id_to_str: Vec<String>) -> Self {
        let str_to_id = id_to_str
            .iter()
            .enumerate()
            .map(|(id, s)| (s.clone(), id as u32))
            .collect();
        Self {
            str_to_id,
            id_to_str,
        }
    }
}

impl From<IdMap> for Vec<String> {
    fn from(map: IdMap) -> Self {
        map.id_to_str
    }
}
