use std::collections::{HashMap, HashSet};

use crate::model::SourceMapping;
use crate::value::{FieldType, FieldValue};

/// Key → source row values. Built in one pass; a repeated key overwrites the
/// earlier entry, so the last occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    entries: HashMap<FieldValue, Vec<FieldValue>>,
}

impl Lookup {
    /// Build from `source`. When `target_key_type` is given, source keys are
    /// coerced to it where possible so that e.g. numeric spreadsheet keys
    /// still match a text key field.
    pub fn build(source: &SourceMapping, target_key_type: Option<FieldType>) -> Self {
        let mut entries = HashMap::with_capacity(source.rows.len());
        for row in &source.rows {
            let key = match target_key_type {
                Some(ty) => row.key.coerce_to(ty).unwrap_or_else(|| row.key.clone()),
                None => row.key.clone(),
            };
            entries.insert(key, row.values.clone());
        }
        Self { entries }
    }

    pub fn get(&self, key: &FieldValue) -> Option<&[FieldValue]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keys that occur more than once, in first-seen order.
pub fn duplicate_keys(source: &SourceMapping) -> Vec<FieldValue> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut dupes = Vec::new();
    for row in &source.rows {
        if !seen.insert(&row.key) && reported.insert(&row.key) {
            dupes.push(row.key.clone());
        }
    }
    dupes
}
