//! Selecting records whose field value appears in an external list.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ReconError;
use crate::model::RecordId;
use crate::store::AttributeStore;
use crate::value::{FieldType, FieldValue};

pub const DATE_WARNING: &str = "Tool not set up to work with dates yet...";

/// How a new match set combines with the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    New,
    AddTo,
    RemoveFrom,
    Subset,
    Switch,
    Clear,
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW_SELECTION",
            Self::AddTo => "ADD_TO_SELECTION",
            Self::RemoveFrom => "REMOVE_FROM_SELECTION",
            Self::Subset => "SUBSET_SELECTION",
            Self::Switch => "SWITCH_SELECTION",
            Self::Clear => "CLEAR_SELECTION",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub query: String,
    pub mode: SelectionMode,
    pub matched: usize,
    /// Selected record ids in store order.
    pub selected: Vec<RecordId>,
    pub warnings: Vec<String>,
}

/// Distinct non-null list values, sorted.
pub fn selection_values(values: &[FieldValue]) -> Vec<FieldValue> {
    values
        .iter()
        .filter(|v| !v.is_null())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// `FIELD IN (...)` over `values`. Text-like fields get quoted literals.
pub fn in_clause(field: &str, field_type: FieldType, values: &[FieldValue]) -> Result<String, ReconError> {
    if values.is_empty() {
        return Err(ReconError::EmptySelection(field.to_string()));
    }
    let quoted = matches!(field_type, FieldType::String | FieldType::Guid | FieldType::GlobalId);
    let literals: Vec<String> = values
        .iter()
        .map(|v| {
            let raw = v.render();
            if quoted {
                format!("'{}'", raw.replace('\'', "''"))
            } else {
                raw
            }
        })
        .collect();
    Ok(format!("{field} IN ({})", literals.join(",")))
}

/// Combine `current` with `matches` under `mode`, returning ids in `order`.
pub fn apply_selection(
    order: &[RecordId],
    current: &HashSet<RecordId>,
    matches: &HashSet<RecordId>,
    mode: SelectionMode,
) -> Vec<RecordId> {
    order
        .iter()
        .filter(|id| {
            let in_current = current.contains(*id);
            let in_matches = matches.contains(*id);
            match mode {
                SelectionMode::New => in_matches,
                SelectionMode::AddTo => in_current || in_matches,
                SelectionMode::RemoveFrom => in_current && !in_matches,
                SelectionMode::Subset => in_current && in_matches,
                SelectionMode::Switch => !in_current,
                SelectionMode::Clear => false,
            }
        })
        .cloned()
        .collect()
}

/// Select records of `store` whose `field` value is in `list`.
///
/// List values are coerced to the field's type before matching; values that
/// cannot be coerced never match but still appear in the query text.
pub fn select_from_list<S: AttributeStore + ?Sized>(
    store: &S,
    field: &str,
    list: &[FieldValue],
    mode: SelectionMode,
    current: &HashSet<RecordId>,
) -> Result<Selection, ReconError> {
    let field_type = store
        .catalog()
        .field_type(field)
        .ok_or_else(|| ReconError::UnknownField {
            table: "input".into(),
            field: field.to_string(),
        })?;

    let mut warnings = Vec::new();
    if field_type == FieldType::Date {
        warn!(field, "date selection field");
        warnings.push(DATE_WARNING.to_string());
    }

    let values = selection_values(list);
    let query = in_clause(field, field_type, &values)?;
    let wanted: HashSet<FieldValue> = values.iter().filter_map(|v| v.coerce_to(field_type)).collect();

    let order = store.record_ids();
    let mut matches = HashSet::new();
    for id in &order {
        if wanted.contains(&store.read(id, field)?) {
            matches.insert(id.clone());
        }
    }

    let selected = apply_selection(&order, current, &matches, mode);
    info!(query = %query, mode = %mode, matched = matches.len(), selected = selected.len(), "selection");

    Ok(Selection {
        query,
        mode,
        matched: matches.len(),
        selected,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::table::{Schema, Table};

    fn store() -> MemoryStore {
        let table = Table::from_csv(
            "parcels",
            "OBJECTID,Zone,Owner\n1,5,O'Neil\n2,2,Smith\n3,8,Lee\n4,2,\n",
        )
        .unwrap();
        let schema = Schema::default()
            .with_column("OBJECTID", FieldType::Oid)
            .with_column("Zone", FieldType::Integer);
        MemoryStore::from_table(&table, Some("OBJECTID"), &schema).unwrap()
    }

    fn ids(v: &[&str]) -> Vec<RecordId> {
        v.iter().map(|s| RecordId::from(*s)).collect()
    }

    #[test]
    fn values_dedup_sorted_without_nulls() {
        let vals = vec![FieldValue::text("b"), FieldValue::Null, FieldValue::text("a"), FieldValue::text("b")];
        assert_eq!(selection_values(&vals), vec![FieldValue::text("a"), FieldValue::text("b")]);
    }

    #[test]
    fn text_values_quoted_numbers_bare() {
        let q = in_clause("Owner", FieldType::String, &[FieldValue::text("O'Neil"), FieldValue::text("Lee")]).unwrap();
        assert_eq!(q, "Owner IN ('O''Neil','Lee')");
        let q = in_clause("Zone", FieldType::Integer, &[FieldValue::Integer(2), FieldValue::Integer(8)]).unwrap();
        assert_eq!(q, "Zone IN (2,8)");
    }

    #[test]
    fn empty_list_rejected() {
        assert!(matches!(
            in_clause("Zone", FieldType::Integer, &[]),
            Err(ReconError::EmptySelection(_))
        ));
    }

    #[test]
    fn text_list_matches_integer_field() {
        let s = store();
        let list = vec![FieldValue::text("2"), FieldValue::text("9")];
        let sel = select_from_list(&s, "Zone", &list, SelectionMode::New, &HashSet::new()).unwrap();
        assert_eq!(sel.query, "Zone IN (2,9)");
        assert_eq!(sel.selected, ids(&["2", "4"]));
    }

    #[test]
    fn modes_combine_with_current() {
        let order = ids(&["1", "2", "3", "4"]);
        let current: HashSet<RecordId> = ids(&["1", "2"]).into_iter().collect();
        let matches: HashSet<RecordId> = ids(&["2", "3"]).into_iter().collect();
        let run = |mode| apply_selection(&order, &current, &matches, mode);
        assert_eq!(run(SelectionMode::New), ids(&["2", "3"]));
        assert_eq!(run(SelectionMode::AddTo), ids(&["1", "2", "3"]));
        assert_eq!(run(SelectionMode::RemoveFrom), ids(&["1"]));
        assert_eq!(run(SelectionMode::Subset), ids(&["2"]));
        assert_eq!(run(SelectionMode::Switch), ids(&["3", "4"]));
        assert!(run(SelectionMode::Clear).is_empty());
    }

    #[test]
    fn unknown_field_is_fatal() {
        let s = store();
        let err = select_from_list(&s, "Nope", &[FieldValue::text("x")], SelectionMode::New, &HashSet::new());
        assert!(matches!(err, Err(ReconError::UnknownField { .. })));
    }
}
