//! Per-zone category counts from a summarize-within table.
//!
//! Zones are grouped by zone value: every zone record sharing a value gets
//! the same counts, summed over all of that value's records.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ReconError;
use crate::model::{FieldCatalog, RecordId, WriteCommand};
use crate::plan::validate_field_name;
use crate::validate::{Issue, ValidationResult};
use crate::value::{FieldType, FieldValue};

/// Category label standing for a null category value.
pub const NULL_CATEGORY: &str = "_Null";
/// Category label standing for an empty-string category value.
pub const EMPTY_CATEGORY: &str = "_EmptyString";
pub const FEATURE_SUM: &str = "Feature_Sum";

/// One output column: counts of `category` land in `field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryField {
    pub category: String,
    pub field: String,
}

/// One row of the summarize-within table.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    /// Id of the zone record the features fell within.
    pub join_id: RecordId,
    pub category: FieldValue,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneRow {
    pub record: RecordId,
    pub zone: FieldValue,
    pub counts: Vec<i64>,
    pub feature_sum: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneCounts {
    /// Output field names, `Feature_Sum` excluded.
    pub fields: Vec<String>,
    pub rows: Vec<ZoneRow>,
}

/// Label of a category value; null and empty text get sentinel labels.
pub fn category_label(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => NULL_CATEGORY.to_string(),
        FieldValue::Text(s) if s.is_empty() => EMPTY_CATEGORY.to_string(),
        other => other.render(),
    }
}

/// One `Sum_<label>` field per distinct category, sorted by label.
pub fn default_category_fields<'a, I>(categories: I) -> Vec<CategoryField>
where
    I: IntoIterator<Item = &'a FieldValue>,
{
    categories
        .into_iter()
        .map(category_label)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|label| CategoryField {
            field: validate_field_name(&format!("Sum_{label}")),
            category: label,
        })
        .collect()
}

/// Duplicate output names are an error; names already on the zone table are
/// replaced and only warned about.
pub fn validate_category_fields(fields: &[CategoryField], zones: &FieldCatalog) -> ValidationResult {
    let mut result = ValidationResult::default();
    for f in fields {
        if zones.contains(&f.field) {
            result.warn(Issue::on(
                &f.field,
                format!("Field '{}' already exists and will be replaced.", f.field),
            ));
        }
    }
    let mut seen = HashSet::new();
    if !fields.iter().all(|f| seen.insert(f.field.as_str())) {
        result.error(Issue::general("Field names must be unique"));
    }
    result
}

/// Count categories per zone value.
///
/// `zones` is `(zone record id, zone value)` in store order.
pub fn zone_counts(
    zones: &[(RecordId, FieldValue)],
    summary: &[SummaryRow],
    fields: &[CategoryField],
) -> Result<ZoneCounts, ReconError> {
    if fields.is_empty() {
        return Err(ReconError::ConfigValidation("no category fields given".into()));
    }

    let zone_of: HashMap<&RecordId, &FieldValue> = zones.iter().map(|(id, z)| (id, z)).collect();

    // (zone value, category label) → count
    let mut totals: HashMap<(&FieldValue, String), i64> = HashMap::new();
    for row in summary {
        let Some(zone) = zone_of.get(&row.join_id) else {
            return Err(ReconError::UnknownRecord(row.join_id.0.clone()));
        };
        *totals.entry((*zone, category_label(&row.category))).or_insert(0) += row.count;
    }

    let rows: Vec<ZoneRow> = zones
        .iter()
        .map(|(id, zone)| {
            let counts: Vec<i64> = fields
                .iter()
                .map(|f| totals.get(&(zone, f.category.clone())).copied().unwrap_or(0))
                .collect();
            ZoneRow {
                record: id.clone(),
                zone: zone.clone(),
                feature_sum: counts.iter().sum(),
                counts,
            }
        })
        .collect();

    info!(zones = rows.len(), categories = fields.len(), "zone counts computed");

    Ok(ZoneCounts {
        fields: fields.iter().map(|f| f.field.clone()).collect(),
        rows,
    })
}

/// Write commands storing `counts` on the zone table. Missing fields are
/// added as integers; existing ones are overwritten.
pub fn count_commands(counts: &ZoneCounts, zones: &FieldCatalog) -> Vec<WriteCommand> {
    let names: Vec<&str> = counts
        .fields
        .iter()
        .map(|s| s.as_str())
        .chain(std::iter::once(FEATURE_SUM))
        .collect();

    let mut commands: Vec<WriteCommand> = names
        .iter()
        .filter(|n| !zones.contains(n))
        .map(|n| WriteCommand::AddField {
            field: n.to_string(),
            field_type: FieldType::Integer,
        })
        .collect();

    for row in &counts.rows {
        let values = row.counts.iter().chain(std::iter::once(&row.feature_sum));
        for (name, value) in names.iter().zip(values) {
            commands.push(WriteCommand::SetValue {
                record: row.record.clone(),
                field: name.to_string(),
                value: FieldValue::Integer(*value),
            });
        }
    }
    commands
}
