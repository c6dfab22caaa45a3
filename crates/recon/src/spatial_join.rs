//! Spatial-join results as a merge source.
//!
//! The join itself happens elsewhere; this module takes its one-to-one
//! output (one row per target record, with a join count) and decides what
//! the merge should see.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::{OverwritePolicy, RecordId, SourceMapping, SourceRow};
use crate::table::{Schema, Table};
use crate::value::{FieldType, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Only fill blank target values.
    #[default]
    #[serde(alias = "do_not_overwrite")]
    FillOnly,
    /// Overwrite only records that had at least one join match.
    OverwriteIfFound,
    /// Overwrite every record; unmatched ones get nulls.
    OverwriteWithNulls,
}

impl JoinMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::FillOnly => "Do not overwrite",
            Self::OverwriteIfFound => "Overwrite only if spatial join found",
            Self::OverwriteWithNulls => "Overwrite with Nulls if no spatial join found",
        }
    }

    pub fn policy(&self) -> OverwritePolicy {
        match self {
            Self::FillOnly => OverwritePolicy::FillOnly,
            Self::OverwriteIfFound | Self::OverwriteWithNulls => OverwritePolicy::Overwrite,
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow {
    /// Id of the target record this row was produced for.
    pub target: RecordId,
    pub join_count: i64,
    pub values: Vec<FieldValue>,
}

/// One-to-one spatial join output.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedTable {
    /// Column holding the target ids.
    pub key_field: String,
    pub fields: Vec<String>,
    pub field_types: Vec<FieldType>,
    pub rows: Vec<JoinedRow>,
}

impl JoinedTable {
    /// Read a joined CSV: `id_column` holds the target id, `count_column`
    /// the join count, `fields` the joined values.
    pub fn from_table(
        table: &Table,
        id_column: &str,
        count_column: &str,
        fields: &[String],
        schema: &Schema,
    ) -> Result<Self, ReconError> {
        let ids = table.typed_column(id_column, FieldType::String)?;
        let counts = table.typed_column(count_column, FieldType::Integer)?;
        let columns: Vec<Vec<FieldValue>> = fields
            .iter()
            .map(|f| table.typed_column(f, schema.field_type(f)))
            .collect::<Result<_, _>>()?;

        let rows = ids
            .into_iter()
            .zip(counts)
            .enumerate()
            .map(|(i, (id, count))| JoinedRow {
                target: RecordId(id.render()),
                join_count: match count {
                    FieldValue::Integer(n) => n,
                    _ => 0,
                },
                values: columns.iter().map(|c| c[i].clone()).collect(),
            })
            .collect();

        Ok(Self {
            key_field: id_column.to_string(),
            fields: fields.to_vec(),
            field_types: fields.iter().map(|f| schema.field_type(f)).collect(),
            rows,
        })
    }

    /// Source mapping and policy for a merge under `mode`. Keys are target
    /// ids as text; the merge coerces them to the target key's type.
    pub fn into_source(self, mode: JoinMode) -> (SourceMapping, OverwritePolicy) {
        let rows = self
            .rows
            .into_iter()
            .filter(|r| mode != JoinMode::OverwriteIfFound || r.join_count > 0)
            .map(|r| SourceRow {
                key: FieldValue::Text(r.target.0),
                values: r.values,
            })
            .collect();
        let mapping = SourceMapping {
            key_field: self.key_field,
            key_type: FieldType::String,
            fields: self.fields,
            field_types: self.field_types,
            rows,
        };
        (mapping, mode.policy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JOINED: &str = "TARGET_FID,Join_Count,District\n1,1,North\n2,0,\n3,2,South\n";

    fn joined() -> JoinedTable {
        let t = Table::from_csv("joined", JOINED).unwrap();
        JoinedTable::from_table(&t, "TARGET_FID", "Join_Count", &["District".to_string()], &Schema::default())
            .unwrap()
    }

    #[test]
    fn reads_counts_and_values() {
        let j = joined();
        assert_eq!(j.rows.len(), 3);
        assert_eq!(j.rows[1].join_count, 0);
        assert_eq!(j.rows[1].values, vec![FieldValue::Null]);
        assert_eq!(j.rows[2].target, RecordId::from("3"));
    }

    #[test]
    fn overwrite_if_found_drops_unmatched() {
        let (m, policy) = joined().into_source(JoinMode::OverwriteIfFound);
        assert_eq!(policy, OverwritePolicy::Overwrite);
        let keys: Vec<String> = m.rows.iter().map(|r| r.key.render()).collect();
        assert_eq!(keys, vec!["1", "3"]);
    }

    #[test]
    fn overwrite_with_nulls_keeps_all() {
        let (m, policy) = joined().into_source(JoinMode::OverwriteWithNulls);
        assert_eq!(policy, OverwritePolicy::Overwrite);
        assert_eq!(m.rows.len(), 3);
        assert!(m.rows[1].values[0].is_null());
    }

    #[test]
    fn fill_only_maps_to_fill_policy() {
        let (m, policy) = joined().into_source(JoinMode::FillOnly);
        assert_eq!(policy, OverwritePolicy::FillOnly);
        assert_eq!(m.rows.len(), 3);
        assert_eq!(JoinMode::FillOnly.to_string(), "Do not overwrite");
    }

    #[test]
    fn source_key_follows_id_column() {
        let t = Table::from_csv("joined", "ORIG_ID,Join_Count,District\n1,1,North\n").unwrap();
        let j = JoinedTable::from_table(&t, "ORIG_ID", "Join_Count", &["District".to_string()], &Schema::default())
            .unwrap();
        let (m, _) = j.into_source(JoinMode::FillOnly);
        assert_eq!(m.key_field, "ORIG_ID");
        assert_eq!(joined().into_source(JoinMode::FillOnly).0.key_field, "TARGET_FID");
    }
}
