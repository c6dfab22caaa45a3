use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{FieldType, FieldValue};

// ---------------------------------------------------------------------------
// Records + catalogs
// ---------------------------------------------------------------------------

/// Opaque, stable record identifier (object id or string key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for RecordId {
    fn from(i: i64) -> Self {
        Self(i.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub editable: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            editable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }
}

/// Ordered field list of one table. Name lookup is case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldCatalog {
    pub fields: Vec<FieldSpec>,
}

impl FieldCatalog {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.get(name).map(|f| f.field_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn push(&mut self, spec: FieldSpec) {
        self.fields.push(spec);
    }
}

// ---------------------------------------------------------------------------
// Conflict groups + resolution
// ---------------------------------------------------------------------------

/// Records known by an external detector to mutually conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictGroup {
    pub group_id: String,
    pub members: Vec<RecordId>,
}

impl ConflictGroup {
    pub fn new(group_id: impl Into<String>, members: Vec<RecordId>) -> Self {
        Self {
            group_id: group_id.into(),
            members,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub group_id: String,
    pub winner: RecordId,
    pub winner_rank: FieldValue,
    pub losers: Vec<RecordId>,
}

/// Replace `target`'s shape with `target` minus `subtract`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipCommand {
    pub group_id: String,
    pub target: RecordId,
    pub subtract: RecordId,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClipReport {
    pub applied: usize,
    pub failures: Vec<RecordFailure>,
}

// ---------------------------------------------------------------------------
// Source mapping + plan
// ---------------------------------------------------------------------------

/// Ordered `(key, values...)` rows drawn from a secondary table.
///
/// Duplicate keys are kept as-is; the lookup built from this takes the last.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMapping {
    pub key_field: String,
    pub key_type: FieldType,
    pub fields: Vec<String>,
    pub field_types: Vec<FieldType>,
    pub rows: Vec<SourceRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub key: FieldValue,
    pub values: Vec<FieldValue>,
}

impl SourceMapping {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.field_index(name).and_then(|i| self.field_types.get(i).copied())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPlan {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub exists_in_target: bool,
}

impl FieldPlan {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            exists_in_target: false,
        }
    }

    pub fn existing(mut self) -> Self {
        self.exists_in_target = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Null every planned field, ignoring the source.
    #[serde(alias = "clear")]
    ClearAll,
    /// Replace from the source whenever the key matches.
    Overwrite,
    /// Only populate fields that are currently null or blank.
    #[serde(alias = "do_not_overwrite")]
    FillOnly,
}

impl Default for OverwritePolicy {
    fn default() -> Self {
        Self::Overwrite
    }
}

impl OverwritePolicy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ClearAll => "Clear all existing values",
            Self::Overwrite => "Overwrite existing values",
            Self::FillOnly => "Do not overwrite",
        }
    }
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClearAll => write!(f, "clear_all"),
            Self::Overwrite => write!(f, "overwrite"),
            Self::FillOnly => write!(f, "fill_only"),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteCommand {
    AddField {
        field: String,
        field_type: FieldType,
    },
    SetValue {
        record: RecordId,
        field: String,
        value: FieldValue,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub record: RecordId,
    pub key: FieldValue,
    pub field: String,
    pub old: FieldValue,
    pub new: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub record: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub policy: OverwritePolicy,
    pub records_scanned: usize,
    /// Distinct planned fields with at least one change.
    pub fields_touched: usize,
    pub keys_not_found: usize,
    pub added_fields: Vec<String>,
    pub read_only_skipped: Vec<String>,
    pub changes: Vec<Change>,
    pub failures: Vec<RecordFailure>,
    pub commands: Vec<WriteCommand>,
}

impl MergeReport {
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub applied: usize,
    pub failures: Vec<RecordFailure>,
}
