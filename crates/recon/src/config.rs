use serde::Deserialize;

use crate::error::ReconError;
use crate::model::{FieldPlan, OverwritePolicy};
use crate::select::SelectionMode;
use crate::spatial_join::JoinMode;
use crate::table::Schema;
use crate::value::FieldType;
use crate::zones::CategoryField;

// ---------------------------------------------------------------------------
// Shared pieces
// ---------------------------------------------------------------------------

/// A CSV table keyed by one of its columns.
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub file: String,
    /// Column matched against the other table.
    pub key: String,
    /// Column supplying unique record ids. Without one, rows are numbered.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub schema: Schema,
}

impl TableConfig {
    pub fn id_column(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeOptions {
    /// Plan and report, but do not write the output table.
    #[serde(default)]
    pub dry_run: bool,
    /// Include the per-value change log in the report.
    #[serde(default)]
    pub log_changes: bool,
}

fn plan_from(fields: &[FieldMapping]) -> Vec<FieldPlan> {
    fields
        .iter()
        .map(|f| FieldPlan::new(f.source.clone(), f.target.clone()))
        .collect()
}

fn require(value: &str, what: &str) -> Result<(), ReconError> {
    if value.trim().is_empty() {
        return Err(ReconError::ConfigValidation(format!("{what} must not be empty")));
    }
    Ok(())
}

fn require_table(table: &TableConfig, section: &str) -> Result<(), ReconError> {
    require(&table.file, &format!("[{section}] file"))?;
    require(&table.key, &format!("[{section}] key"))
}

fn require_fields(fields: &[FieldMapping]) -> Result<(), ReconError> {
    for (i, f) in fields.iter().enumerate() {
        if f.source.trim().is_empty() || f.target.trim().is_empty() {
            return Err(ReconError::ConfigValidation(format!(
                "fields[{i}]: source and target must not be empty"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    pub name: String,
    pub target: TableConfig,
    pub source: TableConfig,
    #[serde(default)]
    pub policy: OverwritePolicy,
    /// Explicit field plan. When empty, every transferable source field is
    /// mapped onto a same-named target field.
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
    #[serde(default)]
    pub options: MergeOptions,
}

impl MergeConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: MergeConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        require_table(&self.target, "target")?;
        require_table(&self.source, "source")?;
        require_fields(&self.fields)
    }

    pub fn plan(&self) -> Vec<FieldPlan> {
        plan_from(&self.fields)
    }
}

// ---------------------------------------------------------------------------
// Resolve
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RecordsConfig {
    pub file: String,
    pub id: String,
    pub rank: String,
    #[serde(default = "default_rank_type")]
    pub rank_type: FieldType,
}

fn default_rank_type() -> FieldType {
    FieldType::Double
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupsConfig {
    pub file: String,
    pub group: String,
    pub member: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveConfig {
    pub name: String,
    pub records: RecordsConfig,
    pub groups: GroupsConfig,
    /// Highest rank wins instead of lowest.
    #[serde(default)]
    pub descending: bool,
}

impl ResolveConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ResolveConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        require(&self.records.file, "[records] file")?;
        require(&self.records.id, "[records] id")?;
        require(&self.records.rank, "[records] rank")?;
        require(&self.groups.file, "[groups] file")?;
        require(&self.groups.group, "[groups] group")?;
        require(&self.groups.member, "[groups] member")?;
        if !self.records.rank_type.is_transferable() {
            return Err(ReconError::ConfigValidation(format!(
                "rank_type {} cannot be ranked",
                self.records.rank_type
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Spatial join
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct JoinedConfig {
    pub file: String,
    #[serde(default = "default_join_id")]
    pub id: String,
    #[serde(default = "default_join_count")]
    pub count: String,
    #[serde(default)]
    pub schema: Schema,
}

fn default_join_id() -> String {
    "TARGET_FID".into()
}

fn default_join_count() -> String {
    "Join_Count".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpatialJoinConfig {
    pub name: String,
    /// `key` is the target's object id column.
    pub target: TableConfig,
    pub joined: JoinedConfig,
    #[serde(default)]
    pub mode: JoinMode,
    pub fields: Vec<FieldMapping>,
    #[serde(default)]
    pub options: MergeOptions,
}

impl SpatialJoinConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: SpatialJoinConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        require_table(&self.target, "target")?;
        require(&self.joined.file, "[joined] file")?;
        if self.fields.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least one [[fields]] entry is required".into(),
            ));
        }
        require_fields(&self.fields)
    }

    pub fn plan(&self) -> Vec<FieldPlan> {
        plan_from(&self.fields)
    }
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneTableConfig {
    pub file: String,
    pub id: String,
    pub zone: String,
    #[serde(default)]
    pub schema: Schema,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryConfig {
    pub file: String,
    #[serde(default = "default_summary_join_id")]
    pub join_id: String,
    pub category: String,
    pub count: String,
}

fn default_summary_join_id() -> String {
    "Join_ID".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZonesConfig {
    pub name: String,
    pub zones: ZoneTableConfig,
    pub summary: SummaryConfig,
    /// Output fields. When empty, one `Sum_<category>` per category seen.
    #[serde(default)]
    pub categories: Vec<CategoryField>,
}

impl ZonesConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ZonesConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        require(&self.zones.file, "[zones] file")?;
        require(&self.zones.id, "[zones] id")?;
        require(&self.zones.zone, "[zones] zone")?;
        require(&self.summary.file, "[summary] file")?;
        require(&self.summary.category, "[summary] category")?;
        require(&self.summary.count, "[summary] count")
    }
}

// ---------------------------------------------------------------------------
// Select
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ListConfig {
    pub file: String,
    pub field: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectConfig {
    pub name: String,
    /// `key` is the field matched against the list; `id` the record ids.
    pub input: TableConfig,
    pub list: ListConfig,
    #[serde(default)]
    pub mode: SelectionMode,
    /// Record ids selected before this run.
    #[serde(default)]
    pub current: Vec<String>,
}

impl SelectConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: SelectConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        require_table(&self.input, "input")?;
        require(&self.list.file, "[list] file")?;
        require(&self.list.field, "[list] field")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
