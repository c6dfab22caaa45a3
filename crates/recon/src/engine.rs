//! Job runners: load CSV text per a job config, run the engine, hand back
//! the results and the updated table.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{MergeConfig, ResolveConfig, SelectConfig, SpatialJoinConfig, ZonesConfig};
use crate::error::ReconError;
use crate::merge::merge;
use crate::model::{
    ApplyReport, ClipCommand, ConflictGroup, FieldCatalog, FieldPlan, MergeReport,
    OverwritePolicy, RecordId, Resolution, SourceMapping,
};
use crate::plan::{default_plan, mark_existing};
use crate::resolve::{clip_commands, resolve_all};
use crate::select::{select_from_list, Selection};
use crate::spatial_join::JoinedTable;
use crate::store::{apply_writes, AttributeStore, MemoryStore};
use crate::table::{Schema, Table};
use crate::unique::{cap_rows, unique_values};
use crate::validate::{validate, MergeCheck, ValidationResult};
use crate::value::{FieldType, FieldValue};
use crate::zones::{
    count_commands, default_category_fields, validate_category_fields, zone_counts, CategoryField,
    SummaryRow, ZoneCounts,
};

#[derive(Debug, Clone, Serialize)]
pub struct JobMeta {
    pub config_name: String,
    pub kind: &'static str,
    pub engine_version: String,
    pub run_at: String,
}

impl JobMeta {
    fn new(config_name: &str, kind: &'static str) -> Self {
        Self {
            config_name: config_name.to_string(),
            kind,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// A loaded merge: target store, source rows and the effective plan.
#[derive(Debug, Clone)]
pub struct MergeJob {
    pub name: String,
    pub store: MemoryStore,
    pub target_key: String,
    pub source_catalog: FieldCatalog,
    pub source_key: String,
    pub source: SourceMapping,
    pub plan: Vec<FieldPlan>,
    pub policy: OverwritePolicy,
    pub dry_run: bool,
    kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub meta: JobMeta,
    pub plan: Vec<FieldPlan>,
    pub report: MergeReport,
    pub applied: ApplyReport,
    /// Updated target table; `None` on a dry run.
    #[serde(skip)]
    pub output: Option<Table>,
}

impl MergeJob {
    pub fn load(config: &MergeConfig, target_csv: &str, source_csv: &str) -> Result<Self, ReconError> {
        let target_table = Table::from_csv("target", target_csv)?;
        let store = MemoryStore::from_table(&target_table, config.target.id_column(), &config.target.schema)?;

        let source_table = Table::from_csv("source", source_csv)?;
        let source_catalog = source_table.catalog(&config.source.schema);

        let mut plan = if config.fields.is_empty() {
            default_plan(
                &source_catalog,
                &config.source.key,
                config.source.id.as_deref(),
                store.catalog(),
            )
        } else {
            config.plan()
        };
        mark_existing(&mut plan, store.catalog());

        let source = load_source(&source_table, &config.source.key, &plan, &config.source.schema)?;

        Ok(Self {
            name: config.name.clone(),
            store,
            target_key: config.target.key.clone(),
            source_catalog,
            source_key: config.source.key.clone(),
            source,
            plan,
            policy: config.policy,
            dry_run: config.options.dry_run,
            kind: "merge",
        })
    }

    pub fn validate(&self) -> ValidationResult {
        validate(&MergeCheck {
            plan: &self.plan,
            target: self.store.catalog(),
            target_key: &self.target_key,
            source: &self.source_catalog,
            source_key: &self.source_key,
            source_rows: Some(&self.source),
        })
    }

    /// Compute the merge and, unless this is a dry run, apply it.
    pub fn run(mut self) -> Result<MergeOutcome, ReconError> {
        let report = merge(&self.store, &self.source, &self.plan, &self.target_key, self.policy)?;

        let (applied, output) = if self.dry_run {
            (ApplyReport::default(), None)
        } else {
            let applied = apply_writes(&mut self.store, &report.commands);
            (applied, Some(self.store.to_table()))
        };

        Ok(MergeOutcome {
            meta: JobMeta::new(&self.name, self.kind),
            plan: self.plan,
            report,
            applied,
            output,
        })
    }
}

/// Source mapping over the plan's source fields that exist in the table.
/// Missing ones are left for validation to report.
fn load_source(
    table: &Table,
    key: &str,
    plan: &[FieldPlan],
    schema: &Schema,
) -> Result<SourceMapping, ReconError> {
    let mut fields: Vec<String> = Vec::new();
    for entry in plan {
        if table.headers.contains(&entry.source) && !fields.contains(&entry.source) {
            fields.push(entry.source.clone());
        }
    }
    if table.headers.iter().any(|h| h == key) {
        table.source_mapping(key, &fields, schema)
    } else {
        Ok(SourceMapping {
            key_field: key.to_string(),
            key_type: schema.field_type(key),
            fields,
            field_types: Vec::new(),
            rows: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Spatial join
// ---------------------------------------------------------------------------

impl MergeJob {
    /// A merge whose source is a spatial join's one-to-one output.
    pub fn load_spatial_join(
        config: &SpatialJoinConfig,
        target_csv: &str,
        joined_csv: &str,
    ) -> Result<Self, ReconError> {
        let target_table = Table::from_csv("target", target_csv)?;
        let store = MemoryStore::from_table(&target_table, config.target.id_column(), &config.target.schema)?;
        let key_type = store.catalog().field_type(&config.target.key).unwrap_or(FieldType::Oid);

        let joined_table = Table::from_csv("joined", joined_csv)?;
        let fields: Vec<String> = config
            .fields
            .iter()
            .map(|f| f.source.clone())
            .filter(|f| joined_table.headers.contains(f))
            .collect();
        let joined = JoinedTable::from_table(
            &joined_table,
            &config.joined.id,
            &config.joined.count,
            &fields,
            &config.joined.schema,
        )?;

        // The joined key carries target ids, so it shares the target key's type.
        let mut source_catalog = joined_table.catalog(&config.joined.schema);
        for spec in source_catalog.fields.iter_mut() {
            if spec.name == config.joined.id {
                spec.field_type = key_type;
            }
        }

        let (source, policy) = joined.into_source(config.mode);
        info!(mode = %config.mode, rows = source.rows.len(), "spatial join source");

        let mut plan = config.plan();
        mark_existing(&mut plan, store.catalog());

        Ok(Self {
            name: config.name.clone(),
            store,
            target_key: config.target.key.clone(),
            source_catalog,
            source_key: config.joined.id.clone(),
            source,
            plan,
            policy,
            dry_run: config.options.dry_run,
            kind: "spatial_join",
        })
    }
}

// ---------------------------------------------------------------------------
// Resolve
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ResolveOutcome {
    pub meta: JobMeta,
    pub rank_field: String,
    pub descending: bool,
    pub resolutions: Vec<Resolution>,
    pub clips: Vec<ClipCommand>,
}

pub fn run_resolve(config: &ResolveConfig, records_csv: &str, groups_csv: &str) -> Result<ResolveOutcome, ReconError> {
    let records = Table::from_csv("records", records_csv)?;
    let schema = Schema::default().with_column(&config.records.rank, config.records.rank_type);
    let store = MemoryStore::from_table(&records, Some(&config.records.id), &schema)?;

    let groups_table = Table::from_csv("groups", groups_csv)?;
    let groups = load_groups(&groups_table, &config.groups.group, &config.groups.member)?;

    let resolutions = resolve_all(&groups, &store, &config.records.rank, config.descending)?;
    let clips = clip_commands(&resolutions);

    Ok(ResolveOutcome {
        meta: JobMeta::new(&config.name, "resolve"),
        rank_field: config.records.rank.clone(),
        descending: config.descending,
        resolutions,
        clips,
    })
}

/// Conflict groups from a `(group, member)` table, in first-seen order.
pub fn load_groups(table: &Table, group_col: &str, member_col: &str) -> Result<Vec<ConflictGroup>, ReconError> {
    let g = table.column(group_col)?;
    let m = table.column(member_col)?;

    let mut order: Vec<String> = Vec::new();
    let mut members: HashMap<String, Vec<RecordId>> = HashMap::new();
    for row in &table.rows {
        let group = row[g].trim().to_string();
        if !members.contains_key(&group) {
            order.push(group.clone());
        }
        members
            .entry(group)
            .or_default()
            .push(RecordId(row[m].trim().to_string()));
    }

    Ok(order
        .into_iter()
        .map(|id| {
            let list = members.remove(&id).unwrap_or_default();
            ConflictGroup::new(id, list)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ZonesOutcome {
    pub meta: JobMeta,
    pub categories: Vec<CategoryField>,
    pub validation: ValidationResult,
    pub counts: Option<ZoneCounts>,
    pub applied: ApplyReport,
    #[serde(skip)]
    pub output: Option<Table>,
}

pub fn run_zones(config: &ZonesConfig, zones_csv: &str, summary_csv: &str) -> Result<ZonesOutcome, ReconError> {
    let zones_table = Table::from_csv("zones", zones_csv)?;
    let mut store = MemoryStore::from_table(&zones_table, Some(&config.zones.id), &config.zones.schema)?;

    let zone_type = store
        .catalog()
        .field_type(&config.zones.zone)
        .ok_or_else(|| ReconError::MissingColumn {
            table: "zones".into(),
            column: config.zones.zone.clone(),
        })?;
    let zones = store
        .record_ids()
        .into_iter()
        .map(|id| {
            let zone = store.read(&id, &config.zones.zone)?;
            Ok((id, zone))
        })
        .collect::<Result<Vec<_>, ReconError>>()?;
    debug!(zones = zones.len(), zone_type = %zone_type, "zones loaded");

    let summary_table = Table::from_csv("summary", summary_csv)?;
    let summary = load_summary(&summary_table, &config.summary.join_id, &config.summary.category, &config.summary.count)?;

    let categories = if config.categories.is_empty() {
        default_category_fields(summary.iter().map(|r| &r.category))
    } else {
        config.categories.clone()
    };

    let validation = validate_category_fields(&categories, store.catalog());
    if !validation.is_ok() {
        return Ok(ZonesOutcome {
            meta: JobMeta::new(&config.name, "zones"),
            categories,
            validation,
            counts: None,
            applied: ApplyReport::default(),
            output: None,
        });
    }

    let counts = zone_counts(&zones, &summary, &categories)?;
    let commands = count_commands(&counts, store.catalog());
    let applied = apply_writes(&mut store, &commands);

    Ok(ZonesOutcome {
        meta: JobMeta::new(&config.name, "zones"),
        categories,
        validation,
        counts: Some(counts),
        applied,
        output: Some(store.to_table()),
    })
}

fn load_summary(table: &Table, join_id: &str, category: &str, count: &str) -> Result<Vec<SummaryRow>, ReconError> {
    let ids = table.typed_column(join_id, FieldType::String)?;
    let cats = table.typed_column(category, FieldType::String)?;
    let counts = table.typed_column(count, FieldType::Integer)?;
    Ok(ids
        .into_iter()
        .zip(cats)
        .zip(counts)
        .map(|((id, category), count)| SummaryRow {
            join_id: RecordId(id.render()),
            category,
            count: match count {
                FieldValue::Integer(n) => n,
                _ => 0,
            },
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Select + unique
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SelectOutcome {
    pub meta: JobMeta,
    pub selection: Selection,
}

pub fn run_select(config: &SelectConfig, input_csv: &str, list_csv: &str) -> Result<SelectOutcome, ReconError> {
    let input = Table::from_csv("input", input_csv)?;
    let store = MemoryStore::from_table(&input, config.input.id_column(), &config.input.schema)?;
    let field_type = store.catalog().field_type(&config.input.key).unwrap_or(FieldType::String);

    let list_table = Table::from_csv("list", list_csv)?;
    let list: Vec<FieldValue> = list_table
        .typed_column(&config.list.field, FieldType::String)?
        .into_iter()
        .map(|v| v.coerce_to(field_type).unwrap_or(v))
        .collect();

    let current: HashSet<RecordId> = config.current.iter().map(|s| RecordId(s.clone())).collect();
    let selection = select_from_list(&store, &config.input.key, &list, config.mode, &current)?;

    Ok(SelectOutcome {
        meta: JobMeta::new(&config.name, "select"),
        selection,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct UniqueOutcome {
    pub field: String,
    pub total: usize,
    pub values: Vec<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Distinct values of `field`, read as `field_type`, capped at `limit` rows.
pub fn run_unique(csv_data: &str, field: &str, field_type: FieldType, limit: usize) -> Result<UniqueOutcome, ReconError> {
    if !field_type.is_transferable() {
        return Err(ReconError::ConfigValidation(format!(
            "{field_type} fields have no listable values"
        )));
    }
    let table = Table::from_csv("input", csv_data)?;
    let column = table.typed_column(field, field_type)?;
    let mut values = unique_values(&column);
    let total = values.len();
    let warning = cap_rows(&mut values, limit);
    if let Some(w) = &warning {
        warn!("{w}");
    }
    Ok(UniqueOutcome {
        field: field.to_string(),
        total,
        values,
        warning,
    })
}
