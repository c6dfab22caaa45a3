//! Attribute store seam and the in-memory implementation.

use std::collections::HashMap;

use tracing::debug;

use crate::error::ReconError;
use crate::model::{ApplyReport, FieldCatalog, FieldSpec, RecordFailure, RecordId, WriteCommand};
use crate::table::{Schema, Table};
use crate::value::FieldValue;

/// Point reads/writes of named fields by record id, plus field introspection.
///
/// Each write is expected to commit on its own; the engine never relies on
/// batching or rollback.
pub trait AttributeStore {
    /// Record ids in store (cursor) order.
    fn record_ids(&self) -> Vec<RecordId>;
    fn catalog(&self) -> &FieldCatalog;
    fn read(&self, id: &RecordId, field: &str) -> Result<FieldValue, ReconError>;
    fn write(&mut self, id: &RecordId, field: &str, value: FieldValue) -> Result<(), ReconError>;
    fn add_field(&mut self, spec: FieldSpec) -> Result<(), ReconError>;
}

/// Apply write commands in order. A failing command is recorded and the
/// remaining commands still run.
pub fn apply_writes<S: AttributeStore + ?Sized>(store: &mut S, commands: &[WriteCommand]) -> ApplyReport {
    let mut report = ApplyReport::default();
    for cmd in commands {
        let outcome = match cmd {
            WriteCommand::AddField { field, field_type } => store
                .add_field(FieldSpec::new(field.clone(), *field_type))
                .map_err(|e| (RecordId(String::new()), Some(field.clone()), e)),
            WriteCommand::SetValue { record, field, value } => store
                .write(record, field, value.clone())
                .map_err(|e| (record.clone(), Some(field.clone()), e)),
        };
        match outcome {
            Ok(()) => report.applied += 1,
            Err((record, field, err)) => {
                debug!(record = %record, error = %err, "write failed");
                report.failures.push(RecordFailure {
                    record,
                    field,
                    message: err.to_string(),
                });
            }
        }
    }
    report
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// One stored record. `raw` holds the cell text a record was loaded with;
/// a cell keeps its text until a write replaces the value.
#[derive(Debug, Clone, Default)]
struct StoredRecord {
    values: HashMap<String, FieldValue>,
    raw: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    name: String,
    catalog: FieldCatalog,
    order: Vec<RecordId>,
    records: HashMap<RecordId, StoredRecord>,
}

impl MemoryStore {
    pub fn new(name: &str, catalog: FieldCatalog) -> Self {
        Self {
            name: name.to_string(),
            catalog,
            order: Vec::new(),
            records: HashMap::new(),
        }
    }

    /// Insert a record. Fields missing from `values` read as null.
    pub fn insert(&mut self, id: RecordId, values: HashMap<String, FieldValue>) {
        if !self.records.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.records.insert(id, StoredRecord { values, raw: HashMap::new() });
    }

    /// Load a typed store from a CSV table.
    ///
    /// With an `id_column` its cells are the record ids and must be unique.
    /// Without one, records are numbered by row starting at 1.
    pub fn from_table(table: &Table, id_column: Option<&str>, schema: &Schema) -> Result<Self, ReconError> {
        let id_idx = id_column.map(|c| table.column(c)).transpose()?;
        let catalog = table.catalog(schema);
        let mut store = Self::new(&table.name, catalog.clone());

        let columns: Vec<(String, Vec<FieldValue>)> = catalog
            .fields
            .iter()
            .map(|f| Ok((f.name.clone(), table.typed_column(&f.name, f.field_type)?)))
            .collect::<Result<_, ReconError>>()?;

        for (i, row) in table.rows.iter().enumerate() {
            let id = match id_idx {
                Some(idx) => RecordId(row[idx].clone()),
                None => RecordId::from(i as i64 + 1),
            };
            if store.records.contains_key(&id) {
                return Err(ReconError::DuplicateRecordId {
                    table: table.name.clone(),
                    column: id_column.unwrap_or_default().to_string(),
                    id: id.0,
                });
            }
            let values = columns
                .iter()
                .map(|(name, vals)| (name.clone(), vals[i].clone()))
                .collect();
            let raw = table
                .headers
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect();
            store.order.push(id.clone());
            store.records.insert(id, StoredRecord { values, raw });
        }
        Ok(store)
    }

    /// Render back to a CSV table in catalog and record order. Cells that
    /// were never written keep their loaded text.
    pub fn to_table(&self) -> Table {
        let headers: Vec<String> = self.catalog.names().map(|n| n.to_string()).collect();
        let rows = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(|rec| {
                headers
                    .iter()
                    .map(|h| match rec.raw.get(h) {
                        Some(text) => text.clone(),
                        None => rec.values.get(h).map(|v| v.render()).unwrap_or_default(),
                    })
                    .collect()
            })
            .collect();
        Table {
            name: self.name.clone(),
            headers,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl AttributeStore for MemoryStore {
    fn record_ids(&self) -> Vec<RecordId> {
        self.order.clone()
    }

    fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    fn read(&self, id: &RecordId, field: &str) -> Result<FieldValue, ReconError> {
        if !self.catalog.contains(field) {
            return Err(ReconError::UnknownField {
                table: self.name.clone(),
                field: field.to_string(),
            });
        }
        let rec = self
            .records
            .get(id)
            .ok_or_else(|| ReconError::UnknownRecord(id.0.clone()))?;
        Ok(rec.values.get(field).cloned().unwrap_or(FieldValue::Null))
    }

    fn write(&mut self, id: &RecordId, field: &str, value: FieldValue) -> Result<(), ReconError> {
        let spec = self.catalog.get(field).ok_or_else(|| ReconError::UnknownField {
            table: self.name.clone(),
            field: field.to_string(),
        })?;
        if !spec.editable {
            return Err(ReconError::ReadOnlyField {
                field: field.to_string(),
            });
        }
        let stored = value.coerce_to(spec.field_type).ok_or_else(|| ReconError::Coercion {
            field: field.to_string(),
            value: value.render(),
            field_type: spec.field_type.to_string(),
        })?;
        let rec = self
            .records
            .get_mut(id)
            .ok_or_else(|| ReconError::UnknownRecord(id.0.clone()))?;
        rec.raw.remove(field);
        rec.values.insert(field.to_string(), stored);
        Ok(())
    }

    fn add_field(&mut self, spec: FieldSpec) -> Result<(), ReconError> {
        if self.catalog.contains(&spec.name) {
            return Err(ReconError::ConfigValidation(format!(
                "field '{}' already exists in {}",
                spec.name, self.name
            )));
        }
        self.catalog.push(spec);
        Ok(())
    }
}
