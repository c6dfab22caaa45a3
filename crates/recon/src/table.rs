//! CSV tables and the schemas that type them.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ReconError;
use crate::model::{FieldCatalog, FieldSpec, SourceMapping, SourceRow};
use crate::value::{FieldType, FieldValue};

/// Raw CSV contents: header row plus untyped cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Column types for a table. Columns not listed are read as `String`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub columns: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub read_only: Vec<String>,
}

impl Schema {
    pub fn with_column(mut self, name: &str, field_type: FieldType) -> Self {
        self.columns.insert(name.to_string(), field_type);
        self
    }

    pub fn field_type(&self, name: &str) -> FieldType {
        self.columns.get(name).copied().unwrap_or(FieldType::String)
    }
}

impl Table {
    pub fn from_csv(name: &str, csv_data: &str) -> Result<Self, ReconError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(csv_data.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ReconError::Io(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ReconError::Io(e.to_string()))?;
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            rows,
        })
    }

    pub fn to_csv(&self) -> Result<String, ReconError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|e| ReconError::Io(e.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|e| ReconError::Io(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ReconError::Io(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ReconError::Io(e.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<usize, ReconError> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReconError::MissingColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    /// Catalog in header order, typed and flagged by `schema`.
    pub fn catalog(&self, schema: &Schema) -> FieldCatalog {
        FieldCatalog::new(
            self.headers
                .iter()
                .map(|h| {
                    let spec = FieldSpec::new(h.clone(), schema.field_type(h));
                    if schema.read_only.iter().any(|r| r == h) {
                        spec.read_only()
                    } else {
                        spec
                    }
                })
                .collect(),
        )
    }

    /// Typed values of one column, in row order.
    pub fn typed_column(&self, name: &str, field_type: FieldType) -> Result<Vec<FieldValue>, ReconError> {
        let idx = self.column(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| self.typed_cell(i, idx, field_type))
            .collect()
    }

    fn typed_cell(&self, row: usize, col: usize, field_type: FieldType) -> Result<FieldValue, ReconError> {
        let raw = self.rows[row].get(col).map(|s| s.as_str()).unwrap_or("");
        FieldValue::parse(raw, field_type).ok_or_else(|| ReconError::ValueParse {
            table: self.name.clone(),
            column: self.headers[col].clone(),
            // 1-based, header is line 1
            row: row + 2,
            value: raw.to_string(),
        })
    }

    /// Build a source mapping of `key` → `fields`, rows kept in file order.
    pub fn source_mapping(
        &self,
        key: &str,
        fields: &[String],
        schema: &Schema,
    ) -> Result<SourceMapping, ReconError> {
        let key_idx = self.column(key)?;
        let key_type = schema.field_type(key);
        let field_idx: Vec<(usize, FieldType)> = fields
            .iter()
            .map(|f| Ok((self.column(f)?, schema.field_type(f))))
            .collect::<Result<_, ReconError>>()?;

        let mut rows = Vec::with_capacity(self.rows.len());
        for i in 0..self.rows.len() {
            let key = self.typed_cell(i, key_idx, key_type)?;
            let values = field_idx
                .iter()
                .map(|&(idx, ty)| self.typed_cell(i, idx, ty))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(SourceRow { key, values });
        }

        Ok(SourceMapping {
            key_field: key.to_string(),
            key_type,
            fields: fields.to_vec(),
            field_types: field_idx.iter().map(|&(_, ty)| ty).collect(),
            rows,
        })
    }
}
