use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (missing key field, bad schema, etc.).
    ConfigValidation(String),
    /// A conflict group was built with fewer than two members.
    EmptyGroup { group_id: String, members: usize },
    /// Two different source fields are mapped onto the same target field.
    AmbiguousField { target: String, sources: Vec<String> },
    /// Target field is not editable in the attribute store.
    ReadOnlyField { field: String },
    /// Field referenced by a plan or config is not in the catalog.
    UnknownField { table: String, field: String },
    /// Record id referenced by a group or command is not in the store.
    UnknownRecord(String),
    /// Two rows of a table carry the same value in its id column.
    DuplicateRecordId { table: String, column: String, id: String },
    /// Missing required column in input data.
    MissingColumn { table: String, column: String },
    /// Raw cell text could not be read as the declared field type.
    ValueParse { table: String, column: String, row: usize, value: String },
    /// Value cannot be stored in a field of the given type.
    Coercion { field: String, value: String, field_type: String },
    /// Selection list was empty after dropping nulls.
    EmptySelection(String),
    /// External geometry engine failed on a clip.
    Geometry(String),
    /// IO error (file read, CSV framing, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::EmptyGroup { group_id, members } => {
                write!(f, "conflict group '{group_id}' has {members} member(s), at least 2 required")
            }
            Self::AmbiguousField { target, sources } => {
                write!(f, "target field '{target}' is mapped from multiple source fields: {}", sources.join(", "))
            }
            Self::ReadOnlyField { field } => write!(f, "field '{field}' is not editable"),
            Self::UnknownField { table, field } => {
                write!(f, "{table}: field '{field}' not found")
            }
            Self::UnknownRecord(id) => write!(f, "record '{id}' not found"),
            Self::DuplicateRecordId { table, column, id } => {
                write!(f, "{table}: id '{id}' appears more than once in column '{column}'")
            }
            Self::MissingColumn { table, column } => {
                write!(f, "{table}: missing column '{column}'")
            }
            Self::ValueParse { table, column, row, value } => {
                write!(f, "{table}, row {row}, column '{column}': cannot parse '{value}'")
            }
            Self::Coercion { field, value, field_type } => {
                write!(f, "field '{field}': cannot store '{value}' as {field_type}")
            }
            Self::EmptySelection(field) => {
                write!(f, "selection list for '{field}' has no values")
            }
            Self::Geometry(msg) => write!(f, "geometry error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}
