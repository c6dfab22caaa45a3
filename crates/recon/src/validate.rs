//! Pre-flight checks for a merge. Pure: reads catalogs and source rows,
//! never the store's values.

use std::collections::HashSet;

use serde::Serialize;

use crate::lookup::duplicate_keys;
use crate::model::{FieldCatalog, FieldPlan, SourceMapping};
use crate::value::FieldType;

/// One validation message, optionally pinned to the field it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Issue {
    pub(crate) fn on(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    pub(crate) fn general(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn error(&mut self, issue: Issue) {
        self.errors.push(issue);
    }

    pub(crate) fn warn(&mut self, issue: Issue) {
        self.warnings.push(issue);
    }
}

/// Everything a merge validation looks at.
#[derive(Debug, Clone, Copy)]
pub struct MergeCheck<'a> {
    pub plan: &'a [FieldPlan],
    pub target: &'a FieldCatalog,
    pub target_key: &'a str,
    pub source: &'a FieldCatalog,
    pub source_key: &'a str,
    /// Source rows, when loaded, for the duplicate key check.
    pub source_rows: Option<&'a SourceMapping>,
}

/// Run every check and accumulate the results.
pub fn validate(check: &MergeCheck<'_>) -> ValidationResult {
    let mut result = ValidationResult::default();

    check_referenced_fields(check, &mut result);
    check_keys(check, &mut result);
    check_existing_targets(check, &mut result);
    check_types(check, &mut result);

    let mut seen = HashSet::new();
    if !check.plan.iter().all(|p| seen.insert(p.target.as_str())) {
        result.error(Issue::general("Target Field names must be unique"));
    }

    result
}

fn check_referenced_fields(check: &MergeCheck<'_>, result: &mut ValidationResult) {
    if !check.target.contains(check.target_key) {
        result.error(Issue::on(
            check.target_key,
            format!("Key field '{}' not found in target.", check.target_key),
        ));
    }
    if !check.source.contains(check.source_key) {
        result.error(Issue::on(
            check.source_key,
            format!("Key field '{}' not found in source.", check.source_key),
        ));
    }
    for entry in check.plan {
        if !check.source.contains(&entry.source) {
            result.error(Issue::on(
                &entry.source,
                format!("Field '{}' not found in source.", entry.source),
            ));
        }
    }
}

fn check_keys(check: &MergeCheck<'_>, result: &mut ValidationResult) {
    if let Some(rows) = check.source_rows {
        if !duplicate_keys(rows).is_empty() {
            result.warn(Issue::on(
                check.source_key,
                "Duplicate values found in Key field. Last instance will be used.",
            ));
        }
    }

    if let (Some(t), Some(s)) = (
        check.target.field_type(check.target_key),
        check.source.field_type(check.source_key),
    ) {
        if t != s {
            result.warn(Issue::on(
                check.source_key,
                "Field types for Input and Join keys do not match. Tool may not work.",
            ));
        }
    }

    for entry in check.plan {
        if entry.source == check.source_key {
            key_equals_return(&entry.source, result);
        }
        if entry.target == check.target_key {
            key_equals_return(&entry.target, result);
        }
    }
}

fn key_equals_return(field: &str, result: &mut ValidationResult) {
    result.error(Issue::on(field, "Key and Return fields cannot be identical"));
}

fn check_existing_targets(check: &MergeCheck<'_>, result: &mut ValidationResult) {
    let mut any_existing = false;
    for entry in check.plan {
        let Some(spec) = check.target.get(&entry.target) else {
            continue;
        };
        any_existing = true;
        result.warn(Issue::on(
            &entry.target,
            format!("Field '{}' already exists.", entry.target),
        ));
        if !spec.editable {
            result.error(Issue::on(
                &entry.target,
                format!("Field '{}' is not editable.", entry.target),
            ));
        }
    }
    if any_existing {
        result.warn(Issue::general("Specify desired overwrite behavior."));
    }
}

/// Outcome of pairing a target field type with a source field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFit {
    Ok,
    /// Values will be coerced; some may not survive.
    Coerced,
    /// Values of the source type cannot be stored in the target.
    Incompatible,
}

/// Compatibility of writing `source` values into a `target` field.
pub fn type_fit(target: FieldType, source: FieldType) -> TypeFit {
    match target {
        FieldType::Date if source == FieldType::Date => TypeFit::Ok,
        FieldType::Date => TypeFit::Incompatible,
        FieldType::Integer | FieldType::SmallInteger if source.is_integer() => TypeFit::Ok,
        FieldType::Integer | FieldType::SmallInteger if source.is_real() => TypeFit::Coerced,
        FieldType::Integer | FieldType::SmallInteger => TypeFit::Incompatible,
        FieldType::String if source == FieldType::String => TypeFit::Ok,
        FieldType::String => TypeFit::Coerced,
        FieldType::Single | FieldType::Double if source.is_numeric() => TypeFit::Ok,
        FieldType::Single | FieldType::Double => TypeFit::Coerced,
        _ => TypeFit::Ok,
    }
}

fn check_types(check: &MergeCheck<'_>, result: &mut ValidationResult) {
    for entry in check.plan {
        let (Some(t), Some(s)) = (
            check.target.field_type(&entry.target),
            check.source.field_type(&entry.source),
        ) else {
            continue;
        };
        match type_fit(t, s) {
            TypeFit::Ok => {}
            TypeFit::Coerced if t == FieldType::String => result.warn(Issue::on(
                &entry.target,
                format!(
                    "Field [{}] input type ({t}) does not match join type ({s}) and will be coerced.",
                    entry.target
                ),
            )),
            TypeFit::Coerced if t.is_real() => result.warn(Issue::on(
                &entry.target,
                format!("Field [{}] input type ({t}) will not match join type ({s})", entry.target),
            )),
            TypeFit::Coerced => result.warn(Issue::on(
                &entry.target,
                format!(
                    "Field [{}] input type ({t}) does not match join type ({s}) and may be coerced.",
                    entry.target
                ),
            )),
            TypeFit::Incompatible => result.error(Issue::on(
                &entry.target,
                format!("Field [{}] input type ({t}) will not match join type ({s}).", entry.target),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSpec, SourceRow};
    use crate::value::FieldValue;

    fn target() -> FieldCatalog {
        FieldCatalog::new(vec![
            FieldSpec::new("OBJECTID", FieldType::Oid).read_only(),
            FieldSpec::new("PIN", FieldType::String),
            FieldSpec::new("Zone", FieldType::Integer),
            FieldSpec::new("Owner", FieldType::String),
            FieldSpec::new("Surveyed", FieldType::Date),
        ])
    }

    fn source() -> FieldCatalog {
        FieldCatalog::new(vec![
            FieldSpec::new("PIN", FieldType::String),
            FieldSpec::new("ZoneCode", FieldType::Double),
            FieldSpec::new("OwnerName", FieldType::String),
            FieldSpec::new("Acres", FieldType::Double),
            FieldSpec::new("Note", FieldType::String),
        ])
    }

    fn check<'a>(plan: &'a [FieldPlan], t: &'a FieldCatalog, s: &'a FieldCatalog) -> MergeCheck<'a> {
        MergeCheck {
            plan,
            target: t,
            target_key: "PIN",
            source: s,
            source_key: "PIN",
            source_rows: None,
        }
    }

    fn messages(issues: &[Issue]) -> Vec<&str> {
        issues.iter().map(|i| i.message.as_str()).collect()
    }

    #[test]
    fn clean_plan_passes_with_existing_field_warning() {
        let (t, s) = (target(), source());
        let plan = vec![FieldPlan::new("OwnerName", "Owner"), FieldPlan::new("Acres", "Acres")];
        let result = validate(&check(&plan, &t, &s));
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(
            messages(&result.warnings),
            vec!["Field 'Owner' already exists.", "Specify desired overwrite behavior."]
        );
    }

    #[test]
    fn duplicate_targets_are_an_error() {
        let (t, s) = (target(), source());
        let plan = vec![FieldPlan::new("OwnerName", "X"), FieldPlan::new("Note", "X")];
        let result = validate(&check(&plan, &t, &s));
        assert_eq!(messages(&result.errors), vec!["Target Field names must be unique"]);
    }

    #[test]
    fn read_only_target_is_an_error() {
        let (t, s) = (target(), source());
        let plan = vec![FieldPlan::new("Acres", "OBJECTID")];
        let result = validate(&check(&plan, &t, &s));
        assert!(messages(&result.errors).contains(&"Field 'OBJECTID' is not editable."));
    }

    #[test]
    fn real_into_integer_warns_text_into_date_fails() {
        let (t, s) = (target(), source());
        let plan = vec![FieldPlan::new("ZoneCode", "Zone"), FieldPlan::new("Note", "Surveyed")];
        let result = validate(&check(&plan, &t, &s));
        assert_eq!(
            messages(&result.errors),
            vec!["Field [Surveyed] input type (Date) will not match join type (String)."]
        );
        assert!(messages(&result.warnings)
            .contains(&"Field [Zone] input type (Integer) does not match join type (Double) and may be coerced."));
    }

    #[test]
    fn type_matrix() {
        use FieldType::*;
        assert_eq!(type_fit(Date, Date), TypeFit::Ok);
        assert_eq!(type_fit(Date, String), TypeFit::Incompatible);
        assert_eq!(type_fit(SmallInteger, Integer), TypeFit::Ok);
        assert_eq!(type_fit(Integer, Single), TypeFit::Coerced);
        assert_eq!(type_fit(Integer, String), TypeFit::Incompatible);
        assert_eq!(type_fit(String, String), TypeFit::Ok);
        assert_eq!(type_fit(String, Double), TypeFit::Coerced);
        assert_eq!(type_fit(Double, SmallInteger), TypeFit::Ok);
        assert_eq!(type_fit(Single, Date), TypeFit::Coerced);
    }

    #[test]
    fn key_mismatch_and_duplicates_warn() {
        let t = target();
        let s = FieldCatalog::new(vec![
            FieldSpec::new("PIN", FieldType::Integer),
            FieldSpec::new("Note", FieldType::String),
        ]);
        let rows = SourceMapping {
            key_field: "PIN".into(),
            key_type: FieldType::Integer,
            fields: vec!["Note".into()],
            field_types: vec![FieldType::String],
            rows: vec![
                SourceRow { key: FieldValue::Integer(1), values: vec![FieldValue::text("a")] },
                SourceRow { key: FieldValue::Integer(1), values: vec![FieldValue::text("b")] },
            ],
        };
        let plan = vec![FieldPlan::new("Note", "Note")];
        let mut c = check(&plan, &t, &s);
        c.source_rows = Some(&rows);
        let result = validate(&c);
        assert!(result.is_ok());
        assert_eq!(
            messages(&result.warnings),
            vec![
                "Duplicate values found in Key field. Last instance will be used.",
                "Field types for Input and Join keys do not match. Tool may not work.",
            ]
        );
    }

    #[test]
    fn key_as_return_field_is_an_error_on_both() {
        let (t, s) = (target(), source());
        let plan = vec![FieldPlan::new("PIN", "PIN")];
        let result = validate(&check(&plan, &t, &s));
        let key_errors: Vec<&Issue> = result
            .errors
            .iter()
            .filter(|i| i.message == "Key and Return fields cannot be identical")
            .collect();
        // one for the source side, one for the target side
        assert_eq!(key_errors.len(), 2);
        assert!(key_errors.iter().all(|i| i.field.as_deref() == Some("PIN")));
    }

    #[test]
    fn key_as_return_on_one_side_is_one_error() {
        let (t, s) = (target(), source());
        let plan = vec![FieldPlan::new("PIN", "Owner")];
        let result = validate(&check(&plan, &t, &s));
        let key_errors = result
            .errors
            .iter()
            .filter(|i| i.message == "Key and Return fields cannot be identical")
            .count();
        assert_eq!(key_errors, 1);
    }

    #[test]
    fn missing_fields_are_errors() {
        let (t, s) = (target(), source());
        let plan = vec![FieldPlan::new("Nope", "Owner")];
        let mut c = check(&plan, &t, &s);
        c.target_key = "ParcelKey";
        let result = validate(&c);
        assert_eq!(
            messages(&result.errors),
            vec!["Key field 'ParcelKey' not found in target.", "Field 'Nope' not found in source."]
        );
    }
}
