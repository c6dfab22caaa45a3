//! Field plans: which source field feeds which target field.

use std::collections::BTreeMap;

use crate::error::ReconError;
use crate::model::{FieldCatalog, FieldPlan, FieldSpec};

/// Fields offered as keys or transfer fields: no geometry/blob columns and
/// no derived shape measures.
pub fn candidate_fields(catalog: &FieldCatalog) -> Vec<&FieldSpec> {
    catalog
        .fields
        .iter()
        .filter(|f| f.field_type.is_transferable())
        .filter(|f| {
            let lower = f.name.to_lowercase();
            lower != "shape_area" && lower != "shape_length"
        })
        .collect()
}

/// Make a name safe to use as a new field name.
///
/// Characters outside `[A-Za-z0-9_]` become `_`; a leading digit (or an
/// empty name) gets a `T` prefix.
pub fn validate_field_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'T');
    }
    out
}

/// Every candidate source field except the key and OID, mapped onto a
/// validated target name of the same spelling.
pub fn default_plan(
    source: &FieldCatalog,
    source_key: &str,
    oid_field: Option<&str>,
    target: &FieldCatalog,
) -> Vec<FieldPlan> {
    let mut plan: Vec<FieldPlan> = candidate_fields(source)
        .into_iter()
        .filter(|f| f.name != source_key && Some(f.name.as_str()) != oid_field)
        .map(|f| FieldPlan::new(f.name.clone(), validate_field_name(&f.name)))
        .collect();
    mark_existing(&mut plan, target);
    plan
}

/// Set `exists_in_target` from the target catalog.
pub fn mark_existing(plan: &mut [FieldPlan], target: &FieldCatalog) {
    for entry in plan.iter_mut() {
        entry.exists_in_target = target.contains(&entry.target);
    }
}

/// Split into (fields to overwrite in place, fields to add).
pub fn partition(plan: &[FieldPlan]) -> (Vec<&FieldPlan>, Vec<&FieldPlan>) {
    plan.iter().partition(|p| p.exists_in_target)
}

/// Reject a plan that maps two different source fields onto one target.
///
/// Exact duplicate entries are tolerated here and dropped from the returned
/// plan; duplicate target names are still reported by validation.
pub fn check_ambiguous(plan: &[FieldPlan]) -> Result<Vec<FieldPlan>, ReconError> {
    let mut by_target: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut unique = Vec::with_capacity(plan.len());
    for entry in plan {
        let sources = by_target.entry(entry.target.as_str()).or_default();
        if !sources.contains(&entry.source.as_str()) {
            sources.push(entry.source.as_str());
            unique.push(entry.clone());
        }
    }
    if let Some((target, sources)) = by_target.into_iter().find(|(_, s)| s.len() > 1) {
        return Err(ReconError::AmbiguousField {
            target: target.to_string(),
            sources: sources.into_iter().map(|s| s.to_string()).collect(),
        });
    }
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldType;

    fn catalog(fields: &[(&str, FieldType)]) -> FieldCatalog {
        FieldCatalog::new(fields.iter().map(|(n, t)| FieldSpec::new(*n, *t)).collect())
    }

    #[test]
    fn candidates_skip_geometry_and_shape_measures() {
        let cat = catalog(&[
            ("OBJECTID", FieldType::Oid),
            ("Shape", FieldType::Geometry),
            ("Shape_Area", FieldType::Double),
            ("SHAPE_Length", FieldType::Double),
            ("Owner", FieldType::String),
            ("Photo", FieldType::Blob),
        ]);
        let names: Vec<&str> = candidate_fields(&cat).iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["OBJECTID", "Owner"]);
    }

    #[test]
    fn field_names_are_sanitized() {
        assert_eq!(validate_field_name("Zone Code"), "Zone_Code");
        assert_eq!(validate_field_name("2020 pop"), "T2020_pop");
        assert_eq!(validate_field_name("ok_name"), "ok_name");
        assert_eq!(validate_field_name(""), "T");
    }

    #[test]
    fn default_plan_excludes_key_and_oid() {
        let source = catalog(&[
            ("OBJECTID", FieldType::Oid),
            ("ParcelID", FieldType::String),
            ("Owner", FieldType::String),
            ("Land Use", FieldType::String),
        ]);
        let target = catalog(&[("PIN", FieldType::String), ("Owner", FieldType::String)]);
        let plan = default_plan(&source, "ParcelID", Some("OBJECTID"), &target);
        assert_eq!(
            plan,
            vec![
                FieldPlan::new("Owner", "Owner").existing(),
                FieldPlan::new("Land Use", "Land_Use"),
            ]
        );
        let (existing, new) = partition(&plan);
        assert_eq!(existing.len(), 1);
        assert_eq!(new[0].target, "Land_Use");
    }

    #[test]
    fn ambiguous_target_rejected() {
        let plan = vec![FieldPlan::new("A", "X"), FieldPlan::new("B", "X")];
        let err = check_ambiguous(&plan).unwrap_err();
        assert_eq!(
            err,
            ReconError::AmbiguousField { target: "X".into(), sources: vec!["A".into(), "B".into()] }
        );
    }

    #[test]
    fn exact_duplicates_collapse() {
        let plan = vec![FieldPlan::new("A", "X"), FieldPlan::new("A", "X")];
        assert_eq!(check_ambiguous(&plan).unwrap().len(), 1);
    }
}
