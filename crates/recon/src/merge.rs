//! Key-based merge of source values into target records.
//!
//! The merge never touches the store; it returns the write commands that
//! would realize it. Callers apply them with [`crate::store::apply_writes`].

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::error::ReconError;
use crate::lookup::Lookup;
use crate::model::{
    Change, FieldPlan, MergeReport, OverwritePolicy, RecordFailure, SourceMapping, WriteCommand,
};
use crate::plan::check_ambiguous;
use crate::store::AttributeStore;
use crate::value::{FieldType, FieldValue};

/// One planned field after resolving it against the store and source.
struct ActiveField {
    target: String,
    target_type: FieldType,
    source_idx: usize,
    exists: bool,
}

/// Compute the writes that merge `source` into `store` under `policy`.
///
/// `target_key` is the store field matched against the source key. Fatal
/// plan problems (ambiguous mapping, unknown fields) fail before anything is
/// planned; per-record problems are collected in the report.
pub fn merge<S: AttributeStore + ?Sized>(
    store: &S,
    source: &SourceMapping,
    plan: &[FieldPlan],
    target_key: &str,
    policy: OverwritePolicy,
) -> Result<MergeReport, ReconError> {
    let plan = check_ambiguous(plan)?;
    let catalog = store.catalog();

    let key_type = catalog
        .field_type(target_key)
        .ok_or_else(|| ReconError::UnknownField {
            table: "target".into(),
            field: target_key.to_string(),
        })?;

    let mut report = MergeReport {
        policy,
        ..MergeReport::default()
    };

    let mut active = Vec::with_capacity(plan.len());
    for entry in &plan {
        let source_idx = source.field_index(&entry.source).ok_or_else(|| ReconError::UnknownField {
            table: "source".into(),
            field: entry.source.clone(),
        })?;
        match catalog.get(&entry.target) {
            Some(spec) if !spec.editable => {
                debug!(field = %entry.target, "skipping read-only field");
                report.read_only_skipped.push(entry.target.clone());
            }
            Some(spec) => active.push(ActiveField {
                target: entry.target.clone(),
                target_type: spec.field_type,
                source_idx,
                exists: true,
            }),
            None => {
                let field_type = source.field_types.get(source_idx).copied().unwrap_or(FieldType::String);
                report.commands.push(WriteCommand::AddField {
                    field: entry.target.clone(),
                    field_type,
                });
                report.added_fields.push(entry.target.clone());
                active.push(ActiveField {
                    target: entry.target.clone(),
                    target_type: field_type,
                    source_idx,
                    exists: false,
                });
            }
        }
    }

    let lookup = Lookup::build(source, Some(key_type));

    for id in store.record_ids() {
        report.records_scanned += 1;

        let key = match store.read(&id, target_key) {
            Ok(k) => k,
            Err(e) => {
                report.failures.push(RecordFailure {
                    record: id.clone(),
                    field: Some(target_key.to_string()),
                    message: e.to_string(),
                });
                continue;
            }
        };

        let row = if policy == OverwritePolicy::ClearAll {
            None
        } else {
            match lookup.get(&key) {
                Some(row) => Some(row),
                None => {
                    report.keys_not_found += 1;
                    continue;
                }
            }
        };

        for field in &active {
            let old = if field.exists {
                match store.read(&id, &field.target) {
                    Ok(v) => v,
                    Err(e) => {
                        report.failures.push(RecordFailure {
                            record: id.clone(),
                            field: Some(field.target.clone()),
                            message: e.to_string(),
                        });
                        continue;
                    }
                }
            } else {
                FieldValue::Null
            };

            let new = match row {
                None => FieldValue::Null,
                Some(values) => {
                    if policy == OverwritePolicy::FillOnly && !old.is_blank() {
                        continue;
                    }
                    let raw = &values[field.source_idx];
                    match raw.coerce_to(field.target_type) {
                        Some(v) => v,
                        None => {
                            let err = ReconError::Coercion {
                                field: field.target.clone(),
                                value: raw.render(),
                                field_type: field.target_type.to_string(),
                            };
                            report.failures.push(RecordFailure {
                                record: id.clone(),
                                field: Some(field.target.clone()),
                                message: err.to_string(),
                            });
                            continue;
                        }
                    }
                }
            };

            if new == old {
                continue;
            }

            debug!(record = %id, key = %key, field = %field.target, old = %old, new = %new, "value change");
            report.commands.push(WriteCommand::SetValue {
                record: id.clone(),
                field: field.target.clone(),
                value: new.clone(),
            });
            report.changes.push(Change {
                record: id.clone(),
                key: key.clone(),
                field: field.target.clone(),
                old,
                new,
            });
        }
    }

    report.fields_touched = report
        .changes
        .iter()
        .map(|c| c.field.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    info!(
        policy = %policy,
        scanned = report.records_scanned,
        changes = report.changes.len(),
        keys_not_found = report.keys_not_found,
        failures = report.failures.len(),
        "merge planned"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldCatalog, FieldSpec, RecordId, SourceRow};
    use crate::store::{apply_writes, MemoryStore};
    use std::collections::HashMap;

    fn target() -> MemoryStore {
        let catalog = FieldCatalog::new(vec![
            FieldSpec::new("OBJECTID", FieldType::Oid).read_only(),
            FieldSpec::new("PIN", FieldType::String),
            FieldSpec::new("Owner", FieldType::String),
            FieldSpec::new("Acres", FieldType::Double),
        ]);
        let mut store = MemoryStore::new("parcels", catalog);
        let rows = [
            ("1", "A-1", FieldValue::text("Smith"), FieldValue::real(1.5)),
            ("2", "A-2", FieldValue::Null, FieldValue::Null),
            ("3", "A-3", FieldValue::text("  "), FieldValue::real(4.0)),
            ("4", "Z-9", FieldValue::text("Keep"), FieldValue::Null),
        ];
        for (oid, pin, owner, acres) in rows {
            let mut values = HashMap::new();
            values.insert("OBJECTID".to_string(), FieldValue::Integer(oid.parse().unwrap()));
            values.insert("PIN".to_string(), FieldValue::text(pin));
            values.insert("Owner".to_string(), owner);
            values.insert("Acres".to_string(), acres);
            store.insert(RecordId::from(oid), values);
        }
        store
    }

    fn source() -> SourceMapping {
        let rows = [
            ("A-1", "Jones", 2.0),
            ("A-2", "Lee", 3.0),
            ("A-3", "Park", 4.0),
            ("A-2", "Lee-Final", 3.25),
        ];
        SourceMapping {
            key_field: "ParcelPIN".into(),
            key_type: FieldType::String,
            fields: vec!["OwnerName".into(), "Area".into()],
            field_types: vec![FieldType::String, FieldType::Double],
            rows: rows
                .iter()
                .map(|(k, o, a)| SourceRow {
                    key: FieldValue::text(*k),
                    values: vec![FieldValue::text(*o), FieldValue::real(*a)],
                })
                .collect(),
        }
    }

    fn plan() -> Vec<FieldPlan> {
        vec![
            FieldPlan::new("OwnerName", "Owner").existing(),
            FieldPlan::new("Area", "Acres").existing(),
        ]
    }

    #[test]
    fn overwrite_replaces_matched_keys_last_wins() {
        let store = target();
        let report = merge(&store, &source(), &plan(), "PIN", OverwritePolicy::Overwrite).unwrap();

        assert_eq!(report.records_scanned, 4);
        assert_eq!(report.keys_not_found, 1);
        // record 3 Acres already 4.0 → no-op write suppressed
        assert_eq!(report.changes.len(), 5);
        assert_eq!(report.fields_touched, 2);
        let owner2 = report
            .changes
            .iter()
            .find(|c| c.record == RecordId::from("2") && c.field == "Owner")
            .unwrap();
        assert_eq!(owner2.new, FieldValue::text("Lee-Final"));
        assert_eq!(owner2.old, FieldValue::Null);
        assert!(report.changes.iter().all(|c| c.record != RecordId::from("4")));
    }

    #[test]
    fn fill_only_touches_blank_values_only() {
        let store = target();
        let report = merge(&store, &source(), &plan(), "PIN", OverwritePolicy::FillOnly).unwrap();
        let touched: Vec<(String, String)> = report
            .changes
            .iter()
            .map(|c| (c.record.0.clone(), c.field.clone()))
            .collect();
        assert_eq!(
            touched,
            vec![
                ("2".to_string(), "Owner".to_string()),
                ("2".to_string(), "Acres".to_string()),
                ("3".to_string(), "Owner".to_string()),
            ]
        );
    }

    #[test]
    fn clear_all_ignores_source() {
        let store = target();
        let report = merge(&store, &source(), &plan(), "PIN", OverwritePolicy::ClearAll).unwrap();
        assert_eq!(report.keys_not_found, 0);
        assert!(report.changes.iter().all(|c| c.new.is_null()));
        // 1: Owner+Acres, 2: nothing, 3: Owner("  ")+Acres, 4: Owner
        assert_eq!(report.changes.len(), 5);
    }

    #[test]
    fn second_run_is_a_no_op() {
        for policy in [OverwritePolicy::Overwrite, OverwritePolicy::FillOnly, OverwritePolicy::ClearAll] {
            let mut store = target();
            let first = merge(&store, &source(), &plan(), "PIN", policy).unwrap();
            let applied = apply_writes(&mut store, &first.commands);
            assert!(applied.failures.is_empty());
            let second = merge(&store, &source(), &plan(), "PIN", policy).unwrap();
            assert_eq!(second.changes.len(), 0, "policy {policy}");
            assert!(second.commands.is_empty());
        }
    }

    #[test]
    fn new_fields_are_added_then_filled() {
        let mut store = target();
        let plan = vec![FieldPlan::new("OwnerName", "PrevOwner")];
        let report = merge(&store, &source(), &plan, "PIN", OverwritePolicy::Overwrite).unwrap();
        assert_eq!(report.added_fields, vec!["PrevOwner"]);
        assert!(matches!(report.commands[0], WriteCommand::AddField { .. }));
        apply_writes(&mut store, &report.commands);
        assert_eq!(store.read(&"1".into(), "PrevOwner").unwrap(), FieldValue::text("Jones"));
        assert_eq!(store.read(&"4".into(), "PrevOwner").unwrap(), FieldValue::Null);
    }

    #[test]
    fn read_only_targets_skipped_and_reported() {
        let store = target();
        let plan = vec![
            FieldPlan::new("Area", "OBJECTID").existing(),
            FieldPlan::new("OwnerName", "Owner").existing(),
        ];
        let report = merge(&store, &source(), &plan, "PIN", OverwritePolicy::Overwrite).unwrap();
        assert_eq!(report.read_only_skipped, vec!["OBJECTID"]);
        assert!(report.changes.iter().all(|c| c.field == "Owner"));
    }

    #[test]
    fn coercion_failures_skip_only_that_field() {
        let store = target();
        let plan = vec![
            FieldPlan::new("OwnerName", "Acres").existing(),
        ];
        let report = merge(&store, &source(), &plan, "PIN", OverwritePolicy::Overwrite).unwrap();
        assert_eq!(report.failures.len(), 3);
        assert!(report.changes.is_empty());
    }

    #[test]
    fn ambiguous_plan_fails_before_planning() {
        let store = target();
        let plan = vec![FieldPlan::new("OwnerName", "Owner"), FieldPlan::new("Area", "Owner")];
        let err = merge(&store, &source(), &plan, "PIN", OverwritePolicy::Overwrite).unwrap_err();
        assert!(matches!(err, ReconError::AmbiguousField { .. }));
    }

    #[test]
    fn unknown_key_field_is_fatal() {
        let store = target();
        let err = merge(&store, &source(), &plan(), "Parcel", OverwritePolicy::Overwrite).unwrap_err();
        assert!(matches!(err, ReconError::UnknownField { .. }));
    }
}
