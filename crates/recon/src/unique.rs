//! Distinct values of one field.

use std::collections::BTreeSet;

use crate::value::FieldValue;

/// Row limit of the spreadsheet export the listing was sized for.
pub const ROW_LIMIT: usize = 1_048_575;

/// Distinct values, ascending, with null (if present) last.
pub fn unique_values<'a, I>(values: I) -> Vec<FieldValue>
where
    I: IntoIterator<Item = &'a FieldValue>,
{
    let set: BTreeSet<&FieldValue> = values.into_iter().collect();
    let (nulls, mut out): (Vec<&FieldValue>, Vec<&FieldValue>) = set.into_iter().partition(|v| v.is_null());
    out.extend(nulls);
    out.into_iter().cloned().collect()
}

/// Truncate to `limit` rows. Returns the warning to show when rows were cut.
pub fn cap_rows(values: &mut Vec<FieldValue>, limit: usize) -> Option<String> {
    if values.len() <= limit {
        return None;
    }
    let total = values.len();
    values.truncate(limit);
    Some(format!(
        "Unique values ({total}) exceed the row limit. Only the first {limit} values written"
    ))
}
