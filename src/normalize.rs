// ABOUTME: Cleans the decoded "object" column of an object query row
// ABOUTME: Flattens aggregate-in-aggregate arrays one level and drops LEFT JOIN null misses

use std::collections::HashSet;

use serde_json::Value;

/// Options for [`normalize_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    /// Also drop array entries structurally equal to an earlier entry.
    pub dedupe_arrays: bool,
}

/// Normalizes with default options (no structural de-duplication).
pub fn normalize(value: Value) -> Value {
    normalize_with(value, NormalizeOptions::default())
}

/// Mirrors what the object compiler can emit: a has-many nested in a
/// has-many aggregates arrays into an array, and a missed LEFT JOIN inside
/// an aggregate shows up as `null`. Arrays are flattened exactly one level
/// and nulls removed; objects are normalized per property; scalars pass
/// through.
pub fn normalize_with(value: Value, options: NormalizeOptions) -> Value {
    match value {
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            let mut seen = HashSet::new();
            for item in items {
                match normalize_with(item, options) {
                    Value::Array(nested) => {
                        for entry in nested {
                            push_entry(&mut out, &mut seen, entry, options);
                        }
                    }
                    other => push_entry(&mut out, &mut seen, other, options),
                }
            }
            Value::Array(out)
        }
        Value::Object(mut map) => {
            for value in map.values_mut() {
                *value = normalize_with(value.take(), options);
            }
            Value::Object(map)
        }
        scalar => scalar,
    }
}

fn push_entry(
    out: &mut Vec<Value>,
    seen: &mut HashSet<String>,
    entry: Value,
    options: NormalizeOptions,
) {
    if entry.is_null() {
        return;
    }
    if options.dedupe_arrays && !seen.insert(entry.to_string()) {
        return;
    }
    out.push(entry);
}
