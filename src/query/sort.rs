use super::predicate::compare_values;
use crate::store::PersistedRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// One ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub field: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: true,
        }
    }

    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: false,
        }
    }
}

/// Sort in place. Nulls sort first ascending; ties fall back to the record id.
///
/// Values of different JSON kinds order by kind:
/// null < bool < number < string < array < object.
pub fn sort_records(records: &mut [PersistedRecord], sort: &[SortDescriptor]) {
    records.sort_by(|a, b| {
        for descriptor in sort {
            let left = a.field(&descriptor.field).unwrap_or(Value::Null);
            let right = b.field(&descriptor.field).unwrap_or(Value::Null);
            let ordering = total_order(&left, &right);
            let ordering = if descriptor.ascending {
                ordering
            } else {
                ordering.reverse()
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.id.cmp(&b.id)
    });
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn total_order(left: &Value, right: &Value) -> Ordering {
    kind_rank(left)
        .cmp(&kind_rank(right))
        .then_with(|| match (left, right) {
            (Value::Number(a), Value::Number(b)) => number_order(a, b),
            (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
                left.to_string().cmp(&right.to_string())
            }
            _ => compare_values(left, right).unwrap_or(Ordering::Equal),
        })
}

/// Float value first, then integers before floats, then the exact integer.
/// Integers past 2^53 that collapse to the same float stay ordered.
fn number_order(a: &Number, b: &Number) -> Ordering {
    let exact = |n: &Number| n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from));
    let (ea, eb) = (exact(a), exact(b));
    a.as_f64()
        .unwrap_or_default()
        .total_cmp(&b.as_f64().unwrap_or_default())
        .then_with(|| ea.is_none().cmp(&eb.is_none()))
        .then_with(|| ea.cmp(&eb))
}
