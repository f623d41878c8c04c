use super::pattern::like_match;
use crate::core::Result;
use crate::store::PersistedRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Filter expression over persisted records.
///
/// Field names address domain fields; `id`, `synced`, `soft_deleted` and
/// `date_updated` address the bookkeeping columns. A missing field reads as
/// `null`, and ordering comparisons against `null` are false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    True,
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
    Like {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.to_string(), value.into())
    }

    pub fn ne(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Ne(field.to_string(), value.into())
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Lt(field.to_string(), value.into())
    }

    pub fn le(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Le(field.to_string(), value.into())
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Gt(field.to_string(), value.into())
    }

    pub fn ge(field: &str, value: impl Into<Value>) -> Self {
        Predicate::Ge(field.to_string(), value.into())
    }

    pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In(field.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(field: &str) -> Self {
        Predicate::IsNull(field.to_string())
    }

    pub fn like(field: &str, pattern: &str) -> Self {
        Predicate::Like {
            field: field.to_string(),
            pattern: pattern.to_string(),
            case_insensitive: false,
        }
    }

    pub fn ilike(field: &str, pattern: &str) -> Self {
        Predicate::Like {
            field: field.to_string(),
            pattern: pattern.to_string(),
            case_insensitive: true,
        }
    }

    /// Conjunction, flattening nested `And`s
    pub fn and(self, other: Predicate) -> Self {
        let mut terms = match self {
            Predicate::And(terms) => terms,
            single => vec![single],
        };
        match other {
            Predicate::And(more) => terms.extend(more),
            single => terms.push(single),
        }
        Predicate::And(terms)
    }

    /// Disjunction, flattening nested `Or`s
    pub fn or(self, other: Predicate) -> Self {
        let mut terms = match self {
            Predicate::Or(terms) => terms,
            single => vec![single],
        };
        match other {
            Predicate::Or(more) => terms.extend(more),
            single => terms.push(single),
        }
        Predicate::Or(terms)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn evaluate(&self, record: &PersistedRecord) -> Result<bool> {
        let read = |field: &str| record.field(field).unwrap_or(Value::Null);

        Ok(match self {
            Predicate::True => true,
            Predicate::Eq(field, expected) => values_equal(&read(field), expected),
            Predicate::Ne(field, expected) => !values_equal(&read(field), expected),
            Predicate::Lt(field, expected) => {
                compare_values(&read(field), expected) == Some(Ordering::Less)
            }
            Predicate::Le(field, expected) => matches!(
                compare_values(&read(field), expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Predicate::Gt(field, expected) => {
                compare_values(&read(field), expected) == Some(Ordering::Greater)
            }
            Predicate::Ge(field, expected) => matches!(
                compare_values(&read(field), expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::In(field, candidates) => {
                let actual = read(field);
                candidates.iter().any(|candidate| values_equal(&actual, candidate))
            }
            Predicate::IsNull(field) => read(field).is_null(),
            Predicate::Like {
                field,
                pattern,
                case_insensitive,
            } => match read(field) {
                Value::String(text) => like_match(&text, pattern, *case_insensitive)?,
                _ => false,
            },
            Predicate::And(terms) => {
                for term in terms {
                    if !term.evaluate(record)? {
                        return Ok(false);
                    }
                }
                true
            }
            Predicate::Or(terms) => {
                for term in terms {
                    if term.evaluate(record)? {
                        return Ok(true);
                    }
                }
                false
            }
            Predicate::Not(inner) => !inner.evaluate(record)?,
        })
    }
}

/// Ordering between two scalar JSON values of the same kind.
///
/// Integers compare exactly, mixed numbers as `f64`. Anything else
/// (null, arrays, objects, mismatched kinds) is unordered.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

pub fn values_equal(left: &Value, right: &Value) -> bool {
    compare_values(left, right) == Some(Ordering::Equal) || left == right
}
