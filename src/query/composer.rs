//! Soft-delete filter injection
//!
//! Every query issued through storage is wrapped here, so a soft-deleted
//! record can only be reached by id or through the reconciliation helpers.

use super::predicate::Predicate;
use crate::store::record::FIELD_SOFT_DELETED;

pub fn not_soft_deleted() -> Predicate {
    Predicate::eq(FIELD_SOFT_DELETED, false)
}

/// `AND(not soft deleted, predicate or TRUE)`
pub fn visible(predicate: Option<Predicate>) -> Predicate {
    Predicate::And(vec![not_soft_deleted(), predicate.unwrap_or(Predicate::True)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Fields, PersistedRecord};
    use proptest::prelude::*;
    use serde_json::json;

    fn record(id: &str, title: &str, soft_deleted: bool) -> PersistedRecord {
        let mut fields = Fields::new();
        fields.insert("title".to_string(), json!(title));
        let mut record = PersistedRecord::new("task", id, fields);
        record.soft_deleted = soft_deleted;
        record
    }

    #[test]
    fn test_visible_without_predicate() {
        let composed = visible(None);
        assert!(composed.evaluate(&record("1", "a", false)).unwrap());
        assert!(!composed.evaluate(&record("1", "a", true)).unwrap());
    }

    #[test]
    fn test_visible_cannot_be_overridden() {
        let composed = visible(Some(Predicate::eq("soft_deleted", true)));
        assert!(!composed.evaluate(&record("1", "a", true)).unwrap());
        assert!(!composed.evaluate(&record("1", "a", false)).unwrap());
    }

    fn arb_predicate() -> impl Strategy<Value = Predicate> {
        let leaf = prop_oneof![
            Just(Predicate::True),
            "[a-c]".prop_map(|t| Predicate::eq("title", t)),
            "[a-c]".prop_map(|t| Predicate::ne("title", t)),
            "[a-c]%".prop_map(|p| Predicate::like("title", &p)),
            any::<bool>().prop_map(|b| Predicate::eq("soft_deleted", b)),
            Just(Predicate::is_null("missing")),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Predicate::And),
                prop::collection::vec(inner.clone(), 0..4).prop_map(Predicate::Or),
                inner.prop_map(Predicate::not),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_soft_deleted_never_visible(predicate in arb_predicate(), title in "[a-c]") {
            let hidden = record("1", &title, true);
            prop_assert!(!visible(Some(predicate)).evaluate(&hidden).unwrap());
        }

        #[test]
        fn prop_live_records_follow_caller_predicate(predicate in arb_predicate(), title in "[a-c]") {
            let live = record("1", &title, false);
            let expected = predicate.evaluate(&live).unwrap();
            prop_assert_eq!(visible(Some(predicate)).evaluate(&live).unwrap(), expected);
        }
    }
}
