//! Field-level diffing between a before/after overlay snapshot, used to
//! compute the inverse half of a receipt when only the "after" state is
//! known at the call site (e.g. `setOfficerOverlay`/`setShipOverlay`, §4.2).

use std::collections::BTreeMap;

/// One field's before/after values, where `before` is `None` if the field
/// was absent (not merely null) prior to the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    /// Field name.
    pub field: String,
    /// Value before the change, if the field was present at all.
    pub before: Option<serde_json::Value>,
    /// Value after the change.
    pub after: serde_json::Value,
}

/// Diff two flat JSON objects field by field, returning only the fields
/// that actually changed. Both `before` and `after` are expected to be
/// JSON objects; any other shape yields an empty diff.
///
/// This only compares fields present in `after` (the shape of a patch
/// request) against their prior value in `before`, since overlay patches
/// describe the fields being written, not the full object.
pub fn diff_overlay_fields(
    before: &serde_json::Value,
    after: &serde_json::Value,
) -> Vec<FieldDiff> {
    let (Some(before_obj), Some(after_obj)) = (before.as_object(), after.as_object()) else {
        return Vec::new();
    };

    let before_map: BTreeMap<_, _> = before_obj.iter().collect();

    after_obj
        .iter()
        .filter_map(|(field, after_value)| {
            let before_value = before_map.get(field).copied();
            if before_value == Some(after_value) {
                None
            } else {
                Some(FieldDiff {
                    field: field.clone(),
                    before: before_value.cloned(),
                    after: after_value.clone(),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unchanged_fields_are_excluded() {
        let before = json!({"rank": 2, "notes": "ok"});
        let after = json!({"rank": 2});
        assert!(diff_overlay_fields(&before, &after).is_empty());
    }

    #[test]
    fn changed_field_is_reported_with_prior_value() {
        let before = json!({"rank": 2});
        let after = json!({"rank": 5});
        let diffs = diff_overlay_fields(&before, &after);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].field, "rank");
        assert_eq!(diffs[0].before, Some(json!(2)));
        assert_eq!(diffs[0].after, json!(5));
    }

    #[test]
    fn newly_present_field_has_no_before() {
        let before = json!({});
        let after = json!({"notes": "new"});
        let diffs = diff_overlay_fields(&before, &after);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].before, None);
    }

    #[test]
    fn non_object_inputs_yield_empty_diff() {
        assert!(diff_overlay_fields(&json!("x"), &json!({"a": 1})).is_empty());
    }
}
