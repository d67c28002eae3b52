//! Tri-state overlay-patch field presence (§3, §9).
//!
//! Overlay patches treat every field independently: a field **absent** from
//! the incoming JSON object leaves the stored value untouched, a field
//! **explicitly `null`** clears it, and a field with a **value** sets it.
//! `Option<Option<T>>` can express this but reads poorly at call sites and
//! its `Deserialize` impl can't tell "absent" from "null" on its own; `Patch<T>`
//! is a named wrapper with a hand-written `Deserialize` that relies on
//! `#[serde(default)]` on the field to supply [`Patch::Absent`] when the key
//! is missing, and otherwise deserializes the value as `Option<T>` (`null` ->
//! [`Patch::Null`], anything else -> [`Patch::Value`]).
//!
//! # Examples
//!
//! ```
//! use fleet_core::Patch;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct OverlayPatch {
//!     #[serde(default)]
//!     target_note: Patch<String>,
//! }
//!
//! let absent: OverlayPatch = serde_json::from_str("{}").unwrap();
//! assert!(absent.target_note.is_absent());
//!
//! let cleared: OverlayPatch = serde_json::from_str(r#"{"target_note": null}"#).unwrap();
//! assert!(cleared.target_note.is_null());
//!
//! let set: OverlayPatch = serde_json::from_str(r#"{"target_note": "hi"}"#).unwrap();
//! assert_eq!(set.target_note.into_value(), Some(Some("hi".to_string())));
//! ```

use schemars::JsonSchema;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Presence state of one patch field: absent (no-op), explicit null (clear),
/// or a concrete value (set).
///
/// On the wire this behaves exactly like `Option<T>` (the "absent" state has
/// no JSON representation of its own — it is the absence of the key), so the
/// [`schemars::JsonSchema`] impl below delegates to `Option<T>`'s schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    /// The field was not present in the incoming patch; leave unchanged.
    Absent,
    /// The field was present and explicitly `null`; clear the stored value.
    Null,
    /// The field was present with a concrete value; set it.
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<T> Patch<T> {
    /// True if the field was absent from the patch (no-op).
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    /// True if the field was explicitly set to `null` (clear).
    pub fn is_null(&self) -> bool {
        matches!(self, Patch::Null)
    }

    /// True if the field carries a concrete value.
    pub fn is_value(&self) -> bool {
        matches!(self, Patch::Value(_))
    }

    /// Convert to `Option<Option<T>>`: `None` for absent, `Some(None)` for
    /// null, `Some(Some(v))` for a value. Useful at store call sites that
    /// build a SQL `COALESCE`-style update.
    pub fn into_value(self) -> Option<Option<T>> {
        match self {
            Patch::Absent => None,
            Patch::Null => Some(None),
            Patch::Value(v) => Some(Some(v)),
        }
    }

    /// Apply this patch to an existing `Option<T>` field, returning the new
    /// value: absent leaves `current` untouched, null clears it, value
    /// replaces it.
    pub fn apply_to(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Absent => current,
            Patch::Null => None,
            Patch::Value(v) => Some(v),
        }
    }

    /// Map the contained value, preserving `Absent`/`Null`.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Absent => Patch::Absent,
            Patch::Null => Patch::Null,
            Patch::Value(v) => Patch::Value(f(v)),
        }
    }
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Reached only when the key is present (absent keys are supplied by
        // `#[serde(default)]` on the field and never call this impl).
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => Patch::Null,
            Some(v) => Patch::Value(v),
        })
    }
}

impl<T> JsonSchema for Patch<T>
where
    T: JsonSchema,
{
    fn schema_name() -> std::borrow::Cow<'static, str> {
        format!("Patch_{}", T::schema_name()).into()
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        Option::<T>::json_schema(generator)
    }
}

impl<T> Serialize for Patch<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Absent => serializer.serialize_none(),
            Patch::Null => serializer.serialize_none(),
            Patch::Value(v) => v.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct P {
        #[serde(default)]
        note: Patch<String>,
        #[serde(default)]
        priority: Patch<u8>,
    }

    #[test]
    fn absent_key_yields_absent() {
        let p: P = serde_json::from_str("{}").unwrap();
        assert!(p.note.is_absent());
        assert!(p.priority.is_absent());
    }

    #[test]
    fn explicit_null_yields_null() {
        let p: P = serde_json::from_str(r#"{"note": null}"#).unwrap();
        assert!(p.note.is_null());
    }

    #[test]
    fn value_yields_value() {
        let p: P = serde_json::from_str(r#"{"priority": 2}"#).unwrap();
        assert_eq!(p.priority, Patch::Value(2));
    }

    #[test]
    fn apply_to_absent_keeps_current() {
        let current = Some("old".to_string());
        assert_eq!(Patch::<String>::Absent.apply_to(current.clone()), current);
    }

    #[test]
    fn apply_to_null_clears() {
        assert_eq!(Patch::<String>::Null.apply_to(Some("old".into())), None);
    }

    #[test]
    fn apply_to_value_replaces() {
        assert_eq!(
            Patch::Value("new".to_string()).apply_to(Some("old".into())),
            Some("new".to_string())
        );
    }

    #[test]
    fn map_preserves_absent_and_null() {
        assert_eq!(Patch::<u8>::Absent.map(|v| v + 1), Patch::Absent);
        assert_eq!(Patch::<u8>::Null.map(|v| v + 1), Patch::Null);
        assert_eq!(Patch::Value(1u8).map(|v| v + 1), Patch::Value(2));
    }

    #[test]
    fn into_value_mapping() {
        assert_eq!(Patch::<u8>::Absent.into_value(), None);
        assert_eq!(Patch::<u8>::Null.into_value(), Some(None));
        assert_eq!(Patch::Value(5u8).into_value(), Some(Some(5)));
    }
}
