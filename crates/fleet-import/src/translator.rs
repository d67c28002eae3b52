//! Stage 2: declarative translation of vendor-specific JSON exports into a
//! mapped import (§4.3 stage 2).
//!
//! A [`TranslatorConfig`] is data, not code — adding support for a new
//! vendor export format means adding a config, not a match arm, apart from
//! the fixed, fail-closed [`Transform`] vocabulary itself.

use crate::error::ImportError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The fixed, enumerated transform vocabulary (§4.3 stage 2). This is a
/// closed sum type: deriving `Deserialize` means an unknown transform name
/// in a `transforms` map fails to parse at all, rather than reaching
/// [`apply_transform`] as a raw string that might silently pass through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Replace the value with a lookup in a named table (resolved later,
    /// in the resolve stage — here it is recorded but not yet applied).
    Lookup,
    /// Coerce to a string.
    ToString,
    /// Coerce to a number; unparseable input becomes `null`.
    ToNumber,
    /// Coerce to a boolean: `"true"|"yes"|"1"` → `true`;
    /// `"false"|"no"|"0"|""` → `false`; anything else uses JS-style
    /// truthiness (`Boolean(value)` in the original export format).
    ToBoolean,
}

/// One configured entity's mapping (`officers`, `ships`, or `docks` in
/// §4.3's translator shape).
#[derive(Debug, Clone, Deserialize)]
pub struct EntityMapping {
    /// Dot-path into the payload resolving to an array of source rows.
    pub source_path: String,
    /// Source field naming the row's vendor id.
    pub id_field: String,
    /// Prefix prepended to the id value to form a stable `refId`.
    pub id_prefix: String,
    /// `sourceKey -> overlayField` renames.
    #[serde(default)]
    pub field_map: HashMap<String, String>,
    /// Values merged in for keys absent after mapping.
    #[serde(default)]
    pub defaults: HashMap<String, serde_json::Value>,
    /// `destField -> transform` to apply after mapping, before defaults.
    #[serde(default)]
    pub transforms: HashMap<String, Transform>,
    /// For `docks` only: prefix used to resolve a referenced ship id.
    #[serde(default)]
    pub ship_id_prefix: Option<String>,
}

/// A declarative translator configuration (§4.3 stage 2).
#[derive(Debug, Clone, Deserialize)]
pub struct TranslatorConfig {
    /// Human-readable translator name, e.g. `"pixelstarships"`.
    pub name: String,
    /// Translator schema version.
    pub version: String,
    /// Vendor identifier recorded on every produced row's provenance.
    pub source_type: String,
    /// Officer entity mapping, if this translator handles officers.
    pub officers: Option<EntityMapping>,
    /// Ship entity mapping, if this translator handles ships.
    pub ships: Option<EntityMapping>,
    /// Dock entity mapping, if this translator handles docks.
    pub docks: Option<EntityMapping>,
}

/// Walk `payload` through the dot-separated `path`, returning `None` if any
/// segment traverses through a null or a primitive (§4.3
/// `resolveSourcePath`).
pub fn resolve_source_path<'a>(
    payload: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let mut current = payload;
    for segment in path.split('.') {
        match current {
            serde_json::Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

fn apply_transform(transform: Transform, value: serde_json::Value) -> serde_json::Value {
    match transform {
        Transform::Lookup => value,
        Transform::ToString => serde_json::Value::String(value_to_string(&value)),
        Transform::ToNumber => value_to_number(&value),
        Transform::ToBoolean => serde_json::Value::Bool(value_to_boolean(&value)),
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_number(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Number(n) => serde_json::Value::Number(n.clone()),
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        _ => serde_json::Value::Null,
    }
}

fn value_to_boolean(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" | "" => false,
            _ => !s.is_empty(),
        },
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::Null => false,
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

/// One entity row after mapping, before fuzzy resolution (§4.3 stage 2/3).
#[derive(Debug, Clone, Serialize)]
pub struct MappedRow {
    /// `idPrefix + idValue`, already assigned — mapped rows always carry a
    /// `refId` by construction; unresolved *names* without an id are a
    /// resolve-stage concern, not a translate-stage one.
    pub ref_id: String,
    /// Mapped and transformed fields, keyed by destination name.
    pub fields: serde_json::Value,
}

/// Per-entity translation counters (§4.3 stage 2 `stats`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranslateStats {
    /// Rows successfully mapped.
    pub translated: usize,
    /// Rows skipped for a non-fatal reason (missing id, non-object row).
    pub errored: usize,
}

/// Output of the translate stage (§4.3 stage 2).
#[derive(Debug, Clone, Default, Serialize)]
pub struct MappedImport {
    /// Mapped officer rows.
    pub officers: Vec<MappedRow>,
    /// Mapped ship rows.
    pub ships: Vec<MappedRow>,
    /// Mapped dock rows.
    pub docks: Vec<MappedRow>,
    /// Per-entity counters.
    pub stats: HashMap<String, TranslateStats>,
    /// Non-fatal warnings (unresolved source path, etc).
    pub warnings: Vec<String>,
}

impl MappedImport {
    /// Total rows translated across every configured entity.
    pub fn translated_count(&self) -> usize {
        self.officers.len() + self.ships.len() + self.docks.len()
    }
}

fn translate_entity(
    name: &str,
    payload: &serde_json::Value,
    mapping: &EntityMapping,
    warnings: &mut Vec<String>,
) -> Result<(Vec<MappedRow>, TranslateStats), ImportError> {
    let mut stats = TranslateStats::default();
    let mut out = Vec::new();

    let Some(source) = resolve_source_path(payload, &mapping.source_path) else {
        warnings.push(format!("{name}: source path {} did not resolve", mapping.source_path));
        return Ok((out, stats));
    };
    let Some(items) = source.as_array() else {
        warnings.push(format!("{name}: source path {} is not an array", mapping.source_path));
        return Ok((out, stats));
    };

    for item in items {
        let Some(obj) = item.as_object() else {
            stats.errored += 1;
            continue;
        };
        let Some(id_value) = obj.get(&mapping.id_field) else {
            stats.errored += 1;
            continue;
        };

        let mut fields = serde_json::Map::new();
        for (source_key, dest_field) in &mapping.field_map {
            if let Some(v) = obj.get(source_key) {
                fields.insert(dest_field.clone(), v.clone());
            }
        }
        for (dest_field, transform) in &mapping.transforms {
            if let Some(v) = fields.remove(dest_field) {
                fields.insert(dest_field.clone(), apply_transform(*transform, v));
            }
        }
        for (k, v) in &mapping.defaults {
            fields.entry(k.clone()).or_insert_with(|| v.clone());
        }

        let id_str = value_to_string(id_value);
        out.push(MappedRow {
            ref_id: format!("{}{}", mapping.id_prefix, id_str),
            fields: serde_json::Value::Object(fields),
        });
        stats.translated += 1;
    }

    Ok((out, stats))
}

/// Run a translator config against a decoded JSON payload (§4.3 stage 2).
///
/// Returns [`ImportError::NoRowsTranslated`] if every configured entity
/// translated zero rows — a partial parse is fine as long as at least one
/// entity translated something.
pub fn translate(config: &TranslatorConfig, payload: &serde_json::Value) -> Result<MappedImport, ImportError> {
    let mut mapped = MappedImport::default();

    if let Some(m) = &config.officers {
        let (rows, stats) = translate_entity("officers", payload, m, &mut mapped.warnings)?;
        mapped.officers = rows;
        mapped.stats.insert("officers".to_string(), stats);
    }
    if let Some(m) = &config.ships {
        let (rows, stats) = translate_entity("ships", payload, m, &mut mapped.warnings)?;
        mapped.ships = rows;
        mapped.stats.insert("ships".to_string(), stats);
    }
    if let Some(m) = &config.docks {
        let (rows, stats) = translate_entity("docks", payload, m, &mut mapped.warnings)?;
        mapped.docks = rows;
        mapped.stats.insert("docks".to_string(), stats);
    }

    if mapped.translated_count() == 0 {
        return Err(ImportError::NoRowsTranslated);
    }

    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> EntityMapping {
        EntityMapping {
            source_path: "fleet.officers".to_string(),
            id_field: "officerId".to_string(),
            id_prefix: "pss:officer:".to_string(),
            field_map: HashMap::from([("lvl".to_string(), "user_level".to_string())]),
            defaults: HashMap::new(),
            transforms: HashMap::from([("user_level".to_string(), Transform::ToNumber)]),
            ship_id_prefix: None,
        }
    }

    #[test]
    fn resolve_source_path_walks_dot_segments() {
        let payload = serde_json::json!({"a": {"b": {"c": [1, 2]}}});
        let v = resolve_source_path(&payload, "a.b.c").unwrap();
        assert_eq!(v, &serde_json::json!([1, 2]));
    }

    #[test]
    fn resolve_source_path_stops_at_null() {
        let payload = serde_json::json!({"a": null});
        assert!(resolve_source_path(&payload, "a.b").is_none());
    }

    #[test]
    fn resolve_source_path_stops_at_primitive() {
        let payload = serde_json::json!({"a": 5});
        assert!(resolve_source_path(&payload, "a.b").is_none());
    }

    #[test]
    fn to_boolean_recognizes_vendor_truthy_strings() {
        assert!(value_to_boolean(&serde_json::json!("yes")));
        assert!(value_to_boolean(&serde_json::json!("1")));
        assert!(!value_to_boolean(&serde_json::json!("no")));
        assert!(!value_to_boolean(&serde_json::json!("")));
    }

    #[test]
    fn to_number_maps_unparseable_to_null() {
        assert_eq!(value_to_number(&serde_json::json!("not-a-number")), serde_json::Value::Null);
    }

    #[test]
    fn translate_entity_maps_and_transforms_rows() {
        let payload = serde_json::json!({
            "fleet": {"officers": [{"officerId": 7, "lvl": "12"}]}
        });
        let mut warnings = Vec::new();
        let (rows, stats) = translate_entity("officers", &payload, &mapping(), &mut warnings).unwrap();
        assert_eq!(stats.translated, 1);
        assert_eq!(rows[0].ref_id, "pss:officer:7");
        assert_eq!(rows[0].fields["user_level"], serde_json::json!(12.0));
    }

    #[test]
    fn translate_entity_counts_rows_missing_id_as_errored() {
        let payload = serde_json::json!({"fleet": {"officers": [{"lvl": 5}]}});
        let mut warnings = Vec::new();
        let (rows, stats) = translate_entity("officers", &payload, &mapping(), &mut warnings).unwrap();
        assert!(rows.is_empty());
        assert_eq!(stats.errored, 1);
    }

    #[test]
    fn translate_entity_warns_when_source_path_missing() {
        let payload = serde_json::json!({});
        let mut warnings = Vec::new();
        let (rows, _stats) = translate_entity("officers", &payload, &mapping(), &mut warnings).unwrap();
        assert!(rows.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn unknown_transform_name_fails_to_deserialize() {
        let raw = serde_json::json!({
            "source_path": "fleet.officers",
            "id_field": "officerId",
            "id_prefix": "pss:officer:",
            "transforms": {"user_level": "frobnicate"},
        });
        let result: Result<EntityMapping, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }

    #[test]
    fn translate_fails_when_nothing_translated() {
        let config = TranslatorConfig {
            name: "test".to_string(),
            version: "1".to_string(),
            source_type: "test".to_string(),
            officers: Some(mapping()),
            ships: None,
            docks: None,
        };
        let payload = serde_json::json!({});
        assert!(matches!(translate(&config, &payload), Err(ImportError::NoRowsTranslated)));
    }
}
