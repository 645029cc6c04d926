//! Declarative field mapping from raw API records to entity fields.
//!
//! The mapping itself ([`civhub_common::types::FieldMapping`]) is
//! configuration; this module applies it. A record missing a required field
//! fails alone — mapping never aborts the run.

use std::collections::HashMap;

use civhub_common::types::FieldMapping;
use civhub_common::HarvestError;

/// A record mapped onto entity fields, ready for dedup and persistence.
#[derive(Debug, Clone)]
pub struct MappedEntity {
    pub external_id: String,
    pub name: String,
    pub attributes: HashMap<String, serde_json::Value>,
}

/// Walk a dotted path (`"result.title"`) into a JSON value.
pub fn lookup_path<'a>(record: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = record;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn as_display_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Apply a field mapping to one raw record.
pub fn apply(mapping: &FieldMapping, record: &serde_json::Value) -> Result<MappedEntity, HarvestError> {
    let external_id = lookup_path(record, &mapping.id_path)
        .and_then(as_display_string)
        .ok_or_else(|| {
            HarvestError::Mapping(format!("record has no external id at '{}'", mapping.id_path))
        })?;

    let mut attributes = HashMap::new();
    for assignment in &mapping.assignments {
        match lookup_path(record, &assignment.path) {
            Some(value) if !value.is_null() => {
                attributes.insert(assignment.attribute.clone(), value.clone());
            }
            _ if assignment.required => {
                return Err(HarvestError::Mapping(format!(
                    "record {external_id}: required field '{}' missing at '{}'",
                    assignment.attribute, assignment.path
                )));
            }
            _ => {}
        }
    }

    let name = attributes
        .get("name")
        .and_then(as_display_string)
        .ok_or_else(|| {
            HarvestError::Mapping(format!(
                "record {external_id}: no usable 'name' attribute after mapping"
            ))
        })?;

    Ok(MappedEntity {
        external_id,
        name,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use civhub_common::types::{EntityType, FieldAssignment};
    use serde_json::json;

    fn mapping() -> FieldMapping {
        FieldMapping {
            id_path: "id".to_string(),
            entity_type: EntityType::Municipality,
            assignments: vec![
                FieldAssignment {
                    attribute: "name".to_string(),
                    path: "properties.title".to_string(),
                    required: true,
                },
                FieldAssignment {
                    attribute: "population".to_string(),
                    path: "properties.population".to_string(),
                    required: false,
                },
            ],
        }
    }

    #[test]
    fn nested_paths_are_resolved() {
        let record = json!({
            "id": "de-08115045",
            "properties": { "title": "Gemeinde Musterstadt", "population": 12400 }
        });

        let mapped = apply(&mapping(), &record).unwrap();
        assert_eq!(mapped.external_id, "de-08115045");
        assert_eq!(mapped.name, "Gemeinde Musterstadt");
        assert_eq!(mapped.attributes["population"], json!(12400));
    }

    #[test]
    fn missing_required_field_is_descriptive() {
        let record = json!({ "id": "de-1", "properties": {} });
        let err = apply(&mapping(), &record).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("de-1"), "{msg}");
        assert!(msg.contains("name"), "{msg}");
    }

    #[test]
    fn missing_optional_field_is_fine() {
        let record = json!({ "id": "de-2", "properties": { "title": "Kleinstadt" } });
        let mapped = apply(&mapping(), &record).unwrap();
        assert!(!mapped.attributes.contains_key("population"));
    }

    #[test]
    fn missing_external_id_fails() {
        let record = json!({ "properties": { "title": "Ohne Id" } });
        assert!(apply(&mapping(), &record).is_err());
    }

    #[test]
    fn numeric_external_ids_are_accepted() {
        let record = json!({ "id": 4711, "properties": { "title": "Zahlenstadt" } });
        let mapped = apply(&mapping(), &record).unwrap();
        assert_eq!(mapped.external_id, "4711");
    }
}
