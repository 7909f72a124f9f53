// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Structural validation of provider payloads.
//!
//! Only the first [`SAMPLE_SIZE`] items of each collection are checked; the
//! per-item filter in [`crate::mapper`] handles stragglers further down the
//! list. Any violation fails fast with the offending path.

use serde_json::{Map, Value};

use crate::error::{IntegrationError, Result};

/// Items checked per collection.
pub const SAMPLE_SIZE: usize = 5;

/// Validate a `GET /cosmetics` payload: `data` maps language to items.
pub fn validate_all_cosmetics(payload: &Value) -> Result<()> {
    let data = envelope_data(payload)?;

    for (language, bucket) in data {
        let path = format!("data.{language}");
        let items = match bucket.as_array() {
            Some(items) if !items.is_empty() => items,
            _ => return Err(IntegrationError::schema(path)),
        };
        validate_sample(items.iter(), &path)?;
    }

    Ok(())
}

/// Validate a `GET /cosmetics/new` payload.
///
/// `data.items` is either one flat array or an object of per-type arrays.
pub fn validate_new_cosmetics(payload: &Value) -> Result<()> {
    let data = envelope_data(payload)?;

    match data.get("items") {
        Some(Value::Array(items)) => validate_sample(items.iter(), "data.items"),
        Some(Value::Object(buckets)) => {
            for (kind, bucket) in buckets {
                if !bucket.is_array() && !bucket.is_null() {
                    return Err(IntegrationError::schema(format!("data.items.{kind}")));
                }
            }
            let flattened = buckets
                .iter()
                .filter_map(|(kind, bucket)| Some((kind, bucket.as_array()?)))
                .flat_map(|(kind, items)| {
                    items
                        .iter()
                        .enumerate()
                        .map(move |(index, item)| (format!("data.items.{kind}[{index}]"), item))
                })
                .take(SAMPLE_SIZE);
            for (path, item) in flattened {
                validate_cosmetic_item(item, &path)?;
            }
            Ok(())
        }
        _ => Err(IntegrationError::schema("data.items")),
    }
}

/// Validate a `GET /shop` payload by checking the items extracted from its
/// entries.
pub fn validate_shop(payload: &Value) -> Result<()> {
    let data = envelope_data(payload)?;

    let entries = data
        .get("entries")
        .and_then(Value::as_array)
        .ok_or_else(|| IntegrationError::schema("data.entries"))?;

    let sampled = entries
        .iter()
        .enumerate()
        .filter_map(|(entry_index, entry)| {
            let items = entry.get("brItems")?.as_array()?;
            Some((entry_index, items))
        })
        .flat_map(|(entry_index, items)| {
            items.iter().enumerate().map(move |(index, item)| {
                (format!("data.entries[{entry_index}].brItems[{index}]"), item)
            })
        })
        .take(SAMPLE_SIZE);

    for (path, item) in sampled {
        validate_cosmetic_item(item, &path)?;
    }

    Ok(())
}

/// Strict check of a single cosmetic record.
pub fn validate_cosmetic_item(item: &Value, path: &str) -> Result<()> {
    let fields = item
        .as_object()
        .ok_or_else(|| IntegrationError::schema(path))?;

    for key in ["id", "name", "description"] {
        require_string(fields, key, path)?;
    }

    require_nested_string(fields, "type", "value", path)?;
    require_nested_string(fields, "rarity", "value", path)?;

    let images = fields
        .get("images")
        .and_then(Value::as_object)
        .ok_or_else(|| IntegrationError::schema(format!("{path}.images")))?;
    require_string(images, "smallIcon", &format!("{path}.images"))?;

    require_string(fields, "added", path)?;

    for key in ["set", "series"] {
        if let Some(value) = fields.get(key).filter(|value| !value.is_null()) {
            let nested = value
                .as_object()
                .ok_or_else(|| IntegrationError::schema(format!("{path}.{key}")))?;
            require_string(nested, "value", &format!("{path}.{key}"))?;
        }
    }

    if let Some(tags) = fields.get("metaTags").filter(|value| !value.is_null()) {
        if !tags.is_array() {
            return Err(IntegrationError::schema(format!("{path}.metaTags")));
        }
    }

    Ok(())
}

fn envelope_data(payload: &Value) -> Result<&Map<String, Value>> {
    let status = payload.get("status");
    if !status.is_some_and(Value::is_number) {
        return Err(IntegrationError::schema("status"));
    }

    payload
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| IntegrationError::schema("data"))
}

fn validate_sample<'a, I>(items: I, path: &str) -> Result<()>
where
    I: Iterator<Item = &'a Value>,
{
    for (index, item) in items.take(SAMPLE_SIZE).enumerate() {
        validate_cosmetic_item(item, &format!("{path}[{index}]"))?;
    }
    Ok(())
}

fn require_string(fields: &Map<String, Value>, key: &str, path: &str) -> Result<()> {
    match fields.get(key) {
        Some(Value::String(_)) => Ok(()),
        _ => Err(IntegrationError::schema(format!("{path}.{key}"))),
    }
}

fn require_nested_string(
    fields: &Map<String, Value>,
    key: &str,
    inner: &str,
    path: &str,
) -> Result<()> {
    match fields.get(key).and_then(|value| value.get(inner)) {
        Some(Value::String(_)) => Ok(()),
        _ => Err(IntegrationError::schema(format!("{path}.{key}.{inner}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(id: &str) -> Value {
        json!({
            "id": id,
            "name": "Renegade Raider",
            "description": "Rare renegade raider outfit.",
            "type": { "value": "outfit", "displayValue": "Outfit" },
            "rarity": { "value": "rare", "displayValue": "Rare" },
            "images": {
                "smallIcon": "https://cdn.example.com/small.png",
                "icon": "https://cdn.example.com/icon.png"
            },
            "added": "2018-01-02T10:00:00Z",
            "set": { "value": "Renegade" },
            "metaTags": ["tag"]
        })
    }

    fn path_of(err: IntegrationError) -> String {
        match err {
            IntegrationError::SchemaValidation { path } => path,
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_well_formed_all_cosmetics_payload() {
        let payload = json!({ "status": 200, "data": { "pt-BR": [item("a"), item("b")] } });
        assert!(validate_all_cosmetics(&payload).is_ok());
    }

    #[test]
    fn rejects_missing_small_icon_with_exact_path() {
        let mut broken = item("c");
        broken["images"].as_object_mut().unwrap().remove("smallIcon");
        let payload = json!({ "status": 200, "data": { "pt-BR": [item("a"), item("b"), broken] } });

        let err = validate_all_cosmetics(&payload).unwrap_err();
        assert_eq!(err.to_string(), "data.pt-BR[2].images.smallIcon is missing or invalid");
    }

    #[test]
    fn only_first_five_items_are_sampled() {
        let mut items: Vec<Value> = (0..5).map(|i| item(&format!("id-{i}"))).collect();
        items.push(json!({ "garbage": true }));
        let payload = json!({ "status": 200, "data": { "en": items } });
        assert!(validate_all_cosmetics(&payload).is_ok());
    }

    #[test]
    fn rejects_bad_envelopes() {
        let bad_status = json!({ "status": "200", "data": {} });
        assert_eq!(path_of(validate_all_cosmetics(&bad_status).unwrap_err()), "status");

        let array_data = json!({ "status": 200, "data": [] });
        assert_eq!(path_of(validate_all_cosmetics(&array_data).unwrap_err()), "data");

        let empty_bucket = json!({ "status": 200, "data": { "en": [] } });
        assert_eq!(path_of(validate_all_cosmetics(&empty_bucket).unwrap_err()), "data.en");
    }

    #[test]
    fn rejects_wrong_optional_field_types() {
        let mut bad_set = item("a");
        bad_set["set"] = json!({ "value": 3 });
        let payload = json!({ "status": 200, "data": { "en": [bad_set] } });
        assert_eq!(path_of(validate_all_cosmetics(&payload).unwrap_err()), "data.en[0].set.value");

        let mut bad_tags = item("a");
        bad_tags["metaTags"] = json!("tag");
        let payload = json!({ "status": 200, "data": { "en": [bad_tags] } });
        assert_eq!(path_of(validate_all_cosmetics(&payload).unwrap_err()), "data.en[0].metaTags");

        let mut bad_rarity = item("a");
        bad_rarity["rarity"] = json!("rare");
        let payload = json!({ "status": 200, "data": { "en": [bad_rarity] } });
        assert_eq!(
            path_of(validate_all_cosmetics(&payload).unwrap_err()),
            "data.en[0].rarity.value"
        );
    }

    #[test]
    fn new_cosmetics_accepts_flat_and_bucketed_items() {
        let flat = json!({ "status": 200, "data": { "items": [item("a")] } });
        assert!(validate_new_cosmetics(&flat).is_ok());

        let bucketed = json!({
            "status": 200,
            "data": { "items": { "br": [item("a")], "tracks": null } }
        });
        assert!(validate_new_cosmetics(&bucketed).is_ok());

        let mut broken = item("b");
        broken["name"] = json!(null);
        let bucketed = json!({ "status": 200, "data": { "items": { "br": [item("a"), broken] } } });
        assert_eq!(
            path_of(validate_new_cosmetics(&bucketed).unwrap_err()),
            "data.items.br[1].name"
        );

        let missing = json!({ "status": 200, "data": { "date": "2024-01-01" } });
        assert_eq!(path_of(validate_new_cosmetics(&missing).unwrap_err()), "data.items");
    }

    #[test]
    fn shop_validates_extracted_items() {
        let payload = json!({
            "status": 200,
            "data": { "entries": [
                { "regularPrice": 1200, "finalPrice": 800, "brItems": [item("a")] },
                { "regularPrice": 500, "finalPrice": 500 }
            ] }
        });
        assert!(validate_shop(&payload).is_ok());

        let mut broken = item("b");
        broken["added"] = json!(12345);
        let payload = json!({
            "status": 200,
            "data": { "entries": [ { "brItems": [item("a")] }, { "brItems": [broken] } ] }
        });
        assert_eq!(
            path_of(validate_shop(&payload).unwrap_err()),
            "data.entries[1].brItems[0].added"
        );

        let payload = json!({ "status": 200, "data": {} });
        assert_eq!(path_of(validate_shop(&payload).unwrap_err()), "data.entries");
    }
}
