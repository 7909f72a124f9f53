// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Normalization of provider records into [`IntegrationCosmetic`].
//!
//! Mapping never fails: the schema guard has already vouched for the shape
//! of sampled items and [`is_valid_cosmetic`] drops anything unusable, so
//! the remaining gaps are filled with defaults.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::model::{IntegrationCosmetic, ShopPrice};

pub const PLACEHOLDER_IMAGE_URL: &str = "https://placehold.co/512x512?text=No+Image";

const EARLIEST_PLAUSIBLE_YEAR: i32 = 2017;
const LATEST_PLAUSIBLE_YEAR: i32 = 2100;

/// Image keys in order of preference.
const IMAGE_PRIORITY: [&str; 5] = ["featured", "icon", "smallIcon", "large", "small"];

/// Permissive per-item filter for collections.
///
/// Looser than [`crate::schema::validate_cosmetic_item`]: a record failing
/// here is dropped from its batch instead of failing the whole fetch.
pub fn is_valid_cosmetic(raw: &Value) -> bool {
    let is_string = |key: &str| raw.get(key).is_some_and(Value::is_string);
    let nested_string = |key: &str| {
        raw.get(key)
            .and_then(|value| value.get("value"))
            .is_some_and(Value::is_string)
    };

    is_string("id")
        && is_string("name")
        && is_string("added")
        && nested_string("type")
        && nested_string("rarity")
        && raw.get("images").is_some_and(Value::is_object)
}

pub fn map_cosmetic(raw: &Value) -> IntegrationCosmetic {
    map_cosmetic_at(raw, Utc::now())
}

/// Map a shop item, attaching the prices of the entry it came from.
pub fn map_shop_cosmetic(raw: &Value, price: ShopPrice) -> IntegrationCosmetic {
    IntegrationCosmetic {
        base_price: price.regular,
        current_price: price.final_price,
        ..map_cosmetic(raw)
    }
}

fn map_cosmetic_at(raw: &Value, now: DateTime<Utc>) -> IntegrationCosmetic {
    let external_id = string_at(raw, "id").unwrap_or_default();

    IntegrationCosmetic {
        name: string_at(raw, "name").unwrap_or_default(),
        description: string_at(raw, "description").unwrap_or_default(),
        kind: normalize_value(raw.get("type")),
        rarity: normalize_value(raw.get("rarity")),
        image_url: select_image(raw.get("images"), &external_id),
        added_at: normalize_added(raw.get("added").and_then(Value::as_str), &external_id, now),
        children: children_of(raw),
        set: display_value(raw.get("set")),
        series: display_value(raw.get("series")),
        base_price: None,
        current_price: None,
        external_id,
    }
}

fn string_at(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn normalize_value(field: Option<&Value>) -> String {
    field
        .and_then(|value| value.get("value"))
        .and_then(Value::as_str)
        .map(|value| value.trim().to_lowercase())
        .unwrap_or_default()
}

fn display_value(field: Option<&Value>) -> Option<String> {
    field
        .and_then(|value| value.get("value"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn select_image(images: Option<&Value>, external_id: &str) -> String {
    let Some(images) = images else {
        tracing::warn!(external_id, "cosmetic has no images, using placeholder");
        return PLACEHOLDER_IMAGE_URL.to_string();
    };

    let preferred = IMAGE_PRIORITY
        .iter()
        .filter_map(|key| images.get(*key).and_then(Value::as_str))
        .find(|url| !url.is_empty());
    if let Some(url) = preferred {
        return url.to_string();
    }

    let other = images
        .get("other")
        .and_then(Value::as_object)
        .and_then(|other| other.values().filter_map(Value::as_str).find(|url| !url.is_empty()));
    if let Some(url) = other {
        return url.to_string();
    }

    tracing::warn!(external_id, "no usable image URL, using placeholder");
    PLACEHOLDER_IMAGE_URL.to_string()
}

fn normalize_added(raw: Option<&str>, external_id: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let parsed = raw.and_then(parse_timestamp);

    match parsed {
        Some(added)
            if (EARLIEST_PLAUSIBLE_YEAR..=LATEST_PLAUSIBLE_YEAR).contains(&added.year()) =>
        {
            added
        }
        Some(added) => {
            tracing::error!(external_id, %added, "implausible added date, using current time");
            now
        }
        None => {
            tracing::error!(external_id, raw = ?raw, "unparseable added date, using current time");
            now
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn children_of(raw: &Value) -> Vec<String> {
    raw.get("set")
        .and_then(|set| set.get("items"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
