//! CHPL wire format.
//!
//! CHPL packs list-valued fields into single strings: items are separated by
//! `☺`, and within an API documentation item the criterion and the URL are
//! separated by `☹`. Everything is decoded into typed values here so the
//! separators never reach the rest of the crate.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::types::{Criterion, Location, Product, Vendor};
use crate::error::ReconcileError;

pub const ITEM_DELIMITER: char = '☺';
pub const PAIR_DELIMITER: char = '☹';

/// Fields requested from the certified products collection.
pub const PRODUCT_FIELDS: [&str; 11] = [
    "id",
    "edition",
    "developer",
    "product",
    "version",
    "chplProductNumber",
    "certificationStatus",
    "criteriaMet",
    "apiDocumentation",
    "certificationDate",
    "practiceType",
];

#[derive(Debug, Deserialize)]
pub struct ChplProductList {
    #[serde(default)]
    pub results: Vec<ChplProduct>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChplProduct {
    pub id: i64,
    #[serde(default)]
    pub chpl_product_number: String,
    #[serde(default)]
    pub edition: String,
    #[serde(default)]
    pub practice_type: String,
    #[serde(default)]
    pub developer: String,
    pub product: String,
    pub version: String,
    // epoch milliseconds
    pub certification_date: Option<i64>,
    #[serde(default)]
    pub certification_status: String,
    #[serde(default)]
    pub criteria_met: String,
    #[serde(default)]
    pub api_documentation: String,
}

#[derive(Debug, Deserialize)]
pub struct ChplVendorList {
    #[serde(default)]
    pub developers: Vec<ChplVendor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChplVendor {
    pub developer_id: i64,
    #[serde(default)]
    pub developer_code: String,
    pub name: String,
    #[serde(default)]
    pub website: String,
    pub address: Option<ChplAddress>,
    // epoch milliseconds, serialized as a string
    #[serde(default)]
    pub last_modified_date: String,
    pub status: Option<ChplStatus>,
}

// address parts are occasionally numbers or null
#[derive(Debug, Clone, Deserialize)]
pub struct ChplAddress {
    #[serde(default)]
    pub line1: Value,
    #[serde(default)]
    pub line2: Value,
    #[serde(default)]
    pub city: Value,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub zipcode: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChplStatus {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ChplCriteriaList {
    #[serde(default)]
    pub criteria: Vec<ChplCriterion>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChplCriterion {
    pub id: i64,
    pub number: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub certification_edition_id: i64,
    #[serde(default)]
    pub certification_edition: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub removed: bool,
}

/// Deserialize a fetched batch.
pub fn decode_batch<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ReconcileError> {
    serde_json::from_slice(bytes).map_err(|e| ReconcileError::MalformedWireField {
        field: "batch",
        detail: e.to_string(),
    })
}

/// Split a `☺`-packed string into its non-empty items.
pub fn split_packed(packed: &str) -> Vec<&str> {
    packed
        .split(ITEM_DELIMITER)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// Decode `criteriaMet` into CHPL criterion ids.
pub fn decode_criteria_met(packed: &str) -> Result<Vec<i64>, ReconcileError> {
    split_packed(packed)
        .into_iter()
        .map(|item| {
            item.parse::<i64>()
                .map_err(|_| ReconcileError::MalformedWireField {
                    field: "criteriaMet",
                    detail: format!("'{}' is not a criterion id", item),
                })
        })
        .collect()
}

/// First API documentation URL. Listings repeat the same URL per criterion,
/// so only the first item is read.
pub fn decode_api_url(packed: &str) -> Result<Option<String>, ReconcileError> {
    let Some(first) = split_packed(packed).into_iter().next() else {
        return Ok(None);
    };

    let parts: Vec<&str> = first.split(PAIR_DELIMITER).collect();
    if parts.len() != 2 {
        return Err(ReconcileError::MalformedWireField {
            field: "apiDocumentation",
            detail: format!("unexpected format: {}", first),
        });
    }

    let url = parts[1].trim();
    url::Url::parse(url).map_err(|e| ReconcileError::MalformedWireField {
        field: "apiDocumentation",
        detail: format!("'{}' is not a valid URL: {}", url, e),
    })?;
    Ok(Some(url.to_string()))
}

/// CHPL timestamps are epoch milliseconds; sub-second precision is dropped.
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(millis.div_euclid(1000), 0)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

pub fn parse_product(wire: &ChplProduct) -> Result<Product, ReconcileError> {
    let mut product = Product::new(&wire.product, &wire.version, &wire.edition);
    product.developer = wire.developer.clone();
    product.certification_status = wire.certification_status.clone();
    product.certification_date = wire.certification_date.and_then(millis_to_datetime);
    product.chpl_id = wire.chpl_product_number.clone();
    product.practice_type = wire.practice_type.clone();
    product.certification_criteria = decode_criteria_met(&wire.criteria_met)?;
    product.api_url = decode_api_url(&wire.api_documentation)?;
    Ok(product)
}

pub fn parse_vendor(wire: &ChplVendor) -> Vendor {
    let mut vendor = Vendor::new(&wire.name, wire.developer_id);
    vendor.developer_code = wire.developer_code.clone();
    vendor.url = wire.website.clone();
    vendor.location = wire.address.as_ref().map(|address| Location {
        address1: value_to_string(&address.line1),
        address2: value_to_string(&address.line2),
        address3: String::new(),
        city: value_to_string(&address.city),
        state: value_to_string(&address.state),
        zipcode: value_to_string(&address.zipcode),
    });
    vendor.status = wire
        .status
        .as_ref()
        .map(|s| s.status.clone())
        .unwrap_or_default();
    vendor.last_modified_in_chpl = wire
        .last_modified_date
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(millis_to_datetime);
    vendor
}

pub fn parse_criterion(wire: &ChplCriterion) -> Criterion {
    let mut criterion = Criterion::new(wire.id, &wire.number, &wire.certification_edition);
    criterion.title = wire.title.clone();
    criterion.certification_edition_id = wire.certification_edition_id;
    criterion.description = wire.description.clone();
    criterion.removed = wire.removed;
    criterion
}
