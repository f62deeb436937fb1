use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which catalog feed a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogEntityKind {
    Product,
    Vendor,
    Criterion,
}

impl CatalogEntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogEntityKind::Product => "product",
            CatalogEntityKind::Vendor => "vendor",
            CatalogEntityKind::Criterion => "criterion",
        }
    }
}

impl fmt::Display for CatalogEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Postal address as published by a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub address1: String,
    pub address2: String,
    pub address3: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
}

/// A certified health IT product (an EHR or similar) listed in CHPL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub name: String,
    pub version: String,

    // Developer name as published alongside the listing
    pub developer: String,

    // Store id of the vendor, resolved from `developer` during ingestion
    pub vendor_id: Option<i64>,

    // URL of the API documentation, if any listing declares one
    pub api_url: Option<String>,

    // CHPL certification criterion ids the product was certified to
    pub certification_criteria: Vec<i64>,

    pub certification_status: String,
    pub certification_date: Option<DateTime<Utc>>,

    // e.g. "2014", "2015"
    pub certification_edition: String,

    // listing id within CHPL, e.g. "15.04.04.2891.Alls.17.02.1.180112"
    pub chpl_id: String,

    pub practice_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    pub fn new(name: &str, version: &str, edition: &str) -> Self {
        Product {
            id: None,
            name: name.to_string(),
            version: version.to_string(),
            developer: String::new(),
            vendor_id: None,
            api_url: None,
            certification_criteria: Vec::new(),
            certification_status: String::new(),
            certification_date: None,
            certification_edition: edition.to_string(),
            chpl_id: String::new(),
            practice_type: String::new(),
            created_at: None,
            updated_at: None,
        }
    }

    /// `name:version (chpl_id)`, used in logs and conflict errors.
    pub fn identity(&self) -> String {
        format!("{}:{} ({})", self.name, self.version, self.chpl_id)
    }

    /// Copy every externally sourced field of `incoming` onto this stored product.
    /// The store id and creation time are kept.
    pub fn apply(&mut self, incoming: &Product) {
        let id = self.id;
        let created_at = self.created_at;
        *self = incoming.clone();
        self.id = id;
        self.created_at = created_at;
    }
}

/// A health IT developer listed in CHPL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub developer_code: String,
    pub url: String,
    pub location: Option<Location>,
    pub status: String,
    pub last_modified_in_chpl: Option<DateTime<Utc>>,
    pub chpl_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Vendor {
    pub fn new(name: &str, chpl_id: i64) -> Self {
        Vendor {
            id: None,
            name: name.to_string(),
            developer_code: String::new(),
            url: String::new(),
            location: None,
            status: String::new(),
            last_modified_in_chpl: None,
            chpl_id,
            created_at: None,
            updated_at: None,
        }
    }
}

/// An ONC certification criterion such as "170.315 (g)(7)".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    // CHPL's numeric id for the criterion, the natural key
    pub certification_id: i64,
    pub number: String,
    pub title: String,
    pub certification_edition_id: i64,
    pub certification_edition: String,
    pub description: String,
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Criterion {
    pub fn new(certification_id: i64, number: &str, edition: &str) -> Self {
        Criterion {
            id: None,
            certification_id,
            number: number.to_string(),
            title: String::new(),
            certification_edition_id: 0,
            certification_edition: edition.to_string(),
            description: String::new(),
            removed: false,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn identity(&self) -> String {
        format!("{} ({})", self.number, self.certification_id)
    }
}

/// A product-to-criterion link. `criterion_id` is the CHPL certification id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CriterionLink {
    pub criterion_id: i64,
    pub number: String,
}
