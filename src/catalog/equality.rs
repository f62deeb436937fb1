//! Field-by-field comparison of catalog entities.
//!
//! Equality ignores the store-assigned id and the created/updated timestamps.
//! Optional fields are compared through [`compare_optional`], which reports
//! absence explicitly instead of folding it into "equal" or "unequal".

use super::types::{Criterion, Location, Product, Vendor};

/// Outcome of comparing one pair of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMatch {
    BothAbsent,
    Equal,
    OneAbsent,
    Unequal,
}

impl FieldMatch {
    pub fn is_match(self) -> bool {
        matches!(self, FieldMatch::BothAbsent | FieldMatch::Equal)
    }

    fn of<T: PartialEq + ?Sized>(a: &T, b: &T) -> Self {
        if a == b {
            FieldMatch::Equal
        } else {
            FieldMatch::Unequal
        }
    }
}

/// Nil-safe comparison: both absent is a match, exactly one absent is not.
pub fn compare_optional<T: PartialEq>(a: Option<&T>, b: Option<&T>) -> FieldMatch {
    match (a, b) {
        (None, None) => FieldMatch::BothAbsent,
        (Some(_), None) | (None, Some(_)) => FieldMatch::OneAbsent,
        (Some(a), Some(b)) => FieldMatch::of(a, b),
    }
}

/// Order-insensitive list comparison.
pub fn compare_unordered<T: Ord + Clone>(a: &[T], b: &[T]) -> FieldMatch {
    if a.len() != b.len() {
        return FieldMatch::Unequal;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    FieldMatch::of(&a, &b)
}

/// Structural equality over the externally sourced fields of an entity.
pub trait FieldwiseEq {
    /// Every field comparison, tagged with the field name.
    fn field_matches(&self, other: &Self) -> Vec<(&'static str, FieldMatch)>;

    /// Name of the first field that differs, if any.
    fn first_difference(&self, other: &Self) -> Option<&'static str> {
        self.field_matches(other)
            .into_iter()
            .find(|(_, result)| !result.is_match())
            .map(|(field, _)| field)
    }

    fn same_content(&self, other: &Self) -> bool {
        self.first_difference(other).is_none()
    }
}

impl FieldwiseEq for Product {
    fn field_matches(&self, other: &Self) -> Vec<(&'static str, FieldMatch)> {
        vec![
            ("name", FieldMatch::of(&self.name, &other.name)),
            ("version", FieldMatch::of(&self.version, &other.version)),
            ("developer", FieldMatch::of(&self.developer, &other.developer)),
            (
                "vendor_id",
                compare_optional(self.vendor_id.as_ref(), other.vendor_id.as_ref()),
            ),
            (
                "api_url",
                compare_optional(self.api_url.as_ref(), other.api_url.as_ref()),
            ),
            (
                "certification_criteria",
                compare_unordered(&self.certification_criteria, &other.certification_criteria),
            ),
            (
                "certification_status",
                FieldMatch::of(&self.certification_status, &other.certification_status),
            ),
            (
                "certification_date",
                compare_optional(
                    self.certification_date.as_ref(),
                    other.certification_date.as_ref(),
                ),
            ),
            (
                "certification_edition",
                FieldMatch::of(&self.certification_edition, &other.certification_edition),
            ),
            (
                "practice_type",
                FieldMatch::of(&self.practice_type, &other.practice_type),
            ),
        ]
    }
}

impl FieldwiseEq for Vendor {
    fn field_matches(&self, other: &Self) -> Vec<(&'static str, FieldMatch)> {
        vec![
            ("name", FieldMatch::of(&self.name, &other.name)),
            (
                "developer_code",
                FieldMatch::of(&self.developer_code, &other.developer_code),
            ),
            ("url", FieldMatch::of(&self.url, &other.url)),
            (
                "location",
                compare_optional::<Location>(self.location.as_ref(), other.location.as_ref()),
            ),
            ("status", FieldMatch::of(&self.status, &other.status)),
            (
                "last_modified_in_chpl",
                compare_optional(
                    self.last_modified_in_chpl.as_ref(),
                    other.last_modified_in_chpl.as_ref(),
                ),
            ),
            ("chpl_id", FieldMatch::of(&self.chpl_id, &other.chpl_id)),
        ]
    }
}

impl FieldwiseEq for Criterion {
    fn field_matches(&self, other: &Self) -> Vec<(&'static str, FieldMatch)> {
        vec![
            (
                "certification_id",
                FieldMatch::of(&self.certification_id, &other.certification_id),
            ),
            ("number", FieldMatch::of(&self.number, &other.number)),
            ("title", FieldMatch::of(&self.title, &other.title)),
            (
                "certification_edition_id",
                FieldMatch::of(
                    &self.certification_edition_id,
                    &other.certification_edition_id,
                ),
            ),
            (
                "certification_edition",
                FieldMatch::of(&self.certification_edition, &other.certification_edition),
            ),
            ("description", FieldMatch::of(&self.description, &other.description)),
            ("removed", FieldMatch::of(&self.removed, &other.removed)),
        ]
    }
}
