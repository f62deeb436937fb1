use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::equality::FieldwiseEq;
use super::types::{Criterion, Product};
use super::TARGET_CATALOG;
use crate::error::ReconcileError;

/// Entities ordered by certification edition and then certification date.
pub trait Precedence: FieldwiseEq {
    fn certification_edition(&self) -> &str;
    fn certification_date(&self) -> Option<DateTime<Utc>>;
    fn identity(&self) -> String;
}

impl Precedence for Product {
    fn certification_edition(&self) -> &str {
        &self.certification_edition
    }

    fn certification_date(&self) -> Option<DateTime<Utc>> {
        self.certification_date
    }

    fn identity(&self) -> String {
        Product::identity(self)
    }
}

impl Precedence for Criterion {
    fn certification_edition(&self) -> &str {
        &self.certification_edition
    }

    // CHPL does not date criteria
    fn certification_date(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn identity(&self) -> String {
        Criterion::identity(self)
    }
}

fn edition_year<E: Precedence>(entity: &E) -> Result<i32, ReconcileError> {
    entity
        .certification_edition()
        .trim()
        .parse::<i32>()
        .map_err(|_| ReconcileError::MalformedEdition {
            identity: entity.identity(),
            edition: entity.certification_edition().to_string(),
        })
}

/// Decide whether `incoming` should replace the stored `existing` record.
///
/// Equal content never updates. Otherwise the later certification edition
/// wins, then the later certification date. When both tie but the content
/// differs the precedence is unknown and an `AmbiguousPrecedence` error is
/// returned so the caller leaves the record alone.
pub fn needs_update<E: Precedence>(existing: &E, incoming: &E) -> Result<bool, ReconcileError> {
    let Some(field) = existing.first_difference(incoming) else {
        return Ok(false);
    };

    debug!(
        target: TARGET_CATALOG,
        "{} differs from stored record in '{}'", incoming.identity(), field
    );

    let existing_edition = edition_year(existing)?;
    let incoming_edition = edition_year(incoming)?;
    match incoming_edition.cmp(&existing_edition) {
        Ordering::Greater => return Ok(true),
        Ordering::Less => return Ok(false),
        Ordering::Equal => {}
    }

    // a dated record is newer than an undated one
    match incoming.certification_date().cmp(&existing.certification_date()) {
        Ordering::Greater => return Ok(true),
        Ordering::Less => return Ok(false),
        Ordering::Equal => {}
    }

    Err(ReconcileError::AmbiguousPrecedence {
        existing: existing.identity(),
        incoming: incoming.identity(),
    })
}
