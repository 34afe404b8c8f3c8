//! Enrolled identities and the adapter from raw `{id, name, encoding}` records.

use crate::types::{EnrolledIdentity, FaceDescriptor, PersonId};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use thiserror::Error;

/// One enrollment row as supplied by the caller.
///
/// Fields are optional so that a single bad row can be reported and skipped
/// instead of failing deserialization of the whole snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    #[serde(default)]
    pub id: Option<PersonId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub encoding: Option<serde_json::Value>,
}

/// Why an enrollment record was excluded from matching.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedEnrollment {
    #[error("record {index}: {reason}")]
    Invalid { index: usize, reason: String },
    #[error("record {index}: missing id")]
    MissingId { index: usize },
    #[error("record {index} (id {id}): missing name")]
    MissingName { index: usize, id: PersonId },
    #[error("record {index} (id {id}): missing encoding")]
    MissingEncoding { index: usize, id: PersonId },
    #[error("record {index} (id {id}): encoding is not an array")]
    NotAnArray { index: usize, id: PersonId },
    #[error("record {index} (id {id}): encoding is empty")]
    Empty { index: usize, id: PersonId },
    #[error("record {index} (id {id}): encoding element {position} is not a finite number")]
    NonNumeric { index: usize, id: PersonId, position: usize },
    #[error("record {index} (id {id}): expected {expected} values, got {actual}")]
    WrongLength { index: usize, id: PersonId, expected: usize, actual: usize },
}

/// Ordered, id-unique set of enrolled identities.
///
/// Built once per request and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    identities: Vec<EnrolledIdentity>,
}

impl Registry {
    /// Build a registry, merging identities that share an id.
    ///
    /// The first occurrence fixes position and name; later occurrences append
    /// their descriptors. Identities left without descriptors are dropped.
    pub fn new(identities: impl IntoIterator<Item = EnrolledIdentity>) -> Self {
        let mut merged: Vec<EnrolledIdentity> = Vec::new();
        let mut index: HashMap<PersonId, usize> = HashMap::new();

        for identity in identities {
            match index.get(&identity.id) {
                Some(&pos) => merged[pos].descriptors.extend(identity.descriptors),
                None => {
                    index.insert(identity.id.clone(), merged.len());
                    merged.push(identity);
                }
            }
        }

        merged.retain(|i| !i.descriptors.is_empty());
        Self { identities: merged }
    }

    /// Adapt raw enrollment records, skipping (and logging) malformed ones.
    ///
    /// `expected_dim` pins the descriptor length; when `None`, the first
    /// well-formed encoding decides it.
    pub fn from_records(
        records: &[EnrollmentRecord],
        expected_dim: Option<usize>,
    ) -> (Self, Vec<MalformedEnrollment>) {
        Self::build(records.iter().map(Ok), expected_dim)
    }

    /// Like [`Registry::from_records`], for records still in JSON form.
    ///
    /// An element that does not deserialize (not an object, a fractional id,
    /// a non-string name) is rejected with the serde error as its reason.
    pub fn from_values(
        values: &[serde_json::Value],
        expected_dim: Option<usize>,
    ) -> (Self, Vec<MalformedEnrollment>) {
        let rows = values
            .iter()
            .map(|value| EnrollmentRecord::deserialize(value).map_err(|e| e.to_string()));
        Self::build(rows, expected_dim)
    }

    fn build<R: Borrow<EnrollmentRecord>>(
        rows: impl ExactSizeIterator<Item = Result<R, String>>,
        expected_dim: Option<usize>,
    ) -> (Self, Vec<MalformedEnrollment>) {
        let mut dim = expected_dim;
        let mut accepted = Vec::with_capacity(rows.len());
        let mut rejected = Vec::new();

        for (index, row) in rows.enumerate() {
            let parsed = row
                .map_err(|reason| MalformedEnrollment::Invalid { index, reason })
                .and_then(|record| parse_record(index, record.borrow(), dim));
            match parsed {
                Ok(identity) => {
                    dim.get_or_insert(identity.descriptors[0].len());
                    accepted.push(identity);
                }
                Err(defect) => {
                    tracing::warn!(error = %defect, "excluding malformed enrollment");
                    rejected.push(defect);
                }
            }
        }

        let registry = Self::new(accepted);
        tracing::debug!(
            identities = registry.len(),
            descriptors = registry.descriptor_count(),
            rejected = rejected.len(),
            "registry built"
        );
        (registry, rejected)
    }

    pub fn identities(&self) -> &[EnrolledIdentity] {
        &self.identities
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnrolledIdentity> {
        self.identities.iter()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Total number of enrolled descriptors across all identities.
    pub fn descriptor_count(&self) -> usize {
        self.identities.iter().map(|i| i.descriptors.len()).sum()
    }
}

fn parse_record(
    index: usize,
    record: &EnrollmentRecord,
    expected_dim: Option<usize>,
) -> Result<EnrolledIdentity, MalformedEnrollment> {
    let id = record.id.clone().ok_or(MalformedEnrollment::MissingId { index })?;
    let name = match &record.name {
        Some(name) => name.clone(),
        None => return Err(MalformedEnrollment::MissingName { index, id }),
    };

    let values = match &record.encoding {
        None | Some(serde_json::Value::Null) => {
            return Err(MalformedEnrollment::MissingEncoding { index, id })
        }
        Some(serde_json::Value::Array(values)) => values,
        Some(_) => return Err(MalformedEnrollment::NotAnArray { index, id }),
    };

    if values.is_empty() {
        return Err(MalformedEnrollment::Empty { index, id });
    }

    let mut descriptor = Vec::with_capacity(values.len());
    for (position, value) in values.iter().enumerate() {
        match value.as_f64().map(|v| v as f32) {
            Some(v) if v.is_finite() => descriptor.push(v),
            _ => return Err(MalformedEnrollment::NonNumeric { index, id, position }),
        }
    }

    if let Some(expected) = expected_dim {
        if descriptor.len() != expected {
            return Err(MalformedEnrollment::WrongLength {
                index,
                id,
                expected,
                actual: descriptor.len(),
            });
        }
    }

    Ok(EnrolledIdentity {
        id,
        name,
        descriptors: vec![FaceDescriptor::new(descriptor)],
    })
}
