use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use thiserror::Error;

use crate::conduit::core::{record::ConduitId, validation::ConduitField};

#[derive(Debug, Error, PartialEq)]
pub enum ConduitError {
    #[error("Conduit error, validation failed ({0})")]
    Validation(FieldErrors),

    #[error("Conduit error, {0} is write-once and cannot be modified")]
    ImmutableField(&'static str),

    #[error("Conduit error, conduit not found (id: {0})")]
    NotFound(ConduitId),

    #[error("Conduit error, active conduit cannot be deleted (id: {0})")]
    ActiveConduitDeletion(ConduitId),

    #[error("Conduit error, conduit modified concurrently (id: {0})")]
    ConcurrentModification(ConduitId),

    #[error("Conduit error, curi collision persisted after retry")]
    CollisionExhausted,

    #[error("Conduit error, internal storage failure")]
    Storage(String),

    #[error("Conduit error, invalid curi configuration ({0})")]
    InvalidConfiguration(String),

    #[error("Conduit error, internal conduit API error")]
    InternalConduitError,
}

impl ConduitError {
    /// HTTP status code the transport layer reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ConduitError::Validation(_) => 422,
            ConduitError::ImmutableField(_) => 400,
            ConduitError::NotFound(_) => 404,
            ConduitError::ActiveConduitDeletion(_) => 403,
            ConduitError::ConcurrentModification(_) => 409,
            ConduitError::CollisionExhausted
            | ConduitError::Storage(_)
            | ConduitError::InvalidConfiguration(_)
            | ConduitError::InternalConduitError => 500,
        }
    }

    /// Whether the caller can fix the request and try again.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

impl From<FieldErrors> for ConduitError {
    fn from(errors: FieldErrors) -> Self {
        ConduitError::Validation(errors)
    }
}

/// Field name to message map produced by the policy validator.
///
/// Entries are ordered by declaration order of [`ConduitField`], so the
/// rendering of a given set of failures is stable.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<ConduitField, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure for `field`. The first message recorded for a field wins.
    pub fn insert(&mut self, field: ConduitField, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: ConduitField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: ConduitField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = ConduitField> + '_ {
        self.0.keys().copied()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field.name(), message)?;
            first = false;
        }
        Ok(())
    }
}
