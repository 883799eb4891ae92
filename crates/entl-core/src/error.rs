//! # Error Hierarchy
//!
//! Structured error types for the entitlement domain, built with `thiserror`.
//! No `Box<dyn Error>`, no `.unwrap()` outside tests.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while loading or evaluating an entitlement policy.
///
/// None of these are recovered locally: a policy that cannot be read is
/// fatal to the request or command that needed it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A threshold key is absent from the site's `ENTITLEMENT_POLICY`.
    #[error("entitlement policy is missing key '{0}'")]
    MissingKey(&'static str),

    /// A threshold key is present but is not a non-negative integer.
    #[error("entitlement policy key '{key}' must be a non-negative integer, got {value}")]
    InvalidValue {
        /// The offending key.
        key: &'static str,
        /// The raw JSON value found.
        value: String,
    },

    /// The `ENTITLEMENT_POLICY` entry exists but is not a JSON object.
    #[error("site configuration entry '{0}' is not an object")]
    NotAnObject(String),

    /// The enrolled course run could not be resolved in the course catalog.
    #[error("course run '{0}' not found in catalog")]
    UnknownCourseRun(String),
}

/// Errors raised by entitlement state changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// `expired_at` is set and the update would clear it.
    #[error("entitlement {uuid} expired at {expired_at}; expiration cannot be cleared")]
    ExpirationCleared {
        uuid: Uuid,
        expired_at: DateTime<Utc>,
    },

    /// `expired_at` is set and the update would move it to another instant.
    #[error("entitlement {uuid} already expired at {expired_at}")]
    AlreadyExpired {
        uuid: Uuid,
        expired_at: DateTime<Utc>,
    },

    /// The requested course mode is not one of the known modes.
    #[error("unknown course mode '{0}'")]
    UnknownMode(String),
}

/// Errors reading or writing a dataset file.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// I/O error.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("invalid dataset JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}
