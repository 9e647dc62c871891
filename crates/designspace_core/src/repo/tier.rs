//! Storage tier contracts.
//!
//! # Responsibility
//! - Define the two narrow storage granularities: bulk JSON documents and
//!   small string values.
//! - Report backend failures as values so the fail-soft `Store` can absorb
//!   them.
//!
//! # Invariants
//! - Tier implementations own no business semantics; keys and values are
//!   opaque strings.
//! - `remove` of an absent key succeeds.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type TierResult<T> = Result<T, TierError>;

/// Backend failure reported by a storage tier.
#[derive(Debug)]
pub enum TierError {
    /// SQLite-level failure.
    Db(DbError),
    /// Storage is disabled or unreachable.
    Unavailable(String),
    /// Write rejected because the tier is full.
    QuotaExceeded { key: String },
}

impl Display for TierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Unavailable(reason) => write!(f, "storage unavailable: {reason}"),
            Self::QuotaExceeded { key } => write!(f, "storage quota exceeded writing `{key}`"),
        }
    }
}

impl Error for TierError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Unavailable(_) | Self::QuotaExceeded { .. } => None,
        }
    }
}

impl From<DbError> for TierError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TierError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable tier for large serialized JSON documents.
pub trait BulkTier {
    fn read(&self, key: &str) -> TierResult<Option<String>>;
    /// Replaces any prior value stored under `key`.
    fn write(&self, key: &str, value: &str) -> TierResult<()>;
    fn remove(&self, key: &str) -> TierResult<()>;
}

/// Small synchronous string-to-string tier for indices and pointers.
pub trait KvTier {
    fn get(&self, key: &str) -> TierResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> TierResult<()>;
    fn remove(&self, key: &str) -> TierResult<()>;
}

impl<T: BulkTier + ?Sized> BulkTier for &T {
    fn read(&self, key: &str) -> TierResult<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, value: &str) -> TierResult<()> {
        (**self).write(key, value)
    }

    fn remove(&self, key: &str) -> TierResult<()> {
        (**self).remove(key)
    }
}

impl<T: KvTier + ?Sized> KvTier for &T {
    fn get(&self, key: &str) -> TierResult<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> TierResult<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> TierResult<()> {
        (**self).remove(key)
    }
}
