use std::fmt;
use thiserror::Error;

pub type Result<T, E = IdentityError> = std::result::Result<T, E>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Why a candidate identifier was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Empty,
    /// Rejected by the platform UUID parser.
    Syntax,
    Length(usize),
    Pattern,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Empty => f.write_str("empty UUID given"),
            InvalidReason::Syntax => f.write_str("not a UUID"),
            InvalidReason::Length(n) => write!(f, "length of UUID has to be 36 characters, got {n}"),
            InvalidReason::Pattern => f.write_str("does not match the UUID pattern"),
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier { value: String, reason: InvalidReason },

    #[error("local id {0:?} is not a non-negative integer")]
    InvalidLocalId(String),

    #[error("collection {0:?} is not known to the schema catalog")]
    UnknownCollection(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IdentityError {
    pub fn invalid(value: &str, reason: InvalidReason) -> Self {
        IdentityError::InvalidIdentifier {
            value: value.to_string(),
            reason,
        }
    }
}

/// Failure reported by a persistent store adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] redb::Error),

    #[error("corrupt {what}: {detail}")]
    Codec { what: &'static str, detail: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn codec(what: &'static str, detail: impl Into<String>) -> Self {
        StoreError::Codec {
            what,
            detail: detail.into(),
        }
    }
}

// redb splits its errors per operation; fold them all into redb::Error.
macro_rules! from_redb {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Database(redb::Error::from(e))
                }
            }

            impl From<$ty> for IdentityError {
                fn from(e: $ty) -> Self {
                    IdentityError::Store(StoreError::from(e))
                }
            }
        )*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
