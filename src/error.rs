//! Error types for the reply tree and its remote.

use thiserror::Error;

/// Failures reported by a [`PostRemote`](crate::remote::PostRemote).
///
/// The store never hands these to its caller. They are logged, or turned
/// into a [`Notice`](crate::store::Notice) for destructive actions.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("User is not authenticated")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Forbidden(String),

    #[error("Username already exists")]
    UsernameTaken,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Anything else a transport wants to report.
    #[error("{0}")]
    Other(String),
}

/// Bounds a post or profile must respect before it is persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Post text is required")]
    EmptyText,

    #[error("Post text is {len} characters, the limit is {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("Post has {count} images, the limit is {max}")]
    TooManyImages { count: usize, max: usize },

    #[error("{field} is required")]
    MissingField { field: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A store needs a signed-in viewer.
    #[error("User is not authenticated")]
    Unauthenticated,
}
