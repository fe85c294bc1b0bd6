/// All errors that can be returned by a DocumentStore implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// No document with the given id exists in the collection.
    #[error("{collection} document not found: {id}")]
    NotFound { collection: String, id: String },

    /// A document with this id already exists in the collection.
    #[error("{collection} document already exists: {id}")]
    AlreadyExists { collection: String, id: String },

    /// Optimistic concurrency control conflict: the case was written by
    /// someone else since it was read.
    #[error(
        "concurrent conflict on case {case_id}: expected version {expected_version}, found {actual_version}"
    )]
    ConcurrentConflict {
        case_id: String,
        expected_version: i64,
        actual_version: i64,
    },

    /// A batch exceeded the per-commit operation ceiling.
    #[error("batch of {operations} operations exceeds the commit limit of {limit}")]
    BatchTooLarge { operations: usize, limit: usize },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn not_found(collection: &str, id: &str) -> Self {
        StorageError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(collection: &str, id: &str) -> Self {
        StorageError::AlreadyExists {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    /// True for the not-found variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
