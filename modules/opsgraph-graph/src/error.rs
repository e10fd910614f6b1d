use opsgraph_common::{EdgeKind, NodeKind};

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Database error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{kind} edge {from} -> {to} references a node that does not exist")]
    MissingEndpoint {
        kind: EdgeKind,
        from: String,
        to: String,
    },

    #[error("Node '{id}' is stored as {existing}; refusing to upsert it as {requested}")]
    TypeMismatch {
        id: String,
        existing: NodeKind,
        requested: NodeKind,
    },

    #[error("Corrupt graph row: {0}")]
    Decode(String),
}

impl GraphError {
    /// Rejections caused by the data being written rather than by the
    /// storage backend. Callers writing batches record these per item.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            GraphError::MissingEndpoint { .. } | GraphError::TypeMismatch { .. }
        )
    }
}
