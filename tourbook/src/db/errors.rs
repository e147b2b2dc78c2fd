use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        /// Table the violated index belongs to (if extractable)
        table: Option<String>,
        /// Columns covered by the violated index (if extractable)
        columns: Vec<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation { message: String },

    /// Check or not-null constraint violation
    #[error("Check constraint violation")]
    CheckViolation { message: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let (table, columns) = parse_unique_target(db_err.message());
                    DbError::UniqueViolation {
                        table,
                        columns,
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        message: db_err.message().to_string(),
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Extract table and columns from a SQLite unique violation message.
///
/// SQLite reports these as `UNIQUE constraint failed: reviews.tour_id, reviews.user_id`.
fn parse_unique_target(message: &str) -> (Option<String>, Vec<String>) {
    let Some((_, target)) = message.split_once("constraint failed:") else {
        return (None, Vec::new());
    };

    let mut table = None;
    let mut columns = Vec::new();
    for qualified in target.split(',') {
        if let Some((t, column)) = qualified.trim().split_once('.') {
            table.get_or_insert_with(|| t.to_string());
            columns.push(column.to_string());
        }
    }
    (table, columns)
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unique_target_composite() {
        let (table, columns) = parse_unique_target("UNIQUE constraint failed: reviews.tour_id, reviews.user_id");
        assert_eq!(table.as_deref(), Some("reviews"));
        assert_eq!(columns, vec!["tour_id".to_string(), "user_id".to_string()]);
    }

    #[test]
    fn test_parse_unique_target_unrecognised() {
        let (table, columns) = parse_unique_target("database is locked");
        assert!(table.is_none());
        assert!(columns.is_empty());
    }
}
