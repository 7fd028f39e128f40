use crate::application::repos::RepoError;

// SQLSTATE class 23: integrity constraint violations.
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Translate sqlx failures into the repository error taxonomy.
///
/// Constraint violations are matched by SQLSTATE code, not message text:
/// the relation guard distinguishes duplicate edges from self-follow
/// rejections by the constraint that fired, so this mapping has to be
/// exact.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) => {
            let constraint = || db.constraint().unwrap_or("unknown").to_string();
            match db.code().as_deref() {
                Some(UNIQUE_VIOLATION) => RepoError::Duplicate {
                    constraint: constraint(),
                },
                Some(CHECK_VIOLATION) => RepoError::CheckViolation {
                    constraint: constraint(),
                },
                Some(FOREIGN_KEY_VIOLATION) => RepoError::InvalidReference {
                    message: db.message().to_string(),
                },
                _ => RepoError::Persistence(db.message().to_string()),
            }
        }
        other => RepoError::from_persistence(other),
    }
}
