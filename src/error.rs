use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{entity} name already exists: {name}")]
    DuplicateName { entity: &'static str, name: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("section {section_id} does not belong to class {class_id}")]
    SectionClassMismatch { section_id: i64, class_id: i64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no students found in class {0}")]
    NoStudents(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Stable code reported across the IPC boundary.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::DuplicateName { .. } => "duplicate_name",
            EngineError::NotFound { .. } => "not_found",
            EngineError::SectionClassMismatch { .. } => "section_class_mismatch",
            EngineError::InvalidInput(_) => "bad_params",
            EngineError::NoStudents(_) => "no_students",
            EngineError::Storage(_) => "db_storage_failed",
        }
    }

    /// Storage faults leave the store untouched, so the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }
}
