use crate::store::StoreError;

/// One failed validation check, tied to the field (or question id) that
/// tripped it.
#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Engine-level failure taxonomy. Everything user-facing the session state
/// machine, grading engine or validator can refuse ends up here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Definition or answer shape invalid. Blocks publish or submit; never
    /// silently dropped.
    #[error("validation failed: {0:?}")]
    Validation(Vec<ValidationError>),

    /// `max_attempts` reached for the (questionnaire, student) pair.
    /// Terminal, not retried.
    #[error("attempt budget exhausted")]
    AttemptBudgetExhausted,

    /// Due date passed (or timer expired) and late submission disallowed.
    #[error("questionnaire is overdue")]
    Overdue,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Store unavailable or a raced uniqueness conflict the engine could not
    /// resolve. Callers retry per their own policy.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation(vec![ValidationError::new(field, message)])
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
