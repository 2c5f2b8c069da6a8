use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Role '{role}' lacks capability '{capability}'")]
    Forbidden { role: String, capability: String },

    #[error("{collaborator} failed: {message}")]
    Collaborator { collaborator: &'static str, message: String },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RiskError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { resource, id: id.into() }
    }
}

pub type RiskResult<T> = Result<T, RiskError>;
