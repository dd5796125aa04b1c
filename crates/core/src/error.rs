use crate::job::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid upload: {0}")]
    UploadInvalid(String),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a missing job record.
    pub fn job_not_found(id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: "Job",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing artifact file.
    pub fn artifact_not_found(name: impl ToString) -> Self {
        CoreError::NotFound {
            entity: "Artifact",
            id: name.to_string(),
        }
    }
}
