use crate::store::StoreError;

pub type BankResult<T> = Result<T, BankError>;

#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("{0}")]
    NotFound(String),
    /// Rejected before any write was made.
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("concurrent update: {0}")]
    Conflict(String),
    #[error("remote call failed: {message}")]
    Remote { message: String, retryable: bool },
}

impl BankError {
    pub fn not_found(message: impl Into<String>) -> Self {
        BankError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        BankError::Validation(message.into())
    }

    pub fn remote(message: impl Into<String>) -> Self {
        BankError::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            BankError::Conflict(_) => true,
            BankError::Remote { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

impl From<StoreError> for BankError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { .. } | StoreError::DuplicateKey { .. } => {
                BankError::Conflict(e.to_string())
            }
            StoreError::Unavailable(_) => BankError::Remote {
                message: e.to_string(),
                retryable: true,
            },
            StoreError::Backend(_) | StoreError::Malformed(_) => BankError::Remote {
                message: e.to_string(),
                retryable: false,
            },
        }
    }
}
