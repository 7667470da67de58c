use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdErrorCode {
    Storage,
    DuplicateKey,
    PartitionAlreadyExists,
    Validation,
    InvalidConfig,
    Decode,
}

impl MdErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            MdErrorCode::Storage => "storage",
            MdErrorCode::DuplicateKey => "duplicate_key",
            MdErrorCode::PartitionAlreadyExists => "partition_already_exists",
            MdErrorCode::Validation => "validation",
            MdErrorCode::InvalidConfig => "invalid_config",
            MdErrorCode::Decode => "decode",
        }
    }
}

#[derive(Debug, Error)]
pub enum MdError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("duplicate key ({namespace}, {keytype}, {key})")]
    DuplicateKey {
        namespace: String,
        keytype: String,
        key: String,
    },
    #[error("partition '{name}' already exists")]
    PartitionAlreadyExists { name: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("decode error: {0}")]
    Decode(String),
}

impl MdError {
    pub fn code(&self) -> MdErrorCode {
        match self {
            MdError::Storage(_) => MdErrorCode::Storage,
            MdError::DuplicateKey { .. } => MdErrorCode::DuplicateKey,
            MdError::PartitionAlreadyExists { .. } => MdErrorCode::PartitionAlreadyExists,
            MdError::Validation(_) => MdErrorCode::Validation,
            MdError::InvalidConfig { .. } => MdErrorCode::InvalidConfig,
            MdError::Decode(_) => MdErrorCode::Decode,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// True for the errors that mean "this name or key is already taken",
    /// whether caught by a pre-check or by the primary key.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            MdError::DuplicateKey { .. } | MdError::PartitionAlreadyExists { .. }
        )
    }
}
