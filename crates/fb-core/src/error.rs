use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    #[error("invalid record interval")]
    InvalidInterval,
    #[error("key extraction error")]
    KeyExtraction,
    #[error("stale insert")]
    StaleInsert,
    #[error("bin capacity exceeded")]
    Capacity,
    #[error("resource exhausted")]
    Resource,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::InvalidInterval => 1001,
            Self::KeyExtraction => 1002,
            Self::StaleInsert => 1003,
            Self::Capacity => 1004,
            Self::Resource => 1005,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;
