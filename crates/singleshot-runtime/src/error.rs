use std::sync::PoisonError;

const MIN_PLATFORM_ERROR: i32 = -1_073_741_824;

#[derive(thiserror::Error, Debug)]
pub enum MlError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Not supported: {0}")]
    NotSupported(String),
    #[error("The engine is busy with another invocation, try again later")]
    TryAgain,
    #[error("Timed out while waiting for the inference result")]
    TimedOut,
    #[error("Failed to invoke the model: {0}")]
    StreamError(String),
    #[error("Unknown error: {0}")]
    Unknown(String),
    #[error("The handle is closed or does not belong to a live engine")]
    InvalidHandle,
}

pub type MlResult<T> = Result<T, MlError>;

impl MlError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        MlError::InvalidParameter(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        MlError::NotSupported(message.into())
    }

    /// Numeric status in the errno style of the C API. Success is `0` and is
    /// never produced by an error value. An invalid handle reports the same code
    /// as an invalid parameter, like the C API does.
    pub fn code(&self) -> i32 {
        match self {
            MlError::InvalidParameter(_) | MlError::InvalidHandle => -22,
            MlError::TryAgain => -11,
            MlError::StreamError(_) => -86,
            MlError::Unknown(_) => MIN_PLATFORM_ERROR,
            MlError::TimedOut => MIN_PLATFORM_ERROR + 1,
            MlError::NotSupported(_) => MIN_PLATFORM_ERROR + 2,
        }
    }

    /// Whether retrying the same call without changing its arguments can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MlError::TryAgain | MlError::TimedOut | MlError::StreamError(_)
        )
    }
}

impl<T> From<PoisonError<T>> for MlError {
    fn from(error: PoisonError<T>) -> Self {
        MlError::Unknown(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_handle_shares_the_invalid_parameter_code() {
        assert_eq!(MlError::InvalidHandle.code(), MlError::invalid("x").code());
        assert_ne!(MlError::TimedOut.code(), MlError::TryAgain.code());
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(MlError::TryAgain.is_retryable());
        assert!(MlError::TimedOut.is_retryable());
        assert!(!MlError::InvalidHandle.is_retryable());
        assert!(!MlError::unsupported("fixed shape").is_retryable());
    }
}
