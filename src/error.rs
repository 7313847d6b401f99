use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    FileNotFound,
    ParseError,
    IoError,
    InvalidRequest,
    InconsistentMapping,
    DetectorFailed,
    GitError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileNotFound => write!(f, "FILE_NOT_FOUND"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::IoError => write!(f, "IO_ERROR"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::InconsistentMapping => write!(f, "INCONSISTENT_MAPPING"),
            Self::DetectorFailed => write!(f, "DETECTOR_FAILED"),
            Self::GitError => write!(f, "GIT_ERROR"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ForkError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for ForkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ForkError {}

impl ForkError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::new(ErrorCode::FileNotFound, format!("File not found: {path}"))
    }

    pub fn parse_error(path: &str) -> Self {
        Self::new(ErrorCode::ParseError, format!("Failed to parse: {path}"))
    }

    pub fn inconsistent_mapping(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InconsistentMapping, message)
    }

    pub fn detector_failed(detector: &str, message: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::DetectorFailed,
            format!("Detector {detector} failed: {message}"),
        )
    }

    pub fn git(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::GitError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = ForkError::inconsistent_mapping("key a.B.c() != source a.B.d()");
        assert_eq!(
            err.to_string(),
            "[INCONSISTENT_MAPPING] key a.B.c() != source a.B.d()"
        );
    }

    #[test]
    fn downcast_through_anyhow() {
        let err: anyhow::Error = ForkError::git("merge-base failed").into();
        let fe = err.downcast_ref::<ForkError>().unwrap();
        assert_eq!(fe.code, ErrorCode::GitError);
    }
}
