use thiserror::Error;

pub const INTERNAL_FAULT_MESSAGE: &str = "An error occurred during the update process";
pub const UPDATE_SUCCESS_MESSAGE: &str = "System Updated Successfully";

/// Outcome kinds of an update request.
///
/// Every variant except `Internal` carries a message meant for the caller.
/// `Internal` wraps the full error chain, which is logged and never shown.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("You don't have enough permissions to perform this action")]
    PermissionDenied,
    #[error("{0}")]
    Validation(String),
    #[error("Permission Error while creating Temp Directory")]
    TempDirectory,
    #[error("Something went wrong. Please try again")]
    ArchiveOpen,
    #[error("Zip File is not Uploaded to Correct Path")]
    MalformedPackage,
    #[error("Error Occurred while moving a Zip File")]
    Move,
    #[error("Current system version not found")]
    VersionRecordMissing,
    #[error("{installed} Please update nearest version first")]
    VersionMismatch { installed: String },
    #[error("Source Code Zip Extraction Failed")]
    PayloadExtraction,
    #[error("Another update is already in progress")]
    UpdateInProgress,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl UpdateError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::Validation(_) => "validation_error",
            Self::TempDirectory => "permission_error",
            Self::ArchiveOpen => "archive_open_error",
            Self::MalformedPackage => "malformed_package",
            Self::Move => "move_error",
            Self::VersionRecordMissing => "version_record_missing",
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::PayloadExtraction => "payload_extraction_error",
            Self::UpdateInProgress => "update_in_progress",
            Self::Internal(_) => "internal_fault",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => INTERNAL_FAULT_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}
