use thiserror::Error;

/// Closed set of failure kinds surfaced by the extraction pipeline.
/// Every error leaving the public API carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input is not a decodable image or a required argument is missing.
    InvalidInput,
    /// The recognition engine failed to initialize or load its model.
    EngineLoadFailed,
    /// No usable text lines were found in the MRZ crop region.
    NoMrzDetected,
    /// Engine confidence below threshold; text is unusable.
    ImageTooBlurry,
    /// Extracted fields failed two or more plausibility checks.
    PoorImageQuality,
    /// MRZ check digits rejected with no recoverable fields.
    InvalidChecksum,
    /// The pipeline did not complete within the allotted time.
    ProcessingTimeout,
    /// The caller cancelled the operation mid-flight.
    Cancelled,
    /// Catch-all for unexpected internal failures.
    ProcessingFailed,
}

impl ErrorCode {
    /// Plain-language, actionable message shown to the end user.
    /// Technical detail never surfaces here, only in `OcrError::technical`.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => {
                "The selected file is not a readable image. Please choose a photo of the passport data page."
            }
            ErrorCode::EngineLoadFailed => {
                "The text recognition engine could not be loaded. Check your connection and try again."
            }
            ErrorCode::NoMrzDetected => {
                "No machine-readable zone was found. Make sure the two lines at the bottom of the passport are fully visible."
            }
            ErrorCode::ImageTooBlurry => {
                "The photo is too blurry to read. Hold the camera steady and try again in better lighting."
            }
            ErrorCode::PoorImageQuality => {
                "The passport details could not be read reliably. Try a sharper photo without glare."
            }
            ErrorCode::InvalidChecksum => {
                "The machine-readable zone could not be verified. Retake the photo with the full data page in frame."
            }
            ErrorCode::ProcessingTimeout => {
                "Reading the passport took too long. Please try again."
            }
            ErrorCode::Cancelled => "The scan was cancelled.",
            ErrorCode::ProcessingFailed => {
                "Something went wrong while reading the passport. Please try again."
            }
        }
    }
}

/// Failure value propagated unchanged from the failure site to the caller.
/// Cloneable so deduplicated concurrent callers can share one failure.
#[derive(Debug, Clone, Error)]
#[error("{code:?}: {message}")]
pub struct OcrError {
    pub code: ErrorCode,
    /// User-facing description.
    pub message: String,
    /// Diagnostic detail for logs, never shown to end users.
    pub technical: Option<String>,
}

impl OcrError {
    pub fn new(code: ErrorCode) -> Self {
        OcrError {
            code,
            message: code.user_message().to_string(),
            technical: None,
        }
    }

    pub fn with_technical(code: ErrorCode, technical: impl Into<String>) -> Self {
        OcrError {
            code,
            message: code.user_message().to_string(),
            technical: Some(technical.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_plain_language() {
        // No code leaks raw technical vocabulary to the user.
        for code in [
            ErrorCode::InvalidInput,
            ErrorCode::EngineLoadFailed,
            ErrorCode::NoMrzDetected,
            ErrorCode::ImageTooBlurry,
            ErrorCode::PoorImageQuality,
            ErrorCode::InvalidChecksum,
            ErrorCode::ProcessingTimeout,
            ErrorCode::Cancelled,
            ErrorCode::ProcessingFailed,
        ] {
            let msg = code.user_message();
            assert!(!msg.is_empty());
            assert!(!msg.contains("Tesseract"));
        }
    }

    #[test]
    fn test_technical_detail_is_preserved() {
        let err = OcrError::with_technical(ErrorCode::ProcessingFailed, "decode exploded");
        assert_eq!(err.code, ErrorCode::ProcessingFailed);
        assert_eq!(err.technical.as_deref(), Some("decode exploded"));
        assert_ne!(err.message, "decode exploded");
    }
}
