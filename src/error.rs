//! Error types for the card_grader library

use thiserror::Error;

/// Result type alias for card_grader operations
pub type Result<T> = std::result::Result<T, GradingError>;

/// Error taxonomy for detection, analysis and grading
#[derive(Error, Debug)]
pub enum GradingError {
    /// Image file could not be loaded or decoded
    #[error("Failed to load image: {message}")]
    ImageLoadError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// EXIF metadata could not be read
    #[error("EXIF processing error: {message}")]
    ExifError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No strategy (nor the vision fallback) produced a usable card boundary
    #[error("Card detection failed: {reason}")]
    DetectionFailure { reason: String },

    /// A single analyzer could not compute a meaningful measurement
    #[error("{analyzer} analysis failed: {reason}")]
    AnalysisFailure {
        analyzer: &'static str,
        reason: String,
    },

    /// The vision fallback returned an error or malformed output
    #[error("External service '{service}' failed: {reason}")]
    ExternalServiceFailure { service: String, reason: String },

    /// The vision fallback did not answer in time
    #[error("External service '{service}' timed out after {timeout_ms}ms")]
    FallbackTimeout { service: String, timeout_ms: u64 },

    /// Geometric or numeric precondition broken (degenerate quad, empty ROI)
    #[error("Invariant violated: {what}")]
    InvariantViolation { what: String },

    /// Invalid input parameters
    #[error("Invalid parameter: {parameter} = {value}")]
    InvalidParameter { parameter: String, value: String },

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The request was cancelled by its caller
    #[error("Grading cancelled")]
    Cancelled,

    /// Generic processing error
    #[error("Processing error: {message}")]
    ProcessingError { message: String },
}

impl GradingError {
    /// Create an image load error with context
    pub fn image_load<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ImageLoadError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an EXIF processing error with context
    pub fn exif<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ExifError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error with context
    pub fn config<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ConfigError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a per-analyzer failure
    pub fn analysis(analyzer: &'static str, reason: impl Into<String>) -> Self {
        Self::AnalysisFailure {
            analyzer,
            reason: reason.into(),
        }
    }

    pub fn invariant(what: impl Into<String>) -> Self {
        Self::InvariantViolation { what: what.into() }
    }

    pub fn invalid_parameter(parameter: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            value: value.to_string(),
        }
    }

    /// Check if grading can continue past this error with a conservative result
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            GradingError::ImageLoadError { .. }
                | GradingError::ConfigError { .. }
                | GradingError::InvalidParameter { .. }
                | GradingError::Cancelled
        )
    }

    /// Get user-friendly error description for application display
    pub fn user_message(&self) -> String {
        match self {
            GradingError::ImageLoadError { .. } => {
                "Could not load the image. Please check the file format and try again.".to_string()
            }
            GradingError::DetectionFailure { .. } => {
                "Could not find the card in the photo. Place it on a plain, contrasting background and retake.".to_string()
            }
            GradingError::AnalysisFailure { analyzer, .. } => {
                format!("The {} check could not be completed; a conservative score was used.", analyzer)
            }
            GradingError::ExternalServiceFailure { .. } | GradingError::FallbackTimeout { .. } => {
                "Assisted card detection is unavailable right now. Results use on-device detection only.".to_string()
            }
            GradingError::Cancelled => "Grading was cancelled.".to_string(),
            _ => "Card grading failed. Please try with a different photo.".to_string(),
        }
    }
}
