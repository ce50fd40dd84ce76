//! Capture error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture backend not available: {0}")]
    NotAvailable(String),

    #[error("Permission denied - screen recording permission required")]
    PermissionDenied,

    #[error("Platform not supported")]
    UnsupportedPlatform,

    #[error("Capture initialization failed: {0}")]
    InitFailed(String),

    #[error("Frame capture failed: {0}")]
    CaptureFailed(String),

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("Capture target vanished: window {0:#x}")]
    StaleTarget(u64),

    #[error("Platform error: {0}")]
    Platform(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;
