// Error types for the emotion overlay application

use thiserror::Error;

/// Main error type for the application
#[derive(Debug, Error)]
pub enum MoodLensError {
    #[error("inference runtime initialization failed: {0}")]
    RuntimeInit(String),

    #[error("model loading failed: {0}")]
    ModelLoad(String),

    #[error("model download failed for {url}: {message}")]
    ModelFetch { url: String, message: String },

    #[error("camera access denied or no camera found")]
    CameraAccess,

    #[error("camera initialization failed: {0}")]
    CameraInit(String),

    #[error("frame processing failed: {0}")]
    FrameProcessing(String),

    #[error("face detection failed: {0}")]
    FaceDetection(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for application operations
pub type Result<T> = std::result::Result<T, MoodLensError>;

// Conversion from nokhwa errors
impl From<nokhwa::NokhwaError> for MoodLensError {
    fn from(err: nokhwa::NokhwaError) -> Self {
        match err {
            nokhwa::NokhwaError::StructureError { structure, error } => {
                MoodLensError::CameraInit(format!("{structure}: {error}"))
            }
            nokhwa::NokhwaError::OpenDeviceError(device, error) => {
                MoodLensError::CameraInit(format!("Device {device}: {error}"))
            }
            nokhwa::NokhwaError::GetPropertyError { property, error } => {
                MoodLensError::CameraInit(format!("Property {property}: {error}"))
            }
            _ => MoodLensError::CameraInit(err.to_string()),
        }
    }
}

// Conversion from OpenCV errors
impl From<opencv::Error> for MoodLensError {
    fn from(err: opencv::Error) -> Self {
        MoodLensError::FaceDetection(err.to_string())
    }
}

// Conversion from ONNX Runtime errors
impl From<ort::Error> for MoodLensError {
    fn from(err: ort::Error) -> Self {
        MoodLensError::Inference(err.to_string())
    }
}
