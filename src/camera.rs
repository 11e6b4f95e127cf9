// Camera module for webcam capture

use crate::config::AppConfig;
use crate::error::{MoodLensError, Result};
use crate::models::Frame;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{error, info};

/// Owns the live capture stream. The stream is released exactly once, on
/// explicit release or on drop, whichever comes first.
pub struct CameraManager {
    camera: Camera,
    released: bool,
}

impl CameraManager {
    /// Opens a camera at the configured resolution. Tries index 0, then 1
    /// (some systems enumerate the default device at 1).
    pub fn open(config: &AppConfig) -> Result<Self> {
        let requested_format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            nokhwa::utils::CameraFormat::new(
                nokhwa::utils::Resolution::new(config.camera_width, config.camera_height),
                nokhwa::utils::FrameFormat::YUYV,
                config.camera_fps,
            ),
        ));

        let camera = Self::try_open_camera(0, requested_format)
            .or_else(|_| Self::try_open_camera(1, requested_format))
            .map_err(|e| {
                error!("Failed to open camera on indices 0 and 1: {}", e);
                MoodLensError::CameraAccess
            })?;

        info!("Opened camera: {}", camera.info().human_name());
        Ok(Self {
            camera,
            released: false,
        })
    }

    /// Helper to try opening a camera at a specific index
    fn try_open_camera(index: u32, requested_format: RequestedFormat) -> Result<Camera> {
        Camera::new(CameraIndex::Index(index), requested_format)
            .map_err(|e| MoodLensError::CameraInit(e.to_string()))
    }

    /// Opens the camera stream and verifies it produces frames. Permission
    /// denial commonly shows up here rather than at device open.
    pub fn ensure_stream_open(&mut self) -> Result<()> {
        let _ = self.camera.open_stream();

        // Give the device a moment to start delivering frames
        std::thread::sleep(std::time::Duration::from_millis(200));

        match self.camera.frame() {
            Ok(_) => Ok(()),
            Err(e) => {
                error!("Camera stream not producing frames: {}", e);
                Err(MoodLensError::CameraAccess)
            }
        }
    }

    /// Grabs and decodes the most recent frame (blocking).
    /// The stream must be opened first with ensure_stream_open()
    pub fn get_current_frame(&mut self) -> Result<Frame> {
        let frame_data = self.camera.frame().map_err(|e| {
            MoodLensError::FrameProcessing(format!("Failed to capture frame: {e}"))
        })?;

        let buffer = frame_data.decode_image::<RgbFormat>().map_err(|e| {
            MoodLensError::FrameProcessing(format!("Failed to decode frame: {e}"))
        })?;

        let (width, height) = (buffer.width(), buffer.height());
        Ok(Frame::new(buffer.into_raw(), width, height))
    }

    /// Returns the current camera resolution
    #[allow(dead_code)]
    pub fn resolution(&self) -> (u32, u32) {
        let res = self.camera.resolution();
        (res.width(), res.height())
    }

    /// Stops the capture stream. Safe to call more than once; only the
    /// first call touches the device.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.camera.stop_stream() {
            error!("Error stopping camera stream: {}", e);
        }
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.release();
    }
}
