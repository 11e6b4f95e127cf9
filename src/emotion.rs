// Face and expression detection backend

use crate::error::{MoodLensError, Result};
use crate::models::{EmotionDistribution, EmotionLabel, FaceExpression, FaceRegion, Frame};
use ndarray::Array4;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use tracing::{error, warn};

/// Classifier input edge length in pixels
const CLASSIFIER_INPUT_SIZE: i32 = 260;

/// Detection capability consumed by the polling loop. The concrete
/// backend is an external collaborator wired in at startup.
///
/// Implementations may be stateful, hence `&mut self`.
pub trait ExpressionDetector: Send {
    /// Finds the single most prominent face in the frame and its
    /// expression distribution. Ok(None) means no face was detected.
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceExpression>>;
}

/// Initializes the inference runtime. Must succeed before any model loads.
pub fn init_runtime() -> Result<()> {
    ort::init()
        .with_name("moodlens")
        .commit()
        .map_err(|e| MoodLensError::RuntimeInit(e.to_string()))?;
    Ok(())
}

/// Face detector backed by an OpenCV Haar cascade
pub struct FaceDetector {
    classifier: CascadeClassifier,
}

/// A grayscale face crop plus where it came from in the frame
struct DetectedFace {
    region: FaceRegion,
    gray_data: Vec<u8>,
    gray_height: u32,
}

impl FaceDetector {
    /// Loads the Haar cascade from the resolved artifact path
    pub fn load(cascade_path: &Path) -> Result<Self> {
        let path = cascade_path.to_string_lossy();
        let classifier = CascadeClassifier::new(&path).map_err(|e| {
            error!("Failed to load Haar cascade: {}", e);
            MoodLensError::ModelLoad(format!("Haar cascade load failed: {e}"))
        })?;

        if classifier.empty()? {
            return Err(MoodLensError::ModelLoad(
                "Haar cascade classifier is empty".to_string(),
            ));
        }

        Ok(Self { classifier })
    }

    /// Detects the most prominent (largest) face in the frame
    fn detect_primary_face(&mut self, frame: &Frame) -> Result<Option<DetectedFace>> {
        let mat = Mat::from_slice(&frame.data).map_err(|e| {
            MoodLensError::FaceDetection(format!("Failed to create Mat: {e}"))
        })?;

        let mat = mat.reshape(3, frame.height as i32).map_err(|e| {
            MoodLensError::FaceDetection(format!("Failed to reshape Mat: {e}"))
        })?;

        // Grayscale for cascade detection
        let mut gray = Mat::default();
        imgproc::cvt_color(
            &mat,
            &mut gray,
            imgproc::COLOR_RGB2GRAY,
            0,
            opencv::core::AlgorithmHint::ALGO_HINT_DEFAULT,
        )
        .map_err(|e| {
            MoodLensError::FaceDetection(format!("Failed to convert to grayscale: {e}"))
        })?;

        let mut faces = Vector::<Rect>::new();
        self.classifier
            .detect_multi_scale(
                &gray,
                &mut faces,
                1.1,               // scale factor
                5,                 // min neighbors
                0,                 // flags
                Size::new(40, 40), // min size
                Size::new(0, 0),   // max size (unbounded)
            )
            .map_err(|e| {
                MoodLensError::FaceDetection(format!("Face detection failed: {e}"))
            })?;

        // Haar detections carry no score; the largest region is the most
        // prominent face
        let Some(rect) = faces
            .iter()
            .max_by_key(|r| i64::from(r.width) * i64::from(r.height))
        else {
            return Ok(None);
        };

        let (gray_data, gray_height) = self.extract_face_region(&gray, rect)?;
        Ok(Some(DetectedFace {
            region: FaceRegion::new(
                rect.x as f32,
                rect.y as f32,
                rect.width as f32,
                rect.height as f32,
            ),
            gray_data,
            gray_height,
        }))
    }

    /// Extracts and crops a face region from the grayscale image
    fn extract_face_region(&self, gray: &Mat, rect: Rect) -> Result<(Vec<u8>, u32)> {
        let face_roi = Mat::roi(gray, rect).map_err(|e| {
            MoodLensError::FaceDetection(format!("Failed to crop face region: {e}"))
        })?;

        // Clone so the data is continuous in memory
        let face_continuous = face_roi.try_clone().map_err(|e| {
            MoodLensError::FaceDetection(format!("Failed to clone face ROI: {e}"))
        })?;

        let face_data = face_continuous.data_bytes().map_err(|e| {
            MoodLensError::FaceDetection(format!("Failed to get face data: {e}"))
        })?;

        Ok((face_data.to_vec(), rect.height as u32))
    }
}

/// Preprocesses a grayscale face crop for classifier input: RGB,
/// 260x260, floats normalized to [0, 1], HWC layout
fn preprocess_face(face_data: &[u8], face_height: u32) -> Result<Vec<f32>> {
    let face_mat = Mat::from_slice(face_data).map_err(|e| {
        MoodLensError::FrameProcessing(format!("Failed to create face Mat: {e}"))
    })?;

    let face_mat = face_mat.reshape(1, face_height as i32).map_err(|e| {
        MoodLensError::FrameProcessing(format!("Failed to reshape face Mat: {e}"))
    })?;

    // The classifier expects RGB input
    let mut rgb_mat = Mat::default();
    imgproc::cvt_color_def(&face_mat, &mut rgb_mat, imgproc::COLOR_GRAY2RGB).map_err(|e| {
        MoodLensError::FrameProcessing(format!("Failed to convert to RGB: {e}"))
    })?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb_mat,
        &mut resized,
        Size::new(CLASSIFIER_INPUT_SIZE, CLASSIFIER_INPUT_SIZE),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )
    .map_err(|e| MoodLensError::FrameProcessing(format!("Failed to resize face: {e}")))?;

    let data = resized.data_bytes().map_err(|e| {
        MoodLensError::FrameProcessing(format!("Failed to get resized data: {e}"))
    })?;

    Ok(data.iter().map(|&pixel| pixel as f32 / 255.0).collect())
}

/// Expression classifier backed by an ONNX session
pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    /// Loads the ONNX model from the resolved artifact path
    pub fn load(model_path: &Path) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| {
                MoodLensError::ModelLoad(format!("Failed to create session builder: {e}"))
            })?
            .commit_from_file(model_path)
            .map_err(|e| {
                error!("Failed to load ONNX model: {}", e);
                MoodLensError::ModelLoad(format!("ONNX model load failed: {e}"))
            })?;

        Ok(Self { session })
    }

    /// Classifies a preprocessed face into an expression distribution
    pub fn classify(&mut self, preprocessed_face: &[f32]) -> Result<EmotionDistribution> {
        let height = CLASSIFIER_INPUT_SIZE as usize;
        let width = CLASSIFIER_INPUT_SIZE as usize;
        let channels = 3;

        // Model input is CHW; preprocessed data is HWC
        let mut chw_data = vec![0.0f32; channels * height * width];
        for h in 0..height {
            for w in 0..width {
                for c in 0..channels {
                    let hwc_idx = (h * width + w) * channels + c;
                    let chw_idx = c * (height * width) + h * width + w;
                    chw_data[chw_idx] = preprocessed_face[hwc_idx];
                }
            }
        }

        let input_array = Array4::from_shape_vec((1, 3, height, width), chw_data)
            .map_err(|e| MoodLensError::Inference(format!("Failed to create input array: {e}")))?;

        let input_tensor = Value::from_array(input_array).map_err(|e| {
            MoodLensError::Inference(format!("Failed to create input tensor: {e}"))
        })?;

        let inputs = ort::inputs![input_tensor];
        let outputs = self.session.run(inputs).map_err(|e| {
            error!("ONNX inference failed: {}", e);
            MoodLensError::Inference(format!("Inference failed: {e}"))
        })?;

        let (_, output_value) = outputs
            .iter()
            .next()
            .ok_or_else(|| MoodLensError::Inference("No output from model".to_string()))?;

        let tensor = output_value.try_extract_tensor::<f32>().map_err(|e| {
            MoodLensError::Inference(format!("Failed to extract output tensor: {e}"))
        })?;

        let logits = tensor.1;
        if logits.is_empty() {
            return Err(MoodLensError::Inference(
                "Empty output from model".to_string(),
            ));
        }

        Ok(distribution_from_logits(logits))
    }
}

/// Softmaxes classifier logits into a distribution over the label set.
///
/// Classifier output order: 0=angry, 1=disgusted, 2=fearful, 3=happy,
/// 4=sad, 5=surprised, 6=neutral, 7=contempt. Contempt has no label of
/// its own and folds into disgusted.
fn distribution_from_logits(logits: &[f32]) -> EmotionDistribution {
    let max_logit = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();

    let mut distribution = EmotionDistribution::new();
    for (index, &logit) in logits.iter().enumerate() {
        let probability = (logit - max_logit).exp() / exp_sum;
        distribution.add(label_for_index(index), probability);
    }
    distribution
}

/// Maps a classifier output index to its emotion label
fn label_for_index(index: usize) -> EmotionLabel {
    match index {
        0 => EmotionLabel::Angry,
        1 => EmotionLabel::Disgusted,
        2 => EmotionLabel::Fearful,
        3 => EmotionLabel::Happy,
        4 => EmotionLabel::Sad,
        5 => EmotionLabel::Surprised,
        6 => EmotionLabel::Neutral,
        7 => EmotionLabel::Disgusted, // contempt
        _ => {
            warn!("Unknown emotion index: {}, folding into neutral", index);
            EmotionLabel::Neutral
        }
    }
}

/// The concrete detection backend: Haar cascade face detection feeding an
/// ONNX expression classifier
pub struct OnnxExpressionDetector {
    face_detector: FaceDetector,
    classifier: ExpressionClassifier,
}

impl OnnxExpressionDetector {
    /// Loads both model artifacts. Both must succeed; there is no
    /// partial-readiness state.
    pub fn load(face_model: &Path, expression_model: &Path) -> Result<Self> {
        let face_detector = FaceDetector::load(face_model)?;
        let classifier = ExpressionClassifier::load(expression_model)?;

        Ok(Self {
            face_detector,
            classifier,
        })
    }
}

impl ExpressionDetector for OnnxExpressionDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceExpression>> {
        let Some(face) = self.face_detector.detect_primary_face(frame)? else {
            return Ok(None);
        };

        let preprocessed = preprocess_face(&face.gray_data, face.gray_height)?;
        let expressions = self.classifier.classify(&preprocessed)?;

        Ok(Some(FaceExpression {
            region: face.region,
            expressions,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distribution_from_logits_is_softmax() {
        // Uniform logits: every label of the 8-class output gets 1/8,
        // with contempt folding into disgusted for a 2/8 share.
        let dist = distribution_from_logits(&[0.0; 8]);
        assert_relative_eq!(dist.get(EmotionLabel::Happy), 0.125, epsilon = 1e-6);
        assert_relative_eq!(dist.get(EmotionLabel::Disgusted), 0.25, epsilon = 1e-6);

        let total: f32 = dist.iter().map(|(_, v)| v).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_distribution_peaks_at_largest_logit() {
        // Index 3 is happy
        let dist = distribution_from_logits(&[0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(dist.dominant().unwrap().label, EmotionLabel::Happy);
        assert!(dist.get(EmotionLabel::Happy) > 0.9);
    }

    #[test]
    fn test_distribution_values_in_unit_interval() {
        let dist = distribution_from_logits(&[-10.0, 3.0, 0.5, 2.0, -1.0, 7.0, 0.0, 1.0]);
        for (_, value) in dist.iter() {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_unknown_index_folds_into_neutral() {
        assert_eq!(label_for_index(12), EmotionLabel::Neutral);
    }

    #[test]
    fn test_seven_class_output_has_no_contempt_fold() {
        let dist = distribution_from_logits(&[0.0; 7]);
        let expected = 1.0 / 7.0;
        assert_relative_eq!(
            dist.get(EmotionLabel::Disgusted),
            expected,
            epsilon = 1e-6
        );
    }
}
