mod analysis;
mod camera;
mod config;
mod emotion;
mod error;
mod lifecycle;
mod model_store;
mod models;
mod ui;

use analysis::SharedSnapshot;
use config::AppConfig;
use error::{MoodLensError, Result};
use lifecycle::{Lifecycle, LifecyclePhase};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};
use ui::{DetectorSlot, MoodLensApp};

/// Initializes the logging system (file only, no console output)
fn init_logging() -> Result<()> {
    let log_file = std::fs::File::create("moodlens.log").map_err(MoodLensError::Io)?;

    let file_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    tracing_subscriber::registry().with(file_layer).init();

    Ok(())
}

fn flatten_task(
    result: std::result::Result<Result<PathBuf>, tokio::task::JoinError>,
) -> Result<PathBuf> {
    match result {
        Ok(inner) => inner,
        Err(e) => Err(MoodLensError::ModelLoad(format!("model task panicked: {e}"))),
    }
}

/// Runs the runtime and model stages on a dedicated thread. Each stage
/// starts only after its predecessor's readiness is recorded; any failure
/// is terminal and leaves downstream stages unstarted. The loaded backend
/// is left in the hand-off slot for the UI.
fn run_startup(config: AppConfig, lifecycle: Arc<Lifecycle>, detector_slot: DetectorSlot) {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            lifecycle.fail(format!("failed to start async runtime: {e}"));
            return;
        }
    };

    rt.block_on(async move {
        lifecycle.advance(LifecyclePhase::RuntimeLoading);
        if let Err(e) = emotion::init_runtime() {
            lifecycle.fail(e.to_string());
            return;
        }
        lifecycle.advance(LifecyclePhase::RuntimeReady);

        lifecycle.advance(LifecyclePhase::ModelsLoading);
        let cache_dir = match &config.model_cache_dir {
            Some(dir) => dir.clone(),
            None => match model_store::default_cache_dir() {
                Ok(dir) => dir,
                Err(e) => {
                    lifecycle.fail(e.to_string());
                    return;
                }
            },
        };

        // Both artifacts resolve concurrently
        let face_url = config.face_model_url.clone();
        let face_bundled = config.bundled_model_dir.clone();
        let face_cache = cache_dir.clone();
        let face_task = tokio::task::spawn_blocking(move || {
            model_store::resolve(
                config::FACE_MODEL_NAME,
                &face_url,
                Some(&face_bundled),
                &face_cache,
            )
        });

        let expression_url = config.expression_model_url.clone();
        let expression_bundled = config.bundled_model_dir.clone();
        let expression_cache = cache_dir.clone();
        let expression_task = tokio::task::spawn_blocking(move || {
            model_store::resolve(
                config::EXPRESSION_MODEL_NAME,
                &expression_url,
                Some(&expression_bundled),
                &expression_cache,
            )
        });

        let face_result = flatten_task(face_task.await);
        let expression_result = flatten_task(expression_task.await);

        let (face_path, expression_path) = match (face_result, expression_result) {
            (Ok(face_path), Ok(expression_path)) => (face_path, expression_path),
            (face_result, expression_result) => {
                let combined = [face_result.err(), expression_result.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                lifecycle.fail(format!("model loading failed: {combined}"));
                return;
            }
        };

        match emotion::OnnxExpressionDetector::load(&face_path, &expression_path) {
            Ok(detector) => {
                if let Ok(mut slot) = detector_slot.lock() {
                    *slot = Some(Box::new(detector));
                }
                lifecycle.advance(LifecyclePhase::ModelsReady);
            }
            Err(e) => {
                lifecycle.fail(e.to_string());
            }
        }
    });
}

fn main() -> Result<()> {
    init_logging()?;

    let config = AppConfig::load("moodlens.json").inspect_err(|e| {
        error!("Configuration error: {}", e);
    })?;

    let lifecycle = Arc::new(Lifecycle::new());
    let detector_slot: DetectorSlot = Arc::new(Mutex::new(None));
    let snapshot: SharedSnapshot = Arc::new(Mutex::new(None));

    {
        let config = config.clone();
        let lifecycle = lifecycle.clone();
        let detector_slot = detector_slot.clone();
        std::thread::spawn(move || run_startup(config, lifecycle, detector_slot));
    }

    let result = eframe::run_native(
        "MoodLens",
        eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size([1280.0, 960.0])
                .with_title("MoodLens"),
            ..Default::default()
        },
        Box::new(move |_cc| {
            Ok(Box::new(MoodLensApp::new(
                config,
                lifecycle,
                detector_slot,
                snapshot,
            )))
        }),
    );

    if let Err(e) = result {
        error!("Application error: {}", e);
    }

    Ok(())
}
