// UI module for the emotion overlay application

use crate::analysis::{DetectionLoop, SharedSnapshot};
use crate::camera::CameraManager;
use crate::config::AppConfig;
use crate::emotion::ExpressionDetector;
use crate::lifecycle::{Lifecycle, LifecyclePhase};
use crate::models::{DetectionSnapshot, EmotionLabel, Frame};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Hand-off slot for the loaded detection backend, filled by the startup
/// thread and taken by the UI when the camera comes up
pub type DetectorSlot = Arc<Mutex<Option<Box<dyn ExpressionDetector>>>>;

/// Display color for an emotion label
pub fn emotion_color(label: EmotionLabel) -> egui::Color32 {
    match label {
        EmotionLabel::Happy => egui::Color32::from_rgb(34, 197, 94),
        EmotionLabel::Sad => egui::Color32::from_rgb(59, 130, 246),
        EmotionLabel::Angry => egui::Color32::from_rgb(239, 68, 68),
        EmotionLabel::Neutral => egui::Color32::from_rgb(107, 114, 128),
        EmotionLabel::Surprised => egui::Color32::from_rgb(234, 179, 8),
        EmotionLabel::Disgusted => egui::Color32::from_rgb(168, 85, 247),
        EmotionLabel::Fearful => egui::Color32::from_rgb(249, 115, 22),
    }
}

const FACE_BOX_COLOR: egui::Color32 = egui::Color32::from_rgb(0, 160, 255);

/// Main application UI
pub struct MoodLensApp {
    config: AppConfig,
    lifecycle: Arc<Lifecycle>,
    detector_slot: DetectorSlot,
    snapshot: SharedSnapshot,
    camera: Option<CameraManager>,
    camera_attempted: bool,
    detection_loop: DetectionLoop,
    frame_sender: Option<mpsc::Sender<Frame>>,
    camera_texture: Option<egui::TextureHandle>,
    torn_down: bool,
}

impl MoodLensApp {
    pub fn new(
        config: AppConfig,
        lifecycle: Arc<Lifecycle>,
        detector_slot: DetectorSlot,
        snapshot: SharedSnapshot,
    ) -> Self {
        Self {
            config,
            lifecycle,
            detector_slot,
            snapshot,
            camera: None,
            camera_attempted: false,
            detection_loop: DetectionLoop::new(),
            frame_sender: None,
            camera_texture: None,
            torn_down: false,
        }
    }

    /// Opens the camera and starts the detection loop once the models are
    /// ready. A single attempt; failure is terminal.
    fn maybe_start_camera(&mut self) {
        if self.camera_attempted || self.lifecycle.phase() != LifecyclePhase::ModelsReady {
            return;
        }
        self.camera_attempted = true;

        let mut camera = match CameraManager::open(&self.config) {
            Ok(camera) => camera,
            Err(e) => {
                self.lifecycle.fail(e.to_string());
                return;
            }
        };
        if let Err(e) = camera.ensure_stream_open() {
            // Drop releases the partially acquired stream
            self.lifecycle.fail(e.to_string());
            return;
        }

        let Some(detector) = self.detector_slot.lock().ok().and_then(|mut slot| slot.take())
        else {
            self.lifecycle.fail("detection backend unavailable");
            return;
        };

        let (sender, receiver) = mpsc::channel(4);
        self.detection_loop.start(
            detector,
            receiver,
            self.snapshot.clone(),
            Duration::from_millis(self.config.detect_interval_ms),
        );
        self.frame_sender = Some(sender);
        self.camera = Some(camera);
        self.lifecycle.advance(LifecyclePhase::CameraReady);
        info!("Camera and detection loop running");
    }

    /// Grabs the current frame, refreshes the display texture, and feeds
    /// the detection loop
    fn update_camera_texture(&mut self, ctx: &egui::Context) {
        let Some(camera) = &mut self.camera else {
            return;
        };

        match camera.get_current_frame() {
            Ok(frame) => {
                if let Some(sender) = &self.frame_sender {
                    let _ = sender.try_send(frame.clone());
                }

                let color_image = egui::ColorImage::from_rgb(
                    [frame.width as usize, frame.height as usize],
                    &frame.data,
                );
                self.camera_texture =
                    Some(ctx.load_texture("camera", color_image, egui::TextureOptions::LINEAR));
            }
            Err(e) => {
                error!("Failed to read camera frame: {}", e);
            }
        }
    }

    fn current_snapshot(&self) -> Option<DetectionSnapshot> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }

    /// Renders the header with the loading and error states
    fn render_status_panel(&self, ctx: &egui::Context) {
        let phase = self.lifecycle.phase();

        egui::TopBottomPanel::top("status").show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(6.0);
                ui.heading("MoodLens");
                ui.label("Real-time emotion detection from your camera");
                ui.add_space(4.0);

                if let Some(message) = phase.error_message() {
                    ui.colored_label(egui::Color32::from_rgb(248, 113, 113), message);
                    ui.add_space(4.0);
                } else if phase.is_loading() {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Loading models...");
                    });
                    ui.add_space(4.0);
                }
            });
        });
    }

    /// Renders the dominant emotion and the per-label probability bars
    fn render_emotion_panel(&self, ctx: &egui::Context) {
        let phase = self.lifecycle.phase();
        let snapshot = self.current_snapshot();

        egui::SidePanel::right("emotions")
            .exact_width(300.0)
            .show(ctx, |ui| {
                ui.add_space(8.0);

                match snapshot {
                    Some(snapshot) => {
                        let expressions = &snapshot.face.expressions;

                        if let Some(dominant) = expressions.dominant() {
                            ui.vertical_centered(|ui| {
                                ui.label("Dominant Emotion");
                                ui.heading(dominant.label.display_name());
                                ui.label(dominant.value_percent());
                            });
                            ui.add_space(12.0);
                        }

                        ui.strong("All Emotions");
                        ui.add_space(4.0);
                        for (label, value) in expressions.iter() {
                            ui.horizontal(|ui| {
                                ui.label(label.display_name());
                                ui.with_layout(
                                    egui::Layout::right_to_left(egui::Align::Center),
                                    |ui| {
                                        ui.label(crate::models::format_percent(value));
                                    },
                                );
                            });
                            ui.add(
                                egui::ProgressBar::new(value)
                                    .fill(emotion_color(label))
                                    .desired_height(8.0),
                            );
                            ui.add_space(4.0);
                        }
                    }
                    None => {
                        // Placeholder only when loading is done and no
                        // error is active
                        if phase == LifecyclePhase::CameraReady {
                            ui.vertical_centered(|ui| {
                                ui.add_space(40.0);
                                ui.label("Step in front of the camera...");
                                ui.weak("No face detected");
                            });
                        }
                    }
                }
            });
    }

    /// Renders the live camera view with the face box overlaid
    fn render_camera_view(&self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let available_size = ui.available_size();

                let Some(texture) = &self.camera_texture else {
                    return;
                };

                let texture_size = texture.size_vec2();
                let aspect_ratio = texture_size.x / texture_size.y;

                // Fit while keeping the aspect ratio
                let mut display_width = available_size.x;
                let mut display_height = display_width / aspect_ratio;
                if display_height > available_size.y {
                    display_height = available_size.y;
                    display_width = display_height * aspect_ratio;
                }

                let x_offset = (available_size.x - display_width) / 2.0;
                let y_offset = (available_size.y - display_height) / 2.0;
                let image_rect = egui::Rect::from_min_size(
                    ui.max_rect().min + egui::vec2(x_offset, y_offset),
                    egui::vec2(display_width, display_height),
                );

                ui.put(
                    image_rect,
                    egui::Image::new(texture)
                        .fit_to_exact_size(egui::vec2(display_width, display_height)),
                );

                // The face region is in frame coordinates; rescale onto the
                // displayed rect so the box tracks the video exactly
                if let Some(snapshot) = self.current_snapshot() {
                    let scaled = snapshot.face.region.scaled(
                        (snapshot.frame_width as f32, snapshot.frame_height as f32),
                        (display_width, display_height),
                    );
                    let face_rect = egui::Rect::from_min_size(
                        image_rect.min + egui::vec2(scaled.x, scaled.y),
                        egui::vec2(scaled.width, scaled.height),
                    );
                    ui.painter().rect_stroke(
                        face_rect,
                        2.0,
                        egui::Stroke::new(2.0, FACE_BOX_COLOR),
                    );
                }
            });
    }

    /// Stops the detection loop, the frame feed, and the camera stream.
    /// Each is guarded independently, so teardown is safe at any
    /// lifecycle stage and runs each release exactly once.
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.detection_loop.stop();
        self.frame_sender = None;
        if let Some(mut camera) = self.camera.take() {
            camera.release();
        }
        info!("UI teardown complete");
    }
}

impl eframe::App for MoodLensApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        if !self.torn_down {
            self.maybe_start_camera();
            self.update_camera_texture(ctx);
        }

        self.render_status_panel(ctx);
        self.render_emotion_panel(ctx);
        self.render_camera_view(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.teardown();
    }
}
