// src/app.rs
use crate::capture::Capture;
use crate::driver::{RenderDriver, SourceMode};
use crate::frame::{Frame, LandmarkGroup};
use crate::host::{Host, HostEvent, Intent};
use crate::playback::{CatchUp, PlaybackMode};
use crate::settings::Settings;
use crate::skeleton::{SkeletonCache, GROUPS};
use crate::ui::{SkeletonView, StatusBadge, Theme};

use eframe::egui;
use std::time::Instant;
use tracing::{debug, error, info};

pub struct ViewerApp {
    // Core components
    driver: RenderDriver,
    host: Host,
    settings: Settings,

    // UI State
    view: SkeletonView,
    badge: StatusBadge,
    theme: Theme,
    show_settings: bool,
    show_diagnostics: bool,
    record_live: bool,
    status: Option<String>,
}

impl ViewerApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: Settings, host: Host) -> Self {
        let theme = Theme::default();
        Self {
            driver: RenderDriver::from_settings(&settings),
            host,
            settings,
            view: SkeletonView::new(theme.clone()),
            badge: StatusBadge::new(),
            theme,
            show_settings: false,
            show_diagnostics: true,
            record_live: false,
            status: None,
        }
    }

    fn handle_intent(&mut self, intent: Intent) {
        let result = match intent {
            Intent::OpenFile => {
                self.host.open_file();
                return;
            }
            Intent::StartStep { forward, reset } => self.driver.start_step(forward, reset),
            Intent::StartPlayback { reset } => self.driver.start_playback(reset, Instant::now()),
            Intent::StartLiveReceive { record } => {
                if let Some(session) = self.host.start_live_receive(record) {
                    debug!("Live session {} started", session);
                    self.driver.begin_live();
                }
                return;
            }
            Intent::StopLiveReceive => {
                self.host.stop_live_receive();
                self.driver.end_live();
                return;
            }
        };

        if let Err(e) = result {
            debug!("{:?} ignored: {}", intent, e);
        }
    }

    fn handle_host_events(&mut self) {
        for event in self.host.poll_events() {
            match event {
                HostEvent::FileOpened { text, path } => {
                    if self.host.is_receiving() {
                        self.host.stop_live_receive();
                    }
                    let capture = Capture::build(&text).with_path(Some(path));
                    self.driver.load_capture(capture);
                    self.status = self.driver.summary_text();
                }
                HostEvent::StopStreaming { session } => {
                    if self.host.finish_session(session) {
                        info!("Live stream stopped");
                        self.driver.end_live();
                    } else {
                        debug!("Ignoring stop from earlier live session {}", session);
                    }
                }
                HostEvent::Failed(message) => {
                    self.status = Some(message);
                }
            }
        }

        if let Some(frame) = self.host.take_live_frame() {
            self.driver.push_live(frame);
        }
    }

    fn render_header(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.add_space(6.0);
            egui::menu::bar(ui, |ui| {
                ui.heading("Holistic Viewer");

                ui.separator();

                let source = self.driver.source();
                ui.horizontal(|ui| {
                    if ui
                        .selectable_label(source == SourceMode::Offline, "📁 Capture")
                        .clicked()
                        && source == SourceMode::Live
                    {
                        self.handle_intent(Intent::StopLiveReceive);
                        self.driver.leave_live();
                        self.handle_intent(Intent::OpenFile);
                    }
                    if ui
                        .selectable_label(source == SourceMode::Live, "📡 Live")
                        .clicked()
                        && source == SourceMode::Offline
                    {
                        self.handle_intent(Intent::StartLiveReceive { record: self.record_live });
                    }
                });

                ui.separator();

                if ui.button("📂 Open").clicked() {
                    self.handle_intent(Intent::OpenFile);
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("⚙ Settings").clicked() {
                        self.show_settings = !self.show_settings;
                    }
                    if ui.button("ℹ Diagnostics").clicked() {
                        self.show_diagnostics = !self.show_diagnostics;
                    }
                });
            });
            ui.add_space(6.0);
        });
    }

    fn render_control_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("controls").show(ctx, |ui| {
            ui.add_space(8.0);
            match self.driver.source() {
                SourceMode::Offline => self.render_playback_controls(ui),
                SourceMode::Live => self.render_live_controls(ui),
            }
            if let Some(status) = &self.status {
                ui.label(egui::RichText::new(status).color(self.theme.text_secondary));
            }
            ui.add_space(8.0);
        });
    }

    fn render_playback_controls(&mut self, ui: &mut egui::Ui) {
        let has_data = !self.driver.capture().is_empty();
        let playing = self.driver.is_playing();

        ui.horizontal(|ui| {
            ui.add_enabled_ui(has_data && !playing, |ui| {
                if ui.button("⏮").on_hover_text("Previous frame").clicked() {
                    self.handle_intent(Intent::StartStep { forward: false, reset: false });
                }
            });

            ui.add_enabled_ui(has_data, |ui| {
                if playing {
                    if ui
                        .add_sized([80.0, 30.0], egui::Button::new("⏸ Pause"))
                        .clicked()
                    {
                        let _ = self.driver.pause();
                    }
                } else if ui
                    .add_sized(
                        [80.0, 30.0],
                        egui::Button::new("▶ Play").fill(self.theme.success),
                    )
                    .clicked()
                {
                    self.handle_intent(Intent::StartPlayback { reset: false });
                }

                if ui
                    .add_sized([80.0, 30.0], egui::Button::new("⏹ Stop").fill(self.theme.error))
                    .clicked()
                {
                    let _ = self.driver.stop();
                }

                if ui.button("↺ Restart").on_hover_text("Play from the first frame").clicked() {
                    self.handle_intent(Intent::StartPlayback { reset: true });
                }
            });

            ui.add_enabled_ui(has_data && !playing, |ui| {
                if ui.button("⏭").on_hover_text("Next frame").clicked() {
                    self.handle_intent(Intent::StartStep { forward: true, reset: false });
                }
            });

            ui.separator();

            // Scrubbing is only honoured while not playing.
            let total = self.driver.capture().len();
            let mut index = self.driver.scheduler().current_index().unwrap_or(0);
            let slider = ui.add_enabled(
                has_data && !playing,
                egui::Slider::new(&mut index, 0..=total).text("frame"),
            );
            if slider.changed() {
                if let Err(e) = self.driver.seek(index) {
                    debug!("Seek ignored: {}", e);
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let mode = match self.driver.mode() {
                    PlaybackMode::Stopped => "Stopped",
                    PlaybackMode::Playing => "Playing",
                    PlaybackMode::Paused => "Paused",
                };
                ui.label(mode);
            });
        });
    }

    fn render_live_controls(&mut self, ui: &mut egui::Ui) {
        let receiving = self.host.is_receiving();

        ui.horizontal(|ui| {
            if receiving {
                if ui
                    .add_sized([120.0, 30.0], egui::Button::new("⏹ Stop").fill(self.theme.error))
                    .clicked()
                {
                    self.handle_intent(Intent::StopLiveReceive);
                }
            } else if ui
                .add_sized(
                    [120.0, 30.0],
                    egui::Button::new("▶ Receive").fill(self.theme.success),
                )
                .clicked()
            {
                self.handle_intent(Intent::StartLiveReceive { record: self.record_live });
            }

            ui.add_enabled_ui(!receiving, |ui| {
                ui.checkbox(&mut self.record_live, "Record to file");
            });

            ui.separator();

            let feed = self.driver.live_feed();
            ui.label(format!("received: {}, dropped: {}", feed.received(), feed.dropped()));
            ui.label(
                egui::RichText::new(format!("listening on {}", self.settings.live_bind_addr))
                    .color(self.theme.text_secondary),
            );
        });
    }

    fn render_diagnostics_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("diagnostics")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                ui.heading("Frame");
                if let Some(position) = self.driver.position_text() {
                    ui.label(position);
                }
                if let Some(summary) = self.driver.summary_text() {
                    ui.label(egui::RichText::new(summary).color(self.theme.text_secondary));
                }
                if let Some(path) = self.driver.capture().path() {
                    ui.label(
                        egui::RichText::new(path.display().to_string())
                            .small()
                            .color(self.theme.text_secondary),
                    );
                }

                ui.separator();

                egui::ScrollArea::vertical().show(ui, |ui| match self.driver.current_frame() {
                    Some(frame) => {
                        for (title, lines) in describe_frame(frame) {
                            ui.strong(title);
                            for line in lines {
                                ui.label(line);
                            }
                            ui.add_space(4.0);
                        }
                    }
                    None => {
                        ui.label("No frame");
                    }
                });

                ui.separator();
                ui.strong("skeleton");
                egui::ScrollArea::vertical().id_source("skeleton").show(ui, |ui| {
                    for line in describe_skeleton(self.driver.cache()) {
                        ui.label(egui::RichText::new(line).small().monospace());
                    }
                });
            });
    }

    fn render_main_content(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let rect = ui.available_rect_before_wrap();
            self.view.show(ui, self.driver.cache(), self.settings.show_grid);

            if self.driver.source() == SourceMode::Live && self.host.is_receiving() {
                let label = if self.record_live { "REC" } else { "LIVE" };
                self.badge.draw(ui, rect, label, self.theme.error);
            }
        });
    }

    fn render_settings_window(&mut self, ctx: &egui::Context) {
        let mut changed = false;

        egui::Window::new("Settings")
            .open(&mut self.show_settings)
            .resizable(true)
            .default_size([380.0, 420.0])
            .show(ctx, |ui| {
                ui.heading("Reconstruction");
                ui.add_space(6.0);

                ui.label("Default aspect ratio:");
                changed |= ui
                    .add(
                        egui::DragValue::new(&mut self.settings.default_aspect_ratio)
                            .speed(0.01)
                            .clamp_range(0.1..=10.0),
                    )
                    .changed();

                ui.label("Face and hand scale:");
                changed |= ui
                    .add(egui::Slider::new(&mut self.settings.anchor_scale, 0.5..=4.0).step_by(0.1))
                    .changed();

                ui.separator();
                ui.heading("Playback");

                ui.label("Minimum frame wait (ms):");
                changed |= ui
                    .add(egui::Slider::new(&mut self.settings.min_frame_wait_ms, 1..=1000))
                    .changed();

                ui.label("Catch-up after a stall:");
                egui::ComboBox::from_id_source("catch_up")
                    .selected_text(match self.settings.catch_up {
                        CatchUp::Single => "One frame per refresh",
                        CatchUp::Drain => "All due frames",
                    })
                    .show_ui(ui, |ui| {
                        changed |= ui
                            .selectable_value(&mut self.settings.catch_up, CatchUp::Single, "One frame per refresh")
                            .changed();
                        changed |= ui
                            .selectable_value(&mut self.settings.catch_up, CatchUp::Drain, "All due frames")
                            .changed();
                    });

                changed |= ui.checkbox(&mut self.settings.show_grid, "Show grid").changed();

                ui.separator();
                ui.heading("Live");

                ui.label("Listen address:");
                changed |= ui.text_edit_singleline(&mut self.settings.live_bind_addr).changed();

                ui.label("Replay played frames to (host[:port]):");
                let replay = ui.text_edit_singleline(&mut self.settings.replay_target);
                if replay.lost_focus() {
                    changed = true;
                }

                ui.label("Recording directory:");
                ui.label(self.settings.recording_dir.display().to_string());
                if ui.button("Browse...").clicked() {
                    if let Some(dir) = rfd::FileDialog::new()
                        .set_directory(&self.settings.recording_dir)
                        .pick_folder()
                    {
                        self.settings.recording_dir = dir;
                        changed = true;
                    }
                }

                ui.separator();
                if ui.button("💾 Save settings").clicked() {
                    if let Err(e) = self.settings.save() {
                        error!("{:#}", e);
                    }
                }
            });

        if changed {
            self.driver.apply_settings(&self.settings);
            self.host.apply_settings(&self.settings);
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_host_events();
        self.driver.tick(Instant::now());
        if let Some(frame) = self.driver.take_played() {
            self.host.replay(frame);
        }

        // Render UI components
        self.render_header(ctx);
        self.render_control_panel(ctx);

        if self.show_settings {
            self.render_settings_window(ctx);
        }

        if self.show_diagnostics {
            self.render_diagnostics_panel(ctx);
        }

        self.render_main_content(ctx);

        // Keep ticking the scheduler every display refresh
        ctx.request_repaint();
    }
}

/// Section titles and lines shown for one frame in the diagnostics panel.
pub fn describe_frame(frame: &Frame) -> Vec<(&'static str, Vec<String>)> {
    const NOT_FOUND: &str = "not found";
    let mut sections = Vec::new();

    sections.push((
        "camera_params",
        match &frame.camera_params {
            Some(params) => vec![
                format!("focal_length: {}", params.focal_length),
                format!("frame_width: {}", params.frame_width),
                format!("frame_height: {}", params.frame_height),
            ],
            None => vec![NOT_FOUND.to_string()],
        },
    ));

    sections.push((
        "gravity",
        match frame.gravity {
            Some([x, y, z]) => vec![format!("[{}, {}, {}]", x, y, z)],
            None => vec![NOT_FOUND.to_string()],
        },
    ));

    for group in LandmarkGroup::ALL {
        let lines = match frame.group(group) {
            Some(landmarks) => {
                let stamp = frame
                    .stamp(group)
                    .map_or_else(|| "-".to_string(), |s| s.to_string());
                vec![
                    format!("{}: {}", group.stamp_name(), stamp),
                    format!("landmarks: {}", landmarks.len()),
                ]
            }
            None => vec![NOT_FOUND.to_string()],
        };
        sections.push((group.field_name(), lines));
    }

    sections
}

/// Extent and rebuild count of every line group that is currently drawn.
pub fn describe_skeleton(cache: &SkeletonCache) -> Vec<String> {
    GROUPS
        .iter()
        .filter_map(|group| {
            let line = cache.get(group.id)?;
            if line.is_collapsed() {
                return None;
            }
            let bounds = line.bounds()?;
            let size = bounds.max - bounds.min;
            Some(format!(
                "{}: center [{:.3}, {:.3}, {:.3}], size [{:.3}, {:.3}, {:.3}], rev {}",
                group.id.name(),
                bounds.center.x,
                bounds.center.y,
                bounds.center.z,
                size.x,
                size.y,
                size.z,
                line.revision(),
            ))
        })
        .collect()
}
