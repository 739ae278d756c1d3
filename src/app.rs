use eframe::egui;

use crate::backend::PatchBackend;
use crate::layout::layout;
use crate::model::Field;
use crate::render;
use crate::state::{Action, AppState, Effect, RunStatus};
use crate::worker::{PatchWorker, WorkerRequest, WorkerResponse};

const ERROR_RED: egui::Color32 = egui::Color32::from_rgb(185, 28, 28);
const DIM: egui::Color32 = egui::Color32::from_rgb(107, 114, 128);
const CANVAS_FILL: egui::Color32 = egui::Color32::from_rgb(249, 250, 251);

/// Form pairs laid out two per row, the token count on its own.
const FORM_ROWS: [&[Field]; 4] = [
    &[Field::SourcePrompt, Field::TargetPrompt],
    &[Field::SourceTokenIndex, Field::SourceLayerIndex],
    &[Field::TargetTokenIndex, Field::TargetLayerIndex],
    &[Field::NTokens],
];

pub struct PatchApp {
    state: AppState,
    worker: PatchWorker,
    backend_name: &'static str,
}

impl PatchApp {
    pub fn new(cc: &eframe::CreationContext<'_>, backend: Box<dyn PatchBackend>) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::light());

        let backend_name = backend.name();
        let ctx = cc.egui_ctx.clone();
        let worker = PatchWorker::spawn(backend, move || ctx.request_repaint());

        let mut app = Self {
            state: AppState::default(),
            worker,
            backend_name,
        };
        if let Err(err) = app.worker.send(WorkerRequest::ModelInfo) {
            app.dispatch(Action::ModelInfoLoaded(Err(err)));
        }
        app
    }

    fn dispatch(&mut self, action: Action) {
        let (state, effect) = std::mem::take(&mut self.state).reduce(action);
        self.state = state;
        if let Some(Effect::Run(params)) = effect {
            log::info!(
                "patching token {} (layer {}) into token {} (layer {})",
                params.source_token_index,
                params.source_layer_index,
                params.target_token_index,
                params.target_layer_index
            );
            if let Err(err) = self.worker.send(WorkerRequest::Patch(params)) {
                self.dispatch(Action::Completed(Err(err)));
            }
        }
    }

    fn poll_worker(&mut self) {
        loop {
            let action = match self.worker.try_recv() {
                Ok(Some(WorkerResponse::Patched(outcome))) => Action::Completed(outcome),
                Ok(Some(WorkerResponse::ModelInfo(outcome))) => Action::ModelInfoLoaded(outcome),
                Ok(None) => break,
                // A run in flight will never be answered.
                Err(err) if self.state.is_busy() => Action::Completed(Err(err)),
                Err(_) => break,
            };
            self.dispatch(action);
        }
    }

    fn draw_form(&self, ui: &mut egui::Ui, actions: &mut Vec<Action>) {
        egui::Grid::new("patch_form")
            .num_columns(4)
            .spacing([12.0, 8.0])
            .show(ui, |ui| {
                for row in FORM_ROWS {
                    for &field in row {
                        ui.label(field.label());
                        let mut value = self.state.form.get(field).to_owned();
                        let edit = egui::TextEdit::singleline(&mut value).desired_width(260.0);
                        if ui.add(edit).changed() {
                            actions.push(Action::Edit(field, value));
                        }
                    }
                    ui.end_row();
                }
            });

        if let Some(info) = &self.state.model_info {
            ui.colored_label(
                DIM,
                format!(
                    "Model: {} ({} layers, hidden size {}, vocab {})",
                    info.model_id, info.num_layers, info.hidden_size, info.vocab_size
                ),
            );
        }

        ui.add_space(8.0);
        ui.vertical_centered(|ui| {
            let busy = self.state.is_busy();
            let label = if busy { "Running Patching..." } else { "Run Patching" };
            if ui.add_enabled(!busy, egui::Button::new(label)).clicked() {
                actions.push(Action::Submit);
            }
        });
    }

    fn draw_results(&self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.heading("Visualization");
        });
        ui.add_space(8.0);

        match &self.state.status {
            RunStatus::Idle => {
                ui.vertical_centered(|ui| {
                    ui.colored_label(
                        DIM,
                        "Enter parameters and click \"Run Patching\" to see the visualization.",
                    );
                });
            }
            RunStatus::Busy { .. } => {
                ui.vertical_centered(|ui| {
                    ui.spinner();
                    ui.label("Loading results...");
                });
            }
            RunStatus::Failed(message) => {
                egui::Frame::NONE
                    .fill(egui::Color32::from_rgb(254, 226, 226))
                    .stroke(egui::Stroke::new(1.0, ERROR_RED))
                    .corner_radius(6.0)
                    .inner_margin(10.0)
                    .show(ui, |ui| {
                        ui.colored_label(ERROR_RED, message);
                    });
            }
            RunStatus::Success { params, result } => {
                let diagram = layout(result, params, ui.available_width());
                let (response, painter) = ui.allocate_painter(diagram.size, egui::Sense::hover());
                painter.rect_filled(response.rect, 8.0, CANVAS_FILL);
                render::paint(&painter, response.rect.min, &diagram);
            }
        }
    }
}

impl eframe::App for PatchApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_worker();

        let mut actions = Vec::new();
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.heading("Patchscopes Interactive Visualization");
                });
                ui.colored_label(DIM, format!("Backend: {}", self.backend_name));
                ui.separator();
                self.draw_form(ui, &mut actions);
                ui.separator();
                self.draw_results(ui);
            });
        });

        for action in actions {
            self.dispatch(action);
        }
    }
}
