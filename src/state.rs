use crate::error::PatchError;
use crate::model::{Field, FormState, ModelInfo, Parameters, PatchResult};

pub const RUN_FAILED_MESSAGE: &str = "Failed to run patching. See log for details.";

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Busy {
        params: Parameters,
    },
    Success {
        params: Parameters,
        result: PatchResult,
    },
    Failed(String),
}

#[derive(Debug)]
pub enum Action {
    Edit(Field, String),
    Submit,
    Completed(Result<PatchResult, PatchError>),
    ModelInfoLoaded(Result<Option<ModelInfo>, PatchError>),
}

/// Work the caller must start on the state's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Run(Parameters),
}

/// Everything the window shows, owned by the UI thread.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub form: FormState,
    pub status: RunStatus,
    pub model_info: Option<ModelInfo>,
}

impl AppState {
    pub fn is_busy(&self) -> bool {
        matches!(self.status, RunStatus::Busy { .. })
    }

    pub fn reduce(self, action: Action) -> (Self, Option<Effect>) {
        match action {
            Action::Edit(field, value) => (
                Self {
                    form: self.form.with(field, value),
                    ..self
                },
                None,
            ),
            Action::Submit => self.submit(),
            Action::Completed(outcome) => (self.complete(outcome), None),
            Action::ModelInfoLoaded(Ok(info)) => {
                if let Some(info) = &info {
                    log::info!(
                        "backend model {} has {} layers",
                        info.model_id,
                        info.num_layers
                    );
                }
                (
                    Self {
                        model_info: info,
                        ..self
                    },
                    None,
                )
            }
            Action::ModelInfoLoaded(Err(err)) => {
                log::warn!("could not fetch model info: {err}");
                (self, None)
            }
        }
    }

    fn submit(self) -> (Self, Option<Effect>) {
        if self.is_busy() {
            log::debug!("submit ignored while a run is in flight");
            return (self, None);
        }
        let num_layers = self.model_info.as_ref().map(|m| m.num_layers);
        match self.form.parse(num_layers) {
            Ok(params) => (
                Self {
                    status: RunStatus::Busy {
                        params: params.clone(),
                    },
                    ..self
                },
                Some(Effect::Run(params)),
            ),
            Err(err) => (
                Self {
                    status: RunStatus::Failed(err.to_string()),
                    ..self
                },
                None,
            ),
        }
    }

    fn complete(self, outcome: Result<PatchResult, PatchError>) -> Self {
        let RunStatus::Busy { params } = self.status else {
            log::warn!("dropping a result that arrived while not running");
            return self;
        };
        let status = match outcome {
            Ok(result) => RunStatus::Success { params, result },
            Err(err) => {
                log::error!("error during patching: {err}");
                RunStatus::Failed(RUN_FAILED_MESSAGE.to_string())
            }
        };
        Self { status, ..self }
    }
}
