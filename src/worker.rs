use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use crate::backend::PatchBackend;
use crate::error::{PatchError, Result};
use crate::model::{ModelInfo, Parameters, PatchResult};

#[derive(Debug)]
pub enum WorkerRequest {
    Patch(Parameters),
    ModelInfo,
}

#[derive(Debug)]
pub enum WorkerResponse {
    Patched(Result<PatchResult>),
    ModelInfo(Result<Option<ModelInfo>>),
}

/// Background thread that owns the backend so the UI never blocks on it.
///
/// Dropping the worker closes the request channel and detaches the thread:
/// a request already in flight runs to completion in the background and its
/// answer is discarded.
pub struct PatchWorker {
    tx: Sender<WorkerRequest>,
    rx: Receiver<WorkerResponse>,
    handle: Option<JoinHandle<()>>,
}

impl PatchWorker {
    /// `notify` runs after every response is queued; the app passes a
    /// repaint request so the next frame picks it up.
    pub fn spawn<F>(backend: Box<dyn PatchBackend>, notify: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let (req_tx, req_rx) = mpsc::channel::<WorkerRequest>();
        let (resp_tx, resp_rx) = mpsc::channel::<WorkerResponse>();

        let handle = thread::Builder::new()
            .name("patch-worker".into())
            .spawn(move || {
                log::debug!("patch worker started with {} backend", backend.name());
                while let Ok(request) = req_rx.recv() {
                    let response = match request {
                        WorkerRequest::Patch(params) => {
                            log::debug!("running patch: {params:?}");
                            WorkerResponse::Patched(backend.patch(&params))
                        }
                        WorkerRequest::ModelInfo => WorkerResponse::ModelInfo(backend.model_info()),
                    };
                    if resp_tx.send(response).is_err() {
                        break;
                    }
                    notify();
                }
                log::debug!("patch worker stopping");
            })
            .ok();

        if handle.is_none() {
            log::error!("failed to spawn patch worker thread");
        }

        Self {
            tx: req_tx,
            rx: resp_rx,
            handle,
        }
    }

    pub fn send(&self, request: WorkerRequest) -> Result<()> {
        if self.handle.is_none() {
            return Err(PatchError::WorkerGone);
        }
        self.tx.send(request).map_err(|_| PatchError::WorkerGone)
    }

    /// `Ok(None)` while nothing is queued; [`PatchError::WorkerGone`] once the
    /// thread has exited (a backend panic, say) and nothing more can arrive.
    pub fn try_recv(&self) -> Result<Option<WorkerResponse>> {
        match self.rx.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PatchError::WorkerGone),
        }
    }
}
