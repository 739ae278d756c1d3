use std::time::Duration;

use reqwest::blocking::{Client, Response};

use crate::backend::PatchBackend;
use crate::error::{PatchError, Result};
use crate::model::{
    indexed_tokens, Activations, ActivationsRequest, Envelope, HealthStatus, ModelInfo,
    Parameters, PatchResult, PatchscopeData, PatchscopeRequest,
};
use crate::tokenize::{resolve_index, token_at, tokenize};

/// Which patching route the server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteApi {
    /// `POST /api/patchify`: camelCase body, bare result.
    Patchify,
    /// `POST /api/patchscope` plus `/api/activations`: snake_case body,
    /// enveloped result with model tokenizer pieces.
    Patchscope,
}

/// HTTP client for a real patching server.
#[derive(Debug)]
pub struct RemoteBackend {
    client: Client,
    base_url: String,
    api: RemoteApi,
}

impl RemoteBackend {
    pub fn new(endpoint: &str, timeout: Duration, api: RemoteApi) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            api,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn health(&self) -> Result<HealthStatus> {
        let response = self.client.get(self.url("/api/health")).send()?;
        let body = checked_body(response)?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Per-token hidden-state norms of `prompt` at each of `layers`.
    pub fn activations(&self, prompt: &str, layers: &[usize]) -> Result<Activations> {
        let url = self.url("/api/activations");
        log::debug!("POST {url} for layers {layers:?}");
        let request = ActivationsRequest {
            prompt,
            layer_indices: Some(layers.to_vec()),
        };
        let response = self.client.post(&url).json(&request).send()?;
        let body = checked_body(response)?;
        let envelope: Envelope<Activations> = serde_json::from_str(&body)?;
        envelope
            .into_result()?
            .ok_or_else(|| PatchError::Backend("activations answer carried no data".to_string()))
    }

    /// `None` on any failure, which is only logged.
    fn layer_norms(&self, prompt: &str, layer: usize) -> Option<Vec<f32>> {
        match self.activations(prompt, &[layer]) {
            Ok(activations) => {
                let norms = activations.layer(layer)?;
                if norms.len() != activations.tokens.len() {
                    log::warn!(
                        "layer {layer} has {} norms for {} tokens",
                        norms.len(),
                        activations.tokens.len()
                    );
                }
                Some(norms.to_vec())
            }
            Err(err) => {
                log::warn!("no activation norms for layer {layer}: {err}");
                None
            }
        }
    }

    fn patchify(&self, params: &Parameters) -> Result<PatchResult> {
        let url = self.url("/api/patchify");
        log::debug!("POST {url}");
        let response = self.client.post(&url).json(params).send()?;
        let body = checked_body(response)?;
        log::debug!("patchify response: {body}");

        let mut result: PatchResult = serde_json::from_str(&body)?;
        // Older servers only send the generated text.
        if result.source_tokens.is_empty() {
            result.source_tokens = tokenize(&params.source_prompt);
        }
        if result.target_tokens.is_empty() {
            result.target_tokens = tokenize(&params.target_prompt);
        }
        Ok(result)
    }

    fn patchscope(&self, params: &Parameters) -> Result<PatchResult> {
        let url = self.url("/api/patchscope");
        log::debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .json(&PatchscopeRequest::from(params))
            .send()?;
        let body = checked_body(response)?;
        log::debug!("patchscope response: {body}");

        let envelope: Envelope<PatchscopeData> = serde_json::from_str(&body)?;
        let data = envelope
            .into_result()?
            .ok_or_else(|| PatchError::Backend("patchscope answer carried no data".to_string()))?;
        let applied = &data.patch_config;
        if applied.source_token_idx != params.source_token_index
            || applied.target_token_idx != params.target_token_index
            || applied.source_layer_idx != params.source_layer_index
            || applied.target_layer_idx != params.target_layer_index
        {
            log::warn!("server applied {applied:?} instead of the requested locations");
        }

        let source_tokens = indexed_tokens(data.source_tokens);
        let target_tokens = indexed_tokens(data.target_tokens);
        let source_index = resolve_index(params.source_token_index, source_tokens.len());
        let source_output = match token_at(&source_tokens, source_index) {
            Some(token) => token.text.clone(),
            None => data.source_prompt,
        };

        Ok(PatchResult {
            source_tokens,
            target_tokens,
            source_output,
            target_output: data.original_response,
            patched_output: data.patched_response,
            source_activations: self.layer_norms(&params.source_prompt, params.source_layer_index),
            target_activations: self.layer_norms(&params.target_prompt, params.target_layer_index),
        })
    }
}

/// Non-2xx becomes [`PatchError::Status`] carrying whatever the server said.
fn checked_body(response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text()?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(PatchError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl PatchBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        match self.api {
            RemoteApi::Patchify => "remote",
            RemoteApi::Patchscope => "patchscope",
        }
    }

    fn patch(&self, params: &Parameters) -> Result<PatchResult> {
        match self.api {
            RemoteApi::Patchify => self.patchify(params),
            RemoteApi::Patchscope => self.patchscope(params),
        }
    }

    fn model_info(&self) -> Result<Option<ModelInfo>> {
        let response = self.client.get(self.url("/api/model-info")).send()?;
        let body = checked_body(response)?;
        let envelope: Envelope<ModelInfo> = serde_json::from_str(&body)?;
        envelope.into_result()
    }
}
