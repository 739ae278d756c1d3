use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::model::{ModelInfo, Parameters, PatchResult};
use crate::tokenize::{resolve_index, token_at, tokenize};

/// A computation step that turns patching parameters into outputs.
///
/// Mocks and the HTTP client are interchangeable behind this trait; the
/// worker thread owns one and calls it synchronously.
pub trait PatchBackend: Send {
    fn name(&self) -> &'static str;

    fn patch(&self, params: &Parameters) -> Result<PatchResult>;

    fn model_info(&self) -> Result<Option<ModelInfo>> {
        Ok(None)
    }
}

pub const STATIC_SOURCE_OUTPUT: &str = "Harry";
pub const STATIC_TARGET_OUTPUT: &str = "man";
pub const STATIC_PATCHED_OUTPUT: &str = "Harry";

/// Canned answer after a fixed pause, mimicking network latency.
pub struct StaticBackend {
    pub delay: Duration,
}

impl PatchBackend for StaticBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    fn patch(&self, params: &Parameters) -> Result<PatchResult> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(PatchResult {
            source_tokens: tokenize(&params.source_prompt),
            target_tokens: tokenize(&params.target_prompt),
            source_output: STATIC_SOURCE_OUTPUT.to_string(),
            target_output: STATIC_TARGET_OUTPUT.to_string(),
            patched_output: STATIC_PATCHED_OUTPUT.to_string(),
            source_activations: None,
            target_activations: None,
        })
    }
}

/// Splits both prompts and reports which source token would be patched in.
pub struct TokenizingBackend;

impl PatchBackend for TokenizingBackend {
    fn name(&self) -> &'static str {
        "tokenizing"
    }

    fn patch(&self, params: &Parameters) -> Result<PatchResult> {
        let source_tokens = tokenize(&params.source_prompt);
        let target_tokens = tokenize(&params.target_prompt);

        let source_index = resolve_index(params.source_token_index, source_tokens.len());
        let patched_output = match token_at(&source_tokens, source_index) {
            Some(token) => format!("The model now thinks '{}' after patching", token.text),
            None => "No valid source token index".to_string(),
        };

        Ok(PatchResult {
            source_output: format!(
                "Model processed source prompt: '{}'",
                params.source_prompt
            ),
            target_output: format!(
                "Model's original output for target prompt: '{}'",
                params.target_prompt
            ),
            patched_output,
            source_tokens,
            target_tokens,
            source_activations: None,
            target_activations: None,
        })
    }
}
