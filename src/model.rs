use serde::{Deserialize, Serialize};

use crate::error::{PatchError, Result};

pub const DEFAULT_SOURCE_PROMPT: &str = "Harry";
pub const DEFAULT_TARGET_PROMPT: &str =
    "Respond only with the completion to this pattern: Man -> man, Car -> car, x ->";

/// One patching request: where to read the representation and where to write it.
///
/// Also the JSON body of `POST /api/patchify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameters {
    pub source_prompt: String,
    pub target_prompt: String,
    /// Negative values count from the end of the tokenized source prompt.
    pub source_token_index: i64,
    pub source_layer_index: usize,
    /// Negative values count from the end of the tokenized target prompt.
    pub target_token_index: i64,
    pub target_layer_index: usize,
    pub n_tokens: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            source_prompt: DEFAULT_SOURCE_PROMPT.to_string(),
            target_prompt: DEFAULT_TARGET_PROMPT.to_string(),
            source_token_index: -1,
            source_layer_index: 2,
            target_token_index: -3,
            target_layer_index: 2,
            n_tokens: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResult {
    #[serde(default)]
    pub source_tokens: Vec<Token>,
    #[serde(default)]
    pub target_tokens: Vec<Token>,
    pub source_output: String,
    pub target_output: String,
    pub patched_output: String,
    /// Per-token hidden-state norms at the source layer, when the backend
    /// can report them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_activations: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_activations: Option<Vec<f32>>,
}

/// Body of `POST /api/patchscope` on the reference model server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchscopeRequest<'a> {
    pub source_prompt: &'a str,
    pub target_prompt: &'a str,
    pub source_token_idx: i64,
    pub target_token_idx: i64,
    pub source_layer_idx: usize,
    pub target_layer_idx: usize,
    pub n_tokens: usize,
}

impl<'a> From<&'a Parameters> for PatchscopeRequest<'a> {
    fn from(p: &'a Parameters) -> Self {
        Self {
            source_prompt: &p.source_prompt,
            target_prompt: &p.target_prompt,
            source_token_idx: p.source_token_index,
            target_token_idx: p.target_token_index,
            source_layer_idx: p.source_layer_index,
            target_layer_idx: p.target_layer_index,
            n_tokens: p.n_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatchConfig {
    pub source_token_idx: i64,
    pub target_token_idx: i64,
    pub source_layer_idx: usize,
    pub target_layer_idx: usize,
}

/// `data` of a successful `/api/patchscope` answer. Tokens are the model
/// tokenizer's pieces, one string each.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PatchscopeData {
    pub source_prompt: String,
    pub original_response: String,
    pub patched_response: String,
    pub source_tokens: Vec<String>,
    pub target_tokens: Vec<String>,
    pub patch_config: PatchConfig,
}

/// Body of `POST /api/activations`. `None` layers means all of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationsRequest<'a> {
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer_indices: Option<Vec<usize>>,
}

/// Hidden-state norms keyed `layer_<n>`, one value per token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Activations {
    pub activations: std::collections::BTreeMap<String, Vec<f32>>,
    pub tokens: Vec<String>,
}

impl Activations {
    pub fn layer(&self, layer: usize) -> Option<&[f32]> {
        self.activations
            .get(&format!("layer_{layer}"))
            .map(Vec::as_slice)
    }
}

/// Number pieces from a model tokenizer the same way the local tokenizer does.
pub fn indexed_tokens(pieces: Vec<String>) -> Vec<Token> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Token { text, index })
        .collect()
}

/// What a real backend reports about the loaded model.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub num_layers: usize,
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub model_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
}

/// `{ success, data, error }` wrapper used by the backend's info endpoints.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn into_result(self) -> Result<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(PatchError::Backend(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    SourcePrompt,
    TargetPrompt,
    SourceTokenIndex,
    SourceLayerIndex,
    TargetTokenIndex,
    TargetLayerIndex,
    NTokens,
}

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::SourcePrompt => "Source Prompt",
            Field::TargetPrompt => "Target Prompt",
            Field::SourceTokenIndex => "Source Token Index",
            Field::SourceLayerIndex => "Source Layer Index",
            Field::TargetTokenIndex => "Target Token Index",
            Field::TargetLayerIndex => "Target Layer Index",
            Field::NTokens => "Number of New Tokens to Generate",
        }
    }
}

/// Raw text of every form field. Index fields stay text so that "-" or ""
/// can sit in the box while the user is typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub source_prompt: String,
    pub target_prompt: String,
    pub source_token_index: String,
    pub source_layer_index: String,
    pub target_token_index: String,
    pub target_layer_index: String,
    pub n_tokens: String,
}

impl Default for FormState {
    fn default() -> Self {
        let p = Parameters::default();
        Self {
            source_prompt: p.source_prompt,
            target_prompt: p.target_prompt,
            source_token_index: p.source_token_index.to_string(),
            source_layer_index: p.source_layer_index.to_string(),
            target_token_index: p.target_token_index.to_string(),
            target_layer_index: p.target_layer_index.to_string(),
            n_tokens: p.n_tokens.to_string(),
        }
    }
}

impl FormState {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::SourcePrompt => &self.source_prompt,
            Field::TargetPrompt => &self.target_prompt,
            Field::SourceTokenIndex => &self.source_token_index,
            Field::SourceLayerIndex => &self.source_layer_index,
            Field::TargetTokenIndex => &self.target_token_index,
            Field::TargetLayerIndex => &self.target_layer_index,
            Field::NTokens => &self.n_tokens,
        }
    }

    pub fn with(mut self, field: Field, value: String) -> Self {
        let slot = match field {
            Field::SourcePrompt => &mut self.source_prompt,
            Field::TargetPrompt => &mut self.target_prompt,
            Field::SourceTokenIndex => &mut self.source_token_index,
            Field::SourceLayerIndex => &mut self.source_layer_index,
            Field::TargetTokenIndex => &mut self.target_token_index,
            Field::TargetLayerIndex => &mut self.target_layer_index,
            Field::NTokens => &mut self.n_tokens,
        };
        *slot = value;
        self
    }

    /// Parse the numeric fields. Layer indices are checked against
    /// `num_layers` when the backend told us how many there are: the source
    /// is read from hidden states (embeddings plus one per layer), the
    /// target is written at a layer's input.
    pub fn parse(&self, num_layers: Option<usize>) -> Result<Parameters> {
        let source_layer_index = parse_count(Field::SourceLayerIndex, &self.source_layer_index)?;
        let target_layer_index = parse_count(Field::TargetLayerIndex, &self.target_layer_index)?;
        if let Some(limit) = num_layers {
            check_layer(Field::SourceLayerIndex, source_layer_index, limit + 1)?;
            check_layer(Field::TargetLayerIndex, target_layer_index, limit)?;
        }
        Ok(Parameters {
            source_prompt: self.source_prompt.clone(),
            target_prompt: self.target_prompt.clone(),
            source_token_index: parse_index(Field::SourceTokenIndex, &self.source_token_index)?,
            source_layer_index,
            target_token_index: parse_index(Field::TargetTokenIndex, &self.target_token_index)?,
            target_layer_index,
            n_tokens: parse_count(Field::NTokens, &self.n_tokens)?,
        })
    }
}

fn parse_index(field: Field, raw: &str) -> Result<i64> {
    raw.trim().parse().map_err(|_| PatchError::InvalidField {
        field: field.label(),
        expected: "an integer",
        value: raw.to_string(),
    })
}

fn parse_count(field: Field, raw: &str) -> Result<usize> {
    raw.trim().parse().map_err(|_| PatchError::InvalidField {
        field: field.label(),
        expected: "a non-negative integer",
        value: raw.to_string(),
    })
}

fn check_layer(field: Field, value: usize, limit: usize) -> Result<()> {
    if value < limit {
        Ok(())
    } else {
        Err(PatchError::OutOfRange {
            field: field.label(),
            value: value as i64,
            limit: limit as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_form_parses_to_default_parameters() {
        let params = FormState::default().parse(None).unwrap();
        assert_eq!(params, Parameters::default());
    }

    #[test]
    fn parameters_serialize_camel_case() {
        let json = serde_json::to_value(Parameters::default()).unwrap();
        assert_eq!(json["sourcePrompt"], "Harry");
        assert_eq!(json["sourceTokenIndex"], -1);
        assert_eq!(json["targetTokenIndex"], -3);
        assert_eq!(json["sourceLayerIndex"], 2);
        assert_eq!(json["nTokens"], 1);
    }

    #[test]
    fn malformed_index_names_the_field() {
        let form = FormState::default().with(Field::SourceTokenIndex, "-".to_string());
        let err = form.parse(None).unwrap_err();
        assert!(matches!(
            err,
            PatchError::InvalidField { field: "Source Token Index", .. }
        ));
        assert_eq!(
            err.to_string(),
            "Source Token Index must be an integer, got '-'"
        );
    }

    #[test]
    fn negative_layer_is_rejected() {
        let form = FormState::default().with(Field::TargetLayerIndex, "-2".to_string());
        assert!(matches!(
            form.parse(None),
            Err(PatchError::InvalidField { field: "Target Layer Index", .. })
        ));
    }

    #[test]
    fn layer_beyond_model_depth_is_rejected() {
        let form = FormState::default().with(Field::TargetLayerIndex, "16".to_string());
        assert!(form.parse(None).is_ok());
        assert!(matches!(
            form.parse(Some(16)),
            Err(PatchError::OutOfRange { field: "Target Layer Index", value: 16, limit: 16 })
        ));
    }

    #[test]
    fn source_layer_may_be_the_final_hidden_state() {
        let last = FormState::default().with(Field::SourceLayerIndex, "16".to_string());
        assert_eq!(last.parse(Some(16)).unwrap().source_layer_index, 16);

        let past = FormState::default().with(Field::SourceLayerIndex, "17".to_string());
        assert!(matches!(
            past.parse(Some(16)),
            Err(PatchError::OutOfRange { field: "Source Layer Index", value: 17, limit: 17 })
        ));
    }

    #[test]
    fn patchscope_request_uses_server_field_names() {
        let params = Parameters::default();
        let json = serde_json::to_value(PatchscopeRequest::from(&params)).unwrap();
        assert_eq!(json["source_prompt"], "Harry");
        assert_eq!(json["source_token_idx"], -1);
        assert_eq!(json["target_token_idx"], -3);
        assert_eq!(json["target_layer_idx"], 2);
        assert_eq!(json["n_tokens"], 1);
    }

    #[test]
    fn activations_look_up_by_layer() {
        let json = r#"{"activations":{"layer_0":[1.0,2.0],"layer_3":[0.5,0.25]},"tokens":["<s>","Harry"],"token_ids":[1,42]}"#;
        let acts: Activations = serde_json::from_str(json).unwrap();
        assert_eq!(acts.layer(3), Some(&[0.5, 0.25][..]));
        assert_eq!(acts.layer(1), None);
    }

    #[test]
    fn whitespace_around_numbers_is_tolerated() {
        let form = FormState::default().with(Field::NTokens, " 4 ".to_string());
        assert_eq!(form.parse(None).unwrap().n_tokens, 4);
    }

    #[test]
    fn result_without_tokens_deserializes() {
        let json = r#"{"sourceOutput":"a","targetOutput":"b","patchedOutput":"c"}"#;
        let result: PatchResult = serde_json::from_str(json).unwrap();
        assert!(result.source_tokens.is_empty());
        assert_eq!(result.patched_output, "c");
    }

    #[test]
    fn failed_envelope_becomes_backend_error() {
        let json = r#"{"success":false,"error":"CUDA out of memory"}"#;
        let env: Envelope<ModelInfo> = serde_json::from_str(json).unwrap();
        match env.into_result() {
            Err(PatchError::Backend(msg)) => assert_eq!(msg, "CUDA out of memory"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
