//! Caller-facing model names and their upstream identifiers

/// Upstream configuration for one caller-facing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelConfig {
    /// Caller-facing name (echoed back in responses)
    pub name: &'static str,
    /// Upstream model UUID
    pub upstream_id: &'static str,
    /// Output ceiling sent as the `max_tokens` param
    pub max_tokens: u32,
}

/// Model used when a request omits `model`.
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";

const MODELS: &[ModelConfig] = &[
    ModelConfig {
        name: "claude-3-7-sonnet-20250219",
        upstream_id: "be71f37b-1487-49fa-a989-a9bb99c0b129",
        max_tokens: 64000,
    },
    ModelConfig {
        name: "claude-4-opus-20250514",
        upstream_id: "bebc7dd5-a24d-4147-85b0-8f62902ea1a3",
        max_tokens: 32000,
    },
    ModelConfig {
        name: "claude-4-sonnet",
        upstream_id: "884dde7c-8def-4365-b19a-57af2787ab84",
        max_tokens: 64000,
    },
];

/// Rejected model name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("model '{requested}' does not exist. Supported models: {}", supported_list())]
pub struct InvalidModel {
    pub requested: String,
}

fn supported_list() -> String {
    MODELS.iter().map(|m| m.name).collect::<Vec<_>>().join(", ")
}

/// All supported models in listing order.
pub fn all() -> &'static [ModelConfig] {
    MODELS
}

/// Resolve a caller-facing model name.
pub fn lookup(name: &str) -> Result<&'static ModelConfig, InvalidModel> {
    MODELS
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| InvalidModel {
            requested: name.to_string(),
        })
}
