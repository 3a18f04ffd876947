//! Simulated ingestion pipeline settings.
//!
//! [`PipelineConfig`] describes what the user believes the pipeline will do: which parser reads
//! the PDF, how text is chunked, how many chunks retrieval returns, and which model answers.
//! None of it drives real processing; the values are narrated in stage names and folded into
//! the backend system instruction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use thiserror::Error;

/// Hosted model used when nothing else is selected.
pub const HOSTED_DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// Hosted "advanced" tier; the only selection that changes the execution model.
pub const HOSTED_ADVANCED_MODEL: &str = "gemini-3-pro-preview";
/// Open-catalog model selected when switching to that provider.
pub const OPEN_CATALOG_DEFAULT_MODEL: &str = "meta-llama/Meta-Llama-3-70B-Instruct";

/// Hosted models offered for selection.
pub const HOSTED_MODELS: [HostedModel; 2] = [
    HostedModel {
        id: HOSTED_DEFAULT_MODEL,
        name: "Gemini 2.5 Flash",
        description: "Fast, efficient, low latency",
    },
    HostedModel {
        id: HOSTED_ADVANCED_MODEL,
        name: "Gemini 3.0 Pro",
        description: "Complex reasoning, high accuracy",
    },
];

/// Suggested open-catalog model identifiers. Any non-blank identifier is accepted.
pub const OPEN_CATALOG_PRESETS: [&str; 4] = [
    OPEN_CATALOG_DEFAULT_MODEL,
    "mistralai/Mistral-7B-Instruct-v0.2",
    "tiiuae/falcon-180B-chat",
    "microsoft/Phi-3-mini-4k-instruct",
];

/// Slider bounds for the chunk size, in tokens.
pub const CHUNK_SIZE: NumericBounds = NumericBounds::new(128, 2048, 64);
/// Slider bounds for the chunk overlap, in tokens.
pub const OVERLAP: NumericBounds = NumericBounds::new(0, 512, 16);
/// Slider bounds for the simulated top-K retrieval depth.
pub const RETRIEVAL_K: NumericBounds = NumericBounds::new(1, 20, 1);

/// Entry in the hosted model catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HostedModel {
    /// Backend model identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
}

/// Inclusive range with a step grid, as offered by the editing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericBounds {
    /// Smallest allowed value.
    pub min: u32,
    /// Largest allowed value.
    pub max: u32,
    /// Grid spacing starting at `min`.
    pub step: u32,
}

impl NumericBounds {
    const fn new(min: u32, max: u32, step: u32) -> Self {
        Self { min, max, step }
    }

    /// The allowed range.
    pub fn range(&self) -> RangeInclusive<u32> {
        self.min..=self.max
    }

    /// Clamp into range and snap to the nearest grid point.
    pub fn clamp(&self, value: u32) -> u32 {
        let value = value.clamp(self.min, self.max);
        let offset = value - self.min;
        let snapped = self.min + ((offset + self.step / 2) / self.step) * self.step;
        snapped.min(self.max)
    }
}

/// Parser the user believes will read the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    /// Layout-aware parsing that preserves tables and headers.
    Docling,
    /// Recursive character splitting.
    #[serde(alias = "lang_chain")]
    LangChain,
    /// Generic element extraction.
    Unstructured,
}

impl ParserKind {
    /// All parser choices in display order.
    pub const ALL: [ParserKind; 3] = [Self::Docling, Self::LangChain, Self::Unstructured];

    /// Full display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Docling => "Docling (Layout Aware)",
            Self::LangChain => "LangChain (Recursive Character)",
            Self::Unstructured => "Unstructured.io",
        }
    }

    /// First word of the label, used in stage names and chat copy.
    pub fn short_label(self) -> &'static str {
        self.label().split(' ').next().unwrap_or_default()
    }
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ParserKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docling" => Ok(Self::Docling),
            "langchain" | "lang_chain" => Ok(Self::LangChain),
            "unstructured" | "unstructured.io" => Ok(Self::Unstructured),
            other => Err(ConfigurationError::UnknownParser(other.to_string())),
        }
    }
}

/// Where the answering model comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelProvider {
    /// Hosted Gemini models; the only provider that actually executes.
    #[serde(rename = "google")]
    Google,
    /// Open Hugging Face catalogue; imitated through a persona instruction.
    #[serde(rename = "hf", alias = "huggingface")]
    HuggingFace,
}

impl ModelProvider {
    /// Model identifier selected when switching to this provider.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Google => HOSTED_DEFAULT_MODEL,
            Self::HuggingFace => OPEN_CATALOG_DEFAULT_MODEL,
        }
    }

    /// Short wire name (`google` / `hf`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::HuggingFace => "hf",
        }
    }
}

impl std::str::FromStr for ModelProvider {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(Self::Google),
            "hf" | "huggingface" => Ok(Self::HuggingFace),
            other => Err(ConfigurationError::UnknownProvider(other.to_string())),
        }
    }
}

/// Errors raised while editing or validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Parser name not recognised.
    #[error("Unknown parser: {0}")]
    UnknownParser(String),
    /// Provider name not recognised.
    #[error("Unknown model provider: {0}")]
    UnknownProvider(String),
    /// Hosted model outside the catalogue.
    #[error("Unknown hosted model: {0}")]
    UnknownHostedModel(String),
    /// Open-catalog model identifier was blank.
    #[error("Model identifier must not be empty")]
    EmptyModel,
    /// A numeric field lies outside its bounds.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: u32,
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
    },
    /// Overlap would swallow the whole chunk.
    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge {
        /// Configured overlap.
        overlap: u32,
        /// Configured chunk size.
        chunk_size: u32,
    },
}

/// Settings of the simulated pipeline for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Tokens per chunk.
    pub chunk_size: u32,
    /// Tokens shared between neighbouring chunks.
    pub overlap: u32,
    /// Simulated top-K retrieval depth.
    pub retrieval_k: u32,
    /// Simulated parser.
    pub parser: ParserKind,
    /// Model provider category.
    pub model_provider: ModelProvider,
    /// Model identifier, always consistent with `model_provider`.
    pub model: String,
    /// Whether the session export bundle is offered in chat.
    pub export_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
            retrieval_k: 5,
            parser: ParserKind::Docling,
            model_provider: ModelProvider::Google,
            model: HOSTED_DEFAULT_MODEL.to_string(),
            export_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Switch provider and reset the model to that provider's default.
    pub fn set_provider(&mut self, provider: ModelProvider) {
        self.model_provider = provider;
        self.model = provider.default_model().to_string();
    }

    /// Select a model for the current provider.
    pub fn set_model(&mut self, model: &str) -> Result<(), ConfigurationError> {
        let model = model.trim();
        match self.model_provider {
            ModelProvider::Google => {
                if !HOSTED_MODELS.iter().any(|entry| entry.id == model) {
                    return Err(ConfigurationError::UnknownHostedModel(model.to_string()));
                }
            }
            ModelProvider::HuggingFace => {
                if model.is_empty() {
                    return Err(ConfigurationError::EmptyModel);
                }
            }
        }
        self.model = model.to_string();
        Ok(())
    }

    /// Apply a partial edit. Numeric fields are clamped to their slider grid.
    ///
    /// The provider is applied before the model, so an update carrying both selects the given
    /// model under the new provider. The edit is all-or-nothing.
    pub fn apply(&mut self, update: ConfigUpdate) -> Result<(), ConfigurationError> {
        let mut next = self.clone();
        if let Some(chunk_size) = update.chunk_size {
            next.chunk_size = CHUNK_SIZE.clamp(chunk_size);
        }
        if let Some(overlap) = update.overlap {
            next.overlap = OVERLAP.clamp(overlap);
        }
        if let Some(retrieval_k) = update.retrieval_k {
            next.retrieval_k = RETRIEVAL_K.clamp(retrieval_k);
        }
        if let Some(parser) = update.parser {
            next.parser = parser;
        }
        if let Some(provider) = update.model_provider {
            next.set_provider(provider);
        }
        if let Some(model) = update.model.as_deref() {
            next.set_model(model)?;
        }
        if let Some(export_enabled) = update.export_enabled {
            next.export_enabled = export_enabled;
        }
        *self = next;
        Ok(())
    }

    /// Check bounds and `overlap < chunk_size` before the configuration is frozen.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        check_range("chunk_size", self.chunk_size, CHUNK_SIZE)?;
        check_range("overlap", self.overlap, OVERLAP)?;
        check_range("retrieval_k", self.retrieval_k, RETRIEVAL_K)?;
        if self.overlap >= self.chunk_size {
            return Err(ConfigurationError::OverlapTooLarge {
                overlap: self.overlap,
                chunk_size: self.chunk_size,
            });
        }
        match self.model_provider {
            ModelProvider::Google if !HOSTED_MODELS.iter().any(|m| m.id == self.model) => {
                Err(ConfigurationError::UnknownHostedModel(self.model.clone()))
            }
            ModelProvider::HuggingFace if self.model.trim().is_empty() => {
                Err(ConfigurationError::EmptyModel)
            }
            _ => Ok(()),
        }
    }
}

fn check_range(
    field: &'static str,
    value: u32,
    bounds: NumericBounds,
) -> Result<(), ConfigurationError> {
    if bounds.range().contains(&value) {
        Ok(())
    } else {
        Err(ConfigurationError::OutOfRange {
            field,
            value,
            min: bounds.min,
            max: bounds.max,
        })
    }
}

/// Partial configuration edit submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigUpdate {
    /// New chunk size.
    #[serde(default)]
    pub chunk_size: Option<u32>,
    /// New overlap.
    #[serde(default)]
    pub overlap: Option<u32>,
    /// New retrieval depth.
    #[serde(default)]
    pub retrieval_k: Option<u32>,
    /// New parser.
    #[serde(default)]
    pub parser: Option<ParserKind>,
    /// New provider; resets the model unless `model` is also given.
    #[serde(default)]
    pub model_provider: Option<ModelProvider>,
    /// New model for the (possibly new) provider.
    #[serde(default)]
    pub model: Option<String>,
    /// Toggle for the export bundle.
    #[serde(default)]
    pub export_enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_provider_resets_model() {
        let mut config = PipelineConfig::default();
        config.set_model(HOSTED_ADVANCED_MODEL).expect("catalogue model");

        config.set_provider(ModelProvider::HuggingFace);
        assert_eq!(config.model, OPEN_CATALOG_DEFAULT_MODEL);

        config.set_model("tiiuae/falcon-180B-chat").expect("free-form id");
        config.set_provider(ModelProvider::Google);
        assert_eq!(config.model, HOSTED_DEFAULT_MODEL);

        config.set_provider(ModelProvider::Google);
        assert_eq!(config.model, HOSTED_DEFAULT_MODEL);
    }

    #[test]
    fn hosted_models_come_from_catalogue() {
        let mut config = PipelineConfig::default();
        let error = config.set_model("gpt-4o").expect_err("not in catalogue");
        assert_eq!(error, ConfigurationError::UnknownHostedModel("gpt-4o".into()));
        assert_eq!(config.model, HOSTED_DEFAULT_MODEL);
    }

    #[test]
    fn open_catalog_rejects_blank_identifier() {
        let mut config = PipelineConfig::default();
        config.set_provider(ModelProvider::HuggingFace);
        assert_eq!(config.set_model("   "), Err(ConfigurationError::EmptyModel));
    }

    #[test]
    fn edits_are_clamped_to_slider_grid() {
        let mut config = PipelineConfig::default();
        config
            .apply(ConfigUpdate {
                chunk_size: Some(5000),
                overlap: Some(37),
                retrieval_k: Some(0),
                ..ConfigUpdate::default()
            })
            .expect("numeric edits never fail");

        assert_eq!(config.chunk_size, 2048);
        assert_eq!(config.overlap, 32);
        assert_eq!(config.retrieval_k, 1);
    }

    #[test]
    fn update_with_provider_and_model_keeps_model() {
        let mut config = PipelineConfig::default();
        config
            .apply(ConfigUpdate {
                model_provider: Some(ModelProvider::HuggingFace),
                model: Some("microsoft/Phi-3-mini-4k-instruct".into()),
                ..ConfigUpdate::default()
            })
            .expect("valid update");
        assert_eq!(config.model_provider, ModelProvider::HuggingFace);
        assert_eq!(config.model, "microsoft/Phi-3-mini-4k-instruct");
    }

    #[test]
    fn failed_update_leaves_config_untouched() {
        let mut config = PipelineConfig::default();
        let before = config.clone();
        let result = config.apply(ConfigUpdate {
            chunk_size: Some(256),
            model: Some("unknown".into()),
            ..ConfigUpdate::default()
        });
        assert!(result.is_err());
        assert_eq!(config, before);
    }

    #[test]
    fn validate_rejects_overlap_not_below_chunk() {
        let config = PipelineConfig {
            chunk_size: 128,
            overlap: 128,
            ..PipelineConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigurationError::OverlapTooLarge {
                overlap: 128,
                chunk_size: 128
            })
        );
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        let config = PipelineConfig {
            retrieval_k: 40,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::OutOfRange { field: "retrieval_k", .. })
        ));
    }

    #[test]
    fn parser_labels_and_parsing() {
        assert_eq!(ParserKind::Docling.short_label(), "Docling");
        assert_eq!(ParserKind::LangChain.short_label(), "LangChain");
        assert_eq!(ParserKind::Unstructured.short_label(), "Unstructured.io");
        assert_eq!("LangChain".parse::<ParserKind>(), Ok(ParserKind::LangChain));
        assert!("pdfminer".parse::<ParserKind>().is_err());
    }

    #[test]
    fn provider_serializes_with_short_names() {
        let json = serde_json::to_string(&ModelProvider::HuggingFace).expect("serialize");
        assert_eq!(json, "\"hf\"");
        let parsed: ModelProvider = serde_json::from_str("\"google\"").expect("deserialize");
        assert_eq!(parsed, ModelProvider::Google);
    }
}
