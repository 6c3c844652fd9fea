use std::str::FromStr;

use weft_core::error::WeftError;
use weft_core::types::{ModelInfo, ModelPricing, ModelRef};

/// Static price table entry for one model.
pub struct ModelSpec {
    pub id: &'static str,
    pub display_name: &'static str,
    pub context_window: u32,
    pub pricing: ModelPricing,
}

impl ModelSpec {
    pub const fn new(
        id: &'static str,
        display_name: &'static str,
        context_window: u32,
        input_micros_per_mtok: u64,
        output_micros_per_mtok: u64,
    ) -> Self {
        Self {
            id,
            display_name,
            context_window,
            pricing: ModelPricing::from_micros(input_micros_per_mtok, output_micros_per_mtok),
        }
    }

    pub fn to_info(&self) -> ModelInfo {
        ModelInfo {
            id: self.id.to_string(),
            display_name: self.display_name.to_string(),
            context_window: self.context_window,
            pricing: self.pricing,
        }
    }
}

/// Convert a static table into owned `ModelInfo`s.
pub fn model_infos(specs: &[ModelSpec]) -> Vec<ModelInfo> {
    specs.iter().map(ModelSpec::to_info).collect()
}

/// Find a model's pricing in a static table.
pub fn find_pricing(specs: &[ModelSpec], model: &str) -> Option<ModelPricing> {
    specs.iter().find(|s| s.id == model).map(|s| s.pricing)
}

/// Capability tags used to pick a sensible default model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Fast,
    Balanced,
    Reasoning,
    Coding,
    LongContext,
    Cheap,
}

impl Capability {
    pub fn all() -> &'static [Capability] {
        &[
            Self::Fast,
            Self::Balanced,
            Self::Reasoning,
            Self::Coding,
            Self::LongContext,
            Self::Cheap,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Reasoning => "reasoning",
            Self::Coding => "coding",
            Self::LongContext => "long-context",
            Self::Cheap => "cheap",
        }
    }

    /// The recommended (provider, model) for this capability.
    pub fn recommended(&self) -> ModelRef {
        let (provider, model) = match self {
            Self::Fast => ("openai", "gpt-4o-mini"),
            Self::Balanced => ("anthropic", "claude-sonnet-4-20250514"),
            Self::Reasoning => ("anthropic", "claude-opus-4-20250514"),
            Self::Coding => ("anthropic", "claude-sonnet-4-20250514"),
            Self::LongContext => ("gemini", "gemini-1.5-pro"),
            Self::Cheap => ("gemini", "gemini-2.0-flash"),
        };
        ModelRef {
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }
}

impl FromStr for Capability {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" | "general" => Ok(Self::Balanced),
            "reasoning" => Ok(Self::Reasoning),
            "coding" | "code" => Ok(Self::Coding),
            "long-context" | "long_context" => Ok(Self::LongContext),
            "cheap" => Ok(Self::Cheap),
            other => Err(WeftError::Config(format!("unknown capability '{}'", other))),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
