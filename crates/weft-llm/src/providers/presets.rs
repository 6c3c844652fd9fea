use crate::pricing::ModelSpec;

/// A named profile for an OpenAI-compatible chat-completions API.
pub struct ProviderPreset {
    pub id: &'static str,
    pub display_name: &'static str,
    pub default_base_url: &'static str,
    /// Required API key prefix ("" = any).
    pub key_prefix: &'static str,
    pub min_key_len: usize,
    pub models: &'static [ModelSpec],
}

impl ProviderPreset {
    pub fn key_looks_valid(&self, key: &str) -> bool {
        key.starts_with(self.key_prefix)
            && key.len() >= self.min_key_len
            && !key.chars().any(char::is_whitespace)
    }
}

pub static OPENAI: ProviderPreset = ProviderPreset {
    id: "openai",
    display_name: "OpenAI",
    default_base_url: "https://api.openai.com/v1/chat/completions",
    key_prefix: "sk-",
    min_key_len: 20,
    models: &[
        ModelSpec::new("gpt-4o", "GPT-4o", 128_000, 2_500_000, 10_000_000),
        ModelSpec::new("gpt-4o-mini", "GPT-4o mini", 128_000, 150_000, 600_000),
        ModelSpec::new("gpt-4.1", "GPT-4.1", 1_047_576, 2_000_000, 8_000_000),
        ModelSpec::new("gpt-4.1-mini", "GPT-4.1 mini", 1_047_576, 400_000, 1_600_000),
        ModelSpec::new("o3-mini", "o3-mini", 200_000, 1_100_000, 4_400_000),
    ],
};

pub static GROQ: ProviderPreset = ProviderPreset {
    id: "groq",
    display_name: "Groq",
    default_base_url: "https://api.groq.com/openai/v1/chat/completions",
    key_prefix: "gsk_",
    min_key_len: 20,
    models: &[
        ModelSpec::new("llama-3.3-70b-versatile", "Llama 3.3 70B", 128_000, 590_000, 790_000),
        ModelSpec::new("llama-3.1-8b-instant", "Llama 3.1 8B", 128_000, 50_000, 80_000),
    ],
};

pub static MISTRAL: ProviderPreset = ProviderPreset {
    id: "mistral",
    display_name: "Mistral AI",
    default_base_url: "https://api.mistral.ai/v1/chat/completions",
    key_prefix: "",
    min_key_len: 32,
    models: &[
        ModelSpec::new("mistral-large-latest", "Mistral Large", 128_000, 2_000_000, 6_000_000),
        ModelSpec::new("mistral-small-latest", "Mistral Small", 32_000, 200_000, 600_000),
    ],
};

pub static DEEPSEEK: ProviderPreset = ProviderPreset {
    id: "deepseek",
    display_name: "DeepSeek",
    default_base_url: "https://api.deepseek.com/v1/chat/completions",
    key_prefix: "sk-",
    min_key_len: 20,
    models: &[
        ModelSpec::new("deepseek-chat", "DeepSeek V3", 64_000, 270_000, 1_100_000),
        ModelSpec::new("deepseek-reasoner", "DeepSeek R1", 64_000, 550_000, 2_190_000),
    ],
};

/// Look up a preset by provider id.
pub fn get_preset(provider: &str) -> Option<&'static ProviderPreset> {
    match provider {
        "openai" => Some(&OPENAI),
        "groq" => Some(&GROQ),
        "mistral" => Some(&MISTRAL),
        "deepseek" => Some(&DEEPSEEK),
        _ => None,
    }
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &["openai", "groq", "mistral", "deepseek"]
}
