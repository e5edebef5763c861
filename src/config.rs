use anyhow::{Context, Result};

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

const API_KEY_VARS: [&str; 3] = ["LLM_API_KEY", "GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub text_model: String,
    pub image_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineConfig {
    /// Extra attempts for a chapter body that came back degraded.
    pub chapter_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: String,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = API_KEY_VARS.iter().find_map(|&key| get(key));
        let llm = LlmConfig {
            api_url: get("LLM_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key,
            text_model: get("LLM_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_model: get("LLM_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        };

        let chapter_retries = match get("CHAPTER_RETRIES") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("CHAPTER_RETRIES must be a number, got {raw:?}"))?,
            None => 0,
        };

        Ok(Config {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            llm,
            pipeline: PipelineConfig { chapter_retries },
        })
    }
}
