use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Studio settings, read once at startup from a YAML file.
///
/// Every section has defaults so a partial file is valid. API keys fall back
/// to environment variables when absent from the file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub api_keys: ApiKeys,
    pub models: ModelsConfig,
    pub memory: MemoryConfig,
    pub visual_feedback: FeedbackConfig,
    pub generation: GenerationConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub google: Option<String>,
    pub stability: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub brain: String,
    pub painter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub file_path: PathBuf,
    pub max_history_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub enabled: bool,
    pub vlm_model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub steps: u32,
    pub width: u32,
    pub height: u32,
    pub cfg_scale: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub request_timeout_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            brain: "gemini-2.5-flash".to_string(),
            painter: "stable-diffusion-xl-1024-v1-0".to_string(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file_path: PathBuf::from("chat_memory.json"),
            max_history_depth: 10,
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vlm_model: "gemini-2.5-flash".to_string(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            steps: 30,
            width: 1024,
            height: 1024,
            cfg_scale: 7.0,
            seed: 0,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_s: 90.0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl StudioConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading config {}", path.display()))?;
        Self::from_yaml_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: StudioConfig = if raw.trim().is_empty() {
            StudioConfig::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory.max_history_depth == 0 {
            bail!("memory.max_history_depth must be at least 1");
        }
        if self.generation.steps == 0 {
            bail!("generation.steps must be at least 1");
        }
        if self.generation.width == 0 || self.generation.height == 0 {
            bail!(
                "generation dimensions must be positive (got {}x{})",
                self.generation.width,
                self.generation.height
            );
        }
        if !(self.transport.request_timeout_s > 0.0) {
            bail!("transport.request_timeout_s must be positive");
        }
        Ok(())
    }

    /// Routes every collaborator to the offline dryrun adapters.
    pub fn with_dryrun_models(mut self) -> Self {
        self.models.brain = "dryrun-brain".to_string();
        self.models.painter = "dryrun-painter".to_string();
        self.visual_feedback.vlm_model = "dryrun-critic".to_string();
        self
    }

    pub fn google_api_key(&self) -> Option<String> {
        non_empty(self.api_keys.google.as_deref())
            .or_else(|| non_empty_env("GEMINI_API_KEY"))
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    pub fn stability_api_key(&self) -> Option<String> {
        non_empty(self.api_keys.stability.as_deref()).or_else(|| non_empty_env("STABILITY_API_KEY"))
    }
}

pub fn is_dryrun_model(model: &str) -> bool {
    model.trim().to_ascii_lowercase().starts_with("dryrun")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{is_dryrun_model, StudioConfig};

    #[test]
    fn full_yaml_document_parses() -> anyhow::Result<()> {
        let config = StudioConfig::from_yaml_str(
            r#"
api_keys:
  google: g-key
  stability: s-key
models:
  brain: gemini-2.0-flash
  painter: stable-diffusion-xl-1024-v1-0
memory:
  enabled: true
  file_path: data/memory.json
  max_history_depth: 6
visual_feedback:
  enabled: false
  vlm_model: gemini-2.0-flash
generation:
  steps: 40
  width: 896
  height: 1152
  cfg_scale: 6.5
"#,
        )?;
        assert_eq!(config.models.brain, "gemini-2.0-flash");
        assert_eq!(config.memory.file_path, PathBuf::from("data/memory.json"));
        assert_eq!(config.memory.max_history_depth, 6);
        assert!(!config.visual_feedback.enabled);
        assert_eq!(config.generation.steps, 40);
        assert_eq!(config.generation.seed, 0);
        assert_eq!(config.google_api_key().as_deref(), Some("g-key"));
        assert_eq!(config.stability_api_key().as_deref(), Some("s-key"));
        Ok(())
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() -> anyhow::Result<()> {
        let config = StudioConfig::from_yaml_str("memory:\n  max_history_depth: 4\n")?;
        assert!(config.memory.enabled);
        assert_eq!(config.memory.max_history_depth, 4);
        assert!(config.visual_feedback.enabled);
        assert_eq!(config.generation.width, 1024);
        assert_eq!(config.logging.level, "info");

        let empty = StudioConfig::from_yaml_str("")?;
        assert_eq!(empty, StudioConfig::default());
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = StudioConfig::from_yaml_str("memory:\n  max_history_depth: 0\n")
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("max_history_depth"));

        assert!(StudioConfig::from_yaml_str("generation:\n  width: 0\n").is_err());
        assert!(StudioConfig::from_yaml_str("generation: [1, 2]\n").is_err());
    }

    #[test]
    fn load_reports_missing_file_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("missing.yaml");
        let err = StudioConfig::load(&path).err().map(|err| format!("{err:#}"));
        assert!(err.unwrap_or_default().contains("missing.yaml"));
        Ok(())
    }

    #[test]
    fn dryrun_models_are_detected() {
        let config = StudioConfig::default().with_dryrun_models();
        assert!(is_dryrun_model(&config.models.brain));
        assert!(is_dryrun_model(&config.models.painter));
        assert!(is_dryrun_model(&config.visual_feedback.vlm_model));
        assert!(!is_dryrun_model("gemini-2.5-flash"));
    }
}
