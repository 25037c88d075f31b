use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the selected provider
    pub api_key: Option<String>,

    /// Provider used for completions (key into `providers`)
    pub provider: String,

    /// Default model to use
    pub default_model: String,

    /// Model provider configuration
    pub providers: HashMap<String, ModelProvider>,

    pub system_prompt: String,
    pub temperature: f32,

    /// Seconds between UI updates while a reply streams in
    pub throttle: f32,

    /// Seconds before a relayed message is sent in dual chat
    pub auto_converse_delay: f32,

    /// Where exported conversations are written
    pub export_dir: Option<PathBuf>,

    /// Duet home directory
    #[serde(skip)]
    pub duet_home: PathBuf,
}

/// Model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProvider {
    pub name: String,
    pub base_url: String,
    pub api_key_env: Option<String>,
    pub models: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ModelProvider {
                name: "OpenAI".to_string(),
                base_url: "https://api.openai.com".to_string(),
                api_key_env: Some("OPENAI_API_KEY".to_string()),
                models: vec!["gpt-3.5-turbo".to_string()],
            },
        );
        providers.insert(
            "openrouter".to_string(),
            ModelProvider {
                name: "OpenRouter".to_string(),
                base_url: "https://openrouter.ai/api".to_string(),
                api_key_env: Some("OPENROUTER_API_KEY".to_string()),
                models: vec![
                    "openai/gpt-3.5-turbo".to_string(),
                    "openai/gpt-4o-mini".to_string(),
                ],
            },
        );

        Config {
            api_key: None,
            provider: "openai".to_string(),
            default_model: "gpt-3.5-turbo".to_string(),
            providers,
            system_prompt: "You are a helpful assistant.".to_string(),
            temperature: 0.7,
            throttle: 0.1,
            auto_converse_delay: 1.0,
            export_dir: None,
            duet_home: home.join(".duet"),
        }
    }
}

impl Config {
    /// Load `~/.duet/config.toml`, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        let duet_home = home.join(".duet");

        fs::create_dir_all(&duet_home).context("Failed to create .duet directory")?;

        Self::load_from(&duet_home)
    }

    /// Load the configuration stored under `duet_home`
    pub fn load_from(duet_home: &Path) -> Result<Self> {
        let config_path = duet_home.join("config.toml");

        let mut config = if config_path.exists() {
            let content =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str::<Config>(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.duet_home = duet_home.to_path_buf();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.duet_home).context("Failed to create .duet directory")?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(self.config_path(), content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.duet_home.join("config.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.duet_home.join("duet.log")
    }

    /// Get the current model provider
    pub fn current_provider(&self) -> Option<&ModelProvider> {
        self.providers.get(&self.provider)
    }

    /// Models offered in the model selector; the default model is always included
    pub fn available_models(&self) -> Vec<String> {
        let mut models = self
            .current_provider()
            .map(|provider| provider.models.clone())
            .unwrap_or_default();
        if !models.contains(&self.default_model) {
            models.insert(0, self.default_model.clone());
        }
        models
    }

    /// Get API key from config or the provider's environment variable
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.current_provider()
                .and_then(|provider| provider.api_key_env.as_ref())
                .and_then(|var| std::env::var(var).ok())
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.get_api_key().is_some()
    }

    /// Name of the variable the API key is read from, for error messages
    pub fn api_key_env(&self) -> String {
        self.current_provider()
            .and_then(|provider| provider.api_key_env.clone())
            .unwrap_or_else(|| "an API key".to_string())
    }

    /// Export directory: configured, else the user's downloads, else the cwd
    pub fn resolved_export_dir(&self) -> PathBuf {
        self.export_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Human-readable dump with the API key redacted
    pub fn describe(&self) -> String {
        let key = match &self.api_key {
            Some(_) => "<set in config>".to_string(),
            None if self.has_api_key() => format!("<from {}>", self.api_key_env()),
            None => "<missing>".to_string(),
        };

        format!(
            "config file:    {}\nprovider:       {}\nmodel:          {}\napi key:        {}\nsystem prompt:  {}\ntemperature:    {}\nthrottle:       {}s\nconverse delay: {}s\nexport dir:     {}\nlog file:       {}",
            self.config_path().display(),
            self.provider,
            self.default_model,
            key,
            self.system_prompt,
            self.temperature,
            self.throttle,
            self.auto_converse_delay,
            self.resolved_export_dir().display(),
            self.log_path().display(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path()).unwrap();

        assert_eq!(config.default_model, "gpt-3.5-turbo");
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.throttle, 0.1);
        assert_eq!(config.auto_converse_delay, 1.0);
        assert_eq!(config.system_prompt, "You are a helpful assistant.");
        assert_eq!(config.duet_home, dir.path());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "temperature = 1.25\nexport_dir = \"/tmp/exports\"\napi_key = \"sk-test\"\n",
        )
        .unwrap();

        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.temperature, 1.25);
        assert_eq!(config.export_dir, Some(PathBuf::from("/tmp/exports")));
        assert_eq!(config.resolved_export_dir(), PathBuf::from("/tmp/exports"));
        assert_eq!(config.get_api_key().as_deref(), Some("sk-test"));
        assert_eq!(config.provider, "openai");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load_from(dir.path()).unwrap();
        config.default_model = "gpt-4o-mini".to_string();
        config.save().unwrap();

        let reloaded = Config::load_from(dir.path()).unwrap();
        assert_eq!(reloaded.default_model, "gpt-4o-mini");
        assert!(reloaded.available_models().contains(&"gpt-4o-mini".to_string()));
    }

    #[test]
    fn describe_redacts_key() {
        let config = Config {
            api_key: Some("sk-secret".to_string()),
            ..Config::default()
        };
        let text = config.describe();
        assert!(text.contains("<set in config>"));
        assert!(!text.contains("sk-secret"));
    }
}
