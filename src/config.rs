use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_TABLE: &str = "agent_system_prompt";

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    backend: BackendConfig,
    auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct BackendConfig {
    url: String,
    anon_key: String,
    table: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthConfig {
    refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend_url: String,
    pub anon_key: String,
    pub table: String,
    pub refresh_token: Option<String>,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self> {
        let config_file: ConfigFile =
            toml::from_str(content).context("Failed to parse config file")?;

        Ok(Self {
            backend_url: config_file.backend.url.trim_end_matches('/').to_string(),
            anon_key: config_file.backend.anon_key,
            table: config_file
                .backend
                .table
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            refresh_token: config_file.auth.refresh_token,
        })
    }

    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = Config::from_toml(
            r#"
            [backend]
            url = "https://example.supabase.co/"
            anon_key = "anon-key"
            table = "sdr_prompts"

            [auth]
            refresh_token = "refresh-abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend_url, "https://example.supabase.co");
        assert_eq!(config.anon_key, "anon-key");
        assert_eq!(config.table, "sdr_prompts");
        assert_eq!(config.refresh_token.as_deref(), Some("refresh-abc"));
    }

    #[test]
    fn table_defaults_and_token_is_optional() {
        let config = Config::from_toml(
            r#"
            [backend]
            url = "https://example.supabase.co"
            anon_key = "anon-key"

            [auth]
            "#,
        )
        .unwrap();

        assert_eq!(config.table, DEFAULT_TABLE);
        assert!(config.refresh_token.is_none());
    }

    #[test]
    fn missing_backend_section_is_an_error() {
        assert!(Config::from_toml("[auth]\n").is_err());
    }
}
