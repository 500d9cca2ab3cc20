use std::path::Path;

use crate::ClientConfig;

impl ClientConfig {
    /// Load configuration from a TOML file
    ///
    /// `{{ env.VAR }}` placeholders are expanded before parsing and the
    /// result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, expansion or parsing
    /// fails, or the configuration is invalid
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::load`], minus the file read
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded = crate::env::expand_env(raw)?;
        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        tracing::debug!(
            message_limit = config.message_limit,
            default_model = config.default_model.as_deref().unwrap_or("<none>"),
            "configuration loaded"
        );

        Ok(config)
    }
}
