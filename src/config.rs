use crate::vault::{RotationPolicy, VaultSettings};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Vault engine configuration
#[derive(Deserialize, Clone)]
pub struct VaultConfig {
    /// Base64-encoded 32-byte master key. Every stored credential is
    /// sealed under it; losing it makes snapshots unreadable.
    pub master_key: String,
    /// Calls per rolling hour for keys created without an explicit limit
    #[serde(default = "default_rate_limit")]
    pub default_rate_limit: u32,
    /// Whether rotation keeps or clears usage history
    #[serde(default)]
    pub rotation_policy: RotationPolicy,
}

fn default_rate_limit() -> u32 {
    100
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("master_key", &"<redacted>")
            .field("default_rate_limit", &self.default_rate_limit)
            .field("rotation_policy", &self.rotation_policy)
            .finish()
    }
}

/// Admin gate configuration
#[derive(Deserialize, Clone)]
pub struct AdminConfig {
    /// Opaque token required in `X-API-Token` for every management call
    pub token: String,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Web server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl WebConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Credential release settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AccessConfig {
    /// Report a caller missing from the allow-list as "not found" so
    /// callers cannot probe which services exist.
    #[serde(default)]
    pub conceal_forbidden: bool,
}

/// Logging settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub vault: VaultConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::with_name("config/default").required(false))
            // Override with local config if present
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (prefix: KEYVAULT_)
            // e.g., KEYVAULT_VAULT__MASTER_KEY, KEYVAULT_ADMIN__TOKEN
            .add_source(
                Environment::with_prefix("KEYVAULT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    /// Deserialize and validate an already-assembled configuration
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let app: Self = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.vault.master_key.trim().is_empty() {
            return Err(ConfigError::Message(
                "vault.master_key is required".to_string(),
            ));
        }
        if self.admin.token.trim().is_empty() {
            return Err(ConfigError::Message("admin.token is required".to_string()));
        }
        if self.vault.default_rate_limit == 0 {
            return Err(ConfigError::Message(
                "vault.default_rate_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn vault_settings(&self) -> VaultSettings {
        VaultSettings {
            default_rate_limit: self.vault.default_rate_limit,
            rotation_policy: self.vault.rotation_policy,
        }
    }
}
