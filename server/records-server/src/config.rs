//! Layered configuration
//!
//! Built-in defaults, then an optional file, then `RECORDS__*` environment
//! variables (`RECORDS__AUTH__JWT_SECRET` sets `auth.jwt_secret`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "RECORDS";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    /// Administrator ensured at startup
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL URL; absent selects the in-memory store
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HS256 signing secret; empty generates a per-process secret
    pub jwt_secret: String,
    pub token_lifetime_secs: u64,
    pub refresh_lifetime_secs: u64,
    pub allow_self_registration: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_lifetime_secs: 3600,
            refresh_lifetime_secs: 86_400,
            allow_self_registration: false,
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    /// Load defaults, then `path` if given, then the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let mut builder = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("database.max_connections", i64::from(defaults.database.max_connections))?
            .set_default("database.run_migrations", defaults.database.run_migrations)?
            .set_default("auth.jwt_secret", defaults.auth.jwt_secret)?
            .set_default(
                "auth.token_lifetime_secs",
                i64::try_from(defaults.auth.token_lifetime_secs).unwrap_or(i64::MAX),
            )?
            .set_default(
                "auth.refresh_lifetime_secs",
                i64::try_from(defaults.auth.refresh_lifetime_secs).unwrap_or(i64::MAX),
            )?
            .set_default("auth.allow_self_registration", defaults.auth.allow_self_registration)?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.auth.token_lifetime_secs, 3600);
        assert_eq!(config.auth.refresh_lifetime_secs, 86_400);
        assert!(!config.auth.allow_self_registration);
        assert!(config.database.url.is_none());
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("records-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("records.toml");
        std::fs::write(
            &path,
            "[server]\nport = 9100\n\n[auth]\nallow_self_registration = true\n\n[bootstrap_admin]\nusername = \"root\"\nemail = \"root@school.test\"\npassword = \"change me please\"\n",
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.auth.allow_self_registration);
        assert_eq!(config.bootstrap_admin.unwrap().username, "root");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_debug_redacts_bootstrap_password() {
        let admin = BootstrapAdmin {
            username: "root".to_string(),
            email: "root@school.test".to_string(),
            password: "hunter22hunter".to_string(),
        };
        assert!(!format!("{admin:?}").contains("hunter22"));
    }
}
