use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub midtrans: MidtransConfig,
    #[serde(default)]
    pub xendit: XenditConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MidtransConfig {
    pub server_key: Option<String>,
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct XenditConfig {
    pub callback_token: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SmtpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub ops_recipient: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.max_connections", 10)?
            .set_default("midtrans.enabled", false)?
            .set_default("midtrans.api_base_url", "https://api.midtrans.com")?
            .set_default("xendit.enabled", false)?
            .set_default("smtp.enabled", false)?
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables (STUDIOBOOK__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("STUDIOBOOK").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://studiobook.db".to_string(),
                max_connections: 10,
            },
            midtrans: MidtransConfig {
                server_key: None,
                api_base_url: Some("https://api.midtrans.com".to_string()),
                enabled: false,
            },
            xendit: XenditConfig {
                callback_token: None,
                enabled: false,
            },
            smtp: SmtpConfig::default(),
        }
    }
}
