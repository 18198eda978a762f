use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use shop_api::ApiSettings;
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub keep_alive_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub identity_header: String,
    pub role_header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("stream.keep_alive_seconds", 15)?
            .set_default("auth.identity_header", "x-user-id")?
            .set_default("auth.role_header", "x-user-role")?
            .set_default(
                "logging.filter",
                "shop_rs=debug,shop_api=debug,shop_services=info,shop_stream=debug,tower_http=debug",
            )?
            .set_default("logging.json", false)?
            // Add in settings from configuration file
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from environment variables, e.g. SHOP_SERVER__PORT
            .add_source(Environment::with_prefix("SHOP").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            identity_header: self.auth.identity_header.to_ascii_lowercase(),
            role_header: self.auth.role_header.to_ascii_lowercase(),
            keep_alive_seconds: self.stream.keep_alive_seconds,
        }
    }
}
