use crate::error::AppError;
use config::Config;
use serde::{Deserialize, Serialize};
use xnsnet_server::config::ServerConfig;

pub const ENV_PREFIX: &str = "XNSNET";

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub app_log_level: String,
    #[serde(default = "default_log_level")]
    pub all_log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_log_level: default_log_level(),
            all_log_level: default_log_level(),
            server: ServerConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Reads `settings_path` if given, then `XNSNET_*` variables on top
    /// (`XNSNET_SERVER__HUB__ADDRESS=...`).
    pub fn parse_config(settings_path: Option<&str>) -> Result<AppConfig, AppError> {
        let mut builder = Config::builder();
        if let Some(path) = settings_path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config = settings.try_deserialize::<AppConfig>()?;

        Ok(config)
    }

    /// The `env_logger` filter: our crates at `app_log_level`, the rest at
    /// `all_log_level`.
    pub fn log_filter(&self) -> String {
        format!(
            "{all},xnsnet={app},xnsnet_core={app},xnsnet_courier={app},xnsnet_server={app}",
            all = self.all_log_level,
            app = self.app_log_level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_sources() {
        let config = AppConfig::parse_config(None).unwrap();
        assert_eq!(config.app_log_level, "info");
        assert_eq!(config.server.hub.address, "127.0.0.1:3333");
        assert_eq!(config.server.spp.allocation, 4);
    }

    #[test]
    fn log_filter_names_every_crate() {
        let config = AppConfig {
            app_log_level: "debug".to_string(),
            all_log_level: "warn".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(
            config.log_filter(),
            "warn,xnsnet=debug,xnsnet_core=debug,xnsnet_courier=debug,xnsnet_server=debug"
        );
    }
}
