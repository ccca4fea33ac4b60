use serde::Deserialize;

use crate::error::ConfigError;

/// Recognised properties-file keys. All optional; an operation that needs a
/// value that was never set raises `ConfigError` rather than panicking.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(rename = "sparql.query.endpoint")]
    pub sparql_query_endpoint: Option<String>,

    #[serde(rename = "sparql.update.endpoint")]
    pub sparql_update_endpoint: Option<String>,

    #[serde(rename = "db.url")]
    pub db_url: Option<String>,

    #[serde(rename = "db.user")]
    pub db_user: Option<String>,

    #[serde(rename = "db.password")]
    pub db_password: Option<String>,
}

/// Loads configuration from `name` (e.g. an `.ini`/`.properties` file, no
/// extension) and overlays `APP__`-prefixed environment variables, e.g.
/// `APP__DB__URL`.
pub fn load(name: &str) -> Result<Config, config::ConfigError> {
    let mut parser = config::Config::default();
    parser.merge(config::File::with_name(name))?;
    parser.merge(config::Environment::with_prefix("APP").separator("__"))?;
    parser.try_into::<Config>()
}

impl Config {
    pub fn require_sparql_query_endpoint(&self) -> Result<&str, ConfigError> {
        self.sparql_query_endpoint
            .as_deref()
            .ok_or_else(|| ConfigError("sparql.query.endpoint".into()))
    }

    pub fn require_sparql_update_endpoint(&self) -> Result<&str, ConfigError> {
        self.sparql_update_endpoint
            .as_deref()
            .ok_or_else(|| ConfigError("sparql.update.endpoint".into()))
    }

    pub fn require_db_url(&self) -> Result<&str, ConfigError> {
        self.db_url
            .as_deref()
            .ok_or_else(|| ConfigError("db.url".into()))
    }
}
