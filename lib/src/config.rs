//! Configuration for fetching, updating and querying.
//!
//! A `Config` is plain data: it can be built in code with [`Config::builder`]
//! or loaded from a JSON file.

use crate::options::{PatternOrder, Reload};
use anyhow::Result;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, Write};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_UPDATE_METHOD: &str = "PATCH";

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    format!("tetrad/{}", env!("CARGO_PKG_VERSION"))
}

fn default_update_method() -> String {
    DEFAULT_UPDATE_METHOD.to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Builder)]
#[builder(default, setter(into))]
#[serde(default)]
pub struct Config {
    /// Never touch the network; fetches and updates fail with an offline error.
    pub offline: bool,
    /// Per-request timeout for fetch and update transports.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Overrides the weighted `Accept` header sent when fetching documents.
    pub accept: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub reload: Reload,
    pub pattern_order: PatternOrder,
    /// HTTP method used to send SPARQL updates.
    #[serde(default = "default_update_method")]
    pub update_method: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            offline: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            accept: None,
            user_agent: default_user_agent(),
            reload: Reload::default(),
            pattern_order: PatternOrder::default(),
            update_method: default_update_method(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn save_to_file(&self, file: &Path) -> Result<()> {
        let config_str = serde_json::to_string_pretty(&self)?;
        let mut file = std::fs::File::create(file)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn from_file(file: &Path) -> Result<Self> {
        let file = std::fs::File::open(file)?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)?;
        Ok(config)
    }

    /// Prints out the current Config in a clear and readable way for command line output.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  Offline: {}", self.offline);
        println!("  Timeout: {}s", self.timeout_secs);
        match &self.accept {
            Some(accept) => println!("  Accept: {}", accept),
            None => println!("  Accept: (default)"),
        }
        println!("  User Agent: {}", self.user_agent);
        println!("  Reload: {:?}", self.reload);
        println!("  Pattern Order: {:?}", self.pattern_order);
        println!("  Update Method: {}", self.update_method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let config = Config::builder()
            .offline(true)
            .timeout_secs(5u64)
            .build()
            .unwrap();
        assert!(config.offline);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.update_method, DEFAULT_UPDATE_METHOD);
        assert_eq!(config.reload, Reload::IfChanged);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"offline": true, "pattern_order": "selectivity"}"#).unwrap();
        assert!(config.offline);
        assert_eq!(config.pattern_order, PatternOrder::Selectivity);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(config.user_agent.starts_with("tetrad/"));
    }
}
